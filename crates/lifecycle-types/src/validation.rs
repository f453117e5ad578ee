//! Configuration validation for pluggable implementations.
//!
//! Each implementation describes the shape of its TOML table with a
//! [`Schema`]; the factory validates before constructing anything.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// Array whose elements all have the inner type.
	Array(Box<FieldType>),
}

/// Custom check run after the type check passed.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Unknown keys are accepted; only declared fields are checked.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(field: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String if !value.is_str() => Err(mismatch(field, "string", value)),
		FieldType::Boolean if !value.is_bool() => Err(mismatch(field, "boolean", value)),
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field, "integer", value))?;
			if min.is_some_and(|min| int_val < min) || max.is_some_and(|max| int_val > max) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is out of range {:?}..={:?}", int_val, min, max),
				});
			}
			Ok(())
		}
		FieldType::Array(inner) => {
			let items = value
				.as_array()
				.ok_or_else(|| mismatch(field, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", field, i), item, inner)?;
			}
			Ok(())
		}
		_ => Ok(()),
	}
}

/// A configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
