//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every pluggable implementation module (storage backend, service plugin,
/// mailer, file transfer) exposes a `Registry` struct implementing this trait
/// so the builder can find its factory by the name used in configuration,
/// e.g. `storage.implementations.file` or `services.implementations.additive`.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
