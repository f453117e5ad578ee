//! Text renderings of the state table.

use crate::GraphFormat;
use lifecycle_core::state::{Edge, TriggerKind};
use lifecycle_types::ProcessStatus;

fn trigger_name(trigger: TriggerKind) -> &'static str {
	match trigger {
		TriggerKind::Update => "update",
		TriggerKind::Button => "button",
		TriggerKind::Background => "background",
	}
}

pub fn graph(edges: &[Edge], format: GraphFormat) -> Result<String, serde_json::Error> {
	let out: String = match format {
		GraphFormat::Edges => edges
			.iter()
			.map(|edge| {
				format!(
					"{} -> {} [{}]\n",
					edge.source,
					edge.target,
					trigger_name(edge.trigger)
				)
			})
			.collect(),
		GraphFormat::Dot => {
			let body: String = edges
				.iter()
				.map(|edge| {
					let style = match edge.trigger {
						TriggerKind::Update => "solid",
						TriggerKind::Button => "bold",
						TriggerKind::Background => "dashed",
					};
					format!(
						"\t\"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
						edge.source,
						edge.target,
						trigger_name(edge.trigger),
						style
					)
				})
				.collect();
			format!("digraph lifecycle {{\n{}}}\n", body)
		}
		GraphFormat::Json => serde_json::to_string_pretty(edges)? + "\n",
	};
	Ok(out)
}

pub fn codes() -> String {
	ProcessStatus::ALL
		.iter()
		.map(|status| format!("{:>5}  {}\n", status.code(), status))
		.collect()
}
