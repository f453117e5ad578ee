//! Main entry point for the process lifecycle service.
//!
//! Runs the background job runner for a configured lifecycle engine and
//! offers a few diagnostics over the state table.

use clap::{Parser, Subcommand, ValueEnum};
use lifecycle_config::Config;
use lifecycle_core::{LifecycleBuilder, LifecycleFactories, StateTable};
use std::path::PathBuf;

mod render;

/// Command-line arguments for the lifecycle service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/demo.toml", env = "LIFECYCLE_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run background jobs until interrupted (default)
	Run,
	/// Print every declared transition
	Graph {
		#[arg(short, long, value_enum, default_value_t = GraphFormat::Edges)]
		format: GraphFormat,
	},
	/// Print the status vocabulary with its persisted codes
	Codes,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum GraphFormat {
	/// One `source -> target [trigger]` line per edge
	Edges,
	/// Graphviz digraph
	Dot,
	Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	match args.command.unwrap_or(Command::Run) {
		Command::Graph { format } => {
			let table = StateTable::standard();
			print!("{}", render::graph(&table.edges(), format)?);
		}
		Command::Codes => print!("{}", render::codes()),
		Command::Run => {
			tracing::info!("Started lifecycle service");
			let config = Config::from_file(&args.config).await?;
			tracing::info!("Loaded configuration [{}]", config.engine.id);

			let lifecycle = LifecycleBuilder::new(config).build(LifecycleFactories::registered())?;
			lifecycle.run().await;
			tracing::info!("Stopped lifecycle service");
		}
	}
	Ok(())
}
