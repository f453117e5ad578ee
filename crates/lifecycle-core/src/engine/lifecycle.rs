//! Running lifecycle: the engine plus its background machinery.

use super::runner::TaskRunner;
use super::TransitionEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// An assembled engine with the task runner that executes its jobs.
pub struct Lifecycle {
	engine: Arc<TransitionEngine>,
	runner: TaskRunner,
	cleanup_interval: Duration,
}

impl Lifecycle {
	pub fn new(engine: Arc<TransitionEngine>, runner: TaskRunner, cleanup_interval: Duration) -> Self {
		Self {
			engine,
			runner,
			cleanup_interval,
		}
	}

	pub fn engine(&self) -> &Arc<TransitionEngine> {
		&self.engine
	}

	pub fn runner_mut(&mut self) -> &mut TaskRunner {
		&mut self.runner
	}

	/// Splits into the engine and its runner, for callers driving jobs by hand.
	pub fn into_parts(self) -> (Arc<TransitionEngine>, TaskRunner) {
		(self.engine, self.runner)
	}

	/// Runs background jobs until Ctrl-C.
	pub async fn run(self) {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
			}
		})
		.await
	}

	/// Runs background jobs and expired-record cleanup until `shutdown` completes.
	pub async fn run_until<S>(self, shutdown: S)
	where
		S: Future<Output = ()>,
	{
		tracing::info!("Starting lifecycle engine");

		let gateway = self.engine.gateway().clone();
		let mut interval = tokio::time::interval(self.cleanup_interval);
		let cleanup_handle = tokio::spawn(async move {
			loop {
				interval.tick().await;
				match gateway.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					}
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					}
					_ => {}
				}
			}
		});

		self.runner.run(shutdown).await;

		cleanup_handle.abort();
		tracing::info!("Lifecycle engine stopped");
	}
}
