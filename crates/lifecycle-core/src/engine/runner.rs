//! Task runner executing background jobs.

use crate::handlers::JobHandlers;
use lifecycle_types::JobReceiver;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Pulls jobs off the queue and runs them on a bounded set of tasks.
///
/// Jobs run in no particular order; two jobs for the same process may run
/// concurrently and rely on the gateway to serialize their writes.
pub struct TaskRunner {
	receiver: JobReceiver,
	handlers: Arc<JobHandlers>,
	semaphore: Arc<Semaphore>,
}

impl TaskRunner {
	pub fn new(receiver: JobReceiver, handlers: Arc<JobHandlers>, max_concurrent_jobs: usize) -> Self {
		Self {
			receiver,
			handlers,
			semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
		}
	}

	/// Runs jobs until `shutdown` completes or every producer is gone.
	pub async fn run<S>(mut self, shutdown: S)
	where
		S: Future<Output = ()>,
	{
		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				job = self.receiver.recv() => {
					let Some(job) = job else {
						break;
					};
					let permit = match self.semaphore.clone().acquire_owned().await {
						Ok(permit) => permit,
						Err(e) => {
							tracing::error!("Failed to acquire job permit: {}", e);
							break;
						}
					};
					let handlers = self.handlers.clone();
					tokio::spawn(async move {
						let _permit = permit;
						handlers.handle(job).await;
					});
				}
				_ = &mut shutdown => break,
			}
		}
		tracing::info!("Task runner stopped");
	}

	/// Runs queued jobs one at a time until the queue is empty, including
	/// jobs enqueued along the way. Returns how many ran.
	pub async fn run_pending(&mut self) -> usize {
		let mut ran = 0;
		while let Ok(job) = self.receiver.try_recv() {
			self.handlers.handle(job).await;
			ran += 1;
		}
		ran
	}

	/// Takes the next job without running it.
	pub fn next_pending(&mut self) -> Option<lifecycle_types::BackgroundJob> {
		self.receiver.try_recv().ok()
	}

	pub fn handlers(&self) -> &Arc<JobHandlers> {
		&self.handlers
	}
}
