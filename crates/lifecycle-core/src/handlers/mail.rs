//! Notification mail handler.

use super::{classify, HandlerError, RetryPolicy};
use crate::engine::event_bus::EventBus;
use lifecycle_outbound::MailerInterface;
use lifecycle_types::{truncate_id, LifecycleEvent, Mail, TaskEvent};
use std::sync::Arc;
use tracing::instrument;

/// Hands mails to the mailer, retrying transient failures.
pub struct MailHandler {
	mailer: Arc<dyn MailerInterface>,
	policy: RetryPolicy,
	event_bus: EventBus,
}

impl MailHandler {
	pub fn new(mailer: Arc<dyn MailerInterface>, policy: RetryPolicy, event_bus: EventBus) -> Self {
		Self {
			mailer,
			policy,
			event_bus,
		}
	}

	#[instrument(skip_all, fields(process_id = %truncate_id(&mail.process_id)))]
	pub async fn send(&self, mail: &Mail) -> Result<(), HandlerError> {
		backoff::future::retry(self.policy.backoff(), || async move {
			self.mailer.send(mail).await.map_err(classify)
		})
		.await?;

		tracing::debug!(recipient = %mail.recipient, "Mail sent");
		self.event_bus
			.publish(LifecycleEvent::Task(TaskEvent::MailSent {
				recipient: mail.recipient.clone(),
				subject: mail.subject.clone(),
			}))
			.ok();
		Ok(())
	}
}
