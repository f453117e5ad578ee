mod common;

use common::{ready_for_verification, Fault, GatewayKind, Harness, CONTRACTOR, PROJECT};
use lifecycle_core::TransitionError;
use lifecycle_gateway::GatewayError;
use lifecycle_types::{BackgroundJob, FileLocation, LifecycleEvent, ProcessStatus, TaskEvent};

const BOTH: [GatewayKind; 2] = [GatewayKind::Durable, GatewayKind::Session];

fn verified(id: &str) -> lifecycle_types::Process {
	let mut process = ready_for_verification(id);
	process.status = ProcessStatus::VerificationCompleted;
	process
}

#[tokio::test]
async fn test_failed_send_commit_has_no_side_effects() {
	for kind in BOTH {
		let mut harness = Harness::with_fault(kind, Fault::FailCommitTo(ProcessStatus::Requested));
		harness.seed(vec![verified("a")]).await;

		let result = harness
			.engine
			.apply_user_action(&harness.session, PROJECT, "a", "REQUESTED")
			.await;
		assert!(
			matches!(result, Err(TransitionError::Gateway(GatewayError::Storage(_)))),
			"{:?}: {:?}",
			kind,
			result
		);

		let process = harness.process("a").await;
		assert_eq!(process.status, ProcessStatus::VerificationCompleted);
		assert!(process.contractor.is_none());
		assert_eq!(process.version, 0);
		assert_eq!(harness.runner.run_pending().await, 0);
		assert!(harness.mailer.sent().await.is_empty());
		assert!(process.files.iter().all(|f| f.location == FileLocation::Local));
	}
}

#[tokio::test]
async fn test_send_racing_an_edit_is_refused() {
	for kind in BOTH {
		let mut harness = Harness::with_fault(
			kind,
			Fault::MoveFirst {
				before: ProcessStatus::Requested,
				to: ProcessStatus::ContractorSelected,
			},
		);
		harness.seed(vec![verified("a")]).await;

		let result = harness
			.engine
			.apply_user_action(&harness.session, PROJECT, "a", "REQUESTED")
			.await;
		assert!(matches!(
			result,
			Err(TransitionError::Gateway(GatewayError::Conflict {
				found: ProcessStatus::ContractorSelected,
				..
			}))
		));

		let process = harness.process("a").await;
		assert_eq!(process.status, ProcessStatus::ContractorSelected);
		assert!(process.contractor.is_none());
		assert!(harness.runner.next_pending().is_none());
	}
}

#[tokio::test]
async fn test_clearing_contractor_does_not_overwrite_concurrent_transition() {
	let harness = Harness::with_fault(
		GatewayKind::Durable,
		Fault::MoveFirst {
			before: ProcessStatus::ServiceReady,
			to: ProcessStatus::Verifying,
		},
	);
	harness.seed(vec![ready_for_verification("a")]).await;

	let result = harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "a", "SERVICE_READY")
		.await;
	assert!(matches!(
		result,
		Err(TransitionError::Gateway(GatewayError::Conflict { .. }))
	));

	let process = harness.process("a").await;
	assert_eq!(process.status, ProcessStatus::Verifying);
	assert_eq!(process.provisional_contractor(), Some(CONTRACTOR));
}

#[tokio::test]
async fn test_verification_enqueue_failure_reverts_status() {
	for kind in BOTH {
		let harness = Harness::with_fault(kind, Fault::FailVerify);
		harness.seed(vec![ready_for_verification("a")]).await;
		let mut events = harness.engine.event_bus().subscribe();

		let result = harness
			.engine
			.apply_user_action(&harness.session, PROJECT, "a", "VERIFYING")
			.await;
		assert!(matches!(
			result,
			Err(TransitionError::Gateway(GatewayError::Queue(_)))
		));
		assert_eq!(harness.status("a").await, ProcessStatus::ContractorSelected);

		let failed = loop {
			match events.try_recv() {
				Ok(LifecycleEvent::Task(TaskEvent::JobFailed { job, .. })) => break job,
				Ok(_) => continue,
				Err(e) => panic!("no failure event: {:?}", e),
			}
		};
		assert!(matches!(
			failed,
			BackgroundJob::Verify { process_id, then_request: false, .. } if process_id == "a"
		));
	}
}
