mod common;

use common::{draft, process_at, GatewayKind, Harness, CLIENT, CONTRACTOR, PROJECT};
use lifecycle_core::state::{Edge, TriggerKind, DELETE_ACTION};
use lifecycle_core::{TransitionError, TransitionOutcome};
use lifecycle_gateway::GatewayError;
use lifecycle_types::{
	BackgroundJob, LifecycleEvent, ProcessStatus, ServiceStatus, Session, TransitionEvent,
	UpdateType,
};
use serde_json::json;
use std::collections::BTreeSet;

const BOTH: [GatewayKind; 2] = [GatewayKind::Durable, GatewayKind::Session];

#[tokio::test]
async fn test_undeclared_actions_do_not_write() {
	let harness = Harness::new(GatewayKind::Durable);
	let table = harness.engine.table();
	let every_action: BTreeSet<&str> = ProcessStatus::ALL
		.iter()
		.filter_map(|status| table.state(*status))
		.flat_map(|spec| spec.button_rules.iter().map(|rule| rule.action))
		.chain(["NOT_AN_ACTION"])
		.collect();

	harness
		.seed(
			ProcessStatus::ALL
				.iter()
				.map(|status| process_at(status.name(), *status))
				.collect(),
		)
		.await;

	for status in ProcessStatus::ALL {
		let spec = table.state(status).unwrap();
		let before = harness.process(status.name()).await;
		for action in every_action.iter().filter(|a| spec.button(a).is_none()) {
			if table.guard_for(action, status).is_some() {
				continue;
			}
			let outcome = harness
				.engine
				.apply_user_action(&harness.session, PROJECT, status.name(), action)
				.await
				.unwrap();
			assert_eq!(outcome, TransitionOutcome::Unchanged(status), "{} on {}", action, status);
		}
		let after = harness.process(status.name()).await;
		assert_eq!(after.version, before.version, "{} was written", status);
		assert_eq!(after.status, status);
	}
}

#[tokio::test]
async fn test_choosing_service_without_dependencies() {
	for kind in BOTH {
		let harness = Harness::new(kind);
		harness.seed(vec![draft("a")]).await;

		let outcome = harness
			.engine
			.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
			.await
			.unwrap();
		assert_eq!(
			outcome,
			TransitionOutcome::Transitioned {
				from: ProcessStatus::Draft,
				to: ProcessStatus::ServiceInProgress,
			},
			"{:?}",
			kind
		);
	}
}

#[tokio::test]
async fn test_complete_definition_settles_to_service_ready() {
	let harness = Harness::new(GatewayKind::Session);
	harness.seed(vec![draft("a")]).await;
	harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
		.await
		.unwrap();

	let outcome = harness
		.engine
		.update_and_evaluate(
			&harness.session,
			PROJECT,
			"a",
			UpdateType::ServiceDetails,
			json!({"material": "petg", "quantity": 10}),
		)
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ServiceReady));

	// Selecting a contractor moves on, dropping it goes back
	let outcome = harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ProvisionalContractor, json!(CONTRACTOR))
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ContractorSelected));

	let outcome = harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "a", "SERVICE_READY")
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ServiceReady));
	assert!(harness.process("a").await.provisional_contractor().is_none());
}

#[tokio::test]
async fn test_complication_round_trip() {
	let harness = Harness::new(GatewayKind::Durable);
	let mut process = process_at("a", ProcessStatus::ServiceReady);
	process.service_type = "additive".into();
	process.service_details = common::ready_details();
	harness.seed(vec![process]).await;

	let outcome = harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceStatus, json!("complication"))
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ServiceComplication));
	assert_eq!(harness.process("a").await.service_status, ServiceStatus::Complication);

	let outcome = harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceStatus, json!("active"))
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ServiceReady));
}

#[tokio::test]
async fn test_process_without_service_stays_draft() {
	for kind in BOTH {
		let harness = Harness::new(kind);
		harness.seed(vec![draft("a")]).await;
		for _ in 0..5 {
			let outcome = harness
				.engine
				.apply_data_changed_event(&harness.session, PROJECT, "a")
				.await
				.unwrap();
			assert_eq!(outcome, TransitionOutcome::Unchanged(ProcessStatus::Draft));
		}
		assert_eq!(harness.process("a").await.version, 0);
	}
}

#[tokio::test]
async fn test_data_changed_event_is_idempotent() {
	let harness = Harness::new(GatewayKind::Durable);
	harness.seed(vec![draft("a")]).await;
	harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
		.await
		.unwrap();
	let settled = harness.process("a").await;

	for _ in 0..2 {
		let outcome = harness
			.engine
			.apply_data_changed_event(&harness.session, PROJECT, "a")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::Unchanged(settled.status));
	}
	assert_eq!(harness.process("a").await.version, settled.version);
}

#[tokio::test]
async fn test_dependency_gate_holds_until_dependency_completes() {
	let harness = Harness::new(GatewayKind::Durable);
	let mut b = process_at("b", ProcessStatus::Delivery);
	b.contractor = Some(CONTRACTOR.into());
	harness.seed(vec![draft("a"), b]).await;

	harness
		.gateway()
		.update_process(&harness.session, PROJECT, "a", UpdateType::DependenciesIn, json!("b"), CLIENT)
		.await
		.unwrap();
	let outcome = harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::WaitingForOtherProcess));

	for _ in 0..3 {
		let outcome = harness
			.engine
			.apply_data_changed_event(&harness.session, PROJECT, "a")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::Unchanged(ProcessStatus::WaitingForOtherProcess));
	}

	harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "b", "COMPLETED")
		.await
		.unwrap();
	assert_eq!(harness.status("b").await, ProcessStatus::Completed);
	// Still waiting until poked
	assert_eq!(harness.status("a").await, ProcessStatus::WaitingForOtherProcess);

	let outcome = harness
		.engine
		.apply_data_changed_event(&harness.session, PROJECT, "a")
		.await
		.unwrap();
	assert_eq!(
		outcome,
		TransitionOutcome::Transitioned {
			from: ProcessStatus::WaitingForOtherProcess,
			to: ProcessStatus::ServiceInProgress,
		}
	);
}

#[tokio::test]
async fn test_completion_schedules_reevaluation_of_dependents() {
	let mut harness = Harness::new(GatewayKind::Session);
	let mut b = process_at("b", ProcessStatus::Delivery);
	b.contractor = Some(CONTRACTOR.into());
	harness.seed(vec![draft("a"), b]).await;
	harness
		.gateway()
		.update_process(&harness.session, PROJECT, "a", UpdateType::DependenciesIn, json!(["b"]), CLIENT)
		.await
		.unwrap();
	harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
		.await
		.unwrap();
	assert_eq!(harness.status("a").await, ProcessStatus::WaitingForOtherProcess);

	harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "b", "COMPLETED")
		.await
		.unwrap();
	let job = harness.runner.next_pending().unwrap();
	assert!(matches!(
		&job,
		BackgroundJob::Reevaluate { process_id, .. } if process_id == "a"
	));

	harness.runner.handlers().handle(job).await;
	assert_eq!(harness.status("a").await, ProcessStatus::ServiceInProgress);
}

#[tokio::test]
async fn test_failed_dependency_releases_gate() {
	let harness = Harness::new(GatewayKind::Durable);
	let mut a = draft("a");
	a.service_type = "additive".into();
	harness
		.seed(vec![a, process_at("b", ProcessStatus::Failed)])
		.await;
	harness
		.gateway()
		.update_process(&harness.session, PROJECT, "a", UpdateType::DependenciesIn, json!("b"), CLIENT)
		.await
		.unwrap();

	let outcome = harness
		.engine
		.apply_data_changed_event(&harness.session, PROJECT, "a")
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ServiceInProgress));
}

#[tokio::test]
async fn test_request_before_verification_is_rejected() {
	let harness = Harness::new(GatewayKind::Durable);
	harness
		.seed(vec![common::ready_for_verification("a")])
		.await;
	let mut events = harness.engine.event_bus().subscribe();

	let result = harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "a", "REQUESTED")
		.await;
	assert!(matches!(result, Err(TransitionError::Precondition(_))));

	let process = harness.process("a").await;
	assert_eq!(process.status, ProcessStatus::ContractorSelected);
	assert_eq!(process.version, 0);
	assert!(process.contractor.is_none());

	match events.recv().await.unwrap() {
		LifecycleEvent::Transition(TransitionEvent::ActionRejected { action, .. }) => {
			assert_eq!(action, "REQUESTED")
		}
		other => panic!("unexpected event {:?}", other),
	}
}

#[tokio::test]
async fn test_delete_is_available_in_every_state() {
	for kind in BOTH {
		let harness = Harness::new(kind);
		harness
			.seed(
				ProcessStatus::ALL
					.iter()
					.map(|status| process_at(status.name(), *status))
					.collect(),
			)
			.await;

		for status in ProcessStatus::ALL {
			let outcome = harness
				.engine
				.apply_user_action(&harness.session, PROJECT, status.name(), DELETE_ACTION)
				.await
				.unwrap();
			assert_eq!(outcome, TransitionOutcome::Deleted);
			let result = harness
				.gateway()
				.get_process(&harness.session, PROJECT, status.name())
				.await;
			assert!(matches!(result, Err(GatewayError::ProcessNotFound(_))));
		}
	}
}

#[tokio::test]
async fn test_buttons_respect_audience() {
	let harness = Harness::new(GatewayKind::Durable);
	let mut requested = process_at("a", ProcessStatus::Requested);
	requested.contractor = Some(CONTRACTOR.into());
	harness.seed(vec![requested]).await;

	let contractor = Session::authenticated("session-2", CONTRACTOR);
	let observer = Session::authenticated("session-3", "mallory");

	let result = harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "a", "CONFIRMED_BY_CONTRACTOR")
		.await;
	assert!(matches!(result, Err(TransitionError::Precondition(_))));
	let result = harness
		.engine
		.apply_user_action(&observer, PROJECT, "a", "CANCELED")
		.await;
	assert!(matches!(result, Err(TransitionError::Precondition(_))));
	assert_eq!(harness.status("a").await, ProcessStatus::Requested);

	let actions: Vec<String> = harness
		.engine
		.buttons(&contractor, PROJECT, "a")
		.await
		.unwrap()
		.into_iter()
		.map(|button| button.action)
		.collect();
	assert_eq!(
		actions,
		vec!["CLARIFICATION", "CONFIRMED_BY_CONTRACTOR", "REJECTED_BY_CONTRACTOR"]
	);
	assert!(harness
		.engine
		.buttons(&observer, PROJECT, "a")
		.await
		.unwrap()
		.is_empty());

	let outcome = harness
		.engine
		.apply_user_action(&contractor, PROJECT, "a", "CONFIRMED_BY_CONTRACTOR")
		.await
		.unwrap();
	assert_eq!(outcome.status(), Some(ProcessStatus::ConfirmedByContractor));
}

#[tokio::test]
async fn test_missing_process_is_a_gateway_error() {
	let harness = Harness::new(GatewayKind::Session);
	harness.seed(vec![draft("a")]).await;
	let result = harness
		.engine
		.apply_data_changed_event(&harness.session, PROJECT, "ghost")
		.await;
	assert!(matches!(
		result,
		Err(TransitionError::Gateway(GatewayError::ProcessNotFound(_)))
	));
}

#[tokio::test]
async fn test_session_gateway_isolates_sessions() {
	let harness = Harness::new(GatewayKind::Session);
	harness.seed(vec![draft("a")]).await;
	let stranger = Session::anonymous("session-9");
	let result = harness
		.engine
		.apply_user_action(&stranger, PROJECT, "a", DELETE_ACTION)
		.await;
	assert!(matches!(
		result,
		Err(TransitionError::Gateway(GatewayError::ProjectNotFound(_)))
	));
	assert_eq!(harness.status("a").await, ProcessStatus::Draft);
}

#[test]
fn test_reachability_graph_lists_every_trigger() {
	let harness = Harness::new(GatewayKind::Durable);
	let edges = harness.engine.compute_reachability_graph();
	let triggers: BTreeSet<TriggerKind> = edges.iter().map(|edge| edge.trigger).collect();
	assert_eq!(triggers.len(), 3);
	assert!(edges.contains(&Edge {
		source: ProcessStatus::Draft,
		target: ProcessStatus::ServiceInProgress,
		trigger: TriggerKind::Update,
	}));
	assert!(edges.contains(&Edge {
		source: ProcessStatus::Verifying,
		target: ProcessStatus::VerificationCompleted,
		trigger: TriggerKind::Background,
	}));
	// Same table, same answer
	assert_eq!(edges, harness.engine.compute_reachability_graph());
}

#[tokio::test]
async fn test_rule_error_leaves_process_unchanged() {
	for kind in BOTH {
		let harness = Harness::new(kind);
		let mut orphan = process_at("orphan", ProcessStatus::WaitingForOtherProcess);
		orphan.service_type = "additive".into();
		orphan.dependencies_in.insert("ghost".into());

		// Stored data with a cycle the gateway would never have accepted
		let mut a = draft("a");
		a.service_type = "additive".into();
		a.dependencies_in.insert("b".into());
		a.dependencies_out.insert("b".into());
		let mut b = draft("b");
		b.service_type = "additive".into();
		b.dependencies_in.insert("a".into());
		b.dependencies_out.insert("a".into());
		harness.seed(vec![orphan, a, b]).await;

		for (id, status) in [
			("orphan", ProcessStatus::WaitingForOtherProcess),
			("a", ProcessStatus::Draft),
			("b", ProcessStatus::Draft),
		] {
			let before = harness.process(id).await;
			let outcome = harness
				.engine
				.apply_data_changed_event(&harness.session, PROJECT, id)
				.await
				.unwrap();
			assert_eq!(outcome, TransitionOutcome::Unchanged(status), "{} on {:?}", id, kind);
			assert_eq!(harness.process(id).await.version, before.version);
		}
	}
}

#[tokio::test]
async fn test_deleting_dependency_schedules_reevaluation() {
	let mut harness = Harness::new(GatewayKind::Durable);
	let mut b = process_at("b", ProcessStatus::Production);
	b.contractor = Some(CONTRACTOR.into());
	harness.seed(vec![draft("a"), b]).await;
	harness
		.gateway()
		.update_process(&harness.session, PROJECT, "a", UpdateType::DependenciesIn, json!("b"), CLIENT)
		.await
		.unwrap();
	harness
		.engine
		.update_and_evaluate(&harness.session, PROJECT, "a", UpdateType::ServiceType, json!("additive"))
		.await
		.unwrap();
	assert_eq!(harness.status("a").await, ProcessStatus::WaitingForOtherProcess);

	let outcome = harness
		.engine
		.apply_user_action(&harness.session, PROJECT, "b", DELETE_ACTION)
		.await
		.unwrap();
	assert_eq!(outcome, TransitionOutcome::Deleted);
	assert!(harness.process("a").await.dependencies_in.is_empty());

	let job = harness.runner.next_pending().unwrap();
	assert!(matches!(
		&job,
		BackgroundJob::Reevaluate { process_id, .. } if process_id == "a"
	));
	harness.runner.handlers().handle(job).await;
	assert_eq!(harness.status("a").await, ProcessStatus::ServiceInProgress);
	assert!(harness.runner.next_pending().is_none());
}
