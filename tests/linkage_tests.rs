//! Integration tests for linkage dispatch
//!
//! Every test checks the execution rows the dispatcher leaves behind, since
//! those are what operators see.

use access_rule_engine::engine::SimulatedFault;
use access_rule_engine::events::trigger;
use access_rule_engine::*;
use std::sync::Arc;
use std::time::Duration;

const READER: DeviceId = DeviceId(1);
const READER_DOOR: DoorId = DoorId(10);
const DOOR_CONTROLLER: DeviceId = DeviceId(2);
const CAMERA: DeviceId = DeviceId(3);
const SIREN: DeviceId = DeviceId(4);

fn site() -> FacilityRegistry {
    FacilityRegistry::from_parts(
        vec![Area::new(AreaId(1), "Loading Dock"), Area::new(AreaId(2), "Warehouse")],
        vec![
            Device::new(READER, AreaId(1), "Dock Reader"),
            Device::new(DOOR_CONTROLLER, AreaId(2), "Warehouse Controller"),
            Device::new(CAMERA, AreaId(1), "Dock Camera").with_kind(DeviceKind::Camera),
            Device::new(SIREN, AreaId(2), "Warehouse Siren").with_kind(DeviceKind::Alarm),
        ],
        vec![
            Door::new(READER_DOOR, READER, AreaId(1), "Dock Door"),
            Door::new(DoorId(11), READER, AreaId(1), "Dock Side Door"),
            Door::new(DoorId(20), DOOR_CONTROLLER, AreaId(2), "Warehouse Door"),
        ],
    )
}

fn unlock_warehouse() -> LinkageRule {
    LinkageRule::new(RuleId(1), READER, DOOR_CONTROLLER, ControlAction::Unlock)
        .on_door(READER_DOOR)
        .targeting_door(DoorId(20))
}

struct Harness {
    engine: AccessRuleEngine,
    actuator: Arc<SimulatedActuator>,
    catalog: Arc<InMemoryRuleCatalog>,
    recorder: Arc<InMemoryAuditRecorder>,
}

fn harness_with(config: EngineConfig, rules: Vec<LinkageRule>) -> Harness {
    let actuator = Arc::new(SimulatedActuator::new());
    let catalog = Arc::new(InMemoryRuleCatalog::with_rules(vec![], rules));
    let recorder = Arc::new(InMemoryAuditRecorder::new());
    let engine = AccessRuleEngine::builder(config, site())
        .with_catalog(catalog.clone())
        .with_actuator(actuator.clone())
        .with_recorder(recorder.clone())
        .build()
        .unwrap();
    Harness {
        engine,
        actuator,
        catalog,
        recorder,
    }
}

fn harness(rules: Vec<LinkageRule>) -> Harness {
    harness_with(
        EngineConfig {
            rule_cache_ttl_secs: 0,
            ..EngineConfig::default()
        },
        rules,
    )
}

async fn dispatch(h: &Harness, door: Option<DoorId>, event: &str) -> Vec<LinkageExecutionLog> {
    h.engine
        .dispatch_linkage(READER, door, event)
        .await
        .unwrap()
        .join_all()
        .await
        .into_iter()
        .map(|row| row.unwrap())
        .collect()
}

/// The reference DOOR_OPEN scenario: one rule, one UNLOCK, one SUCCESS row
#[tokio::test]
async fn test_door_open_unlocks_target() {
    let h = harness(vec![unlock_warehouse()]);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.status, ExecutionStatus::Success);
    assert_eq!(row.trigger_event, "DOOR_OPEN");
    assert_eq!(row.target_device_id, DOOR_CONTROLLER);
    assert_eq!(row.target_door_id, Some(DoorId(20)));
    assert_eq!(row.attempts, 1);
    assert!(row.executed_at.is_some());
    assert!(row.response_payload.is_some());
    assert!(row.error_message.is_none());

    assert_eq!(h.actuator.accepted_count(DOOR_CONTROLLER, ControlAction::Unlock), 1);
    assert_eq!(h.engine.linkage_logs(), rows);
    assert_eq!(h.engine.linkage_log(row.id).as_ref(), Some(row));
}

/// Each matching rule produces exactly one execution row
#[tokio::test]
async fn test_each_matching_rule_gets_one_row() {
    let h = harness(vec![
        unlock_warehouse(),
        LinkageRule::new(RuleId(2), READER, CAMERA, ControlAction::Capture),
        LinkageRule::new(RuleId(3), READER, SIREN, ControlAction::Alert),
    ]);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.is_success()));

    for rule in [RuleId(1), RuleId(2), RuleId(3)] {
        assert_eq!(h.engine.linkage_logs_for_rule(rule).len(), 1);
    }
    assert_eq!(h.actuator.accepted_count(CAMERA, ControlAction::Capture), 1);
    assert_eq!(h.actuator.accepted_count(SIREN, ControlAction::Alert), 1);
}

/// A failing target fails its own row only
#[tokio::test]
async fn test_failed_target_does_not_block_others() {
    let h = harness(vec![
        unlock_warehouse(),
        LinkageRule::new(RuleId(2), READER, CAMERA, ControlAction::Capture),
        LinkageRule::new(RuleId(3), READER, SIREN, ControlAction::Alert),
    ]);
    h.actuator.fail_device(CAMERA, SimulatedFault::Reject);

    dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;

    let failed = &h.engine.linkage_logs_for_rule(RuleId(2))[0];
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("rejected"));
    assert!(h.engine.linkage_logs_for_rule(RuleId(1))[0].is_success());
    assert!(h.engine.linkage_logs_for_rule(RuleId(3))[0].is_success());

    let stats = h.engine.statistics();
    assert_eq!(stats.linkage_dispatched, 3);
    assert_eq!(stats.linkage_succeeded, 2);
    assert_eq!(stats.linkage_failed, 1);
}

/// Higher-priority rules are opened first
#[tokio::test]
async fn test_priority_orders_dispatch() {
    let h = harness(vec![
        LinkageRule::new(RuleId(1), READER, CAMERA, ControlAction::Capture).with_priority(1),
        LinkageRule::new(RuleId(2), READER, SIREN, ControlAction::Alert).with_priority(9),
        LinkageRule::new(RuleId(3), READER, DOOR_CONTROLLER, ControlAction::Lock).with_priority(5),
    ]);

    let summary = h
        .engine
        .dispatch_linkage(READER, None, trigger::ACCESS_DENIED)
        .await
        .unwrap();
    let ids = summary.execution_ids.clone();
    summary.join_all().await;

    let opened: Vec<RuleId> = ids
        .iter()
        .map(|id| h.engine.linkage_log(*id).unwrap().rule_id)
        .collect();
    assert_eq!(opened, vec![RuleId(2), RuleId(3), RuleId(1)]);
}

/// Condition expressions select the trigger events a rule reacts to
#[tokio::test]
async fn test_condition_expression_filters_triggers() {
    let h = harness(vec![
        LinkageRule::new(RuleId(1), READER, CAMERA, ControlAction::Capture).when("DOOR_OPEN"),
        LinkageRule::new(RuleId(2), READER, SIREN, ControlAction::Alert).when("!ACCESS_GRANTED"),
    ]);

    assert!(dispatch(&h, None, trigger::ACCESS_GRANTED).await.is_empty());

    let rows = dispatch(&h, None, trigger::DOOR_OPEN).await;
    assert_eq!(rows.len(), 2);

    let rows = dispatch(&h, None, trigger::ACCESS_DENIED).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rule_id, RuleId(2));
}

/// A door-restricted rule ignores other doors of the same device
#[tokio::test]
async fn test_trigger_door_restriction() {
    let h = harness(vec![unlock_warehouse()]);

    assert!(dispatch(&h, Some(DoorId(11)), trigger::DOOR_OPEN).await.is_empty());
    assert!(dispatch(&h, None, trigger::DOOR_OPEN).await.is_empty());
    assert_eq!(dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await.len(), 1);
}

/// Disabled rules are never dispatched
#[tokio::test]
async fn test_disabled_rule_not_dispatched() {
    let h = harness(vec![unlock_warehouse()]);
    h.catalog.set_linkage_enabled(RuleId(1), false).unwrap();

    let summary = h
        .engine
        .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
        .await
        .unwrap();
    assert_eq!(summary.dispatched, 0);
    assert!(h.engine.linkage_logs().is_empty());
}

/// Delayed rules stay PENDING until their delay elapses
#[tokio::test(start_paused = true)]
async fn test_delayed_action_stays_pending() {
    let h = harness(vec![unlock_warehouse().delayed(30)]);

    let summary = h
        .engine
        .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
        .await
        .unwrap();
    let id = summary.execution_ids[0];

    assert_eq!(h.engine.linkage_log(id).unwrap().status, ExecutionStatus::Pending);
    assert_eq!(h.engine.linkage_pending(RuleId(1)).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(h.engine.linkage_log(id).unwrap().status, ExecutionStatus::Pending);
    assert!(h.actuator.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.drain().await;

    assert_eq!(h.engine.linkage_log(id).unwrap().status, ExecutionStatus::Success);
    assert_eq!(h.engine.linkage_pending(RuleId(1)).await.unwrap(), 0);
}

/// Finished rows beyond the log capacity are evicted oldest first
#[tokio::test]
async fn test_log_capacity_evicts_oldest_rows() {
    let config = EngineConfig {
        linkage_log_capacity: 2,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse()]);

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await[0].id);
    }

    let kept: Vec<ExecutionId> = h.engine.linkage_logs().into_iter().map(|row| row.id).collect();
    assert_eq!(kept, ids[2..].to_vec());
    assert!(h.engine.linkage_log(ids[0]).is_none());
    assert_eq!(h.engine.linkage_logs_for_rule(RuleId(1)).len(), 2);
    assert_eq!(h.actuator.accepted_count(DOOR_CONTROLLER, ControlAction::Unlock), 4);
}

/// Rows still PENDING survive eviction even past the capacity
#[tokio::test(start_paused = true)]
async fn test_log_capacity_keeps_pending_rows() {
    let config = EngineConfig {
        linkage_log_capacity: 1,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse().delayed(30)]);

    for _ in 0..2 {
        h.engine
            .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
            .await
            .unwrap();
    }
    let rows = h.engine.linkage_logs();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.status == ExecutionStatus::Pending));

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.engine.drain().await;

    let summary = h
        .engine
        .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
        .await
        .unwrap();
    let rows = h.engine.linkage_logs();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, summary.execution_ids[0]);
    assert_eq!(rows[0].status, ExecutionStatus::Pending);

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.engine.drain().await;
}

/// A stopped pool fails every matching rule's row instead of skipping the rest
#[tokio::test]
async fn test_refused_rules_each_get_failed_row() {
    let h = harness(vec![
        unlock_warehouse(),
        LinkageRule::new(RuleId(2), READER, CAMERA, ControlAction::Capture),
        LinkageRule::new(RuleId(3), READER, SIREN, ControlAction::Alert),
    ]);
    h.engine.shutdown().await;

    let summary = h
        .engine
        .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
        .await
        .unwrap();
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.refused, 3);
    assert_eq!(summary.execution_ids.len(), 3);
    assert!(summary.handles.is_empty());

    for id in &summary.execution_ids {
        let row = h.engine.linkage_log(*id).unwrap();
        assert_eq!(row.status, ExecutionStatus::Failed);
        assert_eq!(row.attempts, 0);
        assert!(row.error_message.is_some());
    }
    for rule in [RuleId(1), RuleId(2), RuleId(3)] {
        assert_eq!(h.engine.linkage_logs_for_rule(rule).len(), 1);
        assert_eq!(h.engine.linkage_pending(rule).await.unwrap(), 0);
    }
    assert!(h.actuator.sent().is_empty());
    assert_eq!(h.engine.statistics().linkage_failed, 3);
}

/// A state store outage does not stop linkage actions or their rows
#[tokio::test]
async fn test_store_outage_does_not_block_linkage() {
    let store = Arc::new(MemoryStateStore::new());
    let actuator = Arc::new(SimulatedActuator::new());
    let catalog = Arc::new(InMemoryRuleCatalog::with_rules(vec![], vec![unlock_warehouse()]));
    let engine = AccessRuleEngine::builder(EngineConfig::default(), site())
        .with_catalog(catalog)
        .with_store(store.clone())
        .with_actuator(actuator.clone())
        .build()
        .unwrap();
    store.set_unavailable(true);

    let rows: Vec<LinkageExecutionLog> = engine
        .dispatch_linkage(READER, Some(READER_DOOR), trigger::DOOR_OPEN)
        .await
        .unwrap()
        .join_all()
        .await
        .into_iter()
        .map(|row| row.unwrap())
        .collect();

    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_success());
    assert_eq!(engine.linkage_log(rows[0].id).unwrap().status, ExecutionStatus::Success);
    assert_eq!(actuator.accepted_count(DOOR_CONTROLLER, ControlAction::Unlock), 1);
    assert!(engine.linkage_pending(RuleId(1)).await.is_err());

    store.set_unavailable(false);
    assert_eq!(engine.linkage_pending(RuleId(1)).await.unwrap(), 0);
}

/// Transient failures are retried up to the configured limit
#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let config = EngineConfig {
        linkage_max_retries: 2,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse()]);
    h.actuator.fail_times(DOOR_CONTROLLER, 2);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert!(rows[0].is_success());
    assert_eq!(rows[0].attempts, 3);
}

/// Retries stop at the limit and the row records the last error
#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_marks_failed() {
    let config = EngineConfig {
        linkage_max_retries: 1,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse()]);
    h.actuator.fail_times(DOOR_CONTROLLER, 5);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert_eq!(rows[0].status, ExecutionStatus::Failed);
    assert_eq!(rows[0].attempts, 2);
    assert!(rows[0].error_message.as_deref().unwrap().contains("unreachable"));
}

/// A device rejection is final and is not retried
#[tokio::test]
async fn test_rejection_is_not_retried() {
    let config = EngineConfig {
        linkage_max_retries: 3,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse()]);
    h.actuator.fail_device(DOOR_CONTROLLER, SimulatedFault::Reject);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert_eq!(rows[0].status, ExecutionStatus::Failed);
    assert_eq!(rows[0].attempts, 1);
    assert_eq!(h.actuator.commands_for(DOOR_CONTROLLER).len(), 1);
}

/// A device that never answers fails the row after the actuation timeout
#[tokio::test(start_paused = true)]
async fn test_unresponsive_device_times_out() {
    let config = EngineConfig {
        actuation_timeout_ms: 1000,
        rule_cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(config, vec![unlock_warehouse()]);
    h.actuator.fail_device(DOOR_CONTROLLER, SimulatedFault::Hang);

    let rows = dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    assert_eq!(rows[0].status, ExecutionStatus::Failed);
    assert!(rows[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("did not respond"));
    assert_eq!(h.engine.linkage_pending(RuleId(1)).await.unwrap(), 0);
}

/// Rule tests bypass the enabled flag and the condition expression
#[tokio::test]
async fn test_linkage_test_bypasses_filters() {
    let h = harness(vec![unlock_warehouse().when("DOOR_OPEN")]);
    h.catalog.set_linkage_enabled(RuleId(1), false).unwrap();

    let row = h.engine.test_linkage(RuleId(1)).await.unwrap();
    assert!(row.is_success());
    assert_eq!(row.trigger_event, "TEST");

    let command = &h.actuator.commands_for(DOOR_CONTROLLER)[0];
    assert_eq!(command.source, CommandSource::LinkageTest);
    assert_eq!(command.rule_id, Some(RuleId(1)));

    let missing = h.engine.test_linkage(RuleId(42)).await;
    assert!(matches!(missing, Err(EngineError::RuleNotFound(RuleId(42)))));
}

/// Each execution is audited when opened and when finished
#[tokio::test]
async fn test_execution_rows_are_audited() {
    let h = harness(vec![unlock_warehouse()]);

    dispatch(&h, Some(READER_DOOR), trigger::DOOR_OPEN).await;
    h.engine.drain().await;

    let records = h.recorder.linkage_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ExecutionStatus::Pending);
    assert_eq!(records[1].status, ExecutionStatus::Success);
    assert_eq!(records[0].id, records[1].id);
}

/// Accepted events dispatch ACCESS_GRANTED linkage
#[tokio::test]
async fn test_accepted_event_dispatches_linkage() {
    let h = harness(vec![
        LinkageRule::new(RuleId(1), READER, CAMERA, ControlAction::Capture).when("ACCESS_GRANTED")
    ]);

    let event = AccessEvent::new(UserId(3), READER, AreaId(1), READER_DOOR, Direction::In);
    assert!(h.engine.handle_event(&event).await.is_allowed());
    h.engine.drain().await;

    let rows = h.engine.linkage_logs();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].trigger_event, "ACCESS_GRANTED");
    assert!(rows[0].is_success());
}
