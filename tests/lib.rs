// Integration tests test your crate's public API. They only have access to items
// in your crate that are marked pub. See the Cargo Targets page of the Cargo Book
// for more information.
//
//   https://doc.rust-lang.org/cargo/reference/cargo-targets.html#integration-tests
//

use access_rule_engine::*;

mod linkage_tests;

// Event flow, configuration and CLI
mod cli_argument_parsing_tests;

#[test]
fn test_core_id_types() {
    // Display prefixes
    assert_eq!(UserId(42).to_string(), "USER_42");
    assert_eq!(DeviceId(7).to_string(), "DEV_7");
    assert_eq!(AreaId(3).to_string(), "AREA_3");
    assert_eq!(DoorId(9).to_string(), "DOOR_9");

    // Execution ids are unique
    assert_ne!(ExecutionId::new(), ExecutionId::new());
}

#[test]
fn test_wire_names() {
    assert_eq!(
        serde_json::to_string(&PassbackPolicy::Global).unwrap(),
        "\"GLOBAL\""
    );
    assert_eq!(
        serde_json::to_string(&InterlockMode::Unidirectional).unwrap(),
        "\"UNIDIRECTIONAL\""
    );
    assert_eq!(serde_json::to_string(&ControlAction::Capture).unwrap(), "\"CAPTURE\"");
    assert_eq!(serde_json::to_string(&ExecutionStatus::Pending).unwrap(), "\"PENDING\"");
}

#[test]
fn test_decision_serialization() {
    let deny = Decision::deny(DenyReason::Violation(PassbackPolicy::Hard));
    let value = serde_json::to_value(&deny).unwrap();
    assert_eq!(value["outcome"], "DENY");
    assert_eq!(value["reason"], "HARD violation");

    let allow = serde_json::to_value(Decision::allow_soft_violation()).unwrap();
    assert_eq!(allow["outcome"], "ALLOW");
    assert_eq!(allow["soft_violation"], true);
}
