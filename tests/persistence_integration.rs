//! Integration tests for scenario files
//!
//! Saved scenarios must reload into a graph that runs the same way.

mod common;

use common::builders::{loop_scenario, ScenarioBuilder};
use common::fast_settings;
use scenario_engine::scenario::{BlockKind, PortRef, Runner, Scenario};
use scenario_engine::ScenarioError;

#[test]
fn test_saved_loop_runs_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.json");
    let (mut original, ids) = loop_scenario(3);
    original.save(&path).unwrap();

    let mut restored = Scenario::load(&path).unwrap();
    let first = Runner::new(fast_settings()).run(&mut original);
    let second = Runner::new(fast_settings()).run(&mut restored);

    assert!(second.is_completed());
    assert_eq!(first.executed, second.executed);
    assert_eq!(second.executions_of(ids["log"]), 3);
}

#[test]
fn test_titles_and_params_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("titles.json");
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .param("constant", "Block name", "Key")
        .param("constant", "Data type", "byte array")
        .param("constant", "Value", "00112233");
    let constant = builder.id("constant");
    let (scenario, _) = builder.build();
    scenario.save(&path).unwrap();

    let restored = Scenario::load(&path).unwrap();
    let block = restored.block(constant).unwrap();
    assert_eq!(block.core().title(), "Key");
    assert_eq!(block.params().sub_value("Data type"), Some("byte array"));
    assert_eq!(block.params().sub_value("Value"), Some("00112233"));
}

#[test]
fn test_missing_file_reports_io() {
    let dir = tempfile::tempdir().unwrap();
    let err = Scenario::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err.root(), ScenarioError::Io(_)));
}

#[test]
fn test_wrong_scenario_tag_rejected() {
    let (scenario, _) = loop_scenario(1);
    let json = scenario
        .to_json()
        .unwrap()
        .replace("scenario-engine/scenario/1", "scenario-engine/scenario/0");

    let err = Scenario::from_json(&json).unwrap_err();
    assert!(matches!(
        err,
        ScenarioError::FormatMismatch {
            object: "scenario",
            ..
        }
    ));
}

#[test]
fn test_invalid_stored_value_marks_error() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .param("constant", "Data type", "integer")
        .param("constant", "Value", "42");
    let constant = builder.id("constant");
    let (scenario, _) = builder.build();

    // A hand-edited file can carry a value the field type rejects.
    let json = scenario
        .to_json()
        .unwrap()
        .replace("\"42\"", "\"forty-two\"");
    let mut edited = Scenario::from_json(&json).unwrap();
    let block = edited.block(constant).unwrap();
    assert_eq!(
        block.params().sub("Value").unwrap().state(),
        scenario_engine::ParamState::Error
    );
    assert_eq!(block.core().state(), scenario_engine::scenario::BlockState::Error);

    let mut runner = Runner::new(fast_settings());
    assert!(runner.run(&mut edited).is_completed());
    assert_eq!(runner.published(&PortRef::new(constant, "dataOut")), None);
}

#[test]
fn test_reload_drops_published_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reordered.json");

    // Same ids, but block 1 is now a Log block with no data output.
    let (other, _) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("log", BlockKind::Log)
        .build();
    other.save(&path).unwrap();

    let (mut scenario, ids) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .build();
    let output = PortRef::new(ids["constant"], "dataOut");
    let mut runner = Runner::new(fast_settings());
    assert!(runner.run(&mut scenario).is_completed());
    assert!(runner.published(&output).is_some());

    scenario.load_into(&path).unwrap();
    assert!(runner.run(&mut scenario).is_completed());
    assert_eq!(runner.published(&output), None);
}
