//! Integration tests for scenario runs
//!
//! These tests drive complete scenarios through the runner:
//! - Flow walking through loops, merges and conditions
//! - Data routing from sources into consumers
//! - Device-bound blocks, preparation failures and cancellation

mod common;

use common::builders::{loop_scenario, ScenarioBuilder};
use common::devices::RecordingDevice;
use common::fast_settings;
use scenario_engine::device::{DeviceError, DeviceRegistry};
use scenario_engine::error::RunError;
use scenario_engine::ParamState;
use scenario_engine::scenario::{
    BlockKind, BlockState, PortRef, RunOutcome, RunPhase, Runner, ScenarioEvent,
};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_loop_runs_each_branch_expected_times() {
    let (mut scenario, ids) = loop_scenario(3);
    let mut runner = Runner::new(fast_settings());

    let report = runner.run(&mut scenario);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.executions_of(ids["start"]), 1);
    assert_eq!(report.executions_of(ids["constant"]), 1);
    assert_eq!(report.executions_of(ids["loop"]), 4);
    assert_eq!(report.executions_of(ids["log"]), 3);
    assert_eq!(report.executions_of(ids["merge"]), 4);
    assert_eq!(report.executions_of(ids["end"]), 1);
    assert_eq!(report.steps, 14);
    assert_eq!(
        runner.published(&PortRef::new(ids["constant"], "dataOut")),
        Some(&b"Hello, world!"[..])
    );
    assert_eq!(
        scenario.block(ids["end"]).unwrap().core().state(),
        BlockState::RuntimeInfo
    );
}

#[test]
fn test_second_run_repeats_loop() {
    let (mut scenario, ids) = loop_scenario(2);
    let mut runner = Runner::new(fast_settings());

    let first = runner.run(&mut scenario);
    let second = runner.run(&mut scenario);

    assert!(first.is_completed());
    assert!(second.is_completed());
    assert_eq!(first.executions_of(ids["log"]), 2);
    assert_eq!(second.executions_of(ids["log"]), 2);
    assert_eq!(first.steps, second.steps);
}

#[test]
fn test_zero_iterations_goes_straight_to_done() {
    let (mut scenario, ids) = loop_scenario(0);
    let report = Runner::new(fast_settings()).run(&mut scenario);

    assert!(report.is_completed());
    assert_eq!(report.executions_of(ids["log"]), 0);
    assert_eq!(report.executions_of(ids["loop"]), 1);
}

fn condition_scenario(value_hex: &str) -> ScenarioBuilder {
    ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .block("condition", BlockKind::Condition)
        .block("yes", BlockKind::FlowEnd)
        .block("no", BlockKind::FlowEnd)
        .param("constant", "Data type", "byte array")
        .param("constant", "Value", value_hex)
        .link("start", "flowOut", "condition", "flowIn")
        .link("constant", "dataOut", "condition", "predicateIn")
        .link("condition", "flowOutTrue", "yes", "flowIn")
        .link("condition", "flowOutFalse", "no", "flowIn")
}

#[test]
fn test_condition_routes_on_input() {
    for (value, branch) in [("01", "yes"), ("00ff", "no")] {
        let builder = condition_scenario(value);
        let (yes, no) = (builder.id("yes"), builder.id("no"));
        let (mut scenario, _) = builder.build();

        let report = Runner::new(fast_settings()).run(&mut scenario);
        assert!(report.is_completed());
        let taken = if branch == "yes" { yes } else { no };
        let skipped = if branch == "yes" { no } else { yes };
        assert_eq!(report.executions_of(taken), 1, "value {}", value);
        assert_eq!(report.executions_of(skipped), 0, "value {}", value);
    }
}

#[test]
fn test_condition_expression_over_input() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .block("condition", BlockKind::Condition)
        .block("yes", BlockKind::FlowEnd)
        .param("condition", "Predicate", "expression")
        .param("condition", "Expression", "len == 13 && data[0] == 72")
        .link("start", "flowOut", "condition", "flowIn")
        .link("constant", "dataOut", "condition", "predicateIn")
        .link("condition", "flowOutTrue", "yes", "flowIn");
    let yes = builder.id("yes");
    let (mut scenario, _) = builder.build();

    let report = Runner::new(fast_settings()).run(&mut scenario);
    assert!(report.is_completed());
    assert_eq!(report.executions_of(yes), 1);
}

#[test]
fn test_bad_expression_fails_prepare() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("condition", BlockKind::Condition)
        .param("condition", "Predicate", "expression")
        .param("condition", "Expression", "len >")
        .link("start", "flowOut", "condition", "flowIn");
    let condition = builder.id("condition");
    let (mut scenario, _) = builder.build();

    let report = Runner::new(fast_settings()).run(&mut scenario);
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(RunError::PrepareFailed(condition))
    );
    assert!(report.executed.is_empty());
}

fn device_registry(device: RecordingDevice) -> DeviceRegistry {
    let mut devices = DeviceRegistry::new();
    devices.register("dev", device);
    devices
}

#[test]
fn test_device_write_receives_constant() {
    let (mut scenario, _) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .block("write", BlockKind::IoDeviceWrite)
        .block("end", BlockKind::FlowEnd)
        .param("write", "Device", "dev")
        .link("start", "flowOut", "write", "flowIn")
        .link("constant", "dataOut", "write", "dataIn")
        .link("write", "flowOut", "end", "flowIn")
        .build();
    let device = RecordingDevice::default();
    let mut runner = Runner::new(fast_settings()).with_devices(device_registry(device.clone()));

    let report = runner.run(&mut scenario);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(device.written(), vec![b"Hello, world!".to_vec()]);
}

#[test]
fn test_device_read_publishes_output() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("read", BlockKind::IoDeviceRead)
        .block("log", BlockKind::Log)
        .param("read", "Device", "dev")
        .param("read", "Read length", "4")
        .link("start", "flowOut", "read", "flowIn")
        .link("read", "flowOut", "log", "flowIn")
        .link("read", "dataOut", "log", "dataIn");
    let read = builder.id("read");
    let (mut scenario, _) = builder.build();
    let mut runner = Runner::new(fast_settings())
        .with_devices(device_registry(RecordingDevice::with_pattern(&[0xca, 0xfe])));

    let report = runner.run(&mut scenario);

    assert!(report.is_completed());
    // Published buffers outlive the run.
    assert_eq!(
        runner.published(&PortRef::new(read, "dataOut")),
        Some(&[0xca, 0xfe, 0xca, 0xfe][..])
    );
}

#[test]
fn test_missing_device_fails_prepare() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("read", BlockKind::IoDeviceRead)
        .param("read", "Device", "absent")
        .link("start", "flowOut", "read", "flowIn");
    let read = builder.id("read");
    let (mut scenario, _) = builder.build();

    let report = Runner::new(fast_settings()).run(&mut scenario);

    assert_eq!(report.outcome, RunOutcome::Aborted(RunError::PrepareFailed(read)));
    assert_eq!(
        scenario.block(read).unwrap().core().state(),
        BlockState::RuntimeError
    );
}

#[test]
fn test_device_failure_aborts_run() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("read", BlockKind::IoDeviceRead)
        .block("end", BlockKind::FlowEnd)
        .param("read", "Device", "dev")
        .link("start", "flowOut", "read", "flowIn")
        .link("read", "flowOut", "end", "flowIn");
    let (read, end) = (builder.id("read"), builder.id("end"));
    let (mut scenario, _) = builder.build();
    let mut runner = Runner::new(fast_settings())
        .with_devices(device_registry(RecordingDevice::failing(DeviceError::Timeout(250))));

    let report = runner.run(&mut scenario);

    match &report.outcome {
        RunOutcome::Aborted(RunError::BlockFailed { block, message }) => {
            assert_eq!(*block, read);
            assert!(message.contains("250 ms"), "message: {}", message);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.executions_of(end), 0);
    assert!(!scenario.is_running());
}

#[test]
fn test_cancel_during_delay() {
    let (mut scenario, _) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("delay", BlockKind::Delay)
        .block("end", BlockKind::FlowEnd)
        .param("delay", "Length", "60")
        .link("start", "flowOut", "delay", "flowIn")
        .link("delay", "flowOut", "end", "flowIn")
        .build();
    let mut runner = Runner::new(fast_settings());
    let token = runner.cancel_token();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        token.cancel();
    });
    let started = Instant::now();
    let report = runner.run(&mut scenario);
    canceller.join().unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(started.elapsed() < common::test_timeout());
    assert_eq!(runner.phase(), RunPhase::Cancelled);
}

#[test]
fn test_short_delay_completes() {
    let (mut scenario, ids) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("delay", BlockKind::Delay)
        .block("end", BlockKind::FlowEnd)
        .param("delay", "Length", "0.05")
        .link("start", "flowOut", "delay", "flowIn")
        .link("delay", "flowOut", "end", "flowIn")
        .build();

    let report = Runner::new(fast_settings()).run(&mut scenario);

    assert!(report.is_completed());
    assert_eq!(report.executed, vec![ids["start"], ids["delay"], ids["end"]]);
    assert!(report.duration() >= chrono::Duration::milliseconds(50));
}

#[test]
fn test_two_start_blocks_rejected() {
    let (mut scenario, _) = ScenarioBuilder::new()
        .block("a", BlockKind::FlowStart)
        .block("b", BlockKind::FlowStart)
        .build();

    let report = Runner::new(fast_settings()).run(&mut scenario);
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(RunError::MultipleEntryPoints(2))
    );
}

#[test]
fn test_run_publishes_state_changes() {
    let (mut scenario, ids) = loop_scenario(1);
    let events = scenario.subscribe();

    Runner::new(fast_settings()).run(&mut scenario);

    let events: Vec<ScenarioEvent> = events.try_iter().collect();
    assert!(events.contains(&ScenarioEvent::StateChanged(ids["log"])));
    assert!(events.contains(&ScenarioEvent::AppearanceChanged(ids["loop"])));
    assert_eq!(
        events.last(),
        Some(&ScenarioEvent::RunPhaseChanged(RunPhase::Completed))
    );
}

#[test]
fn test_invalid_value_keeps_previous_buffer() {
    let builder = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .param("constant", "Data type", "integer")
        .param("constant", "Value", "42");
    let constant = builder.id("constant");
    let (mut scenario, _) = builder.build();
    let output = PortRef::new(constant, "dataOut");

    let mut runner = Runner::new(fast_settings());
    assert!(runner.run(&mut scenario).is_completed());
    assert_eq!(runner.published(&output), Some(&[0u8, 0, 0, 42][..]));

    // Switch through "string" so the integer field can hold unparsable text.
    let mut params = scenario.block(constant).unwrap().params().clone();
    params.sub_mut("Data type").unwrap().set_value("string").unwrap();
    scenario.configure_block(constant, params).unwrap();
    let mut params = scenario.block(constant).unwrap().params().clone();
    params.sub_mut("Value").unwrap().set_value("forty-two").unwrap();
    params.sub_mut("Data type").unwrap().set_value("integer").unwrap();
    let stored = scenario.configure_block(constant, params).unwrap();
    assert_eq!(stored.sub("Value").unwrap().state(), ParamState::Error);

    assert!(runner.run(&mut scenario).is_completed());
    assert_eq!(runner.published(&output), Some(&[0u8, 0, 0, 42][..]));
}

#[test]
fn test_loop_without_done_branch_aborts() {
    let (mut scenario, ids) = ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("merge", BlockKind::FlowMerge)
        .block("loop", BlockKind::Loop)
        .param("loop", "Number of iterations", "2")
        .link("start", "flowOut", "merge", "flowIn1")
        .link("merge", "flowOut", "loop", "flowIn")
        .link("loop", "flowOutRepeat", "merge", "flowIn2")
        .build();

    let report = Runner::new(fast_settings()).run(&mut scenario);
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(RunError::NoNextHop(ids["loop"]))
    );
    assert_eq!(report.executions_of(ids["loop"]), 3);
    assert_eq!(
        scenario.block(ids["loop"]).unwrap().core().state(),
        BlockState::RuntimeError
    );
}
