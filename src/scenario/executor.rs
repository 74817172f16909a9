//! Scenario runner.
//!
//! A run moves through `Idle -> Preparing -> Running` and ends in one of
//! `Completed`, `Aborted` or `Cancelled`:
//!
//! 1. The single Flow Start block is located; zero or several is reported
//!    before anything is prepared.
//! 2. Every block is prepared. One refusal aborts the run with nothing
//!    executed.
//! 3. Blocks without a flow input (constants and other pure sources) execute
//!    once, in graph order.
//! 4. A single cursor walks the flow edges from the start block. Each step
//!    gathers the latest buffer published on every connected data input,
//!    runs the block, stores its outputs and follows its preferred flow port.
//!
//! Asynchronous steps are the only suspension point. While one is pending
//! the runner polls its completion channel and the cancel token; a cancel
//! asks the block to stop and waits a bounded grace period for it.
//!
//! `cleanup()` is called on every block however the run ends.

use crate::config::RunnerSettings;
use crate::device::DeviceRegistry;
use crate::error::RunError;
use crate::scenario::block::{BlockState, PortData, PrepareContext};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::completion::{Completion, CompletionHandle};
use crate::scenario::events::ScenarioEvent;
use crate::scenario::graph::Scenario;
use crate::scenario::id::{BlockId, PortRef};
use crate::scenario::port::{PortCategory, PortDirection};
use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    Preparing,
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Aborted | RunPhase::Cancelled)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted(RunError),
    Cancelled,
}

impl RunOutcome {
    pub fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Completed => RunPhase::Completed,
            RunOutcome::Aborted(_) => RunPhase::Aborted,
            RunOutcome::Cancelled => RunPhase::Cancelled,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Number of block steps executed, pre-pass included.
    pub steps: u64,
    /// Blocks in the order their steps ran.
    pub executed: Vec<BlockId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// How many times `block` executed during the run.
    pub fn executions_of(&self, block: BlockId) -> usize {
        self.executed.iter().filter(|id| **id == block).count()
    }
}

/// Cooperative cancellation flag shared with the host.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Why a step did not succeed.
enum StepError {
    Abort(RunError),
    Cancelled,
}

/// Walks a scenario and routes data between its blocks.
pub struct Runner {
    settings: RunnerSettings,
    devices: DeviceRegistry,
    cancel: CancelToken,
    phase: RunPhase,
    /// Latest buffer published on each data output. Kept across runs of
    /// the same scenario generation.
    published: HashMap<PortRef, Vec<u8>>,
    generation: Option<u64>,
    executed: Vec<BlockId>,
}

impl Runner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self {
            settings,
            devices: DeviceRegistry::new(),
            cancel: CancelToken::new(),
            phase: RunPhase::Idle,
            published: HashMap::new(),
            generation: None,
            executed: Vec::new(),
        }
    }

    pub fn with_devices(mut self, devices: DeviceRegistry) -> Self {
        self.devices = devices;
        self
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.devices
    }

    /// Token that cancels the current run from another thread. A cancel
    /// requested before `run` starts applies to that run; the token is
    /// cleared when a run ends.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Latest buffer published on a data output port. Buffers from a
    /// previous scenario (or a reloaded one) are dropped when the next run
    /// starts.
    pub fn published(&self, port: &PortRef) -> Option<&[u8]> {
        self.published.get(port).map(Vec::as_slice)
    }

    /// Forget every published buffer.
    pub fn clear_published(&mut self) {
        self.published.clear();
    }

    /// Run `scenario` to completion, abort or cancellation.
    pub fn run(&mut self, scenario: &mut Scenario) -> RunReport {
        let started_at = Utc::now();
        self.executed.clear();
        if self.generation != Some(scenario.generation()) {
            if !self.published.is_empty() {
                tracing::debug!(
                    "Scenario changed, dropping {} published buffers",
                    self.published.len()
                );
                self.published.clear();
            }
            self.generation = Some(scenario.generation());
        }

        let outcome = match scenario.entry_point() {
            _ if scenario.is_running() => RunOutcome::Aborted(RunError::AlreadyRunning),
            Err(reason) => {
                tracing::warn!("Scenario cannot run: {}", reason);
                RunOutcome::Aborted(reason)
            }
            Ok(entry) => {
                scenario.set_running(true);
                let outcome = self.prepare_and_walk(scenario, entry);
                self.cleanup_all(scenario);
                scenario.set_running(false);
                outcome
            }
        };

        self.set_phase(scenario, outcome.phase());
        self.cancel.reset();
        let report = RunReport {
            outcome,
            steps: self.executed.len() as u64,
            executed: std::mem::take(&mut self.executed),
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            steps = report.steps,
            elapsed_ms = report.duration().num_milliseconds(),
            "Run {}",
            report.outcome
        );
        report
    }

    fn set_phase(&mut self, scenario: &Scenario, phase: RunPhase) {
        if self.phase != phase {
            tracing::debug!("Run phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            scenario.events().publish(ScenarioEvent::RunPhaseChanged(phase));
        }
    }

    fn prepare_and_walk(&mut self, scenario: &mut Scenario, entry: BlockId) -> RunOutcome {
        self.set_phase(scenario, RunPhase::Preparing);
        if let Err(reason) = self.prepare_all(scenario) {
            return RunOutcome::Aborted(reason);
        }

        self.set_phase(scenario, RunPhase::Running);
        tracing::info!("Run started at {:?}", entry);
        match self.walk(scenario, entry) {
            Ok(()) => RunOutcome::Completed,
            Err(StepError::Abort(reason)) => RunOutcome::Aborted(reason),
            Err(StepError::Cancelled) => RunOutcome::Cancelled,
        }
    }

    fn prepare_all(&mut self, scenario: &mut Scenario) -> Result<(), RunError> {
        let ids: Vec<BlockId> = scenario.block_ids().collect();
        let ctx = PrepareContext {
            devices: &self.devices,
        };

        for id in &ids {
            scenario.update_block(*id, |block| block.core_mut().reset_state(true));
        }
        for id in ids {
            let prepared = scenario
                .update_block(id, |block| {
                    let ok = block.prepare(&ctx);
                    if !ok {
                        block
                            .core_mut()
                            .set_state(BlockState::RuntimeError, "Failed to prepare block.");
                    }
                    ok
                })
                .unwrap_or(false);
            if !prepared {
                tracing::warn!("Block {:?} failed to prepare", id);
                return Err(RunError::PrepareFailed(id));
            }
        }
        Ok(())
    }

    fn cleanup_all(&mut self, scenario: &mut Scenario) {
        let ids: Vec<BlockId> = scenario.block_ids().collect();
        for id in ids {
            scenario.update_block(id, |block| {
                if !block.cleanup() {
                    tracing::warn!("Block {:?} failed to clean up", id);
                }
            });
        }
    }

    fn walk(&mut self, scenario: &mut Scenario, entry: BlockId) -> Result<(), StepError> {
        // Sources without a flow input run once before the flow starts.
        let sources: Vec<BlockId> = scenario
            .blocks()
            .filter(|(_, block)| {
                block.kind() != BlockKind::FlowStart && !block.core().has_flow_input()
            })
            .map(|(id, _)| id)
            .collect();
        for id in sources {
            self.check_cancelled()?;
            self.step(scenario, id)?;
        }

        let mut cursor = entry;
        loop {
            self.check_cancelled()?;
            if let Some(limit) = self.settings.step_limit() {
                if self.executed.len() as u64 >= limit {
                    return Err(StepError::Abort(RunError::StepLimit(limit)));
                }
            }

            self.step(scenario, cursor)?;

            match self.next_hop(scenario, cursor)? {
                Some(next) => cursor = next,
                None => return Ok(()),
            }
        }
    }

    /// Follow the preferred flow port of `current`. `None` ends the path.
    fn next_hop(
        &self,
        scenario: &mut Scenario,
        current: BlockId,
    ) -> Result<Option<BlockId>, StepError> {
        let Some(block) = scenario.block(current) else {
            return Err(StepError::Abort(RunError::NoNextHop(current)));
        };

        if block.kind() == BlockKind::FlowEnd {
            scenario.update_block(current, |block| {
                block
                    .core_mut()
                    .set_state(BlockState::RuntimeInfo, "Execution finished here successfully.")
            });
            return Ok(None);
        }

        let has_outgoing = block
            .core()
            .ports_where(PortCategory::Flow, PortDirection::Output)
            .any(|p| scenario.outgoing(&PortRef::new(current, p.name())).is_some());
        if !has_outgoing {
            tracing::debug!("Flow path ends at {:?}", current);
            return Ok(None);
        }

        let Some(port) = block.preferred_output_flow_port().map(str::to_string) else {
            scenario.update_block(current, |block| {
                block
                    .core_mut()
                    .set_state(BlockState::RuntimeError, "No next flow port to follow.")
            });
            return Err(StepError::Abort(RunError::NoNextHop(current)));
        };

        let next = scenario
            .outgoing(&PortRef::new(current, port.as_str()))
            .map(|connection| connection.target.block);
        match next {
            Some(next) => Ok(Some(next)),
            None => {
                tracing::warn!(
                    "Execution stopped at {}: flow port '{}' is not connected",
                    current,
                    port
                );
                scenario.update_block(current, |block| {
                    block.core_mut().set_state(
                        BlockState::RuntimeError,
                        "Execution stopped here: unconnected output flow port!",
                    )
                });
                Err(StepError::Abort(RunError::NoNextHop(current)))
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Latest buffers for every connected data input of `id`.
    fn gather_inputs(&self, scenario: &Scenario, id: BlockId) -> PortData {
        let mut inputs = PortData::new();
        let Some(block) = scenario.block(id) else {
            return inputs;
        };
        for port in block.core().ports_where(PortCategory::Data, PortDirection::Input) {
            let target = PortRef::new(id, port.name());
            let buffer = scenario
                .incoming(&target)
                .and_then(|c| self.published.get(&c.source));
            if let Some(buffer) = buffer {
                inputs.insert(port.name().to_string(), buffer.clone());
            }
        }
        inputs
    }

    /// Store buffers a block produced, keyed by its data output ports.
    fn publish(&mut self, scenario: &Scenario, id: BlockId, outputs: PortData) {
        for (port, buffer) in outputs {
            let port_ref = PortRef::new(id, port);
            match scenario.port(&port_ref) {
                Some(p) if p.is_data_output() => {
                    self.published.insert(port_ref, buffer);
                }
                _ => tracing::warn!("Block {:?} produced data for unknown output {}", id, port_ref),
            }
        }
    }

    fn fail(scenario: &mut Scenario, id: BlockId, message: String) -> StepError {
        tracing::error!("Block {:?} failed: {}", id, message);
        scenario.update_block(id, |block| {
            block
                .core_mut()
                .set_state(BlockState::RuntimeError, message.clone())
        });
        StepError::Abort(RunError::BlockFailed { block: id, message })
    }

    fn step(&mut self, scenario: &mut Scenario, id: BlockId) -> Result<(), StepError> {
        let inputs = self.gather_inputs(scenario, id);
        let immediate = scenario
            .update_block(id, |block| {
                block.core_mut().set_state(BlockState::BeingExecuted, "");
                block.supports_immediate_execution()
            })
            .ok_or(StepError::Abort(RunError::NoNextHop(id)))?;

        tracing::debug!(
            block = ?id,
            title = scenario.block(id).map(|b| b.core().title()).unwrap_or_default(),
            step = self.executed.len(),
            "Executing block"
        );

        let outputs = if immediate {
            let result = scenario
                .update_block(id, |block| block.execute_immediate(&inputs))
                .ok_or(StepError::Abort(RunError::NoNextHop(id)))?;
            result.map_err(|e| Self::fail(scenario, id, e.to_string()))?
        } else {
            self.execute_async(scenario, id, &inputs)?
        };

        self.executed.push(id);
        self.publish(scenario, id, outputs);
        scenario.update_block(id, |block| {
            if block.core().state() == BlockState::BeingExecuted {
                block.core_mut().reset_state(true);
            }
        });
        Ok(())
    }

    fn execute_async(
        &mut self,
        scenario: &mut Scenario,
        id: BlockId,
        inputs: &PortData,
    ) -> Result<PortData, StepError> {
        let (handle, completion) = CompletionHandle::channel();
        let started = scenario
            .update_block(id, |block| block.execute(inputs, handle))
            .ok_or(StepError::Abort(RunError::NoNextHop(id)))?;
        started.map_err(|e| Self::fail(scenario, id, e.to_string()))?;

        let poll = self.settings.completion_poll();
        loop {
            match completion.recv_timeout(poll) {
                Ok(Completion::Finished(outputs)) => return Ok(outputs),
                Ok(Completion::Failed(message)) => return Err(Self::fail(scenario, id, message)),
                Ok(Completion::Stopped) => {
                    if self.cancel.is_cancelled() {
                        return Err(StepError::Cancelled);
                    }
                    return Err(Self::fail(scenario, id, "Block stopped unexpectedly".into()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Self::fail(
                        scenario,
                        id,
                        "Block dropped its completion handle".into(),
                    ));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Stopping block {:?}", id);
        scenario.update_block(id, |block| block.stop_execution());
        match completion.recv_timeout(self.settings.stop_grace()) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Block {:?} did not acknowledge stop within {:?}",
                    id,
                    self.settings.stop_grace()
                );
            }
        }
        Err(StepError::Cancelled)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(RunnerSettings::default())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("phase", &self.phase)
            .field("devices", &self.devices)
            .field("published", &self.published.len())
            .finish()
    }
}
