//! Block abstraction for the scenario graph.
//!
//! Every block kind implements the `Block` trait and embeds a `BlockCore`
//! holding the state shared by all kinds: names, parameter tree, status,
//! ports and canvas position. The trait supplies the execution contract:
//!
//! - `prepare()` once before a run, `cleanup()` once after it.
//! - `execute_immediate()` for cheap synchronous steps, or `execute()` for
//!   steps that complete later through a `CompletionHandle`.
//! - `preferred_output_flow_port()` to choose the next hop after a step.
//!
//! Parameter edits go through `apply_params`, which runs the
//! `should_update_params` / `set_params` / `update_params` protocol and
//! folds the resulting field states into the block status.

use crate::device::DeviceRegistry;
use crate::device::DeviceError;
use crate::params::{ConfigParam, ParamState};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::completion::CompletionHandle;
use crate::scenario::connection::Point;
use crate::scenario::port::{Port, PortCategory, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Byte buffers keyed by port name within one block.
pub type PortData = HashMap<String, Vec<u8>>;

/// Log target for messages that belong in the scenario run log.
pub const RUN_LOG_TARGET: &str = "scenario_engine::run_log";

/// Name of the field most block kinds use for their display title.
pub const BLOCK_NAME_PARAM: &str = "Block name";

/// Block status. The first four are set while editing, the rest while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockState {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
    BeingExecuted,
    RuntimeInfo,
    RuntimeWarning,
    RuntimeError,
}

impl BlockState {
    pub fn is_runtime(self) -> bool {
        matches!(
            self,
            BlockState::BeingExecuted
                | BlockState::RuntimeInfo
                | BlockState::RuntimeWarning
                | BlockState::RuntimeError
        )
    }
}

impl From<ParamState> for BlockState {
    fn from(state: ParamState) -> Self {
        match state {
            ParamState::Ok => BlockState::Ok,
            ParamState::Info => BlockState::Info,
            ParamState::Warning => BlockState::Warning,
            ParamState::Error => BlockState::Error,
        }
    }
}

/// Errors a block step can raise. Any of them aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("Block kind {0} does not support this execution mode")]
    Unsupported(BlockKind),

    #[error("Missing input on port '{0}'")]
    MissingInput(String),

    #[error("Block is not prepared: {0}")]
    NotPrepared(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("{0}")]
    Failed(String),
}

/// Severity of a run-log message emitted by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Pending change notifications, drained by the graph or runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockChanges {
    pub appearance: bool,
    pub state: bool,
    pub ports: bool,
}

impl BlockChanges {
    pub fn any(&self) -> bool {
        self.appearance || self.state || self.ports
    }
}

/// Context handed to `prepare()`.
pub struct PrepareContext<'a> {
    pub devices: &'a DeviceRegistry,
}

/// State shared by every block kind.
#[derive(Debug, Clone)]
pub struct BlockCore {
    name: String,
    description: String,
    title: String,
    subtitle: String,
    pub(crate) params: ConfigParam,
    state: BlockState,
    state_message: String,
    ports: Vec<Port>,
    position: Point,
    changes: BlockChanges,
}

impl BlockCore {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let params = ConfigParam::group(format!("{} configuration", name));
        Self {
            name,
            description: description.into(),
            title: String::new(),
            subtitle: String::new(),
            params,
            state: BlockState::Ok,
            state_message: String::new(),
            ports: Vec::new(),
            position: Point::default(),
            changes: BlockChanges::default(),
        }
    }

    pub fn with_params(mut self, params: ConfigParam) -> Self {
        self.params = params;
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.add_port(port);
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// User-facing title; the kind name until the user renames the block.
    pub fn title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn params(&self) -> &ConfigParam {
        &self.params
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn state_message(&self) -> &str {
        &self.state_message
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if self.title != title {
            self.title = title;
            self.changes.appearance = true;
        }
    }

    pub fn set_subtitle(&mut self, subtitle: impl Into<String>) {
        let subtitle = subtitle.into();
        if self.subtitle != subtitle {
            self.subtitle = subtitle;
            self.changes.appearance = true;
        }
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
        self.changes.appearance = true;
    }

    pub fn set_state(&mut self, state: BlockState, message: impl Into<String>) {
        self.state = state;
        self.state_message = message.into();
        self.changes.state = true;
    }

    /// Return to `Ok`. With `only_runtime`, edit-time states are kept.
    pub fn reset_state(&mut self, only_runtime: bool) {
        if only_runtime && !self.state.is_runtime() {
            return;
        }
        if self.state != BlockState::Ok || !self.state_message.is_empty() {
            self.state = BlockState::Ok;
            self.state_message.clear();
            self.changes.state = true;
        }
    }

    /// Copy the "Block name" field into the title, if the block has one.
    pub fn apply_block_name(&mut self) {
        if let Some(name) = self.params.sub_value(BLOCK_NAME_PARAM).map(str::to_string) {
            self.set_title(name);
        }
    }

    // ── Ports ──

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Add a port. Refuses a duplicate name.
    pub fn add_port(&mut self, port: Port) -> bool {
        if self.port(port.name()).is_some() {
            tracing::warn!(
                "Block '{}' already has a port named '{}'",
                self.name,
                port.name()
            );
            return false;
        }
        self.ports.push(port);
        self.changes.ports = true;
        true
    }

    pub fn remove_port(&mut self, name: &str) -> Option<Port> {
        let index = self.ports.iter().position(|p| p.name() == name)?;
        self.changes.ports = true;
        Some(self.ports.remove(index))
    }

    /// Replace the whole port list (persistence restore).
    pub(crate) fn replace_ports(&mut self, ports: Vec<Port>) {
        self.ports = ports;
        self.changes.ports = true;
    }

    pub fn ports_where(
        &self,
        category: PortCategory,
        direction: PortDirection,
    ) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(move |p| p.category() == category && p.direction() == direction)
    }

    pub fn has_flow_input(&self) -> bool {
        self.ports.iter().any(Port::is_flow_input)
    }

    /// The single flow-output port, if exactly one exists.
    pub fn sole_flow_output(&self) -> Option<&str> {
        let mut outputs = self.ports_where(PortCategory::Flow, PortDirection::Output);
        match (outputs.next(), outputs.next()) {
            (Some(port), None) => Some(port.name()),
            _ => None,
        }
    }

    // ── Notifications and logging ──

    pub fn take_changes(&mut self) -> BlockChanges {
        std::mem::take(&mut self.changes)
    }

    /// Emit a run-log message attributed to this block.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let block = self.title();
        match level {
            LogLevel::Info => tracing::info!(target: RUN_LOG_TARGET, block, "{}", message),
            LogLevel::Success => {
                tracing::info!(target: RUN_LOG_TARGET, block, success = true, "{}", message)
            }
            LogLevel::Warning => tracing::warn!(target: RUN_LOG_TARGET, block, "{}", message),
            LogLevel::Error => tracing::error!(target: RUN_LOG_TARGET, block, "{}", message),
        }
    }

    pub(crate) fn restore_identity(
        &mut self,
        title: String,
        subtitle: String,
        position: Point,
        state: BlockState,
        state_message: String,
    ) {
        self.title = title;
        self.subtitle = subtitle;
        self.position = position;
        self.state = state;
        self.state_message = state_message;
    }

    /// Raw title as stored (may be empty), used by persistence.
    pub(crate) fn raw_title(&self) -> &str {
        &self.title
    }
}

/// Contract shared by every block kind.
pub trait Block: Send {
    fn kind(&self) -> BlockKind;

    fn core(&self) -> &BlockCore;

    fn core_mut(&mut self) -> &mut BlockCore;

    /// Deep copy with fresh run-scoped state.
    fn clone_block(&self) -> Box<dyn Block>;

    fn params(&self) -> &ConfigParam {
        self.core().params()
    }

    /// Names of the fields `set_params` requires.
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    fn validate_params_structure(&self, params: &ConfigParam) -> bool {
        params.has_subs(self.required_params())
    }

    /// Accept a new parameter tree. Returns the tree as stored, with field
    /// states describing any validation problem. A tree with the wrong
    /// structure is returned marked `Error` and nothing is stored.
    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let mut params = params;
        if !self.validate_params_structure(&params) {
            params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
            return params;
        }

        params.reset_state(true);
        let core = self.core_mut();
        core.params = params;
        core.apply_block_name();
        core.params.clone()
    }

    /// Whether `new_params` needs a structural rebuild after it is stored.
    fn should_update_params(&self, _new_params: &ConfigParam) -> bool {
        false
    }

    /// Rebuild dependent fields or ports from the stored parameters.
    fn update_params(&mut self, _values_changed: bool) {}

    /// Compute run-scoped state. `false` aborts the run.
    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> bool {
        true
    }

    /// Release run-scoped state. Must be idempotent.
    fn cleanup(&mut self) -> bool {
        true
    }

    fn supports_immediate_execution(&self) -> bool {
        false
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        Err(BlockError::Unsupported(self.kind()))
    }

    fn execute(
        &mut self,
        _inputs: &PortData,
        _completion: CompletionHandle,
    ) -> Result<(), BlockError> {
        Err(BlockError::Unsupported(self.kind()))
    }

    /// Best-effort request to stop a pending asynchronous step. The block
    /// should answer with `Completion::Stopped` (or any completion).
    fn stop_execution(&mut self) {}

    /// Flow-output port to follow after this block's step.
    fn preferred_output_flow_port(&self) -> Option<&str> {
        self.core().sole_flow_output()
    }
}

/// Run the parameter exchange protocol on `block` and fold the result into
/// its status. Returns the tree as the block stored it (or the rejected tree).
pub fn apply_params(block: &mut dyn Block, params: ConfigParam) -> ConfigParam {
    let structurally_valid = block.validate_params_structure(&params);
    let rebuild = structurally_valid && block.should_update_params(&params);

    let result = block.set_params(params);
    if !structurally_valid {
        let (_, message) = result.worst_state();
        let message = message.to_string();
        block.core_mut().set_state(BlockState::Error, message);
        return result;
    }

    // A rebuilt tree is validated again against its new field types.
    let result = if rebuild {
        block.update_params(true);
        let rebuilt = block.params().clone();
        block.set_params(rebuilt)
    } else {
        result
    };

    let (state, message) = result.worst_state();
    let message = message.to_string();
    block.core_mut().set_state(state.into(), message);
    result
}
