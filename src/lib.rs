//! # scenario-engine
//!
//! A block-based scenario engine. Users compose a directed graph of blocks
//! (start, end, merge, condition, loop, constant, log, delay, device I/O),
//! connect flow and data ports, and run the graph. The runner follows flow
//! edges from a single start block and routes the latest published byte
//! buffer into every connected data input.
//!
//! ## Modules
//!
//! - **scenario**: graph model, connection rules, block kinds, runner and JSON persistence
//! - **params**: the typed parameter tree each block owns
//! - **device**: the `IoDevice` capability hardware-bound blocks call into
//! - **config**: engine settings loaded from TOML
//!
//! ## Configuration
//!
//! Engine settings live in the platform config directory under
//! `dev.scenario-engine/engine.toml`:
//!
//! - **Linux**: `~/.config/dev.scenario-engine/`
//! - **macOS**: `~/Library/Application Support/dev.scenario-engine/`
//! - **Windows**: `%APPDATA%\dev.scenario-engine\`
//!
//! ## Example
//!
//! ```no_run
//! use scenario_engine::config::EngineConfig;
//! use scenario_engine::scenario::{BlockKind, PortRef, Runner, Scenario};
//!
//! let mut scenario = Scenario::new();
//! let start = scenario.add_block_of_kind(BlockKind::FlowStart);
//! let end = scenario.add_block_of_kind(BlockKind::FlowEnd);
//! scenario.add_connection(PortRef::new(start, "flowOut"), PortRef::new(end, "flowIn"));
//!
//! let config = EngineConfig::load_or_default();
//! let report = Runner::new(config.runner).run(&mut scenario);
//! assert!(report.is_completed());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod params;
pub mod scenario;

// Re-export commonly used types
pub use config::EngineConfig;
pub use device::{DeviceRegistry, IoDevice, LoopbackDevice};
pub use error::{Result, RunError, ScenarioError};
pub use params::{ConfigParam, ParamState, ParamType};
pub use scenario::{BlockKind, RunOutcome, RunReport, Runner, Scenario};
