//! Scenario graph model and execution.
//!
//! A scenario is a directed graph of blocks. Flow ports carry control from
//! one block to the next; data ports carry byte buffers. The `graph` module
//! enforces the connection rules, `executor` walks the flow edges, and
//! `persist` reads and writes the JSON form.

pub mod block;
pub mod block_kind;
pub mod blocks;
pub mod completion;
pub mod connection;
pub mod events;
pub mod executor;
pub mod graph;
pub mod id;
pub mod persist;
pub mod port;

pub use block::{apply_params, Block, BlockCore, BlockError, BlockState, LogLevel, PortData};
pub use block_kind::BlockKind;
pub use completion::{Completion, CompletionHandle};
pub use connection::{Connection, ConnectionRejection, Point};
pub use events::{EventBus, ScenarioEvent};
pub use executor::{CancelToken, RunOutcome, RunPhase, RunReport, Runner};
pub use graph::Scenario;
pub use id::{BlockId, ConnectionId, PortRef};
pub use port::{Port, PortCategory, PortDirection};
