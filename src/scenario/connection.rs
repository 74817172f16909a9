//! Connections between block ports.

use crate::scenario::id::{ConnectionId, PortRef};
use serde::{Deserialize, Serialize};

/// A 2-D point on the editor canvas. Carried for persistence only; the
/// runner never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An edge from an output port to an input port of the same category.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: PortRef,
    pub target: PortRef,
    /// Where the editor bends the drawn line.
    pub routing_hint: Option<Point>,
}

impl Connection {
    /// Whether either end sits on `port`.
    pub fn touches(&self, port: &PortRef) -> bool {
        &self.source == port || &self.target == port
    }
}

/// Why `Scenario::add_connection` refused to link two ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRejection {
    UnknownPort(PortRef),
    CategoryMismatch,
    WrongDirection,
    SameBlock,
    /// The named port already holds the one connection its category allows.
    PortOccupied(PortRef),
    Duplicate,
}

impl std::fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRejection::UnknownPort(port) => write!(f, "unknown port {}", port),
            ConnectionRejection::CategoryMismatch => write!(f, "port categories differ"),
            ConnectionRejection::WrongDirection => {
                write!(f, "source must be an output and target an input")
            }
            ConnectionRejection::SameBlock => write!(f, "both ports belong to the same block"),
            ConnectionRejection::PortOccupied(port) => {
                write!(f, "port {} is already connected", port)
            }
            ConnectionRejection::Duplicate => write!(f, "connection already exists"),
        }
    }
}
