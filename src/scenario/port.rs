//! Port descriptors for scenario blocks.
//!
//! Each block owns an ordered list of `Port`s. Category and direction are
//! fixed at construction; the graph uses them to validate connections.

use serde::{Deserialize, Serialize};

/// What a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortCategory {
    /// Control flow: decides which block runs next.
    Flow,
    /// A byte buffer produced by one step and consumed by another.
    Data,
    /// Configuration binding between two blocks (e.g. a target and its scope).
    Connection,
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// A named, typed connection point owned by a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    name: String,
    label: String,
    description: String,
    category: PortCategory,
    direction: PortDirection,
    type_hint: Option<String>,
}

impl Port {
    pub fn new(
        name: impl Into<String>,
        category: PortCategory,
        direction: PortDirection,
    ) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            description: String::new(),
            category,
            direction,
            type_hint: None,
        }
    }

    pub fn flow_input(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Flow, PortDirection::Input)
    }

    pub fn flow_output(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Flow, PortDirection::Output)
    }

    pub fn data_input(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Data, PortDirection::Input)
    }

    pub fn data_output(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Data, PortDirection::Output)
    }

    pub fn connection_input(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Connection, PortDirection::Input)
    }

    pub fn connection_output(name: impl Into<String>) -> Self {
        Self::new(name, PortCategory::Connection, PortDirection::Output)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label, falling back to the name when none was given.
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> PortCategory {
        self.category
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint.as_deref()
    }

    pub fn is_flow_input(&self) -> bool {
        self.category == PortCategory::Flow && self.direction == PortDirection::Input
    }

    pub fn is_flow_output(&self) -> bool {
        self.category == PortCategory::Flow && self.direction == PortDirection::Output
    }

    pub fn is_data_input(&self) -> bool {
        self.category == PortCategory::Data && self.direction == PortDirection::Input
    }

    pub fn is_data_output(&self) -> bool {
        self.category == PortCategory::Data && self.direction == PortDirection::Output
    }

    /// Raw label as stored (may be empty), used by persistence.
    pub(crate) fn raw_label(&self) -> &str {
        &self.label
    }
}
