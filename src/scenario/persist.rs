//! Scenario persistence (JSON).
//!
//! Every persisted object carries a format tag. A tag that does not match
//! exactly fails the whole load; nothing is silently upgraded.
//!
//! Loading builds a fresh graph. Block ids are reassigned in document order
//! and connections are re-validated through the normal connection rules, so
//! a file cannot smuggle in an illegal topology.

use crate::error::{Result, ResultExt, ScenarioError};
use crate::params::{ConfigParam, ParamState};
use crate::scenario::block::{apply_params, Block, BlockState};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::connection::Point;
use crate::scenario::graph::Scenario;
use crate::scenario::id::{BlockId, PortRef};
use crate::scenario::port::{Port, PortCategory, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const SCENARIO_FORMAT: &str = "scenario-engine/scenario/1";
pub const BLOCK_FORMAT: &str = "scenario-engine/block/1";
pub const PORT_FORMAT: &str = "scenario-engine/port/1";
pub const CONNECTION_FORMAT: &str = "scenario-engine/connection/1";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioDoc {
    format: String,
    #[serde(default)]
    blocks: Vec<BlockDoc>,
    #[serde(default)]
    connections: Vec<ConnectionDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockDoc {
    format: String,
    id: BlockId,
    kind: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    position: Point,
    #[serde(default)]
    state: BlockState,
    #[serde(default)]
    state_message: String,
    params: ConfigParam,
    ports: Vec<PortDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortDoc {
    format: String,
    name: String,
    category: PortCategory,
    direction: PortDirection,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConnectionDoc {
    format: String,
    source: PortRef,
    target: PortRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    routing_hint: Option<Point>,
}

fn check_format(object: &'static str, expected: &'static str, found: &str) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(ScenarioError::FormatMismatch {
            object,
            expected,
            found: found.to_string(),
        })
    }
}

impl PortDoc {
    fn from_port(port: &Port) -> Self {
        Self {
            format: PORT_FORMAT.to_string(),
            name: port.name().to_string(),
            category: port.category(),
            direction: port.direction(),
            label: port.raw_label().to_string(),
            description: port.description().to_string(),
            type_hint: port.type_hint().map(str::to_string),
        }
    }

    fn into_port(self) -> Result<Port> {
        check_format("port", PORT_FORMAT, &self.format)?;
        let mut port = Port::new(self.name, self.category, self.direction)
            .with_label(self.label)
            .with_description(self.description);
        if let Some(hint) = self.type_hint {
            port = port.with_type_hint(hint);
        }
        Ok(port)
    }
}

impl BlockDoc {
    fn from_block(id: BlockId, block: &dyn Block) -> Self {
        let core = block.core();
        Self {
            format: BLOCK_FORMAT.to_string(),
            id,
            kind: block.kind().tag(),
            title: core.raw_title().to_string(),
            subtitle: core.subtitle().to_string(),
            position: core.position(),
            state: core.state(),
            state_message: core.state_message().to_string(),
            params: block.params().clone(),
            ports: core.ports().iter().map(PortDoc::from_port).collect(),
        }
    }

    fn into_block(self) -> Result<Box<dyn Block>> {
        check_format("block", BLOCK_FORMAT, &self.format)?;
        let kind = BlockKind::from_tag(self.kind).ok_or(ScenarioError::UnknownBlockKind(self.kind))?;

        let mut block = kind.create();
        apply_params(block.as_mut(), self.params);

        let ports = self
            .ports
            .into_iter()
            .map(PortDoc::into_port)
            .collect::<Result<Vec<_>>>()?;
        check_port_layout(kind, block.core().ports(), &ports)?;
        let (param_state, param_message) = block.params().worst_state();
        let validation = (param_state != ParamState::Ok)
            .then(|| (BlockState::from(param_state), param_message.to_string()));

        let core = block.core_mut();
        core.replace_ports(ports);
        core.restore_identity(
            self.title,
            self.subtitle,
            self.position,
            self.state,
            self.state_message,
        );
        // Run results do not survive a reload; validation of the stored
        // parameters wins over the saved status.
        core.reset_state(true);
        if let Some((state, message)) = validation {
            core.set_state(state, message);
        }
        Ok(block)
    }
}

impl Scenario {
    /// Serialize the graph to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        let doc = ScenarioDoc {
            format: SCENARIO_FORMAT.to_string(),
            blocks: self
                .blocks()
                .map(|(id, block)| BlockDoc::from_block(id, block))
                .collect(),
            connections: self
                .connections()
                .map(|c| ConnectionDoc {
                    format: CONNECTION_FORMAT.to_string(),
                    source: c.source.clone(),
                    target: c.target.clone(),
                    routing_hint: c.routing_hint,
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Build a new graph from a JSON string.
    pub fn from_json(json: &str) -> Result<Scenario> {
        let doc: ScenarioDoc = serde_json::from_str(json)?;
        check_format("scenario", SCENARIO_FORMAT, &doc.format)?;

        let mut scenario = Scenario::new();
        let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
        for block_doc in doc.blocks {
            let saved_id = block_doc.id;
            let block = block_doc
                .into_block()
                .with_context(|| format!("Failed to restore block {}", saved_id))?;
            let id = scenario.add_block(block);
            if remap.insert(saved_id, id).is_some() {
                return Err(ScenarioError::Corrupt(format!(
                    "block id {} appears twice",
                    saved_id
                )));
            }
        }

        for connection_doc in doc.connections {
            check_format("connection", CONNECTION_FORMAT, &connection_doc.format)?;
            let source = remap_port(&remap, connection_doc.source)?;
            let target = remap_port(&remap, connection_doc.target)?;
            let id = scenario
                .connect(source.clone(), target.clone())
                .map_err(|rejection| {
                    ScenarioError::Corrupt(format!(
                        "connection {} -> {} rejected: {}",
                        source, target, rejection
                    ))
                })?;
            if connection_doc.routing_hint.is_some() {
                scenario.set_routing_hint(id, connection_doc.routing_hint);
            }
        }

        tracing::debug!(
            "Restored scenario with {} blocks and {} connections",
            scenario.block_count(),
            scenario.connection_count()
        );
        Ok(scenario)
    }

    /// Save the graph to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write scenario to {:?}", path))?;
        tracing::info!("Saved scenario to {:?}", path);
        Ok(())
    }

    /// Load a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Scenario> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {:?}", path))?;
        let scenario = Scenario::from_json(&json)
            .with_context(|| format!("Failed to load scenario from {:?}", path))?;
        tracing::info!("Loaded scenario from {:?}", path);
        Ok(scenario)
    }

    /// Replace this graph with the one stored at `path`. On any error the
    /// current graph is left untouched.
    pub fn load_into(&mut self, path: &Path) -> Result<()> {
        if self.is_running() {
            return Err(ScenarioError::Invalid(crate::error::RunError::AlreadyRunning));
        }
        let loaded = Scenario::load(path)?;
        self.replace_with(loaded);
        Ok(())
    }
}

/// Stored ports may carry their own labels, but names, categories and
/// directions must be exactly what the block builds from its parameters.
fn check_port_layout(kind: BlockKind, built: &[Port], stored: &[Port]) -> Result<()> {
    let mut names = HashSet::new();
    for port in stored {
        if !names.insert(port.name()) {
            return Err(ScenarioError::Corrupt(format!(
                "{} block has two ports named '{}'",
                kind.display_name(),
                port.name()
            )));
        }
    }

    let present = |port: &Port| {
        stored.iter().any(|s| {
            s.name() == port.name()
                && s.category() == port.category()
                && s.direction() == port.direction()
        })
    };
    if stored.len() != built.len() || !built.iter().all(present) {
        return Err(ScenarioError::Corrupt(format!(
            "{} block ports do not match its parameters",
            kind.display_name()
        )));
    }
    Ok(())
}

fn remap_port(remap: &HashMap<BlockId, BlockId>, port: PortRef) -> Result<PortRef> {
    let block = remap
        .get(&port.block)
        .copied()
        .ok_or_else(|| ScenarioError::Corrupt(format!("connection refers to missing block {}", port.block)))?;
    Ok(PortRef::new(block, port.port))
}
