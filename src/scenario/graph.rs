//! The scenario graph: blocks, connections and their validity rules.
//!
//! Blocks and connections live in arena vectors indexed by `BlockId` and
//! `ConnectionId`. A removed slot stays `None`, so ids stay stable for the
//! lifetime of the graph. A per-port index maps every `PortRef` to the
//! connections attached to it, which gives O(1) successor/predecessor
//! lookup for the runner and makes cascade deletes cheap.
//!
//! Connection multiplicity:
//! - a Flow output is the source of at most one connection
//! - a Data input is the target of at most one connection
//! - a Connection-category port holds at most one connection on either end

use crate::error::{Result, RunError, ScenarioError};
use crate::params::ConfigParam;
use crate::scenario::block::{apply_params, Block};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::connection::{Connection, ConnectionRejection, Point};
use crate::scenario::events::{EventBus, ScenarioEvent};
use crate::scenario::id::{BlockId, ConnectionId, PortRef};
use crate::scenario::port::{Port, PortCategory, PortDirection};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

pub struct Scenario {
    blocks: Vec<Option<Box<dyn Block>>>,
    connections: Vec<Option<Connection>>,
    port_index: HashMap<PortRef, Vec<ConnectionId>>,
    events: EventBus,
    last_rejection: Option<ConnectionRejection>,
    running: bool,
    /// Process-unique; changes whenever block ids may have been reassigned.
    generation: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            connections: Vec::new(),
            port_index: HashMap::new(),
            events: EventBus::new(),
            last_rejection: None,
            running: false,
            generation: next_generation(),
        }
    }
}

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifies this graph and its id assignment. Clones and reloads get
    /// a fresh value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Observation ──

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<ScenarioEvent> {
        self.events.subscribe()
    }

    /// True while a runner is walking this graph.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    // ── Blocks ──

    /// Add a block. Returns its BlockId.
    pub fn add_block(&mut self, block: Box<dyn Block>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        tracing::info!("Added block {:?} of kind {}", id, block.kind());
        self.blocks.push(Some(block));
        self.events.publish(ScenarioEvent::BlockAdded(id));
        self.sync_block(id);
        id
    }

    /// Create a block of `kind` with its default configuration and add it.
    pub fn add_block_of_kind(&mut self, kind: BlockKind) -> BlockId {
        self.add_block(kind.create())
    }

    /// Remove a block and every connection attached to its ports.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Box<dyn Block>> {
        if self.block(id).is_none() {
            return Err(ScenarioError::UnknownBlock(id));
        }
        if self.running {
            return Err(ScenarioError::BlockInUse(id));
        }

        let attached: Vec<ConnectionId> = self
            .connections()
            .filter(|c| c.source.block == id || c.target.block == id)
            .map(|c| c.id)
            .collect();
        for connection in attached {
            self.remove_connection(connection);
        }

        let block = self.blocks[id.index()]
            .take()
            .ok_or(ScenarioError::UnknownBlock(id))?;
        self.events.publish(ScenarioEvent::BlockRemoved(id));
        tracing::info!("Removed block {:?}", id);
        Ok(block)
    }

    /// Take over the blocks and connections of `other`, keeping this graph's
    /// subscribers. Observers see the old content removed and the new added.
    pub(crate) fn replace_with(&mut self, other: Scenario) {
        let old_blocks: Vec<BlockId> = self.block_ids().collect();
        let old_connections: Vec<ConnectionId> = self.connections().map(|c| c.id).collect();

        self.blocks = other.blocks;
        self.connections = other.connections;
        self.port_index = other.port_index;
        self.last_rejection = None;
        self.generation = next_generation();

        for id in old_connections {
            self.events.publish(ScenarioEvent::ConnectionRemoved(id));
        }
        for id in old_blocks {
            self.events.publish(ScenarioEvent::BlockRemoved(id));
        }
        let new_blocks: Vec<BlockId> = self.block_ids().collect();
        for id in new_blocks {
            self.events.publish(ScenarioEvent::BlockAdded(id));
        }
        let new_connections: Vec<ConnectionId> = self.connections().map(|c| c.id).collect();
        for id in new_connections {
            self.events.publish(ScenarioEvent::ConnectionAdded(id));
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&dyn Block> {
        self.blocks.get(id.index())?.as_deref()
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Option<&mut (dyn Block + 'static)> {
        self.blocks.get_mut(id.index())?.as_deref_mut()
    }

    /// Mutate a block, then reconcile its connections and publish whatever
    /// changed.
    pub fn update_block<R>(&mut self, id: BlockId, f: impl FnOnce(&mut dyn Block) -> R) -> Option<R> {
        let result = f(self.block_mut(id)?);
        self.sync_block(id);
        Some(result)
    }

    /// Run the parameter exchange protocol on a block. Returns the tree as
    /// the block stored it; field states describe any validation problem.
    pub fn configure_block(&mut self, id: BlockId, params: ConfigParam) -> Result<ConfigParam> {
        self.update_block(id, |block| apply_params(block, params))
            .ok_or(ScenarioError::UnknownBlock(id))
    }

    pub fn set_block_position(&mut self, id: BlockId, position: Point) -> bool {
        self.update_block(id, |block| block.core_mut().set_position(position))
            .is_some()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| BlockId(index as u32))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &dyn Block)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((BlockId(index as u32), slot.as_deref()?)))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn port(&self, port: &PortRef) -> Option<&Port> {
        self.block(port.block)?.core().port(&port.port)
    }

    /// Publish pending change flags of one block and drop connections whose
    /// ports disappeared.
    pub(crate) fn sync_block(&mut self, id: BlockId) {
        let Some(block) = self.block_mut(id) else {
            return;
        };
        let changes = block.core_mut().take_changes();

        if changes.ports {
            let stale: Vec<ConnectionId> = self
                .connections()
                .filter(|c| {
                    (c.source.block == id || c.target.block == id)
                        && (self.port(&c.source).is_none() || self.port(&c.target).is_none())
                })
                .map(|c| c.id)
                .collect();
            for connection in stale {
                tracing::debug!("Dropping {:?} after ports of {:?} changed", connection, id);
                self.remove_connection(connection);
            }
            self.events.publish(ScenarioEvent::PortsChanged(id));
        }
        if changes.appearance {
            self.events.publish(ScenarioEvent::AppearanceChanged(id));
        }
        if changes.state {
            self.events.publish(ScenarioEvent::StateChanged(id));
        }
    }

    // ── Connections ──

    /// Link `source` (an output) to `target` (an input). Returns false and
    /// records the reason in `last_rejection()` when the link is illegal;
    /// nothing is mutated in that case.
    pub fn add_connection(&mut self, source: PortRef, target: PortRef) -> bool {
        self.connect(source, target).is_ok()
    }

    /// Like `add_connection`, returning the new id or the rejection reason.
    pub fn connect(
        &mut self,
        source: PortRef,
        target: PortRef,
    ) -> std::result::Result<ConnectionId, ConnectionRejection> {
        if let Err(rejection) = self.check_connection(&source, &target) {
            tracing::debug!("Rejected connection {} -> {}: {}", source, target, rejection);
            self.last_rejection = Some(rejection.clone());
            return Err(rejection);
        }

        let id = ConnectionId(self.connections.len() as u32);
        self.port_index.entry(source.clone()).or_default().push(id);
        self.port_index.entry(target.clone()).or_default().push(id);
        tracing::info!("Added connection {:?}: {} -> {}", id, source, target);
        self.connections.push(Some(Connection {
            id,
            source,
            target,
            routing_hint: None,
        }));
        self.last_rejection = None;
        self.events.publish(ScenarioEvent::ConnectionAdded(id));
        Ok(id)
    }

    /// Reason the most recent connection attempt failed, if it did.
    pub fn last_rejection(&self) -> Option<&ConnectionRejection> {
        self.last_rejection.as_ref()
    }

    /// Check a prospective connection against every invariant.
    pub fn check_connection(
        &self,
        source: &PortRef,
        target: &PortRef,
    ) -> std::result::Result<(), ConnectionRejection> {
        let source_port = self
            .port(source)
            .ok_or_else(|| ConnectionRejection::UnknownPort(source.clone()))?;
        let target_port = self
            .port(target)
            .ok_or_else(|| ConnectionRejection::UnknownPort(target.clone()))?;

        if source.block == target.block {
            return Err(ConnectionRejection::SameBlock);
        }
        if source_port.category() != target_port.category() {
            return Err(ConnectionRejection::CategoryMismatch);
        }
        if source_port.direction() != PortDirection::Output
            || target_port.direction() != PortDirection::Input
        {
            return Err(ConnectionRejection::WrongDirection);
        }
        if self.connection_between(source, target).is_some() {
            return Err(ConnectionRejection::Duplicate);
        }

        let source_taken = !self.connections_at(source).is_empty();
        let target_taken = !self.connections_at(target).is_empty();
        match source_port.category() {
            PortCategory::Flow if source_taken => {
                Err(ConnectionRejection::PortOccupied(source.clone()))
            }
            PortCategory::Data if target_taken => {
                Err(ConnectionRejection::PortOccupied(target.clone()))
            }
            PortCategory::Connection if source_taken => {
                Err(ConnectionRejection::PortOccupied(source.clone()))
            }
            PortCategory::Connection if target_taken => {
                Err(ConnectionRejection::PortOccupied(target.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.get_mut(id.index()).and_then(Option::take) else {
            return false;
        };

        for port in [&connection.source, &connection.target] {
            if let Some(ids) = self.port_index.get_mut(port) {
                ids.retain(|c| *c != id);
                if ids.is_empty() {
                    self.port_index.remove(port);
                }
            }
        }

        self.events.publish(ScenarioEvent::ConnectionRemoved(id));
        tracing::info!("Removed connection {:?}", id);
        true
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.index())?.as_ref()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().flatten()
    }

    pub fn connection_count(&self) -> usize {
        self.connections().count()
    }

    /// Connections attached to `port`, as source or target.
    pub fn connections_at(&self, port: &PortRef) -> &[ConnectionId] {
        self.port_index.get(port).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn connection_between(&self, source: &PortRef, target: &PortRef) -> Option<ConnectionId> {
        self.connections_at(source)
            .iter()
            .copied()
            .find(|id| self.connection(*id).is_some_and(|c| &c.target == target))
    }

    /// The connection leaving output `port`, if exactly one does.
    pub fn outgoing(&self, port: &PortRef) -> Option<&Connection> {
        self.connections_at(port)
            .iter()
            .filter_map(|id| self.connection(*id))
            .find(|c| &c.source == port)
    }

    /// The connection feeding input `port`, if any.
    pub fn incoming(&self, port: &PortRef) -> Option<&Connection> {
        self.connections_at(port)
            .iter()
            .filter_map(|id| self.connection(*id))
            .find(|c| &c.target == port)
    }

    pub fn set_routing_hint(&mut self, id: ConnectionId, hint: Option<Point>) -> bool {
        match self.connections.get_mut(id.index()).and_then(Option::as_mut) {
            Some(connection) => {
                connection.routing_hint = hint;
                true
            }
            None => false,
        }
    }

    // ── Validity ──

    /// The single Flow Start block a run enters through.
    pub fn entry_point(&self) -> std::result::Result<BlockId, RunError> {
        let starts: Vec<BlockId> = self
            .blocks()
            .filter(|(_, block)| block.kind() == BlockKind::FlowStart)
            .map(|(id, _)| id)
            .collect();
        match starts.as_slice() {
            [] => Err(RunError::NoEntryPoint),
            [only] => Ok(*only),
            many => Err(RunError::MultipleEntryPoints(many.len())),
        }
    }

    /// Check the entry point and that every connection refers to live ports.
    pub fn validate(&self) -> Result<()> {
        self.entry_point()?;
        for connection in self.connections() {
            for port in [&connection.source, &connection.target] {
                if self.port(port).is_none() {
                    return Err(ScenarioError::Corrupt(format!(
                        "{:?} refers to missing port {}",
                        connection.id, port
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Deep copy: blocks are cloned through `clone_block`, connection ids and
/// topology are preserved. The copy starts with no subscribers.
impl Clone for Scenario {
    fn clone(&self) -> Self {
        Self {
            blocks: self
                .blocks
                .iter()
                .map(|slot| slot.as_ref().map(|block| block.clone_block()))
                .collect(),
            connections: self.connections.clone(),
            port_index: self.port_index.clone(),
            events: EventBus::new(),
            last_rejection: None,
            running: false,
            generation: next_generation(),
        }
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("blocks", &self.block_count())
            .field("connections", &self.connection_count())
            .field("running", &self.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamType;
    use proptest::prelude::*;

    fn port(block: BlockId, name: &str) -> PortRef {
        PortRef::new(block, name)
    }

    fn start_loop_end() -> (Scenario, BlockId, BlockId, BlockId) {
        let mut scenario = Scenario::new();
        let start = scenario.add_block_of_kind(BlockKind::FlowStart);
        let lp = scenario.add_block_of_kind(BlockKind::Loop);
        let end = scenario.add_block_of_kind(BlockKind::FlowEnd);
        (scenario, start, lp, end)
    }

    #[test]
    fn test_flow_output_single_connection() {
        let (mut scenario, start, lp, end) = start_loop_end();
        assert!(scenario.add_connection(port(start, "flowOut"), port(lp, "flowIn")));
        assert!(!scenario.add_connection(port(start, "flowOut"), port(end, "flowIn")));
        assert_eq!(
            scenario.last_rejection(),
            Some(&ConnectionRejection::PortOccupied(port(start, "flowOut")))
        );
        assert_eq!(scenario.connection_count(), 1);
    }

    #[test]
    fn test_flow_input_accepts_many() {
        let (mut scenario, start, lp, _) = start_loop_end();
        assert!(scenario.add_connection(port(start, "flowOut"), port(lp, "flowIn")));
        let merge = scenario.add_block_of_kind(BlockKind::FlowMerge);
        assert!(scenario.add_connection(port(lp, "flowOutDone"), port(merge, "flowIn1")));
        assert!(scenario.add_connection(port(lp, "flowOutRepeat"), port(merge, "flowIn2")));
        let end = scenario.add_block_of_kind(BlockKind::FlowEnd);
        let other = scenario.add_block_of_kind(BlockKind::Delay);
        assert!(scenario.add_connection(port(merge, "flowOut"), port(end, "flowIn")));
        assert!(scenario.add_connection(port(other, "flowOut"), port(end, "flowIn")));
        assert_eq!(scenario.connections_at(&port(end, "flowIn")).len(), 2);
    }

    #[test]
    fn test_data_input_single_producer_fan_out_allowed() {
        let mut scenario = Scenario::new();
        let a = scenario.add_block_of_kind(BlockKind::ConstantValue);
        let b = scenario.add_block_of_kind(BlockKind::ConstantValue);
        let log1 = scenario.add_block_of_kind(BlockKind::Log);
        let log2 = scenario.add_block_of_kind(BlockKind::Log);

        assert!(scenario.add_connection(port(a, "dataOut"), port(log1, "dataIn")));
        assert!(scenario.add_connection(port(a, "dataOut"), port(log2, "dataIn")));
        assert!(!scenario.add_connection(port(b, "dataOut"), port(log1, "dataIn")));
        assert_eq!(
            scenario.last_rejection(),
            Some(&ConnectionRejection::PortOccupied(port(log1, "dataIn")))
        );
    }

    #[test]
    fn test_rejections() {
        let (mut scenario, start, lp, end) = start_loop_end();
        let constant = scenario.add_block_of_kind(BlockKind::ConstantValue);
        let log = scenario.add_block_of_kind(BlockKind::Log);

        let cases = [
            (
                port(start, "nope"),
                port(lp, "flowIn"),
                ConnectionRejection::UnknownPort(port(start, "nope")),
            ),
            (port(lp, "flowOutDone"), port(lp, "flowIn"), ConnectionRejection::SameBlock),
            (
                port(constant, "dataOut"),
                port(end, "flowIn"),
                ConnectionRejection::CategoryMismatch,
            ),
            (
                port(end, "flowIn"),
                port(start, "flowOut"),
                ConnectionRejection::WrongDirection,
            ),
            (port(log, "dataIn"), port(log, "dataIn"), ConnectionRejection::SameBlock),
        ];
        for (source, target, expected) in cases {
            assert!(!scenario.add_connection(source, target));
            assert_eq!(scenario.last_rejection(), Some(&expected));
        }
        assert_eq!(scenario.connection_count(), 0);
        assert!(scenario.connections_at(&port(lp, "flowIn")).is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut scenario = Scenario::new();
        let constant = scenario.add_block_of_kind(BlockKind::ConstantValue);
        let log = scenario.add_block_of_kind(BlockKind::Log);
        assert!(scenario.add_connection(port(constant, "dataOut"), port(log, "dataIn")));
        assert!(!scenario.add_connection(port(constant, "dataOut"), port(log, "dataIn")));
        assert_eq!(scenario.last_rejection(), Some(&ConnectionRejection::Duplicate));
    }

    #[test]
    fn test_remove_block_cascades() {
        let (mut scenario, start, lp, end) = start_loop_end();
        scenario.add_connection(port(start, "flowOut"), port(lp, "flowIn"));
        scenario.add_connection(port(lp, "flowOutDone"), port(end, "flowIn"));
        let events = scenario.subscribe();

        let removed = scenario.remove_block(lp).unwrap();
        assert_eq!(removed.kind(), BlockKind::Loop);
        assert_eq!(scenario.connection_count(), 0);
        assert!(scenario.connections_at(&port(start, "flowOut")).is_empty());
        assert!(scenario.connections_at(&port(end, "flowIn")).is_empty());
        assert!(scenario.block(lp).is_none());
        assert_eq!(scenario.block_count(), 2);

        let received: Vec<ScenarioEvent> = events.try_iter().collect();
        assert_eq!(received.last(), Some(&ScenarioEvent::BlockRemoved(lp)));
        assert_eq!(
            received
                .iter()
                .filter(|e| matches!(e, ScenarioEvent::ConnectionRemoved(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_self_loop_rejected_as_same_block() {
        let (mut scenario, _, lp, _) = start_loop_end();
        assert!(!scenario.add_connection(port(lp, "flowOutRepeat"), port(lp, "flowIn")));
    }

    #[test]
    fn test_remove_block_in_use() {
        let (mut scenario, start, _, _) = start_loop_end();
        scenario.set_running(true);
        assert!(matches!(
            scenario.remove_block(start),
            Err(ScenarioError::BlockInUse(_))
        ));
        scenario.set_running(false);
        assert!(scenario.remove_block(start).is_ok());
        assert!(matches!(
            scenario.remove_block(start),
            Err(ScenarioError::UnknownBlock(_))
        ));
    }

    #[test]
    fn test_remove_connection_twice() {
        let (mut scenario, start, lp, _) = start_loop_end();
        let id = scenario
            .connect(port(start, "flowOut"), port(lp, "flowIn"))
            .unwrap();
        assert!(scenario.remove_connection(id));
        assert!(!scenario.remove_connection(id));
        assert!(scenario.add_connection(port(start, "flowOut"), port(lp, "flowIn")));
    }

    #[test]
    fn test_port_removal_drops_connections() {
        let mut scenario = Scenario::new();
        let start = scenario.add_block_of_kind(BlockKind::FlowStart);
        let merge = scenario.add_block_of_kind(BlockKind::FlowMerge);

        let mut params = scenario.block(merge).unwrap().params().clone();
        params.sub_mut("Input count").unwrap().set_value("4").unwrap();
        scenario.configure_block(merge, params).unwrap();
        assert!(scenario.add_connection(port(start, "flowOut"), port(merge, "flowIn4")));

        let events = scenario.subscribe();
        let mut params = scenario.block(merge).unwrap().params().clone();
        params.sub_mut("Input count").unwrap().set_value("2").unwrap();
        scenario.configure_block(merge, params).unwrap();

        assert_eq!(scenario.connection_count(), 0);
        assert!(scenario.port(&port(merge, "flowIn4")).is_none());
        let received: Vec<ScenarioEvent> = events.try_iter().collect();
        assert!(received.contains(&ScenarioEvent::PortsChanged(merge)));
        assert!(received.contains(&ScenarioEvent::ConnectionRemoved(ConnectionId(0))));
    }

    #[test]
    fn test_entry_point_validation() {
        let mut scenario = Scenario::new();
        assert_eq!(scenario.entry_point(), Err(RunError::NoEntryPoint));
        let start = scenario.add_block_of_kind(BlockKind::FlowStart);
        assert_eq!(scenario.entry_point(), Ok(start));
        scenario.add_block_of_kind(BlockKind::FlowStart);
        assert_eq!(scenario.entry_point(), Err(RunError::MultipleEntryPoints(2)));
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_clone_is_deep() {
        let (mut scenario, start, lp, end) = start_loop_end();
        scenario.add_connection(port(start, "flowOut"), port(lp, "flowIn"));
        scenario.add_connection(port(lp, "flowOutDone"), port(end, "flowIn"));

        let mut copy = scenario.clone();
        assert_eq!(copy.block_count(), 3);
        assert_eq!(copy.connection_count(), 2);
        assert!(copy.outgoing(&port(lp, "flowOutDone")).is_some());

        copy.remove_block(end).unwrap();
        let mut params = copy.block(lp).unwrap().params().clone();
        params.sub_mut("Block name").unwrap().set_value("Outer").unwrap();
        copy.configure_block(lp, params).unwrap();

        assert_eq!(scenario.block_count(), 3);
        assert_eq!(scenario.connection_count(), 2);
        assert_eq!(scenario.block(lp).unwrap().core().title(), "Loop");
    }

    #[test]
    fn test_configure_publishes_changes() {
        let mut scenario = Scenario::new();
        let constant = scenario.add_block_of_kind(BlockKind::ConstantValue);
        let events = scenario.subscribe();

        let mut params = scenario.block(constant).unwrap().params().clone();
        params.sub_mut("Data type").unwrap().set_value("integer").unwrap();
        params.sub_mut("Value").unwrap().set_value("7").unwrap();
        let stored = scenario.configure_block(constant, params).unwrap();
        assert_eq!(stored.sub("Value").unwrap().param_type(), ParamType::Int);

        let received: Vec<ScenarioEvent> = events.try_iter().collect();
        assert!(received.contains(&ScenarioEvent::AppearanceChanged(constant)));
        assert!(received.contains(&ScenarioEvent::StateChanged(constant)));
        assert!(matches!(
            scenario.configure_block(BlockId(99), ConfigParam::group("x")),
            Err(ScenarioError::UnknownBlock(_))
        ));
    }

    /// Every port of a small mixed graph, for random connection attempts.
    fn all_ports(scenario: &Scenario) -> Vec<PortRef> {
        scenario
            .blocks()
            .flat_map(|(id, block)| {
                block
                    .core()
                    .ports()
                    .iter()
                    .map(move |p| PortRef::new(id, p.name()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn mixed_scenario() -> Scenario {
        let mut scenario = Scenario::new();
        for kind in [
            BlockKind::FlowStart,
            BlockKind::Loop,
            BlockKind::Condition,
            BlockKind::FlowMerge,
            BlockKind::ConstantValue,
            BlockKind::ConstantValue,
            BlockKind::Log,
            BlockKind::Log,
            BlockKind::FlowEnd,
        ] {
            scenario.add_block_of_kind(kind);
        }
        scenario
    }

    proptest! {
        #[test]
        fn test_multiplicity_holds_under_random_edits(
            attempts in prop::collection::vec((0usize..64, 0usize..64), 1..80)
        ) {
            let mut scenario = mixed_scenario();
            let ports = all_ports(&scenario);

            for (a, b) in attempts {
                let source = ports[a % ports.len()].clone();
                let target = ports[b % ports.len()].clone();
                let before = scenario.connection_count();
                let ok = scenario.add_connection(source.clone(), target.clone());

                let s = scenario.port(&source).unwrap().clone();
                let t = scenario.port(&target).unwrap().clone();
                if s.category() != t.category()
                    || s.direction() != PortDirection::Output
                    || t.direction() != PortDirection::Input
                {
                    prop_assert!(!ok);
                    prop_assert_eq!(scenario.connection_count(), before);
                }
            }

            for port_ref in &ports {
                let p = scenario.port(port_ref).unwrap();
                let count = scenario.connections_at(port_ref).len();
                if p.is_flow_output() || p.is_data_input() {
                    prop_assert!(count <= 1, "{} holds {} connections", port_ref, count);
                }
            }
            for connection in scenario.connections() {
                prop_assert_ne!(connection.source.block, connection.target.block);
            }
        }

        #[test]
        fn test_block_removal_leaves_no_dangling(
            attempts in prop::collection::vec((0usize..64, 0usize..64), 1..60),
            victim in 0u32..9
        ) {
            let mut scenario = mixed_scenario();
            let ports = all_ports(&scenario);
            for (a, b) in attempts {
                scenario.add_connection(ports[a % ports.len()].clone(), ports[b % ports.len()].clone());
            }

            let victim = BlockId(victim);
            let untouched = scenario
                .connections()
                .filter(|c| c.source.block != victim && c.target.block != victim)
                .count();
            scenario.remove_block(victim).unwrap();

            prop_assert_eq!(scenario.connection_count(), untouched);
            for connection in scenario.connections() {
                prop_assert!(scenario.port(&connection.source).is_some());
                prop_assert!(scenario.port(&connection.target).is_some());
            }
            for port_ref in ports.iter().filter(|p| p.block == victim) {
                prop_assert!(scenario.connections_at(port_ref).is_empty());
            }
        }
    }
}
