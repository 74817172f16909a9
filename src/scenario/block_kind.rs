//! Block kind enumeration and factory.
//!
//! Each kind has a stable numeric tag used by persistence, so a saved
//! scenario can be rebuilt without knowing concrete block types up front.

use crate::scenario::block::Block;
use crate::scenario::blocks::{
    ConditionBlock, ConstantValueBlock, DelayBlock, FlowEndBlock, FlowMergeBlock,
    FlowStartBlock, IoDeviceReadBlock, IoDeviceWriteBlock, LogBlock, LoopBlock,
};
use serde::{Deserialize, Serialize};

/// Kinds of blocks that can be placed in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    // Control flow
    FlowStart,
    FlowEnd,
    FlowMerge,
    Condition,
    Loop,

    // Data
    ConstantValue,
    Log,

    // Timing and devices
    Delay,
    IoDeviceRead,
    IoDeviceWrite,
}

impl BlockKind {
    /// Stable tag written to saved scenarios.
    pub fn tag(self) -> u32 {
        match self {
            BlockKind::FlowStart => 1,
            BlockKind::FlowEnd => 2,
            BlockKind::FlowMerge => 3,
            BlockKind::Condition => 4,
            BlockKind::Log => 10,
            BlockKind::IoDeviceRead => 31,
            BlockKind::IoDeviceWrite => 32,
            BlockKind::ConstantValue => 40,
            BlockKind::Loop => 50,
            BlockKind::Delay => 70,
        }
    }

    pub fn from_tag(tag: u32) -> Option<BlockKind> {
        Self::all().iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BlockKind::FlowStart => "Flow start",
            BlockKind::FlowEnd => "Flow end",
            BlockKind::FlowMerge => "Flow merge",
            BlockKind::Condition => "Condition",
            BlockKind::Loop => "Loop",
            BlockKind::ConstantValue => "Constant",
            BlockKind::Log => "Logger",
            BlockKind::Delay => "Delay",
            BlockKind::IoDeviceRead => "IO device read",
            BlockKind::IoDeviceWrite => "IO device write",
        }
    }

    pub fn all() -> &'static [BlockKind] {
        &[
            BlockKind::FlowStart,
            BlockKind::FlowEnd,
            BlockKind::FlowMerge,
            BlockKind::Condition,
            BlockKind::Log,
            BlockKind::IoDeviceRead,
            BlockKind::IoDeviceWrite,
            BlockKind::ConstantValue,
            BlockKind::Loop,
            BlockKind::Delay,
        ]
    }

    /// Whether the block's step runs asynchronously.
    pub fn is_asynchronous(&self) -> bool {
        matches!(
            self,
            BlockKind::Delay | BlockKind::IoDeviceRead | BlockKind::IoDeviceWrite
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            BlockKind::FlowStart => "This block is the start point of the scenario.",
            BlockKind::FlowEnd => "This block is the end point of the scenario.",
            BlockKind::FlowMerge => {
                "This block merges multiple flow paths; e.g. after a condition."
            }
            BlockKind::Condition => "This block directs flow based on a set condition.",
            BlockKind::Loop => "This block represents a loop.",
            BlockKind::ConstantValue => "This block represents a constant value.",
            BlockKind::Log => "This block logs data input to scenario run log.",
            BlockKind::Delay => "This block represents a delay in execution.",
            BlockKind::IoDeviceRead => "This block reads data from an IO device.",
            BlockKind::IoDeviceWrite => "This block writes data to an IO device.",
        }
    }

    /// Construct a block of this kind with its default configuration.
    pub fn create(self) -> Box<dyn Block> {
        match self {
            BlockKind::FlowStart => Box::new(FlowStartBlock::new()),
            BlockKind::FlowEnd => Box::new(FlowEndBlock::new()),
            BlockKind::FlowMerge => Box::new(FlowMergeBlock::new()),
            BlockKind::Condition => Box::new(ConditionBlock::new()),
            BlockKind::Loop => Box::new(LoopBlock::new()),
            BlockKind::ConstantValue => Box::new(ConstantValueBlock::new()),
            BlockKind::Log => Box::new(LogBlock::new()),
            BlockKind::Delay => Box::new(DelayBlock::new()),
            BlockKind::IoDeviceRead => Box::new(IoDeviceReadBlock::new()),
            BlockKind::IoDeviceWrite => Box::new(IoDeviceWriteBlock::new()),
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in BlockKind::all() {
            assert_eq!(BlockKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(BlockKind::from_tag(0), None);
        assert_eq!(BlockKind::from_tag(61), None);
    }

    #[test]
    fn test_factory_builds_matching_kind() {
        for kind in BlockKind::all() {
            let block = kind.create();
            assert_eq!(block.kind(), *kind);
            assert_eq!(block.core().name(), kind.display_name());
            assert_eq!(
                block.supports_immediate_execution(),
                !kind.is_asynchronous(),
                "{kind}"
            );
        }
    }
}
