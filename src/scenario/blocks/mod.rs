//! Built-in block kinds.

pub mod condition;
pub mod constant;
pub mod delay;
pub mod flow;
pub mod io_device;
pub mod log;
pub mod loop_block;

pub use condition::ConditionBlock;
pub use constant::ConstantValueBlock;
pub use delay::DelayBlock;
pub use flow::{FlowEndBlock, FlowMergeBlock, FlowStartBlock};
pub use io_device::{IoDeviceReadBlock, IoDeviceWriteBlock};
pub use log::LogBlock;
pub use loop_block::LoopBlock;

use crate::params::{ConfigParam, ParamType};
use crate::scenario::block::BLOCK_NAME_PARAM;

/// Root group every block's parameter tree starts from.
pub(crate) fn params_root(kind_name: &str) -> ConfigParam {
    ConfigParam::group(format!("{} configuration", kind_name))
}

/// The "Block name" field with the given default title.
pub(crate) fn block_name_param(default: &str) -> ConfigParam {
    ConfigParam::new(
        BLOCK_NAME_PARAM,
        default,
        ParamType::String,
        "Display name of the block.",
    )
}
