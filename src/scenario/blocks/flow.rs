//! Flow start, end and merge blocks.

use super::params_root;
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{Block, BlockCore, BlockError, PortData};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::port::Port;

/// Unique entry point of a run.
#[derive(Debug, Clone)]
pub struct FlowStartBlock {
    core: BlockCore,
}

impl FlowStartBlock {
    pub fn new() -> Self {
        let kind = BlockKind::FlowStart;
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_port(Port::flow_output("flowOut")),
        }
    }
}

impl Default for FlowStartBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for FlowStartBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::FlowStart
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(self.clone())
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        Ok(PortData::new())
    }
}

/// Terminates the flow path that reaches it.
#[derive(Debug, Clone)]
pub struct FlowEndBlock {
    core: BlockCore,
}

impl FlowEndBlock {
    pub fn new() -> Self {
        let kind = BlockKind::FlowEnd;
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_port(Port::flow_input("flowIn")),
        }
    }
}

impl Default for FlowEndBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for FlowEndBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::FlowEnd
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(self.clone())
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        Ok(PortData::new())
    }
}

const INPUT_COUNT_PARAM: &str = "Input count";
const MIN_INPUTS: u32 = 2;
const MAX_INPUTS: u32 = 5;

/// Rejoins several flow paths into one.
#[derive(Debug, Clone)]
pub struct FlowMergeBlock {
    core: BlockCore,
    input_count: u32,
}

impl FlowMergeBlock {
    pub fn new() -> Self {
        let kind = BlockKind::FlowMerge;
        let params = params_root(kind.display_name()).with_sub(ConfigParam::new(
            INPUT_COUNT_PARAM,
            "2",
            ParamType::UInt,
            "Number of inputs into the block between 2 and 5.",
        ));
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_port(Port::flow_input("flowIn1"))
                .with_port(Port::flow_input("flowIn2"))
                .with_port(Port::flow_output("flowOut").with_description(
                    "The flow from either of the inputs will continue through this port.",
                )),
            input_count: MIN_INPUTS,
        }
    }

    pub fn input_count(&self) -> u32 {
        self.input_count
    }

    fn input_port_name(index: u32) -> String {
        format!("flowIn{}", index)
    }

    /// Add or remove `flowIn3..5` so exactly `count` inputs exist.
    fn resize_inputs(&mut self, count: u32) {
        for index in (MIN_INPUTS + 1)..=MAX_INPUTS {
            let name = Self::input_port_name(index);
            let present = self.core.port(&name).is_some();
            if index <= count && !present {
                self.core.add_port(Port::flow_input(name));
            } else if index > count && present {
                self.core.remove_port(&name);
            }
        }
        self.input_count = count;
    }
}

impl Default for FlowMergeBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for FlowMergeBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::FlowMerge
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(self.clone())
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[INPUT_COUNT_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let mut params = params;
        if !self.validate_params_structure(&params) {
            params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
            return params;
        }

        params.reset_state(true);
        self.core.params = params;

        let count = self
            .core
            .params
            .sub_value(INPUT_COUNT_PARAM)
            .and_then(|v| v.trim().parse::<u32>().ok());
        match count {
            Some(count) if (MIN_INPUTS..=MAX_INPUTS).contains(&count) => {
                if count != self.input_count {
                    self.resize_inputs(count);
                }
            }
            _ => {
                if let Some(field) = self.core.params.sub_mut(INPUT_COUNT_PARAM) {
                    field.set_state(ParamState::Error, "Value has to be between 2 and 5.");
                }
            }
        }

        self.core.params.clone()
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        Ok(PortData::new())
    }
}
