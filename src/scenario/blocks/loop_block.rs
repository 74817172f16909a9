//! Counting loop block.
//!
//! `prepare()` arms the countdown at N+1 so the first visit decrements into
//! iteration #1. Each visit then decrements; the visit that finds the
//! countdown already at zero resets it to N, which lets a loop nested in an
//! outer loop run its N iterations again on every re-entry.

use super::{block_name_param, params_root};
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{
    Block, BlockCore, BlockError, LogLevel, PortData, PrepareContext, BLOCK_NAME_PARAM,
};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::port::Port;

const ITERATIONS_PARAM: &str = "Number of iterations";
const PORT_DONE: &str = "flowOutDone";
const PORT_REPEAT: &str = "flowOutRepeat";

#[derive(Debug, Clone)]
pub struct LoopBlock {
    core: BlockCore,
    total_iterations: u64,
    iterations_left: u64,
}

impl LoopBlock {
    pub fn new() -> Self {
        let kind = BlockKind::Loop;
        let params = params_root(kind.display_name())
            .with_sub(block_name_param("Loop"))
            .with_sub(ConfigParam::new(
                ITERATIONS_PARAM,
                "3",
                ParamType::ULongLong,
                "Number of times the repeat flow output will be activated.",
            ));
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_subtitle("3 iterations")
                .with_port(Port::flow_input("flowIn"))
                .with_port(Port::flow_output(PORT_DONE).with_label("done").with_description(
                    "After the final iteration, flow will continue through this port.",
                ))
                .with_port(
                    Port::flow_output(PORT_REPEAT)
                        .with_label("repeat")
                        .with_description(
                            "Flow will continue through this port at the start of every iteration.",
                        ),
                ),
            total_iterations: 0,
            iterations_left: 0,
        }
    }

    pub fn iterations_left(&self) -> u64 {
        self.iterations_left
    }

    fn configured_subtitle(&self) -> String {
        format!(
            "{} iterations",
            self.core.params().sub_value(ITERATIONS_PARAM).unwrap_or("?")
        )
    }
}

impl Default for LoopBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for LoopBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Loop
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
        &[BLOCK_NAME_PARAM, ITERATIONS_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let mut params = params;
        if !self.validate_params_structure(&params) {
            params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
            return params;
        }

        params.reset_state(true);
        self.core.params = params;
        self.core.apply_block_name();
        let subtitle = self.configured_subtitle();
        self.core.set_subtitle(subtitle);
        self.core.params.clone()
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> bool {
        let parsed = self
            .core
            .params()
            .sub_value(ITERATIONS_PARAM)
            .and_then(|v| v.trim().parse::<u64>().ok());

        match parsed {
            Some(total) => {
                self.total_iterations = total;
                self.iterations_left = total.saturating_add(1);
                true
            }
            None => {
                self.core.log(LogLevel::Error, "Invalid number of iterations");
                false
            }
        }
    }

    fn cleanup(&mut self) -> bool {
        let subtitle = self.configured_subtitle();
        self.core.set_subtitle(subtitle);
        true
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        if self.iterations_left == 0 {
            self.iterations_left = self.total_iterations;
        } else {
            self.iterations_left -= 1;
        }

        if self.iterations_left > 0 {
            let iteration = self.total_iterations - self.iterations_left + 1;
            self.core
                .log(LogLevel::Info, format!("Starting iteration #{}", iteration));
            self.core.set_subtitle(format!(
                "Iteration {} of {}",
                iteration, self.total_iterations
            ));
        } else {
            self.core.log(LogLevel::Info, "Loop done");
            self.core.set_subtitle("Loop done");
        }

        Ok(PortData::new())
    }

    fn preferred_output_flow_port(&self) -> Option<&str> {
        if self.iterations_left == 0 {
            Some(PORT_DONE)
        } else {
            Some(PORT_REPEAT)
        }
    }
}
