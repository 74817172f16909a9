//! Logger block: writes its data input to the run log.

use super::params_root;
use crate::params::{ConfigParam, ParamType};
use crate::scenario::block::{Block, BlockCore, BlockError, LogLevel, PortData};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::port::Port;

const FORMAT_PARAM: &str = "Log format";
const FORMAT_STRING: &str = "string";
const FORMAT_HEX: &str = "hex";
const INPUT_PORT: &str = "dataIn";

/// Inputs longer than this are abbreviated to their first and last bytes.
pub const LOG_ENTRY_SIZE_LIMIT: usize = 512;
const ABBREVIATED_EDGE: usize = 5;

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render `data` for the run log in the given format.
pub fn format_entry(data: &[u8], hex: bool) -> String {
    let render = |bytes: &[u8]| {
        if hex {
            to_hex(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    };

    if data.len() > LOG_ENTRY_SIZE_LIMIT {
        format!(
            "{} ... skipping {} bytes ... {} (total length {} bytes)",
            render(&data[..ABBREVIATED_EDGE]),
            data.len() - 2 * ABBREVIATED_EDGE,
            render(&data[data.len() - ABBREVIATED_EDGE..]),
            data.len()
        )
    } else {
        render(data)
    }
}

#[derive(Debug, Clone)]
pub struct LogBlock {
    core: BlockCore,
}

impl LogBlock {
    pub fn new() -> Self {
        let kind = BlockKind::Log;
        let format = ConfigParam::new(
            FORMAT_PARAM,
            FORMAT_STRING,
            ParamType::Enum,
            "Log format - string or hex.",
        )
        .with_enum_values([FORMAT_STRING, FORMAT_HEX]);

        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params_root(kind.display_name()).with_sub(format))
                .with_port(Port::flow_input("flowIn"))
                .with_port(
                    Port::data_input(INPUT_PORT)
                        .with_description(
                            "Data passed through this port will be put into the scenario run log.",
                        )
                        .with_type_hint("[any]"),
                )
                .with_port(Port::flow_output("flowOut")),
        }
    }
}

impl Default for LogBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for LogBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Log
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
        &[FORMAT_PARAM]
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, inputs: &PortData) -> Result<PortData, BlockError> {
        let data = inputs.get(INPUT_PORT).map(Vec::as_slice).unwrap_or_default();
        let hex = self.core.params().sub_value(FORMAT_PARAM) == Some(FORMAT_HEX);
        self.core.log(LogLevel::Info, format_entry(data, hex));
        Ok(PortData::new())
    }
}
