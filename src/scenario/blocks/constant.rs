//! Constant value source.
//!
//! Publishes a typed literal on `dataOut`. Numbers are encoded big-endian
//! at their declared width, `bool` as one byte, `byte array` from hex text
//! and `string` as UTF-8. Changing "Data type" rebuilds the "Value" field
//! with the matching parameter type so the value is re-validated.

use super::{block_name_param, params_root};
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{
    Block, BlockCore, BlockError, BlockState, LogLevel, PortData, BLOCK_NAME_PARAM,
};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::port::Port;

const DATA_TYPE_PARAM: &str = "Data type";
const VALUE_PARAM: &str = "Value";
const VALUE_HINT: &str = "Value of constant.";
pub const OUTPUT_PORT: &str = "dataOut";

/// Binary encoding selected by the "Data type" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantType {
    String,
    ByteArray,
    Integer,
    UnsignedInteger,
    Short,
    UnsignedShort,
    LongLong,
    UnsignedLongLong,
    Real,
    Bool,
}

impl ConstantType {
    const ALL: [ConstantType; 10] = [
        ConstantType::String,
        ConstantType::ByteArray,
        ConstantType::Integer,
        ConstantType::UnsignedInteger,
        ConstantType::Short,
        ConstantType::UnsignedShort,
        ConstantType::LongLong,
        ConstantType::UnsignedLongLong,
        ConstantType::Real,
        ConstantType::Bool,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConstantType::String => "string",
            ConstantType::ByteArray => "byte array",
            ConstantType::Integer => "integer",
            ConstantType::UnsignedInteger => "unsigned integer",
            ConstantType::Short => "short",
            ConstantType::UnsignedShort => "unsigned short",
            ConstantType::LongLong => "long long",
            ConstantType::UnsignedLongLong => "unsigned long long",
            ConstantType::Real => "real",
            ConstantType::Bool => "bool",
        }
    }

    pub fn from_label(label: &str) -> Option<ConstantType> {
        Self::ALL.iter().copied().find(|t| t.label() == label)
    }

    /// Parameter type the "Value" field takes for this encoding.
    pub fn param_type(self) -> ParamType {
        match self {
            ConstantType::String | ConstantType::ByteArray => ParamType::String,
            ConstantType::Integer => ParamType::Int,
            ConstantType::UnsignedInteger => ParamType::UInt,
            ConstantType::Short => ParamType::Short,
            ConstantType::UnsignedShort => ParamType::UShort,
            ConstantType::LongLong => ParamType::LongLong,
            ConstantType::UnsignedLongLong => ParamType::ULongLong,
            ConstantType::Real => ParamType::Real,
            ConstantType::Bool => ParamType::Bool,
        }
    }

    /// Encode `text` to bytes; `None` when the text does not parse.
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        let trimmed = text.trim();
        let bytes = match self {
            ConstantType::String => text.as_bytes().to_vec(),
            ConstantType::ByteArray => decode_hex(text)?,
            ConstantType::Integer => trimmed.parse::<i32>().ok()?.to_be_bytes().to_vec(),
            ConstantType::UnsignedInteger => trimmed.parse::<u32>().ok()?.to_be_bytes().to_vec(),
            ConstantType::Short => trimmed.parse::<i16>().ok()?.to_be_bytes().to_vec(),
            ConstantType::UnsignedShort => trimmed.parse::<u16>().ok()?.to_be_bytes().to_vec(),
            ConstantType::LongLong => trimmed.parse::<i64>().ok()?.to_be_bytes().to_vec(),
            ConstantType::UnsignedLongLong => trimmed.parse::<u64>().ok()?.to_be_bytes().to_vec(),
            ConstantType::Real => trimmed.parse::<f64>().ok()?.to_be_bytes().to_vec(),
            ConstantType::Bool => match text {
                "true" => vec![1],
                "false" => vec![0],
                _ => return None,
            },
        };
        Some(bytes)
    }
}

/// Decode hex text, ignoring whitespace. Rejects odd digit counts.
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    if digits.len() % 2 != 0 {
        return None;
    }
    Some(digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

#[derive(Debug, Clone)]
pub struct ConstantValueBlock {
    core: BlockCore,
}

impl ConstantValueBlock {
    pub fn new() -> Self {
        let kind = BlockKind::ConstantValue;
        let data_type = ConfigParam::new(
            DATA_TYPE_PARAM,
            ConstantType::String.label(),
            ParamType::Enum,
            "Data type of constant value.",
        )
        .with_enum_values(ConstantType::ALL.iter().map(|t| t.label()));

        let params = params_root(kind.display_name())
            .with_sub(block_name_param("Constant"))
            .with_sub(data_type)
            .with_sub(ConfigParam::new(
                VALUE_PARAM,
                "Hello, world!",
                ParamType::String,
                VALUE_HINT,
            ));

        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_subtitle("Hello, world!")
                .with_port(Port::data_output(OUTPUT_PORT)),
        }
    }

    pub fn constant_type(&self) -> Option<ConstantType> {
        self.core
            .params()
            .sub_value(DATA_TYPE_PARAM)
            .and_then(ConstantType::from_label)
    }
}

impl Default for ConstantValueBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for ConstantValueBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::ConstantValue
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
        &[BLOCK_NAME_PARAM, DATA_TYPE_PARAM, VALUE_PARAM]
    }

    fn should_update_params(&self, new_params: &ConfigParam) -> bool {
        ConfigParam::value_differs(new_params, self.core.params(), DATA_TYPE_PARAM)
    }

    fn update_params(&mut self, _values_changed: bool) {
        let param_type = self
            .constant_type()
            .map(ConstantType::param_type)
            .unwrap_or(ParamType::String);
        let params = &mut self.core.params;
        let old_value = params
            .remove_sub(VALUE_PARAM)
            .map(|p| p.value().to_string())
            .unwrap_or_default();

        // The default is the old text; validity is checked on the next set_params.
        let mut value = ConfigParam::new(VALUE_PARAM, "", param_type, VALUE_HINT);
        value.force_value(old_value);
        params.add_sub(value);
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

        let constant_type = self.constant_type();
        let mut subtitle = String::new();
        if let Some(value) = self.core.params.sub_mut(VALUE_PARAM) {
            let text = value.value().to_string();
            if value.check_value(&text).is_err() {
                value.set_state(ParamState::Error, "Invalid value.");
            } else if constant_type == Some(ConstantType::ByteArray)
                && decode_hex(&text).is_none()
            {
                value.set_state(
                    ParamState::Error,
                    "Invalid value: non-hex characters present.",
                );
            }
            subtitle = if constant_type == Some(ConstantType::ByteArray) {
                format!("0x{}", text)
            } else {
                text
            };
        }
        self.core.set_subtitle(subtitle);

        self.core.params.clone()
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, _inputs: &PortData) -> Result<PortData, BlockError> {
        let mut outputs = PortData::new();
        let text = self.core.params().sub_value(VALUE_PARAM).unwrap_or_default();

        match self.constant_type().and_then(|t| t.encode(text)) {
            Some(bytes) => {
                outputs.insert(OUTPUT_PORT.to_string(), bytes);
            }
            None => {
                let message = format!("Value '{}' does not match the configured data type", text);
                self.core.log(LogLevel::Warning, &message);
                self.core.set_state(BlockState::RuntimeWarning, message);
            }
        }

        Ok(outputs)
    }
}
