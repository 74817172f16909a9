//! Hierarchical parameter tree owned by each block.
//!
//! A `ConfigParam` is a named, typed field whose value is kept as text and
//! validated against its type on every `set_value`. Fields nest: a block's
//! parameter object is a `Group` whose sub-params are the editable fields.
//!
//! Validation problems never surface as `Err` from the block API; they are
//! recorded in the field's `state` and folded into the block status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value type of a parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Int,
    UInt,
    Short,
    UShort,
    LongLong,
    ULongLong,
    Real,
    Bool,
    /// Container with no value of its own.
    Group,
    Enum,
}

/// Validation state of a parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ParamState {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
}

/// Reasons a value is refused by a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("Parameter '{0}' is read-only")]
    Readonly(String),

    #[error("Parameter '{name}' rejects value '{value}': expected {expected}")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("Parameter '{0}' is a group and has no value")]
    NoValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParam {
    name: String,
    value: String,
    default_value: String,
    param_type: ParamType,
    hint: String,
    readonly: bool,
    #[serde(default)]
    enum_values: Vec<String>,
    #[serde(default)]
    state: ParamState,
    #[serde(default)]
    state_message: String,
    #[serde(default)]
    sub_params: Vec<ConfigParam>,
}

impl ConfigParam {
    pub fn new(
        name: impl Into<String>,
        default_value: impl Into<String>,
        param_type: ParamType,
        hint: impl Into<String>,
    ) -> Self {
        let default_value = default_value.into();
        Self {
            name: name.into(),
            value: default_value.clone(),
            default_value,
            param_type,
            hint: hint.into(),
            readonly: false,
            enum_values: Vec::new(),
            state: ParamState::Ok,
            state_message: String::new(),
            sub_params: Vec::new(),
        }
    }

    /// Root container for a block's fields.
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, "", ParamType::Group, "")
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_enum_value(value);
        }
        self
    }

    pub fn with_sub(mut self, param: ConfigParam) -> Self {
        self.add_sub(param);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn enum_values(&self) -> &[String] {
        &self.enum_values
    }

    pub fn state(&self) -> ParamState {
        self.state
    }

    pub fn state_message(&self) -> &str {
        &self.state_message
    }

    pub fn sub_params(&self) -> &[ConfigParam] {
        &self.sub_params
    }

    /// Check `value` against this field's type without storing it.
    pub fn check_value(&self, value: &str) -> Result<(), ParamError> {
        if self.readonly {
            return Err(ParamError::Readonly(self.name.clone()));
        }

        let expected = match self.param_type {
            ParamType::String => return Ok(()),
            ParamType::Group => return Err(ParamError::NoValue(self.name.clone())),
            ParamType::Int => value.trim().parse::<i32>().map(|_| ()).map_err(|_| "int"),
            ParamType::UInt => value.trim().parse::<u32>().map(|_| ()).map_err(|_| "uint"),
            ParamType::Short => value.trim().parse::<i16>().map(|_| ()).map_err(|_| "short"),
            ParamType::UShort => value.trim().parse::<u16>().map(|_| ()).map_err(|_| "ushort"),
            ParamType::LongLong => value.trim().parse::<i64>().map(|_| ()).map_err(|_| "longlong"),
            ParamType::ULongLong => value
                .trim()
                .parse::<u64>()
                .map(|_| ())
                .map_err(|_| "ulonglong"),
            ParamType::Real => value.trim().parse::<f64>().map(|_| ()).map_err(|_| "real"),
            ParamType::Bool => match value {
                "true" | "false" => Ok(()),
                _ => Err("'true' or 'false'"),
            },
            ParamType::Enum => {
                if self.enum_values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err("one of the enumerated values")
                }
            }
        };

        expected.map_err(|expected| ParamError::InvalidValue {
            name: self.name.clone(),
            value: value.to_string(),
            expected,
        })
    }

    /// Validate and store a new value. On rejection the old value is kept.
    pub fn set_value(&mut self, value: impl Into<String>) -> Result<(), ParamError> {
        let value = value.into();
        self.check_value(&value)?;
        self.value = value;
        Ok(())
    }

    /// Store a value without validation; used when restoring a tree whose
    /// field type is about to be rebuilt.
    pub(crate) fn force_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn add_enum_value(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.param_type != ParamType::Enum || self.enum_values.contains(&value) {
            return false;
        }
        self.enum_values.push(value);
        true
    }

    pub fn set_state(&mut self, state: ParamState, message: impl Into<String>) {
        self.state = state;
        self.state_message = message.into();
    }

    /// Reset this field (and optionally every descendant) to `Ok`.
    pub fn reset_state(&mut self, recursive: bool) {
        self.state = ParamState::Ok;
        self.state_message.clear();
        if recursive {
            for sub in &mut self.sub_params {
                sub.reset_state(true);
            }
        }
    }

    /// Add a sub-param; refuses a second field with the same name.
    pub fn add_sub(&mut self, param: ConfigParam) -> bool {
        if self.sub(&param.name).is_some() {
            return false;
        }
        self.sub_params.push(param);
        true
    }

    pub fn remove_sub(&mut self, name: &str) -> Option<ConfigParam> {
        let index = self.sub_params.iter().position(|p| p.name == name)?;
        Some(self.sub_params.remove(index))
    }

    pub fn sub(&self, name: &str) -> Option<&ConfigParam> {
        self.sub_params.iter().find(|p| p.name == name)
    }

    pub fn sub_mut(&mut self, name: &str) -> Option<&mut ConfigParam> {
        self.sub_params.iter_mut().find(|p| p.name == name)
    }

    /// Value of a direct sub-param, if present.
    pub fn sub_value(&self, name: &str) -> Option<&str> {
        self.sub(name).map(|p| p.value())
    }

    /// True when every name in `names` is a direct sub-param.
    pub fn has_subs(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.sub(name).is_some())
    }

    /// Worst state in this subtree, with the message of the field that set it.
    pub fn worst_state(&self) -> (ParamState, &str) {
        let mut worst = (self.state, self.state_message.as_str());
        for sub in &self.sub_params {
            let candidate = sub.worst_state();
            if candidate.0 > worst.0 {
                worst = candidate;
            }
        }
        worst
    }

    /// Whether the named direct sub-param differs in value between two trees.
    pub fn value_differs(a: &ConfigParam, b: &ConfigParam, name: &str) -> bool {
        match (a.sub(name), b.sub(name)) {
            (Some(x), Some(y)) => x.value != y.value,
            (None, None) => false,
            _ => true,
        }
    }
}
