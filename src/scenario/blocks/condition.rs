//! Condition block: picks `flowOutTrue` or `flowOutFalse` from `predicateIn`.
//!
//! ## Predicates
//!
//! - `first byte`: true when the first input byte is non-zero (default).
//! - `any byte`: true when any input byte is non-zero.
//! - `expression`: a Rhai expression returning `bool`. The scope holds
//!   `data` (the input as a blob) and `len` (its length).
//!
//! ```rhai
//! len > 2 && data[0] == 0x90
//! ```

use super::params_root;
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{
    Block, BlockCore, BlockError, LogLevel, PortData, PrepareContext,
};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::port::Port;
use rhai::{Blob, Engine, Scope, AST};
use std::sync::Arc;

const PREDICATE_PARAM: &str = "Predicate";
const EXPRESSION_PARAM: &str = "Expression";
const INPUT_PORT: &str = "predicateIn";
const PORT_TRUE: &str = "flowOutTrue";
const PORT_FALSE: &str = "flowOutFalse";

const PREDICATE_FIRST_BYTE: &str = "first byte";
const PREDICATE_ANY_BYTE: &str = "any byte";
const PREDICATE_EXPRESSION: &str = "expression";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Predicate {
    FirstByte,
    AnyByte,
    Expression,
}

impl Predicate {
    fn from_label(label: &str) -> Option<Predicate> {
        match label {
            PREDICATE_FIRST_BYTE => Some(Predicate::FirstByte),
            PREDICATE_ANY_BYTE => Some(Predicate::AnyByte),
            PREDICATE_EXPRESSION => Some(Predicate::Expression),
            _ => None,
        }
    }
}

/// Engine plus compiled expression, built in `prepare()`.
#[derive(Clone)]
struct CompiledPredicate {
    engine: Arc<Engine>,
    ast: AST,
}

fn compile(source: &str) -> Result<CompiledPredicate, String> {
    let engine = Engine::new();
    let ast = engine
        .compile_expression(source)
        .map_err(|e| format!("Compile error: {}", e))?;
    Ok(CompiledPredicate {
        engine: Arc::new(engine),
        ast,
    })
}

#[derive(Clone)]
pub struct ConditionBlock {
    core: BlockCore,
    compiled: Option<CompiledPredicate>,
    outcome: bool,
}

impl ConditionBlock {
    pub fn new() -> Self {
        let kind = BlockKind::Condition;
        let predicate = ConfigParam::new(
            PREDICATE_PARAM,
            PREDICATE_FIRST_BYTE,
            ParamType::Enum,
            "How the input is evaluated to true/false.",
        )
        .with_enum_values([PREDICATE_FIRST_BYTE, PREDICATE_ANY_BYTE, PREDICATE_EXPRESSION]);

        let params = params_root(kind.display_name())
            .with_sub(predicate)
            .with_sub(ConfigParam::new(
                EXPRESSION_PARAM,
                "len > 0 && data[0] != 0",
                ParamType::String,
                "Rhai expression over `data` and `len`, used by the expression predicate.",
            ));

        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_port(Port::flow_input("flowIn"))
                .with_port(
                    Port::data_input(INPUT_PORT)
                        .with_description(
                            "Data passed through this port will be evaluated to be true/false.",
                        )
                        .with_type_hint("[any]"),
                )
                .with_port(Port::flow_output(PORT_TRUE).with_description(
                    "If the input is evaluated to be TRUE, the flow will continue through this port.",
                ))
                .with_port(Port::flow_output(PORT_FALSE).with_description(
                    "If the input is evaluated to be FALSE, the flow will continue through this port.",
                )),
            compiled: None,
            outcome: false,
        }
    }

    fn predicate(&self) -> Option<Predicate> {
        self.core
            .params()
            .sub_value(PREDICATE_PARAM)
            .and_then(Predicate::from_label)
    }

    fn evaluate(&self, data: &[u8]) -> Result<bool, BlockError> {
        match self.predicate() {
            Some(Predicate::FirstByte) | None => Ok(data.first().is_some_and(|b| *b != 0)),
            Some(Predicate::AnyByte) => Ok(data.iter().any(|b| *b != 0)),
            Some(Predicate::Expression) => {
                let compiled = self
                    .compiled
                    .as_ref()
                    .ok_or_else(|| BlockError::NotPrepared("expression not compiled".into()))?;

                let mut scope = Scope::new();
                scope.push("data", Blob::from(data));
                scope.push("len", data.len() as i64);
                compiled
                    .engine
                    .eval_ast_with_scope::<bool>(&mut scope, &compiled.ast)
                    .map_err(|e| BlockError::Failed(format!("Predicate failed: {}", e)))
            }
        }
    }
}

impl Default for ConditionBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConditionBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionBlock")
            .field("core", &self.core)
            .field("compiled", &self.compiled.is_some())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Block for ConditionBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Condition
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(Self {
            compiled: None,
            outcome: false,
            ..self.clone()
        })
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PREDICATE_PARAM, EXPRESSION_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let mut params = params;
        if !self.validate_params_structure(&params) {
            params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
            return params;
        }

        params.reset_state(true);
        self.core.params = params;

        if self.predicate() == Some(Predicate::Expression) {
            let source = self
                .core
                .params
                .sub_value(EXPRESSION_PARAM)
                .unwrap_or_default()
                .to_string();
            if let (Err(message), Some(field)) =
                (compile(&source), self.core.params.sub_mut(EXPRESSION_PARAM))
            {
                field.set_state(ParamState::Error, message);
            }
            self.core.set_subtitle(source);
        } else {
            let subtitle = self
                .core
                .params
                .sub_value(PREDICATE_PARAM)
                .unwrap_or_default()
                .to_string();
            self.core.set_subtitle(subtitle);
        }

        self.core.params.clone()
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> bool {
        self.outcome = false;
        self.compiled = None;

        if self.predicate() != Some(Predicate::Expression) {
            return true;
        }

        let source = self
            .core
            .params()
            .sub_value(EXPRESSION_PARAM)
            .unwrap_or_default();
        match compile(source) {
            Ok(compiled) => {
                self.compiled = Some(compiled);
                true
            }
            Err(message) => {
                self.core.log(LogLevel::Error, &message);
                false
            }
        }
    }

    fn cleanup(&mut self) -> bool {
        self.compiled = None;
        true
    }

    fn supports_immediate_execution(&self) -> bool {
        true
    }

    fn execute_immediate(&mut self, inputs: &PortData) -> Result<PortData, BlockError> {
        let data = inputs.get(INPUT_PORT).map(Vec::as_slice).unwrap_or_default();
        self.outcome = self.evaluate(data)?;
        tracing::debug!(block = self.core.title(), outcome = self.outcome, "Condition evaluated");
        Ok(PortData::new())
    }

    fn preferred_output_flow_port(&self) -> Option<&str> {
        Some(if self.outcome { PORT_TRUE } else { PORT_FALSE })
    }
}
