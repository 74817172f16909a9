//! Test data builders for creating scenarios

use scenario_engine::scenario::{BlockId, BlockKind, PortRef, Scenario};
use std::collections::HashMap;

/// Builds a scenario from named blocks and links between them.
///
/// ```ignore
/// let (scenario, ids) = ScenarioBuilder::new()
///     .block("start", BlockKind::FlowStart)
///     .block("end", BlockKind::FlowEnd)
///     .link("start", "flowOut", "end", "flowIn")
///     .build();
/// ```
#[derive(Default)]
pub struct ScenarioBuilder {
    scenario: Scenario,
    ids: HashMap<String, BlockId>,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, name: &str, kind: BlockKind) -> Self {
        let id = self.scenario.add_block_of_kind(kind);
        self.ids.insert(name.to_string(), id);
        self
    }

    /// Set one parameter field and run the parameter exchange.
    pub fn param(mut self, name: &str, field: &str, value: &str) -> Self {
        let id = self.id(name);
        let mut params = self
            .scenario
            .block(id)
            .expect("block exists")
            .params()
            .clone();
        params
            .sub_mut(field)
            .unwrap_or_else(|| panic!("{} has no field '{}'", name, field))
            .set_value(value)
            .unwrap_or_else(|e| panic!("{}.{}: {}", name, field, e));
        self.scenario
            .configure_block(id, params)
            .expect("block exists");
        self
    }

    /// Connect `from.out` to `to.input`, panicking when the link is rejected.
    pub fn link(mut self, from: &str, out: &str, to: &str, input: &str) -> Self {
        let source = PortRef::new(self.id(from), out);
        let target = PortRef::new(self.id(to), input);
        if let Err(rejection) = self.scenario.connect(source.clone(), target.clone()) {
            panic!("link {} -> {} rejected: {}", source, target, rejection);
        }
        self
    }

    pub fn id(&self, name: &str) -> BlockId {
        *self
            .ids
            .get(name)
            .unwrap_or_else(|| panic!("no block named '{}'", name))
    }

    pub fn build(self) -> (Scenario, HashMap<String, BlockId>) {
        (self.scenario, self.ids)
    }
}

/// Start -> Merge -> Loop(n) with the repeat branch logging a constant and
/// returning through the merge; done leads to End.
pub fn loop_scenario(iterations: u64) -> (Scenario, HashMap<String, BlockId>) {
    ScenarioBuilder::new()
        .block("start", BlockKind::FlowStart)
        .block("constant", BlockKind::ConstantValue)
        .block("merge", BlockKind::FlowMerge)
        .block("loop", BlockKind::Loop)
        .block("log", BlockKind::Log)
        .block("end", BlockKind::FlowEnd)
        .param("loop", "Number of iterations", &iterations.to_string())
        .link("start", "flowOut", "merge", "flowIn1")
        .link("merge", "flowOut", "loop", "flowIn")
        .link("loop", "flowOutRepeat", "log", "flowIn")
        .link("log", "flowOut", "merge", "flowIn2")
        .link("loop", "flowOutDone", "end", "flowIn")
        .link("constant", "dataOut", "log", "dataIn")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_scenario_builds() {
        let (scenario, ids) = loop_scenario(3);
        assert_eq!(scenario.block_count(), 6);
        assert_eq!(scenario.connection_count(), 6);
        assert_eq!(scenario.entry_point(), Ok(ids["start"]));
    }
}
