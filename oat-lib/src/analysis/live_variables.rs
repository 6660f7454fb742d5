use itertools::Itertools;

use analysis::{
    domains::PowerSet,
    solvers::{DataflowAnalysis, DataflowResult, WorklistSolver},
};

use crate::{cfg::Cfg, ir::*};

pub type LiveFact = PowerSet<VarId>;

/// Backward may-analysis computing the variables whose current value may
/// still be read: `in = (out \ def) ∪ uses`.
#[derive(Debug, Clone, Copy)]
pub struct LiveVariables<'p> {
    program: &'p Program,
    method: MethodId,
}

impl<'p> LiveVariables<'p> {
    pub fn new(program: &'p Program, method: MethodId) -> Self {
        Self { program, method }
    }

    pub fn solve(&self, cfg: &Cfg) -> DataflowResult<LiveFact> {
        WorklistSolver.solve(cfg, self)
    }
}

impl DataflowAnalysis<Cfg> for LiveVariables<'_> {
    type Fact = LiveFact;

    fn is_forward(&self) -> bool {
        false
    }

    fn boundary_fact(&self, _cfg: &Cfg) -> LiveFact {
        LiveFact::new()
    }

    fn initial_fact(&self) -> LiveFact {
        LiveFact::new()
    }

    fn meet_into(&self, fact: &LiveFact, target: &mut LiveFact) {
        target.union_with(fact);
    }

    fn transfer_node(&self, node: usize, input: &LiveFact, output: &mut LiveFact) -> bool {
        let mut new = input.clone();
        if let Some(stmt) = self.program.body(self.method).stmts.get(node) {
            if let Some(def) = stmt.def() {
                new.remove(&def);
            }
            for used in stmt.uses() {
                new.insert(used);
            }
        }
        if *output == new {
            return false;
        }
        *output = new;
        true
    }
}

/// Renders the live-out set of every statement.
pub fn annotate(program: &Program, method: MethodId) -> Annotations {
    let cfg = Cfg::new(program, method);
    let result = LiveVariables::new(program, method).solve(&cfg);
    let mut anns = Annotations::default();
    for index in 0..program.body(method).stmts.len() {
        let live = result
            .out_fact(cfg.node_of_stmt(index))
            .iter()
            .map(|&var| program.identifiers.get_name(program.var(var).name))
            .sorted()
            .join(", ");
        anns.post
            .entry(index)
            .or_default()
            .push(format!("live: {{{live}}}"));
    }
    anns
}
