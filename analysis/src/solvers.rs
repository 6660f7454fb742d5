use std::collections::VecDeque;

use crate::cfg::ControlFlowGraph;

/// Per-node facts computed by a dataflow analysis, totalized over the node
/// set of the CFG the solver ran on. `in` and `out` are in program order
/// regardless of the direction of the analysis.
#[derive(Clone, Debug)]
pub struct DataflowResult<F> {
    ins: Vec<F>,
    outs: Vec<F>,
}

impl<F> DataflowResult<F> {
    pub fn in_fact(&self, node: usize) -> &F {
        &self.ins[node]
    }

    pub fn out_fact(&self, node: usize) -> &F {
        &self.outs[node]
    }

    pub fn node_count(&self) -> usize {
        self.ins.len()
    }
}

/// The capabilities a dataflow analysis has to provide to the solver.
pub trait DataflowAnalysis<Cfg: ControlFlowGraph> {
    type Fact: Clone + Eq;

    fn is_forward(&self) -> bool;

    /// The fact at the boundary of the analysis: the entry node for forward
    /// analyses, the exit node for backward ones.
    fn boundary_fact(&self, cfg: &Cfg) -> Self::Fact;

    /// The fact every other node starts from.
    fn initial_fact(&self) -> Self::Fact;

    /// Destructively joins `fact` into `target`.
    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact);

    /// Applies the node's transfer function. `input` and `output` are
    /// direction-relative: IN/OUT for forward analyses, OUT/IN for backward
    /// ones. Returns whether `output` changed.
    fn transfer_node(&self, node: usize, input: &Self::Fact, output: &mut Self::Fact) -> bool;
}

/// Chaotic iteration driven by a FIFO worklist seeded with every node in
/// index order. Termination requires monotone transfer functions over a
/// lattice of finite height.
#[derive(Debug, Default)]
pub struct WorklistSolver;

impl WorklistSolver {
    pub fn solve<Cfg, A>(&self, cfg: &Cfg, analysis: &A) -> DataflowResult<A::Fact>
    where
        Cfg: ControlFlowGraph,
        A: DataflowAnalysis<Cfg>,
    {
        let node_count = cfg.node_count();
        let mut ins = vec![analysis.initial_fact(); node_count];
        let mut outs = vec![analysis.initial_fact(); node_count];

        let mut worklist: VecDeque<usize> = (0..node_count).collect();
        if analysis.is_forward() {
            ins[cfg.entry()] = analysis.boundary_fact(cfg);
            while let Some(node) = worklist.pop_front() {
                for &pred in cfg.predecessors(node) {
                    analysis.meet_into(&outs[pred], &mut ins[node]);
                }
                if analysis.transfer_node(node, &ins[node], &mut outs[node]) {
                    worklist.extend(cfg.successors(node).iter().copied());
                }
            }
        } else {
            outs[cfg.exit()] = analysis.boundary_fact(cfg);
            while let Some(node) = worklist.pop_front() {
                for &succ in cfg.successors(node) {
                    analysis.meet_into(&ins[succ], &mut outs[node]);
                }
                if analysis.transfer_node(node, &outs[node], &mut ins[node]) {
                    worklist.extend(cfg.predecessors(node).iter().copied());
                }
            }
        }

        DataflowResult { ins, outs }
    }
}
