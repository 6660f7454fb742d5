use crate::cfg::ControlFlowGraph;
use crate::domains::PowerSet;
use crate::solvers::*;

struct TestCfg {
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    entry: usize,
    exit: usize,
}

impl TestCfg {
    fn new(node_count: usize, edges: &[(usize, usize)], entry: usize, exit: usize) -> Self {
        let mut succs = vec![Vec::new(); node_count];
        let mut preds = vec![Vec::new(); node_count];
        for &(from, to) in edges {
            succs[from].push(to);
            preds[to].push(from);
        }
        Self {
            succs,
            preds,
            entry,
            exit,
        }
    }
}

impl ControlFlowGraph for TestCfg {
    fn node_count(&self) -> usize {
        self.succs.len()
    }

    fn entry(&self) -> usize {
        self.entry
    }

    fn exit(&self) -> usize {
        self.exit
    }

    fn successors(&self, node: usize) -> &[usize] {
        &self.succs[node]
    }

    fn predecessors(&self, node: usize) -> &[usize] {
        &self.preds[node]
    }
}

/// Collects the ids of the nodes seen on some path to (or from) each node.
struct CollectNodes {
    forward: bool,
}

impl DataflowAnalysis<TestCfg> for CollectNodes {
    type Fact = PowerSet<usize>;

    fn is_forward(&self) -> bool {
        self.forward
    }

    fn boundary_fact(&self, _cfg: &TestCfg) -> Self::Fact {
        PowerSet::new()
    }

    fn initial_fact(&self) -> Self::Fact {
        PowerSet::new()
    }

    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact) {
        target.union_with(fact);
    }

    fn transfer_node(&self, node: usize, input: &Self::Fact, output: &mut Self::Fact) -> bool {
        let mut new = input.clone();
        new.insert(node);
        if *output == new {
            return false;
        }
        *output = new;
        true
    }
}

fn is_superset(big: &PowerSet<usize>, small: &PowerSet<usize>) -> bool {
    small.iter().all(|element| big.contains(element))
}

// Entry 0, a loop between 1 and 2, then 3 and the exit 4.
fn looping_cfg() -> TestCfg {
    TestCfg::new(5, &[(0, 1), (1, 2), (2, 1), (2, 3), (3, 4)], 0, 4)
}

#[test]
fn forward_reaches_fixed_point() {
    let cfg = looping_cfg();
    let result = WorklistSolver.solve(&cfg, &CollectNodes { forward: true });

    for &node in &[0, 1, 2] {
        assert!(result.in_fact(3).contains(&node));
    }
    assert!(!result.in_fact(1).contains(&3));

    // Soundness: facts flow along every edge.
    for node in 0..cfg.node_count() {
        for &succ in cfg.successors(node) {
            assert!(is_superset(result.in_fact(succ), result.out_fact(node)));
        }
    }
}

#[test]
fn backward_reaches_fixed_point() {
    let cfg = looping_cfg();
    let result = WorklistSolver.solve(&cfg, &CollectNodes { forward: false });

    for &node in &[2, 3, 4] {
        assert!(result.in_fact(1).contains(&node));
    }
    assert!(!result.out_fact(3).contains(&0));

    for node in 0..cfg.node_count() {
        for &succ in cfg.successors(node) {
            assert!(is_superset(result.out_fact(node), result.in_fact(succ)));
        }
    }
}
