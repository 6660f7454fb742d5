use std::collections::{BTreeSet, HashSet, VecDeque};

use analysis::cfg::ControlFlowGraph;

use crate::{
    cfg::{Cfg, EdgeKind},
    ir::*,
};

use super::constant_propagation::{evaluate_atom, evaluate_binary, ConstantPropagation};
use super::live_variables::LiveVariables;

/// Finds the statements of a method that can be removed: code unreachable
/// once constant conditions are folded, and side-effect-free assignments
/// whose left side is never read.
#[derive(Debug, Clone, Copy)]
pub struct DeadCodeDetection<'p> {
    program: &'p Program,
}

impl<'p> DeadCodeDetection<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self { program }
    }

    /// The dead statements of `method`, in ascending statement order.
    pub fn analyze(&self, method: MethodId) -> BTreeSet<usize> {
        let program = self.program;
        let body = program.body(method);
        let cfg = Cfg::new(program, method);
        let constants = ConstantPropagation::new(program, method).solve(&cfg);
        let live = LiveVariables::new(program, method).solve(&cfg);

        // Statements are marked `seen` when enqueued so each node is
        // visited at most once.
        fn enqueue(queue: &mut VecDeque<usize>, seen: &mut HashSet<usize>, node: usize) {
            if seen.insert(node) {
                queue.push_back(node);
            }
        }

        let mut reachable = HashSet::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        enqueue(&mut queue, &mut seen, cfg.entry());

        while let Some(node) = queue.pop_front() {
            let Some(index) = cfg.stmt_of_node(node)
            else {
                if node == cfg.entry() {
                    for &succ in cfg.successors(node) {
                        enqueue(&mut queue, &mut seen, succ);
                    }
                }
                continue;
            };
            match &body.stmts[index] {
                Stmt::Assign { lhs, rhs } => {
                    reachable.insert(index);
                    let no_use = !live.out_fact(node).contains(lhs);
                    if has_no_side_effect(rhs) && no_use {
                        reachable.remove(&index);
                    }
                    for &succ in cfg.successors(node) {
                        enqueue(&mut queue, &mut seen, succ);
                    }
                }
                Stmt::If { op, lhs, rhs, .. } => {
                    reachable.insert(index);
                    let fact = constants.in_fact(node);
                    let cond = evaluate_binary(
                        *op,
                        evaluate_atom(lhs, fact),
                        evaluate_atom(rhs, fact),
                    );
                    match cond.as_const() {
                        Some(value) => {
                            let taken = if value == 1 {
                                EdgeKind::IfTrue
                            } else {
                                EdgeKind::IfFalse
                            };
                            for edge in cfg.out_edges(node) {
                                if edge.kind == taken {
                                    enqueue(&mut queue, &mut seen, edge.target);
                                }
                            }
                        }
                        None => {
                            for &succ in cfg.successors(node) {
                                enqueue(&mut queue, &mut seen, succ);
                            }
                        }
                    }
                }
                Stmt::Switch { var, .. } => {
                    reachable.insert(index);
                    let value = constants.in_fact(node).get_or_bottom(var);
                    match value.as_const() {
                        Some(value) => {
                            let mut matched = false;
                            for edge in cfg.out_edges(node) {
                                if edge.kind == EdgeKind::SwitchCase(value) {
                                    matched = true;
                                    enqueue(&mut queue, &mut seen, edge.target);
                                }
                            }
                            if !matched {
                                // With no default edge the switch falls
                                // nowhere.
                                for edge in cfg.out_edges(node) {
                                    if edge.kind == EdgeKind::SwitchDefault {
                                        enqueue(&mut queue, &mut seen, edge.target);
                                    }
                                }
                            }
                        }
                        None => {
                            for &succ in cfg.successors(node) {
                                enqueue(&mut queue, &mut seen, succ);
                            }
                        }
                    }
                }
                _ => {
                    reachable.insert(index);
                    for &succ in cfg.successors(node) {
                        enqueue(&mut queue, &mut seen, succ);
                    }
                }
            }
        }

        (0..body.stmts.len())
            .filter(|index| !reachable.contains(index))
            .collect()
    }
}

/// Whether the right-hand side can be dropped without changing behavior.
/// Allocations touch the heap; casts, field accesses, and array accesses
/// may trap; so can division and remainder.
fn has_no_side_effect(rhs: &Exp) -> bool {
    match rhs {
        Exp::New(_)
        | Exp::NewArray { .. }
        | Exp::Cast { .. }
        | Exp::LoadField(_)
        | Exp::LoadArray(_) => false,
        Exp::Binary { op, .. } => !op.is_division(),
        Exp::Atom(_) => true,
    }
}

/// Marks each dead statement.
pub fn annotate(program: &Program, method: MethodId) -> Annotations {
    let dead = DeadCodeDetection::new(program).analyze(method);
    let mut anns = Annotations::default();
    for index in dead {
        anns.post.entry(index).or_default().push("dead".to_owned());
    }
    anns
}
