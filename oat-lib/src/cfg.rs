use analysis::cfg::ControlFlowGraph;

use crate::ir::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Entry,
    FallThrough,
    Goto,
    IfTrue,
    IfFalse,
    SwitchCase(i32),
    SwitchDefault,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: usize,
}

/// Statement-level control flow graph of one method body. Nodes `0..n` are
/// the statement indices; two synthetic nodes follow: the entry (`n`) and
/// the exit (`n + 1`).
#[derive(Debug, Clone)]
pub struct Cfg {
    stmt_count: usize,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    out_edges: Vec<Vec<Edge>>,
}

impl Cfg {
    pub fn new(program: &Program, method: MethodId) -> Self {
        let body = program.body(method);
        let stmt_count = body.stmts.len();
        let mut cfg = Cfg {
            stmt_count,
            succs: vec![Vec::new(); stmt_count + 2],
            preds: vec![Vec::new(); stmt_count + 2],
            out_edges: vec![Vec::new(); stmt_count + 2],
        };
        let entry = stmt_count;
        let exit = stmt_count + 1;

        let first = if stmt_count == 0 { exit } else { 0 };
        cfg.add_edge(entry, first, EdgeKind::Entry);

        for (index, stmt) in body.stmts.iter().enumerate() {
            let next = if index + 1 < stmt_count {
                index + 1
            } else {
                exit
            };
            match stmt {
                Stmt::Goto { target } => cfg.add_edge(index, *target, EdgeKind::Goto),
                Stmt::If { target, .. } => {
                    cfg.add_edge(index, *target, EdgeKind::IfTrue);
                    cfg.add_edge(index, next, EdgeKind::IfFalse);
                }
                Stmt::Switch { cases, default, .. } => {
                    for (value, target) in cases {
                        cfg.add_edge(index, *target, EdgeKind::SwitchCase(*value));
                    }
                    if let Some(target) = default {
                        cfg.add_edge(index, *target, EdgeKind::SwitchDefault);
                    }
                }
                Stmt::Return(_) => cfg.add_edge(index, exit, EdgeKind::Return),
                _ => cfg.add_edge(index, next, EdgeKind::FallThrough),
            }
        }
        cfg
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        self.succs[from].push(to);
        self.preds[to].push(from);
        self.out_edges[from].push(Edge { kind, target: to });
    }

    pub fn stmt_count(&self) -> usize {
        self.stmt_count
    }

    /// The statement a node stands for; `None` for the synthetic nodes.
    pub fn stmt_of_node(&self, node: usize) -> Option<usize> {
        (node < self.stmt_count).then_some(node)
    }

    pub fn node_of_stmt(&self, stmt: usize) -> usize {
        assert!(stmt < self.stmt_count);
        stmt
    }

    pub fn out_edges(&self, node: usize) -> &[Edge] {
        &self.out_edges[node]
    }
}

impl ControlFlowGraph for Cfg {
    fn node_count(&self) -> usize {
        self.stmt_count + 2
    }

    fn entry(&self) -> usize {
        self.stmt_count
    }

    fn exit(&self) -> usize {
        self.stmt_count + 1
    }

    fn successors(&self, node: usize) -> &[usize] {
        &self.succs[node]
    }

    fn predecessors(&self, node: usize) -> &[usize] {
        &self.preds[node]
    }
}

pub fn print_cfg(program: &Program, method: MethodId, cfg: &Cfg) -> String {
    let name = format!("\"{}\"", program.qualified_name(method));
    let body = program.body(method);
    analysis::cfg::print(Some(&name), cfg, |node| match cfg.stmt_of_node(node) {
        Some(index) => print_stmt(program, &body.stmts[index]).replace('"', "\\\""),
        None if node == cfg.entry() => "entry".to_owned(),
        None => "exit".to_owned(),
    })
}
