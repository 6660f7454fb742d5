use std::collections::{HashMap, HashSet, VecDeque};

use crate::ir::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallKind {
    Static,
    Special,
    Virtual,
    Interface,
    Dynamic,
    Other,
}

/// The call-graph edge kind of an invoke statement.
pub fn call_kind(invoke: &Invoke) -> CallKind {
    match invoke.kind {
        InvokeKind::Static => CallKind::Static,
        InvokeKind::Special => CallKind::Special,
        InvokeKind::Virtual => CallKind::Virtual,
        InvokeKind::Interface => CallKind::Interface,
        InvokeKind::Dynamic => CallKind::Dynamic,
    }
}

/// A call site: the invoke statement at `stmt` in `method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite {
    pub method: MethodId,
    pub stmt: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallEdge {
    pub kind: CallKind,
    pub call_site: CallSite,
    pub callee: MethodId,
}

/// Method-level call graph. Edges are deduplicated; their sources must lie
/// in methods already recorded as reachable.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    entries: Vec<MethodId>,
    reachable: Vec<MethodId>,
    reachable_set: HashSet<MethodId>,
    edges: Vec<CallEdge>,
    edge_set: HashSet<CallEdge>,
    callees: HashMap<CallSite, Vec<MethodId>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry_method(&mut self, method: MethodId) {
        self.entries.push(method);
    }

    pub fn contains(&self, method: MethodId) -> bool {
        self.reachable_set.contains(&method)
    }

    /// Returns whether the method was new.
    pub fn add_reachable_method(&mut self, method: MethodId) -> bool {
        if self.reachable_set.insert(method) {
            self.reachable.push(method);
            return true;
        }
        false
    }

    /// Idempotent; returns whether the edge was new.
    pub fn add_edge(&mut self, edge: CallEdge) -> bool {
        assert!(
            self.reachable_set.contains(&edge.call_site.method),
            "Call edge from an unreachable method."
        );
        if !self.edge_set.insert(edge) {
            return false;
        }
        self.callees.entry(edge.call_site).or_default().push(edge.callee);
        self.edges.push(edge);
        true
    }

    pub fn entry_methods(&self) -> &[MethodId] {
        &self.entries
    }

    pub fn reachable_methods(&self) -> &[MethodId] {
        &self.reachable
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn callees_of(&self, site: CallSite) -> &[MethodId] {
        self.callees.get(&site).map_or(&[], Vec::as_slice)
    }
}

/// The invoke statements of a concrete method.
pub fn call_sites_in(program: &Program, method: MethodId) -> Vec<(CallSite, &Invoke)> {
    program
        .body(method)
        .stmts
        .iter()
        .enumerate()
        .filter_map(move |(index, stmt)| match stmt {
            Stmt::Invoke(invoke) => Some((
                CallSite {
                    method,
                    stmt: index,
                },
                invoke,
            )),
            _ => None,
        })
        .collect()
}

/// Class-hierarchy-analysis call-graph construction: a breadth-first sweep
/// over reachable methods, resolving every call site against the hierarchy
/// alone.
pub struct ChaBuilder<'p> {
    program: &'p Program,
}

impl<'p> ChaBuilder<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self { program }
    }

    pub fn build(&self) -> CallGraph {
        let entry = self.program.entry.expect("Program has no entry method.");
        let mut call_graph = CallGraph::new();
        call_graph.add_entry_method(entry);

        let mut queue = VecDeque::new();
        queue.push_back(entry);
        while let Some(method) = queue.pop_front() {
            if call_graph.contains(method) {
                continue;
            }
            call_graph.add_reachable_method(method);
            if self.program.method(method).body.is_none() {
                continue;
            }
            for (site, invoke) in call_sites_in(self.program, method) {
                for callee in self.resolve(invoke) {
                    call_graph.add_edge(CallEdge {
                        kind: call_kind(invoke),
                        call_site: site,
                        callee,
                    });
                    queue.push_back(callee);
                }
            }
        }
        call_graph
    }

    /// All candidate callees of a call site under CHA. Virtual and
    /// interface calls dispatch in the declared class and, transitively,
    /// every direct subclass, subinterface, and implementor. Unresolvable
    /// lookups are dropped silently.
    pub fn resolve(&self, invoke: &Invoke) -> Vec<MethodId> {
        let program = self.program;
        let declared_class = invoke.method_ref.class;
        let subsig = &program.method(invoke.method_ref.declared).subsig;
        let mut result = Vec::new();
        match invoke.kind {
            InvokeKind::Static => {
                result.extend(program.declared_method(declared_class, subsig));
            }
            InvokeKind::Special => {
                result.extend(program.dispatch(declared_class, subsig));
            }
            InvokeKind::Virtual | InvokeKind::Interface => {
                let mut queue = VecDeque::new();
                let mut visited = HashSet::new();
                queue.push_back(declared_class);
                visited.insert(declared_class);
                while let Some(class) = queue.pop_front() {
                    if let Some(target) = program.dispatch(class, subsig) {
                        if !result.contains(&target) {
                            result.push(target);
                        }
                    }
                    for &next in program
                        .direct_subclasses_of(class)
                        .iter()
                        .chain(program.direct_subinterfaces_of(class))
                        .chain(program.direct_implementors_of(class))
                    {
                        if visited.insert(next) {
                            queue.push_back(next);
                        }
                    }
                }
            }
            // Dynamic call targets are not visible to the hierarchy.
            InvokeKind::Dynamic => {}
        }
        result
    }
}
