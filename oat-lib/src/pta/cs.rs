use std::collections::{BTreeSet, HashMap, HashSet};

use crate::callgraph::{call_kind, CallEdge, CallGraph, CallKind, CallSite};
use crate::ir::*;

use super::context::{ContextPool, ContextSelector, CtxId};
use super::{
    resolve_callee, AllocSite, HeapModel, Obj, ObjId, PointerFlowGraph, PointsToSet, PtrId,
    WorkList,
};

/// An interned context-sensitive object: a heap context paired with an
/// allocation-site object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsObjId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsMethod {
    pub ctx: CtxId,
    pub method: MethodId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsCallSite {
    pub ctx: CtxId,
    pub site: CallSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsCallEdge {
    pub kind: CallKind,
    pub call_site: CsCallSite,
    pub callee: CsMethod,
}

/// A node of the context-sensitive pointer-flow graph. Static fields stay
/// context-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsPointer {
    Var(CtxId, VarId),
    StaticField(FieldId),
    InstanceField(CsObjId, FieldId),
    ArrayIndex(CsObjId),
}

/// Context-sensitive call graph over context-qualified methods and sites.
#[derive(Debug, Default)]
pub struct CsCallGraph {
    entries: Vec<CsMethod>,
    reachable: Vec<CsMethod>,
    reachable_set: HashSet<CsMethod>,
    edges: Vec<CsCallEdge>,
    edge_set: HashSet<CsCallEdge>,
}

impl CsCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry_method(&mut self, method: CsMethod) {
        self.entries.push(method);
    }

    /// Returns whether the context-qualified method was new.
    pub fn add_reachable_method(&mut self, method: CsMethod) -> bool {
        if self.reachable_set.insert(method) {
            self.reachable.push(method);
            return true;
        }
        false
    }

    /// Idempotent; returns whether the edge was new.
    pub fn add_edge(&mut self, edge: CsCallEdge) -> bool {
        assert!(
            self.reachable_set.contains(&CsMethod {
                ctx: edge.call_site.ctx,
                method: edge.call_site.site.method,
            }),
            "Call edge from an unreachable method."
        );
        if !self.edge_set.insert(edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn reachable_methods(&self) -> &[CsMethod] {
        &self.reachable
    }

    pub fn edges(&self) -> &[CsCallEdge] {
        &self.edges
    }

    /// Projects the graph down to plain methods by dropping every context.
    pub fn strip_contexts(&self) -> CallGraph {
        let mut stripped = CallGraph::new();
        for entry in &self.entries {
            stripped.add_entry_method(entry.method);
        }
        for method in &self.reachable {
            stripped.add_reachable_method(method.method);
        }
        for edge in &self.edges {
            stripped.add_edge(CallEdge {
                kind: edge.kind,
                call_site: edge.call_site.site,
                callee: edge.callee.method,
            });
        }
        stripped
    }
}

#[derive(Debug, Default)]
struct CsObjTable {
    objs: Vec<(CtxId, ObjId)>,
    interned: HashMap<(CtxId, ObjId), CsObjId>,
}

impl CsObjTable {
    fn get(&mut self, ctx: CtxId, obj: ObjId) -> CsObjId {
        if let Some(&id) = self.interned.get(&(ctx, obj)) {
            return id;
        }
        let id = CsObjId(self.objs.len());
        self.objs.push((ctx, obj));
        self.interned.insert((ctx, obj), id);
        id
    }

    fn parts(&self, id: CsObjId) -> (CtxId, ObjId) {
        self.objs[id.0]
    }
}

/// The context-sensitive pointer analysis: structurally the insensitive
/// solver with every variable, object, method, and call site qualified by a
/// context chosen by the pluggable selector.
pub struct CsPointerAnalysis<'p, S: ContextSelector> {
    program: &'p Program,
    selector: S,
    pool: ContextPool,
    heap: HeapModel,
    cs_objs: CsObjTable,
    pfg: PointerFlowGraph<CsPointer, CsObjId>,
    call_graph: CsCallGraph,
    worklist: WorkList<CsObjId>,
}

impl<'p, S: ContextSelector> CsPointerAnalysis<'p, S> {
    pub fn new(program: &'p Program, selector: S) -> Self {
        Self {
            program,
            selector,
            pool: ContextPool::new(),
            heap: HeapModel::new(),
            cs_objs: CsObjTable::default(),
            pfg: PointerFlowGraph::new(),
            call_graph: CsCallGraph::new(),
            worklist: WorkList::new(),
        }
    }

    pub fn solve(mut self) -> CsPointerAnalysisResult {
        self.initialize();
        self.analyze();
        self.into_result()
    }

    fn initialize(&mut self) {
        let entry = self.program.entry.expect("Program has no entry method.");
        let ctx = self.selector.empty_context(&mut self.pool);
        let entry = CsMethod { ctx, method: entry };
        self.call_graph.add_entry_method(entry);
        self.add_reachable(entry);
    }

    fn add_reachable(&mut self, cs_method: CsMethod) {
        if !self.call_graph.add_reachable_method(cs_method) {
            return;
        }
        let CsMethod { ctx, method } = cs_method;
        let program = self.program;
        for (index, stmt) in program.body(method).stmts.iter().enumerate() {
            match stmt {
                Stmt::Assign { lhs, rhs } => match rhs {
                    Exp::New(class) => {
                        self.process_new(ctx, method, index, *lhs, Type::Class(*class));
                    }
                    Exp::NewArray { elem, .. } => {
                        let ty = Type::Array(Box::new(elem.clone()));
                        self.process_new(ctx, method, index, *lhs, ty);
                    }
                    Exp::Atom(Atom::Var(source)) => {
                        let source = self.pfg.get_ptr(CsPointer::Var(ctx, *source));
                        let target = self.pfg.get_ptr(CsPointer::Var(ctx, *lhs));
                        self.add_pfg_edge(source, target);
                    }
                    Exp::LoadField(access) if access.base.is_none() => {
                        let source = self.pfg.get_ptr(CsPointer::StaticField(access.field));
                        let target = self.pfg.get_ptr(CsPointer::Var(ctx, *lhs));
                        self.add_pfg_edge(source, target);
                    }
                    _ => {}
                },
                Stmt::StoreField { target, value } if target.base.is_none() => {
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(CsPointer::Var(ctx, *value));
                        let target = self.pfg.get_ptr(CsPointer::StaticField(target.field));
                        self.add_pfg_edge(source, target);
                    }
                }
                Stmt::Invoke(invoke) if invoke.kind == InvokeKind::Static => {
                    if let Some(callee) = resolve_callee(program, None, invoke) {
                        let site = CallSite {
                            method,
                            stmt: index,
                        };
                        let callee_ctx =
                            self.selector
                                .select_context(&mut self.pool, ctx, site, callee);
                        self.add_call_edge(CsCallSite { ctx, site }, invoke, callee, callee_ctx);
                    }
                }
                _ => {}
            }
        }
    }

    fn process_new(&mut self, ctx: CtxId, method: MethodId, stmt: usize, lhs: VarId, ty: Type) {
        let site = AllocSite { method, stmt };
        let obj = self.heap.get_obj(self.program, site, ty);
        let heap_ctx = self.selector.select_heap_context(&mut self.pool, ctx, obj);
        let cs_obj = self.cs_objs.get(heap_ctx, obj);
        let target = self.pfg.get_ptr(CsPointer::Var(ctx, lhs));
        self.worklist
            .add_entry(target, PointsToSet::singleton(cs_obj));
    }

    /// Adds a context-sensitive call-graph edge; on a new edge makes the
    /// callee reachable in its context and wires argument and return flows
    /// across the two contexts.
    fn add_call_edge(
        &mut self,
        cs_site: CsCallSite,
        invoke: &Invoke,
        callee: MethodId,
        callee_ctx: CtxId,
    ) {
        let edge = CsCallEdge {
            kind: call_kind(invoke),
            call_site: cs_site,
            callee: CsMethod {
                ctx: callee_ctx,
                method: callee,
            },
        };
        if !self.call_graph.add_edge(edge) {
            return;
        }
        self.add_reachable(CsMethod {
            ctx: callee_ctx,
            method: callee,
        });
        let caller_ctx = cs_site.ctx;
        let callee_body = self.program.body(callee);
        for (arg, &param) in invoke.args.iter().zip(&callee_body.params) {
            if let Atom::Var(arg) = arg {
                let source = self.pfg.get_ptr(CsPointer::Var(caller_ctx, *arg));
                let target = self.pfg.get_ptr(CsPointer::Var(callee_ctx, param));
                self.add_pfg_edge(source, target);
            }
        }
        if let Some(result) = invoke.result {
            let target = self.pfg.get_ptr(CsPointer::Var(caller_ctx, result));
            for &ret in &callee_body.return_vars {
                let source = self.pfg.get_ptr(CsPointer::Var(callee_ctx, ret));
                self.add_pfg_edge(source, target);
            }
        }
    }

    fn add_pfg_edge(&mut self, source: PtrId, target: PtrId) {
        if self.pfg.add_edge(source, target) && !self.pfg.points_to(source).is_empty() {
            let pts = self.pfg.points_to(source).clone();
            self.worklist.add_entry(target, pts);
        }
    }

    fn analyze(&mut self) {
        while let Some((ptr, pts)) = self.worklist.poll_entry() {
            let diff = self.propagate(ptr, &pts);
            if diff.is_empty() {
                continue;
            }
            let CsPointer::Var(ctx, var) = *self.pfg.pointer(ptr)
            else {
                continue;
            };
            let program = self.program;
            let info = program.var(var);
            let stmts = &program.body(info.method).stmts;
            for &cs_obj in diff.iter() {
                for &index in &info.store_fields {
                    let Stmt::StoreField { target, value } = &stmts[index]
                    else {
                        panic!("Store-field index out of sync.");
                    };
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(CsPointer::Var(ctx, *value));
                        let target = self
                            .pfg
                            .get_ptr(CsPointer::InstanceField(cs_obj, target.field));
                        self.add_pfg_edge(source, target);
                    }
                }
                for &index in &info.load_fields {
                    let Stmt::Assign {
                        lhs,
                        rhs: Exp::LoadField(access),
                    } = &stmts[index]
                    else {
                        panic!("Load-field index out of sync.");
                    };
                    let source = self
                        .pfg
                        .get_ptr(CsPointer::InstanceField(cs_obj, access.field));
                    let target = self.pfg.get_ptr(CsPointer::Var(ctx, *lhs));
                    self.add_pfg_edge(source, target);
                }
                for &index in &info.store_arrays {
                    let Stmt::StoreArray { value, .. } = &stmts[index]
                    else {
                        panic!("Store-array index out of sync.");
                    };
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(CsPointer::Var(ctx, *value));
                        let target = self.pfg.get_ptr(CsPointer::ArrayIndex(cs_obj));
                        self.add_pfg_edge(source, target);
                    }
                }
                for &index in &info.load_arrays {
                    let Stmt::Assign {
                        lhs,
                        rhs: Exp::LoadArray(_),
                    } = &stmts[index]
                    else {
                        panic!("Load-array index out of sync.");
                    };
                    let source = self.pfg.get_ptr(CsPointer::ArrayIndex(cs_obj));
                    let target = self.pfg.get_ptr(CsPointer::Var(ctx, *lhs));
                    self.add_pfg_edge(source, target);
                }
                self.process_call(ctx, var, cs_obj);
            }
        }
    }

    fn propagate(&mut self, ptr: PtrId, pts: &PointsToSet<CsObjId>) -> PointsToSet<CsObjId> {
        let mut diff = PointsToSet::new();
        for &obj in pts.iter() {
            if self.pfg.points_to_mut(ptr).add(obj) {
                diff.add(obj);
            }
        }
        if !diff.is_empty() {
            let succs: Vec<PtrId> = self.pfg.succs_of(ptr).collect();
            for succ in succs {
                self.worklist.add_entry(succ, pts.clone());
            }
        }
        diff
    }

    /// Resolves the instance calls on `var` in `recv_ctx` against the newly
    /// discovered receiver object.
    fn process_call(&mut self, recv_ctx: CtxId, var: VarId, recv: CsObjId) {
        let program = self.program;
        let info = program.var(var);
        let stmts = &program.body(info.method).stmts;
        let (heap_ctx, obj) = self.cs_objs.parts(recv);
        let recv_ty = self.heap.obj(obj).ty.clone();
        let container = self.heap.obj(obj).container;
        for &index in &info.invokes {
            let Stmt::Invoke(invoke) = &stmts[index]
            else {
                panic!("Invoke index out of sync.");
            };
            let Some(callee) = resolve_callee(program, Some(&recv_ty), invoke)
            else {
                continue;
            };
            let site = CallSite {
                method: info.method,
                stmt: index,
            };
            let callee_ctx = self.selector.select_context_with_recv(
                &mut self.pool,
                recv_ctx,
                site,
                heap_ctx,
                obj,
                container,
                callee,
            );
            if let Some(this_var) = program.body(callee).this_var {
                let this_ptr = self.pfg.get_ptr(CsPointer::Var(callee_ctx, this_var));
                self.worklist
                    .add_entry(this_ptr, PointsToSet::singleton(recv));
            }
            self.add_call_edge(
                CsCallSite {
                    ctx: recv_ctx,
                    site,
                },
                invoke,
                callee,
                callee_ctx,
            );
        }
    }

    fn into_result(self) -> CsPointerAnalysisResult {
        let mut var_pts: HashMap<VarId, BTreeSet<ObjId>> = HashMap::new();
        let mut cs_var_pts = HashMap::new();
        for (id, pointer) in self.pfg.pointers() {
            let pts: BTreeSet<CsObjId> = self.pfg.points_to(id).iter().copied().collect();
            if let CsPointer::Var(ctx, var) = *pointer {
                var_pts
                    .entry(var)
                    .or_default()
                    .extend(pts.iter().map(|&cs_obj| self.cs_objs.parts(cs_obj).1));
                cs_var_pts.insert((ctx, var), pts);
            }
        }
        CsPointerAnalysisResult {
            var_pts,
            cs_var_pts,
            objs: (0..self.heap.obj_count())
                .map(|id| self.heap.obj(ObjId(id)).clone())
                .collect(),
            cs_objs: self.cs_objs,
            pool: self.pool,
            call_graph: self.call_graph,
        }
    }
}

/// Read-only projection of a finished context-sensitive analysis. Variable
/// points-to sets union over every incarnation of the variable; the call
/// graph can be read with or without contexts.
#[derive(Debug)]
pub struct CsPointerAnalysisResult {
    var_pts: HashMap<VarId, BTreeSet<ObjId>>,
    cs_var_pts: HashMap<(CtxId, VarId), BTreeSet<CsObjId>>,
    objs: Vec<Obj>,
    cs_objs: CsObjTable,
    pool: ContextPool,
    call_graph: CsCallGraph,
}

impl CsPointerAnalysisResult {
    /// The context-stripped union of the variable's points-to sets.
    pub fn var_points_to(&self, var: VarId) -> BTreeSet<ObjId> {
        self.var_pts.get(&var).cloned().unwrap_or_default()
    }

    pub fn cs_var_points_to(&self, ctx: CtxId, var: VarId) -> BTreeSet<CsObjId> {
        self.cs_var_pts.get(&(ctx, var)).cloned().unwrap_or_default()
    }

    pub fn obj(&self, id: ObjId) -> &Obj {
        &self.objs[id.0]
    }

    pub fn obj_count(&self) -> usize {
        self.objs.len()
    }

    pub fn cs_obj(&self, id: CsObjId) -> (CtxId, ObjId) {
        self.cs_objs.parts(id)
    }

    pub fn context(&self, ctx: CtxId) -> &[super::context::ContextElem] {
        self.pool.elems(ctx)
    }

    pub fn call_graph(&self) -> &CsCallGraph {
        &self.call_graph
    }

    pub fn strip_call_graph(&self) -> CallGraph {
        self.call_graph.strip_contexts()
    }
}
