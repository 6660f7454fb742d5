use std::collections::{BTreeSet, HashMap};

use crate::callgraph::{call_kind, CallEdge, CallGraph, CallSite};
use crate::ir::*;

use super::{
    resolve_callee, AllocSite, HeapModel, Obj, ObjId, PointerFlowGraph, PointsToSet, PtrId,
    WorkList,
};

/// A node of the context-insensitive pointer-flow graph. Arrays are modeled
/// with a single cell per abstract array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pointer {
    Var(VarId),
    StaticField(FieldId),
    InstanceField(ObjId, FieldId),
    ArrayIndex(ObjId),
}

/// Context-insensitive, flow-insensitive pointer analysis building its call
/// graph on the fly. Statements of newly reachable methods are replayed
/// once; instance field, array, and instance call constraints are wired
/// lazily as receiver points-to sets grow.
pub struct PointerAnalysis<'p> {
    program: &'p Program,
    heap: HeapModel,
    pfg: PointerFlowGraph<Pointer, ObjId>,
    call_graph: CallGraph,
    worklist: WorkList<ObjId>,
}

impl<'p> PointerAnalysis<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            heap: HeapModel::new(),
            pfg: PointerFlowGraph::new(),
            call_graph: CallGraph::new(),
            worklist: WorkList::new(),
        }
    }

    pub fn solve(mut self) -> PointerAnalysisResult {
        self.initialize();
        self.analyze();
        self.into_result()
    }

    fn initialize(&mut self) {
        let entry = self.program.entry.expect("Program has no entry method.");
        self.call_graph.add_entry_method(entry);
        self.add_reachable(entry);
    }

    /// Records a newly reachable method and replays its statements.
    fn add_reachable(&mut self, method: MethodId) {
        if !self.call_graph.add_reachable_method(method) {
            return;
        }
        let program = self.program;
        for (index, stmt) in program.body(method).stmts.iter().enumerate() {
            match stmt {
                Stmt::Assign { lhs, rhs } => match rhs {
                    Exp::New(class) => {
                        let site = AllocSite {
                            method,
                            stmt: index,
                        };
                        let obj = self.heap.get_obj(program, site, Type::Class(*class));
                        let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                        self.worklist.add_entry(target, PointsToSet::singleton(obj));
                    }
                    Exp::NewArray { elem, .. } => {
                        let site = AllocSite {
                            method,
                            stmt: index,
                        };
                        let ty = Type::Array(Box::new(elem.clone()));
                        let obj = self.heap.get_obj(program, site, ty);
                        let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                        self.worklist.add_entry(target, PointsToSet::singleton(obj));
                    }
                    Exp::Atom(Atom::Var(source)) => {
                        let source = self.pfg.get_ptr(Pointer::Var(*source));
                        let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                        self.add_pfg_edge(source, target);
                    }
                    Exp::LoadField(access) if access.base.is_none() => {
                        let source = self.pfg.get_ptr(Pointer::StaticField(access.field));
                        let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                        self.add_pfg_edge(source, target);
                    }
                    // Instance and array loads are wired lazily; casts and
                    // arithmetic transfer no objects.
                    _ => {}
                },
                Stmt::StoreField { target, value } if target.base.is_none() => {
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(Pointer::Var(*value));
                        let target = self.pfg.get_ptr(Pointer::StaticField(target.field));
                        self.add_pfg_edge(source, target);
                    }
                }
                Stmt::Invoke(invoke) if invoke.kind == InvokeKind::Static => {
                    if let Some(callee) = resolve_callee(program, None, invoke) {
                        let site = CallSite {
                            method,
                            stmt: index,
                        };
                        self.add_call_edge(site, invoke, callee);
                    }
                }
                _ => {}
            }
        }
    }

    /// Adds a call-graph edge; on a new edge makes the callee reachable and
    /// wires its argument and return value flows.
    fn add_call_edge(&mut self, site: CallSite, invoke: &Invoke, callee: MethodId) {
        let edge = CallEdge {
            kind: call_kind(invoke),
            call_site: site,
            callee,
        };
        if !self.call_graph.add_edge(edge) {
            return;
        }
        self.add_reachable(callee);
        let callee_body = self.program.body(callee);
        for (arg, &param) in invoke.args.iter().zip(&callee_body.params) {
            if let Atom::Var(arg) = arg {
                let source = self.pfg.get_ptr(Pointer::Var(*arg));
                let target = self.pfg.get_ptr(Pointer::Var(param));
                self.add_pfg_edge(source, target);
            }
        }
        if let Some(result) = invoke.result {
            let target = self.pfg.get_ptr(Pointer::Var(result));
            for &ret in &callee_body.return_vars {
                let source = self.pfg.get_ptr(Pointer::Var(ret));
                self.add_pfg_edge(source, target);
            }
        }
    }

    /// Inserts a PFG edge; a new edge with a non-empty source set seeds the
    /// target.
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
            let Pointer::Var(var) = *self.pfg.pointer(ptr)
            else {
                continue;
            };
            let program = self.program;
            let info = program.var(var);
            let stmts = &program.body(info.method).stmts;
            for &obj in diff.iter() {
                for &index in &info.store_fields {
                    let Stmt::StoreField { target, value } = &stmts[index]
                    else {
                        panic!("Store-field index out of sync.");
                    };
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(Pointer::Var(*value));
                        let target = self.pfg.get_ptr(Pointer::InstanceField(obj, target.field));
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
                    let source = self.pfg.get_ptr(Pointer::InstanceField(obj, access.field));
                    let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                    self.add_pfg_edge(source, target);
                }
                for &index in &info.store_arrays {
                    let Stmt::StoreArray { value, .. } = &stmts[index]
                    else {
                        panic!("Store-array index out of sync.");
                    };
                    if let Atom::Var(value) = value {
                        let source = self.pfg.get_ptr(Pointer::Var(*value));
                        let target = self.pfg.get_ptr(Pointer::ArrayIndex(obj));
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
                    let source = self.pfg.get_ptr(Pointer::ArrayIndex(obj));
                    let target = self.pfg.get_ptr(Pointer::Var(*lhs));
                    self.add_pfg_edge(source, target);
                }
                self.process_call(var, obj);
            }
        }
    }

    /// Extends `pt(ptr)` by `pts`, forwards the entry along the pointer's
    /// PFG successors when anything was new, and returns the delta.
    fn propagate(&mut self, ptr: PtrId, pts: &PointsToSet<ObjId>) -> PointsToSet<ObjId> {
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

    /// Resolves the instance calls on `var` against the newly discovered
    /// receiver object.
    fn process_call(&mut self, var: VarId, recv: ObjId) {
        let program = self.program;
        let info = program.var(var);
        let stmts = &program.body(info.method).stmts;
        let recv_ty = self.heap.obj(recv).ty.clone();
        for &index in &info.invokes {
            let Stmt::Invoke(invoke) = &stmts[index]
            else {
                panic!("Invoke index out of sync.");
            };
            let Some(callee) = resolve_callee(program, Some(&recv_ty), invoke)
            else {
                continue;
            };
            if let Some(this_var) = program.body(callee).this_var {
                let this_ptr = self.pfg.get_ptr(Pointer::Var(this_var));
                self.worklist
                    .add_entry(this_ptr, PointsToSet::singleton(recv));
            }
            let site = CallSite {
                method: info.method,
                stmt: index,
            };
            self.add_call_edge(site, invoke, callee);
        }
    }

    fn into_result(self) -> PointerAnalysisResult {
        let mut result = PointerAnalysisResult {
            var_pts: HashMap::new(),
            static_field_pts: HashMap::new(),
            instance_field_pts: HashMap::new(),
            array_pts: HashMap::new(),
            objs: (0..self.heap.obj_count())
                .map(|id| self.heap.obj(ObjId(id)).clone())
                .collect(),
            call_graph: self.call_graph,
        };
        for (id, pointer) in self.pfg.pointers() {
            let pts: BTreeSet<ObjId> = self.pfg.points_to(id).iter().copied().collect();
            match *pointer {
                Pointer::Var(var) => {
                    result.var_pts.insert(var, pts);
                }
                Pointer::StaticField(field) => {
                    result.static_field_pts.insert(field, pts);
                }
                Pointer::InstanceField(obj, field) => {
                    result.instance_field_pts.insert((obj, field), pts);
                }
                Pointer::ArrayIndex(obj) => {
                    result.array_pts.insert(obj, pts);
                }
            }
        }
        result
    }
}

/// Read-only projection of a finished analysis.
#[derive(Debug)]
pub struct PointerAnalysisResult {
    var_pts: HashMap<VarId, BTreeSet<ObjId>>,
    static_field_pts: HashMap<FieldId, BTreeSet<ObjId>>,
    instance_field_pts: HashMap<(ObjId, FieldId), BTreeSet<ObjId>>,
    array_pts: HashMap<ObjId, BTreeSet<ObjId>>,
    objs: Vec<Obj>,
    call_graph: CallGraph,
}

impl PointerAnalysisResult {
    pub fn var_points_to(&self, var: VarId) -> BTreeSet<ObjId> {
        self.var_pts.get(&var).cloned().unwrap_or_default()
    }

    pub fn static_field_points_to(&self, field: FieldId) -> BTreeSet<ObjId> {
        self.static_field_pts.get(&field).cloned().unwrap_or_default()
    }

    pub fn instance_field_points_to(&self, obj: ObjId, field: FieldId) -> BTreeSet<ObjId> {
        self.instance_field_pts
            .get(&(obj, field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn array_points_to(&self, obj: ObjId) -> BTreeSet<ObjId> {
        self.array_pts.get(&obj).cloned().unwrap_or_default()
    }

    pub fn obj(&self, id: ObjId) -> &Obj {
        &self.objs[id.0]
    }

    pub fn obj_count(&self) -> usize {
        self.objs.len()
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }
}
