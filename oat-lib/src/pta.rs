pub mod ci;
pub mod context;
pub mod cs;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;

use crate::ir::{ClassId, InvokeKind, Invoke, MethodId, Program, Type};

/// An allocation site: a `new` statement within a concrete method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocSite {
    pub method: MethodId,
    pub stmt: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub usize);

/// An abstract heap object, identified by its creation site.
#[derive(Debug, Clone)]
pub struct Obj {
    pub site: AllocSite,
    pub ty: Type,
    /// The class declaring the allocating method; type sensitivity keys
    /// contexts on it.
    pub container: ClassId,
}

/// Interns one abstract object per allocation site.
#[derive(Debug, Default)]
pub struct HeapModel {
    objs: Vec<Obj>,
    sites: HashMap<AllocSite, ObjId>,
}

impl HeapModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_obj(&mut self, program: &Program, site: AllocSite, ty: Type) -> ObjId {
        if let Some(&obj) = self.sites.get(&site) {
            return obj;
        }
        let obj = ObjId(self.objs.len());
        self.objs.push(Obj {
            site,
            ty,
            container: program.method(site.method).class,
        });
        self.sites.insert(site, obj);
        obj
    }

    pub fn obj(&self, id: ObjId) -> &Obj {
        &self.objs[id.0]
    }

    pub fn obj_count(&self) -> usize {
        self.objs.len()
    }
}

/// A monotone set of abstract objects. Ordered storage keeps iteration and
/// therefore worklist contents deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsToSet<T: Ord + Copy>(BTreeSet<T>);

impl<T: Ord + Copy> Default for PointsToSet<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Ord + Copy> PointsToSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(element: T) -> Self {
        let mut set = Self::new();
        set.add(element);
        set
    }

    /// Returns whether the set grew.
    pub fn add(&mut self, element: T) -> bool {
        self.0.insert(element)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.0.contains(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Handle of an interned pointer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PtrId(pub usize);

/// Directed multigraph over interned pointers, each node carrying a
/// monotone points-to set. Shared by both solver variants; `P` is the
/// pointer representation and `T` the abstract object handle.
#[derive(Debug)]
pub struct PointerFlowGraph<P: Eq + Hash + Clone, T: Ord + Copy> {
    nodes: Vec<P>,
    ids: HashMap<P, usize>,
    pts: Vec<PointsToSet<T>>,
    succs: Vec<Vec<usize>>,
    edges: HashSet<(usize, usize)>,
}

impl<P: Eq + Hash + Clone, T: Ord + Copy> Default for PointerFlowGraph<P, T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            ids: HashMap::new(),
            pts: Vec::new(),
            succs: Vec::new(),
            edges: HashSet::new(),
        }
    }
}

impl<P: Eq + Hash + Clone, T: Ord + Copy> PointerFlowGraph<P, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a pointer, allocating its node on first sight.
    pub fn get_ptr(&mut self, pointer: P) -> PtrId {
        if let Some(&id) = self.ids.get(&pointer) {
            return PtrId(id);
        }
        let id = self.nodes.len();
        self.nodes.push(pointer.clone());
        self.ids.insert(pointer, id);
        self.pts.push(PointsToSet::new());
        self.succs.push(Vec::new());
        PtrId(id)
    }

    pub fn pointer(&self, id: PtrId) -> &P {
        &self.nodes[id.0]
    }

    pub fn ptr_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the edge was new.
    pub fn add_edge(&mut self, source: PtrId, target: PtrId) -> bool {
        if !self.edges.insert((source.0, target.0)) {
            return false;
        }
        self.succs[source.0].push(target.0);
        true
    }

    pub fn succs_of(&self, ptr: PtrId) -> impl Iterator<Item = PtrId> + '_ {
        self.succs[ptr.0].iter().map(|&id| PtrId(id))
    }

    pub fn points_to(&self, ptr: PtrId) -> &PointsToSet<T> {
        &self.pts[ptr.0]
    }

    pub fn points_to_mut(&mut self, ptr: PtrId) -> &mut PointsToSet<T> {
        &mut self.pts[ptr.0]
    }

    pub fn pointers(&self) -> impl Iterator<Item = (PtrId, &P)> + '_ {
        self.nodes.iter().enumerate().map(|(id, p)| (PtrId(id), p))
    }
}

/// FIFO worklist of pending points-to deltas. Entries may repeat; the
/// propagator filters against the pointer's current set.
#[derive(Debug)]
pub struct WorkList<T: Ord + Copy>(VecDeque<(PtrId, PointsToSet<T>)>);

impl<T: Ord + Copy> Default for WorkList<T> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T: Ord + Copy> WorkList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, pointer: PtrId, pts: PointsToSet<T>) {
        self.0.push_back((pointer, pts));
    }

    pub fn poll_entry(&mut self) -> Option<(PtrId, PointsToSet<T>)> {
        self.0.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Receiver-type dispatch shared by both pointer solvers: virtual and
/// interface calls dispatch on the runtime class of the receiver object,
/// special calls on the statically named class, static calls use the
/// declared method. Dynamic invokes are not resolvable here.
pub(crate) fn resolve_callee(
    program: &Program,
    recv_ty: Option<&Type>,
    invoke: &Invoke,
) -> Option<MethodId> {
    let subsig = &program.method(invoke.method_ref.declared).subsig;
    match invoke.kind {
        InvokeKind::Static => program.declared_method(invoke.method_ref.class, subsig),
        InvokeKind::Special => program.dispatch(invoke.method_ref.class, subsig),
        InvokeKind::Virtual | InvokeKind::Interface => {
            let class = recv_ty?.as_class()?;
            program.dispatch(class, subsig)
        }
        InvokeKind::Dynamic => None,
    }
}


#[cfg(test)]
mod cs_tests;
