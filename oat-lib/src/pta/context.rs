use std::collections::HashMap;

use crate::callgraph::CallSite;
use crate::ir::{ClassId, MethodId};

use super::ObjId;

/// One element of a context string. Which variant a selector produces is
/// its defining choice: call sites, receiver allocation sites, or the
/// classes containing those allocation sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextElem {
    CallSite(CallSite),
    Obj(ObjId),
    Type(ClassId),
}

/// Interned context handle. Contexts are hash-consed, so handle equality is
/// structural equality; `CtxId::EMPTY` is the empty context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(pub u32);

impl CtxId {
    pub const EMPTY: CtxId = CtxId(0);
}

#[derive(Debug)]
pub struct ContextPool {
    contexts: Vec<Vec<ContextElem>>,
    interned: HashMap<Vec<ContextElem>, CtxId>,
}

impl Default for ContextPool {
    fn default() -> Self {
        let mut pool = ContextPool {
            contexts: Vec::new(),
            interned: HashMap::new(),
        };
        pool.intern(Vec::new());
        pool
    }
}

impl ContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, elems: Vec<ContextElem>) -> CtxId {
        if let Some(&id) = self.interned.get(&elems) {
            return id;
        }
        let id = CtxId(self.contexts.len() as u32);
        self.interned.insert(elems.clone(), id);
        self.contexts.push(elems);
        id
    }

    pub fn elems(&self, ctx: CtxId) -> &[ContextElem] {
        &self.contexts[ctx.0 as usize]
    }

    pub fn len(&self, ctx: CtxId) -> usize {
        self.elems(ctx).len()
    }

    /// The context made of the last `n` elements of `ctx`.
    pub fn suffix(&mut self, ctx: CtxId, n: usize) -> CtxId {
        let elems = self.elems(ctx);
        if elems.len() <= n {
            return ctx;
        }
        let trimmed = elems[elems.len() - n..].to_vec();
        self.intern(trimmed)
    }

    /// Appends `elem` to the last `k - 1` elements of `base`, so the result
    /// never exceeds `k` elements.
    pub fn append_limited(&mut self, base: CtxId, elem: ContextElem, k: usize) -> CtxId {
        assert!(k > 0, "Context limit must be positive.");
        let elems = self.elems(base);
        let keep = (k - 1).min(elems.len());
        let mut result = elems[elems.len() - keep..].to_vec();
        result.push(elem);
        self.intern(result)
    }
}

/// Chooses the contexts that distinguish analysis instances of methods and
/// heap objects. All selectors are k-limited: no produced context exceeds
/// the selector's `k` elements.
pub trait ContextSelector {
    /// The context of the entry method.
    fn empty_context(&self, _pool: &mut ContextPool) -> CtxId {
        CtxId::EMPTY
    }

    /// Context for the callee of a static call.
    fn select_context(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        site: CallSite,
        callee: MethodId,
    ) -> CtxId;

    /// Context for the callee of an instance call. `recv_ctx` is the heap
    /// context of the receiver object, `container` the class declaring its
    /// allocation site.
    #[allow(clippy::too_many_arguments)]
    fn select_context_with_recv(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        site: CallSite,
        recv_ctx: CtxId,
        recv_obj: ObjId,
        container: ClassId,
        callee: MethodId,
    ) -> CtxId;

    /// Heap context for an object allocated by a method running in
    /// `method_ctx`.
    fn select_heap_context(&self, pool: &mut ContextPool, method_ctx: CtxId, obj: ObjId) -> CtxId;
}

/// k-limited call-site sensitivity: contexts are the last `k` call sites.
#[derive(Debug, Clone, Copy)]
pub struct CallSiteSensitivity {
    pub k: usize,
}

impl ContextSelector for CallSiteSensitivity {
    fn select_context(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        site: CallSite,
        _callee: MethodId,
    ) -> CtxId {
        pool.append_limited(caller, ContextElem::CallSite(site), self.k)
    }

    fn select_context_with_recv(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        site: CallSite,
        _recv_ctx: CtxId,
        _recv_obj: ObjId,
        _container: ClassId,
        _callee: MethodId,
    ) -> CtxId {
        pool.append_limited(caller, ContextElem::CallSite(site), self.k)
    }

    fn select_heap_context(
        &self,
        pool: &mut ContextPool,
        method_ctx: CtxId,
        _obj: ObjId,
    ) -> CtxId {
        pool.suffix(method_ctx, self.k - 1)
    }
}

/// k-limited object sensitivity: contexts are the last `k` receiver
/// allocation sites.
#[derive(Debug, Clone, Copy)]
pub struct ObjectSensitivity {
    pub k: usize,
}

impl ContextSelector for ObjectSensitivity {
    fn select_context(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        _site: CallSite,
        _callee: MethodId,
    ) -> CtxId {
        pool.suffix(caller, self.k)
    }

    fn select_context_with_recv(
        &self,
        pool: &mut ContextPool,
        _caller: CtxId,
        _site: CallSite,
        recv_ctx: CtxId,
        recv_obj: ObjId,
        _container: ClassId,
        _callee: MethodId,
    ) -> CtxId {
        pool.append_limited(recv_ctx, ContextElem::Obj(recv_obj), self.k)
    }

    fn select_heap_context(
        &self,
        pool: &mut ContextPool,
        method_ctx: CtxId,
        _obj: ObjId,
    ) -> CtxId {
        pool.suffix(method_ctx, 1)
    }
}

/// k-limited type sensitivity: object sensitivity coarsened to the classes
/// containing the receiver allocation sites.
#[derive(Debug, Clone, Copy)]
pub struct TypeSensitivity {
    pub k: usize,
}

impl ContextSelector for TypeSensitivity {
    fn select_context(
        &self,
        pool: &mut ContextPool,
        caller: CtxId,
        _site: CallSite,
        _callee: MethodId,
    ) -> CtxId {
        pool.suffix(caller, self.k)
    }

    fn select_context_with_recv(
        &self,
        pool: &mut ContextPool,
        _caller: CtxId,
        _site: CallSite,
        recv_ctx: CtxId,
        _recv_obj: ObjId,
        container: ClassId,
        _callee: MethodId,
    ) -> CtxId {
        pool.append_limited(recv_ctx, ContextElem::Type(container), self.k)
    }

    fn select_heap_context(
        &self,
        pool: &mut ContextPool,
        method_ctx: CtxId,
        _obj: ObjId,
    ) -> CtxId {
        pool.suffix(method_ctx, 1)
    }
}
