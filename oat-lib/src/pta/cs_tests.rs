use std::collections::BTreeSet;

use crate::callgraph::CallSite;
use crate::ir::{MethodId, Program};
use crate::parser_tests::parse_string;

use super::context::*;
use super::cs::{CsPointerAnalysis, CsPointerAnalysisResult};
use super::{AllocSite, ObjId};

fn solve<S: ContextSelector>(program: &Program, selector: S) -> CsPointerAnalysisResult {
    CsPointerAnalysis::new(program, selector).solve()
}

fn obj_at(result: &CsPointerAnalysisResult, method: MethodId, stmt: usize) -> ObjId {
    let site = AllocSite { method, stmt };
    (0..result.obj_count())
        .map(ObjId)
        .find(|&obj| result.obj(obj).site == site)
        .expect("No object for the allocation site.")
}

fn pts_of(
    result: &CsPointerAnalysisResult,
    program: &Program,
    method: MethodId,
    var: &str,
) -> BTreeSet<ObjId> {
    result.var_points_to(program.var_named(method, var).unwrap())
}

////////////////////////////
/// Context pool basics. ///
////////////////////////////

fn site(method: usize, stmt: usize) -> ContextElem {
    ContextElem::CallSite(CallSite {
        method: MethodId(method),
        stmt,
    })
}

#[test]
fn pool_interns_structurally() {
    let mut pool = ContextPool::new();
    assert_eq!(pool.intern(Vec::new()), CtxId::EMPTY);

    let a = pool.intern(vec![site(0, 1)]);
    let b = pool.intern(vec![site(0, 1)]);
    assert_eq!(a, b);

    let c = pool.intern(vec![site(0, 2)]);
    assert_ne!(a, c);
    assert_eq!(pool.elems(c), &[site(0, 2)]);
}

#[test]
fn append_limited_truncates_to_k() {
    let mut pool = ContextPool::new();
    let one = pool.append_limited(CtxId::EMPTY, site(0, 0), 2);
    assert_eq!(pool.elems(one), &[site(0, 0)]);

    let two = pool.append_limited(one, site(0, 1), 2);
    assert_eq!(pool.elems(two), &[site(0, 0), site(0, 1)]);

    let three = pool.append_limited(two, site(0, 2), 2);
    assert_eq!(pool.elems(three), &[site(0, 1), site(0, 2)]);

    let limited = pool.append_limited(two, site(0, 3), 1);
    assert_eq!(pool.elems(limited), &[site(0, 3)]);
}

#[test]
fn suffix_keeps_the_last_elements() {
    let mut pool = ContextPool::new();
    let two = pool.intern(vec![site(0, 0), site(0, 1)]);
    assert_eq!(pool.suffix(two, 2), two);
    let last = pool.suffix(two, 1);
    assert_eq!(pool.elems(last), &[site(0, 1)]);
    assert_eq!(pool.suffix(two, 0), CtxId::EMPTY);
}

#[test]
fn call_site_heap_contexts_drop_one_element() {
    let mut pool = ContextPool::new();
    let two = pool.intern(vec![site(0, 0), site(0, 1)]);

    let one_cs = CallSiteSensitivity { k: 1 };
    let heap = one_cs.select_heap_context(&mut pool, two, ObjId(0));
    assert_eq!(heap, CtxId::EMPTY);

    let two_cs = CallSiteSensitivity { k: 2 };
    let heap = two_cs.select_heap_context(&mut pool, two, ObjId(0));
    assert_eq!(pool.elems(heap), &[site(0, 1)]);
}

//////////////////////////////
/// Whole-program solving. ///
//////////////////////////////

/// Two call sites of an identity function: insensitively the returns merge,
/// one call-site of context keeps them apart.
const ID_PROGRAM: &str = r"class A { }
class Main {
  static method id(x: A): A {
    return x;
  }
  static method main() {
    a1 = new A;
    a2 = new A;
    r1 = Main.id(a1);
    r2 = Main.id(a2);
    return;
  }
}
";

#[test]
fn call_site_sensitivity_separates_call_sites() -> Result<(), String> {
    let program = parse_string(ID_PROGRAM)?;
    let main = program.entry.unwrap();

    let result = solve(&program, CallSiteSensitivity { k: 1 });
    let o1 = obj_at(&result, main, 0);
    let o2 = obj_at(&result, main, 1);
    assert_eq!(pts_of(&result, &program, main, "r1"), BTreeSet::from([o1]));
    assert_eq!(pts_of(&result, &program, main, "r2"), BTreeSet::from([o2]));
    Ok(())
}

#[test]
fn insensitive_baseline_merges_call_sites() -> Result<(), String> {
    use super::ci::PointerAnalysis;
    let program = parse_string(ID_PROGRAM)?;
    let main = program.entry.unwrap();

    let result = PointerAnalysis::new(&program).solve();
    let r1 = program.var_named(main, "r1").unwrap();
    assert_eq!(result.var_points_to(r1).len(), 2);
    Ok(())
}

/// The container/field pattern: object sensitivity keeps the two boxes
/// apart, the insensitive analysis conflates them.
const BOX_PROGRAM: &str = r"class B { }
class A {
  field f: B;
  method set(v: B) {
    this.f = v;
  }
  method get(): B {
    r = this.f;
    return r;
  }
}
class Main {
  static method main() {
    a1 = new A;
    a2 = new A;
    b1 = new B;
    b2 = new B;
    a1.set(b1);
    a2.set(b2);
    x = a1.get();
    y = a2.get();
    return;
  }
}
";

#[test]
fn object_sensitivity_separates_receivers() -> Result<(), String> {
    let program = parse_string(BOX_PROGRAM)?;
    let main = program.entry.unwrap();

    let result = solve(&program, ObjectSensitivity { k: 1 });
    let o_b1 = obj_at(&result, main, 2);
    let o_b2 = obj_at(&result, main, 3);
    assert_eq!(pts_of(&result, &program, main, "x"), BTreeSet::from([o_b1]));
    assert_eq!(pts_of(&result, &program, main, "y"), BTreeSet::from([o_b2]));
    Ok(())
}

#[test]
fn insensitive_baseline_conflates_receivers() -> Result<(), String> {
    use super::ci::PointerAnalysis;
    let program = parse_string(BOX_PROGRAM)?;
    let main = program.entry.unwrap();

    let result = PointerAnalysis::new(&program).solve();
    let x = program.var_named(main, "x").unwrap();
    assert_eq!(result.var_points_to(x).len(), 2);
    Ok(())
}

/// Three levels of allocation and dispatch; 2-object contexts truncate to
/// the last receiver pair.
const NESTED_PROGRAM: &str = r"class C {
  method h() {
    nop;
  }
}
class B {
  method g() {
    c = new C;
    c.h();
  }
}
class A {
  method m() {
    b = new B;
    b.g();
  }
}
class Main {
  static method main() {
    a = new A;
    a.m();
    return;
  }
}
";

#[test]
fn two_object_contexts_truncate_to_the_receiver_pair() -> Result<(), String> {
    let program = parse_string(NESTED_PROGRAM)?;
    let main = program.entry.unwrap();
    let a_m = program.method_named("A", "m").unwrap();
    let b_g = program.method_named("B", "g").unwrap();
    let c_h = program.method_named("C", "h").unwrap();

    let result = solve(&program, ObjectSensitivity { k: 2 });
    let o_a = obj_at(&result, main, 0);
    let o_b = obj_at(&result, a_m, 0);
    let o_c = obj_at(&result, b_g, 0);

    let ctx_of = |method: MethodId| {
        result
            .call_graph()
            .reachable_methods()
            .iter()
            .find(|m| m.method == method)
            .map(|m| result.context(m.ctx).to_vec())
            .expect("Method not reachable.")
    };

    assert_eq!(ctx_of(a_m), vec![ContextElem::Obj(o_a)]);
    assert_eq!(
        ctx_of(b_g),
        vec![ContextElem::Obj(o_a), ContextElem::Obj(o_b)]
    );
    // The 2-limit keeps only the last receiver pair.
    assert_eq!(
        ctx_of(c_h),
        vec![ContextElem::Obj(o_b), ContextElem::Obj(o_c)]
    );
    Ok(())
}

#[test]
fn two_type_contexts_use_container_classes() -> Result<(), String> {
    let program = parse_string(NESTED_PROGRAM)?;
    let a_m = program.method_named("A", "m").unwrap();
    let b_g = program.method_named("B", "g").unwrap();
    let c_h = program.method_named("C", "h").unwrap();

    let result = solve(&program, TypeSensitivity { k: 2 });
    let main_class = program.class_named("Main").unwrap();
    let a_class = program.class_named("A").unwrap();
    let b_class = program.class_named("B").unwrap();

    let ctx_of = |method: MethodId| {
        result
            .call_graph()
            .reachable_methods()
            .iter()
            .find(|m| m.method == method)
            .map(|m| result.context(m.ctx).to_vec())
            .expect("Method not reachable.")
    };

    assert_eq!(ctx_of(a_m), vec![ContextElem::Type(main_class)]);
    assert_eq!(
        ctx_of(b_g),
        vec![ContextElem::Type(main_class), ContextElem::Type(a_class)]
    );
    assert_eq!(
        ctx_of(c_h),
        vec![ContextElem::Type(a_class), ContextElem::Type(b_class)]
    );
    Ok(())
}

#[test]
fn stripping_contexts_yields_a_plain_call_graph() -> Result<(), String> {
    let program = parse_string(NESTED_PROGRAM)?;
    let a_m = program.method_named("A", "m").unwrap();
    let b_g = program.method_named("B", "g").unwrap();
    let c_h = program.method_named("C", "h").unwrap();

    let result = solve(&program, ObjectSensitivity { k: 2 });
    let stripped = result.strip_call_graph();
    assert!(stripped.contains(a_m));
    assert!(stripped.contains(b_g));
    assert!(stripped.contains(c_h));
    for edge in stripped.edges() {
        assert!(stripped.contains(edge.call_site.method));
        assert!(stripped.contains(edge.callee));
    }
    Ok(())
}

#[test]
fn two_call_site_contexts_record_the_call_chain() -> Result<(), String> {
    let program = parse_string(
        r"class A { }
class Main {
  static method inner(x: A): A {
    return x;
  }
  static method outer(y: A): A {
    r = Main.inner(y);
    return r;
  }
  static method main() {
    a = new A;
    s = Main.outer(a);
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let outer = program.method_named("Main", "outer").unwrap();
    let inner = program.method_named("Main", "inner").unwrap();

    let result = solve(&program, CallSiteSensitivity { k: 2 });
    let ctx_of = |method: MethodId| {
        result
            .call_graph()
            .reachable_methods()
            .iter()
            .find(|m| m.method == method)
            .map(|m| result.context(m.ctx).to_vec())
            .expect("Method not reachable.")
    };

    let outer_site = ContextElem::CallSite(CallSite {
        method: main,
        stmt: 1,
    });
    let inner_site = ContextElem::CallSite(CallSite {
        method: outer,
        stmt: 0,
    });
    assert_eq!(ctx_of(outer), vec![outer_site]);
    assert_eq!(ctx_of(inner), vec![outer_site, inner_site]);

    // The value still flows through both frames.
    let o_a = obj_at(&result, main, 0);
    assert_eq!(pts_of(&result, &program, main, "s"), BTreeSet::from([o_a]));
    Ok(())
}

#[test]
fn points_to_sets_union_over_contexts() -> Result<(), String> {
    let program = parse_string(ID_PROGRAM)?;
    let main = program.entry.unwrap();
    let id = program.method_named("Main", "id").unwrap();

    let result = solve(&program, CallSiteSensitivity { k: 1 });
    let o1 = obj_at(&result, main, 0);
    let o2 = obj_at(&result, main, 1);

    // `x` has two incarnations, one per call site; the projection unions
    // them.
    assert_eq!(
        pts_of(&result, &program, id, "x"),
        BTreeSet::from([o1, o2])
    );
    Ok(())
}
