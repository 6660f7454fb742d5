use std::collections::BTreeSet;

use crate::ir::{MethodId, Program};
use crate::parser_tests::parse_string;

use super::dead_code::DeadCodeDetection;

fn dead(program: &Program, method: MethodId) -> BTreeSet<usize> {
    DeadCodeDetection::new(program).analyze(method)
}

#[test]
fn constant_condition_prunes_a_branch() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 1;
    if x == 1 goto then;
    y = 2;
    goto end;
  then: z = 3;
  end: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    // The else branch is unreachable; the then-branch assignment is
    // useless because `z` is never read; `x = 1` stays because the
    // condition reads it.
    assert_eq!(dead(&program, main), BTreeSet::from([2, 3, 4]));
    Ok(())
}

#[test]
fn constant_false_condition_takes_the_else_edge() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 1;
    if x == 2 goto then;
    y = x + 1;
    goto end;
  then: y = x + 2;
  end: return y;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(dead(&program, main), BTreeSet::from([4]));
    Ok(())
}

#[test]
fn switch_on_a_constant_keeps_only_the_default() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    k = 3;
    switch k { case 1: a; case 2: b; default: d; }
  a: x = 1;
  b: y = 2;
  d: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(dead(&program, main), BTreeSet::from([2, 3]));
    Ok(())
}

#[test]
fn switch_on_a_constant_takes_the_matching_case() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    k = 2;
    switch k { case 1: a; case 2: b; default: d; }
  a: x = 1;
  b: y = k + 1;
    return y;
  d: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    // Case 2 jumps over the first case body; the default is unreachable.
    assert_eq!(dead(&program, main), BTreeSet::from([2, 5]));
    Ok(())
}

#[test]
fn switch_on_an_unknown_value_keeps_everything() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static field f: int;
  static method main() {
    k = Main.f;
    switch k { case 1: a; default: d; }
  a: x = k + 1;
    return x;
  d: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(dead(&program, main), BTreeSet::new());
    Ok(())
}

#[test]
fn code_after_return_is_dead() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    return;
    nop;
    nop;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(dead(&program, main), BTreeSet::from([1, 2]));
    Ok(())
}

#[test]
fn useless_assignments_with_side_effects_stay() -> Result<(), String> {
    let program = parse_string(
        r"class A { }
class Main {
  static field f: int;
  static method main() {
    a = Main.f;
    b = a / a;
    c = new A;
    d = 1 + 2;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    // `b`, `c`, and `d` are all unread, but only the pure arithmetic can
    // be dropped: the division may trap, the load may fault, and the
    // allocation touches the heap. The load feeds the division, so it is
    // live anyway.
    assert_eq!(dead(&program, main), BTreeSet::from([3]));
    Ok(())
}

#[test]
fn loop_bodies_are_reachable() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static field f: int;
  static method main() {
    n = Main.f;
    i = 0;
  head: if i > n goto done;
    i = i + 1;
    goto head;
  done: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(dead(&program, main), BTreeSet::new());
    Ok(())
}

#[test]
fn reachable_and_dead_partition_the_method() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 1;
    if x == 1 goto then;
    y = 2;
    goto end;
  then: z = x + 1;
    return z;
  end: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let dead = dead(&program, main);
    let total = program.body(main).stmts.len();
    for index in &dead {
        assert!(*index < total);
    }
    // {2, 3, 6} unreachable, everything else live.
    assert_eq!(dead, BTreeSet::from([2, 3, 6]));
    Ok(())
}
