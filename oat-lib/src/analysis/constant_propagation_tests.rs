use analysis::domains::Value;

use crate::cfg::Cfg;
use crate::ir::{MethodId, Program};
use crate::parser_tests::parse_string;

use super::constant_propagation::*;

fn out_value(program: &Program, method: MethodId, stmt: usize, var: &str) -> Value {
    let cfg = Cfg::new(program, method);
    let result = ConstantPropagation::new(program, method).solve(&cfg);
    let var = program.var_named(method, var).unwrap();
    result.out_fact(cfg.node_of_stmt(stmt)).get_or_bottom(&var)
}

fn in_value(program: &Program, method: MethodId, stmt: usize, var: &str) -> Value {
    let cfg = Cfg::new(program, method);
    let result = ConstantPropagation::new(program, method).solve(&cfg);
    let var = program.var_named(method, var).unwrap();
    result.in_fact(cfg.node_of_stmt(stmt)).get_or_bottom(&var)
}

#[test]
fn adds_constants() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 1;
    y = 2;
    z = x + y;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 2, "z"), Value::Const(3));
    Ok(())
}

#[test]
fn merging_branches_loses_the_constant() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static field f: int;
  static method main() {
    c = Main.f;
    if c == 1 goto then;
    x = 2;
    goto join;
  then: x = 1;
  join: y = x;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 0, "c"), Value::Nac);
    assert_eq!(in_value(&program, main, 5, "x"), Value::Nac);
    assert_eq!(out_value(&program, main, 5, "y"), Value::Nac);
    Ok(())
}

#[test]
fn division_by_constant_zero_is_undefined() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 10;
    y = x / 0;
    z = x % 0;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 1, "y"), Value::Undef);
    assert_eq!(out_value(&program, main, 2, "z"), Value::Undef);
    Ok(())
}

#[test]
fn shifts_and_bitwise() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 2 << 3;
    y = -8 >> 1;
    z = -8 >>> 1;
    a = 12 & 10;
    b = 12 | 10;
    c = 12 ^ 10;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 0, "x"), Value::Const(16));
    assert_eq!(out_value(&program, main, 1, "y"), Value::Const(-4));
    assert_eq!(out_value(&program, main, 2, "z"), Value::Const(2147483644));
    assert_eq!(out_value(&program, main, 3, "a"), Value::Const(8));
    assert_eq!(out_value(&program, main, 4, "b"), Value::Const(14));
    assert_eq!(out_value(&program, main, 5, "c"), Value::Const(6));
    Ok(())
}

#[test]
fn comparisons_fold_to_zero_or_one() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    t = 1 < 2;
    f = 1 >= 2;
    e = 3 == 3;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 0, "t"), Value::Const(1));
    assert_eq!(out_value(&program, main, 1, "f"), Value::Const(0));
    assert_eq!(out_value(&program, main, 2, "e"), Value::Const(1));
    Ok(())
}

#[test]
fn parameters_enter_as_nac() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method compute(p: int): int {
    q = p + 1;
    return q;
  }
  static method main() { return; }
}
",
    )?;
    let compute = program.method_named("Main", "compute").unwrap();
    assert_eq!(in_value(&program, compute, 0, "p"), Value::Nac);
    assert_eq!(out_value(&program, compute, 0, "q"), Value::Nac);
    Ok(())
}

#[test]
fn loops_reach_a_fixed_point() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    i = 0;
  head: if i > 9 goto done;
    i = i + 1;
    goto head;
  done: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    // The increment joins 0 with every incremented value.
    assert_eq!(in_value(&program, main, 1, "i"), Value::Nac);
    assert_eq!(out_value(&program, main, 2, "i"), Value::Nac);
    Ok(())
}

#[test]
fn call_results_are_not_constant() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method five(): int { return 5; }
  static method main() {
    r = Main.five();
    s = r + 1;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 0, "r"), Value::Nac);
    assert_eq!(out_value(&program, main, 1, "s"), Value::Nac);
    Ok(())
}

#[test]
fn undefined_operands_poison_downstream() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 10;
    y = x / 0;
    z = y + 1;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    assert_eq!(out_value(&program, main, 1, "y"), Value::Undef);
    assert_eq!(out_value(&program, main, 2, "z"), Value::Undef);
    Ok(())
}

#[test]
fn values_move_up_the_lattice_only() -> Result<(), String> {
    // Fixed-point soundness: along every edge the incoming fact of the
    // target is at least the outgoing fact of the source.
    use analysis::cfg::ControlFlowGraph;
    let program = parse_string(
        r"class Main {
  static method main() {
    i = 0;
    j = 1;
  head: if i > 9 goto done;
    i = i + 1;
    j = j + i;
    goto head;
  done: k = i + j;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let cfg = Cfg::new(&program, main);
    let result = ConstantPropagation::new(&program, main).solve(&cfg);
    for node in 0..cfg.node_count() {
        for &succ in cfg.successors(node) {
            let mut merged = result.in_fact(succ).clone();
            let changed = merged.join_with(result.out_fact(node));
            assert!(!changed, "in({succ}) must already subsume out({node})");
        }
    }
    Ok(())
}
