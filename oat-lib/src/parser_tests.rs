use super::ir::*;
use super::lexer::*;
use super::parser::*;
use utils::DiagnosticEmitter;

pub fn parse_string(source: &str) -> Result<Program, String> {
    let mut diag = DiagnosticEmitter::new(Box::new(Vec::new()), Box::new(Vec::new()));
    let lexer = Lexer::new(source, &mut diag);
    let tokens = lexer.lex_all();
    if tokens.tokens.is_empty() {
        return Err(diag.out_buffer().to_string() + diag.err_buffer());
    }
    let parser = Parser::new(tokens, &mut diag);
    let Some(program) = parser.parse()
    else {
        return Err(diag.out_buffer().to_string() + diag.err_buffer());
    };
    Ok(program)
}

#[test]
fn parse_minimal_program() -> Result<(), String> {
    let source = r"class Main {
  static method main() {
    x = 1;
    y = 2;
    z = x + y;
    return;
  }
}
";
    let program = parse_string(source)?;
    let main = program.method_named("Main", "main").unwrap();
    assert_eq!(program.entry, Some(main));

    let body = program.body(main);
    assert_eq!(body.stmts.len(), 4);
    assert!(body.this_var.is_none());

    let z = program.var_named(main, "z").unwrap();
    assert_eq!(program.var(z).ty, Type::Int);
    assert_eq!(
        body.stmts[2],
        Stmt::Assign {
            lhs: z,
            rhs: Exp::Binary {
                op: BinaryOp::Add,
                lhs: Atom::Var(program.var_named(main, "x").unwrap()),
                rhs: Atom::Var(program.var_named(main, "y").unwrap()),
            },
        }
    );
    Ok(())
}

#[test]
fn parse_hierarchy_links() -> Result<(), String> {
    let source = r"interface I {
  method m(): int;
}
interface J : I {
  method n(): int;
}
class A impl I {
  method m(): int { return 1; }
}
class B : A {
  method m(): int { return 2; }
}
";
    let program = parse_string(source)?;
    let i = program.class_named("I").unwrap();
    let j = program.class_named("J").unwrap();
    let a = program.class_named("A").unwrap();
    let b = program.class_named("B").unwrap();

    assert!(program.class(i).is_interface);
    assert_eq!(program.direct_subinterfaces_of(i), &[j]);
    assert_eq!(program.direct_implementors_of(i), &[a]);
    assert_eq!(program.direct_subclasses_of(a), &[b]);
    assert_eq!(program.class(b).superclass, Some(a));

    let i_m = program.method_named("I", "m").unwrap();
    assert!(program.method(i_m).is_abstract);

    let a_m = program.method_named("A", "m").unwrap();
    let b_m = program.method_named("B", "m").unwrap();
    let subsig = &program.method(i_m).subsig;
    assert_eq!(program.dispatch(a, subsig), Some(a_m));
    assert_eq!(program.dispatch(b, subsig), Some(b_m));
    Ok(())
}

#[test]
fn parse_branch_targets() -> Result<(), String> {
    let source = r"class Main {
  static method main() {
    x = 1;
    if x < 2 goto end;
    x = 3;
  end: return;
  }
}
";
    let program = parse_string(source)?;
    let main = program.entry.unwrap();
    let body = program.body(main);
    assert_eq!(
        body.stmts[1],
        Stmt::If {
            op: BinaryOp::Lt,
            lhs: Atom::Var(program.var_named(main, "x").unwrap()),
            rhs: Atom::Int(2),
            target: 3,
        }
    );
    Ok(())
}

#[test]
fn parse_switch() -> Result<(), String> {
    let source = r"class Main {
  static method main() {
    k = 2;
    switch k { case 1: one; case 2: two; default: done; }
  one: nop;
  two: nop;
  done: return;
  }
}
";
    let program = parse_string(source)?;
    let main = program.entry.unwrap();
    let body = program.body(main);
    assert_eq!(
        body.stmts[1],
        Stmt::Switch {
            var: program.var_named(main, "k").unwrap(),
            cases: vec![(1, 2), (2, 3)],
            default: Some(4),
        }
    );
    Ok(())
}

#[test]
fn parse_members_and_calls() -> Result<(), String> {
    let source = r"interface I {
  method m(): int;
}
class A impl I {
  field f: A;
  static field g: int;
  method m(): int { return 1; }
  method id(other: A): A { return other; }
}
class Main {
  static method helper(): A {
    a = new A;
    return a;
  }
  static method main() {
    a = Main.helper();
    b = a.id(a);
    i = (I) a;
    r = i.m();
    a.f = b;
    c = a.f;
    A.g = r;
    s = A.g;
    arr = new A[10];
    arr[0] = c;
    d = arr[1];
    return;
  }
}
";
    let program = parse_string(source)?;
    let main = program.entry.unwrap();
    let body = program.body(main);

    let Stmt::Invoke(helper_call) = &body.stmts[0]
    else {
        panic!("Expected an invoke.");
    };
    assert_eq!(helper_call.kind, InvokeKind::Static);
    assert_eq!(
        helper_call.method_ref.declared,
        program.method_named("Main", "helper").unwrap()
    );

    let Stmt::Invoke(id_call) = &body.stmts[1]
    else {
        panic!("Expected an invoke.");
    };
    assert_eq!(id_call.kind, InvokeKind::Virtual);
    assert_eq!(id_call.args.len(), 1);
    assert_eq!(
        id_call.result,
        Some(program.var_named(main, "b").unwrap())
    );

    let Stmt::Invoke(interface_call) = &body.stmts[3]
    else {
        panic!("Expected an invoke.");
    };
    assert_eq!(interface_call.kind, InvokeKind::Interface);

    let i = program.var_named(main, "i").unwrap();
    assert_eq!(
        program.var(i).ty,
        Type::Class(program.class_named("I").unwrap())
    );

    let arr = program.var_named(main, "arr").unwrap();
    assert_eq!(
        program.var(arr).ty,
        Type::Array(Box::new(Type::Class(program.class_named("A").unwrap())))
    );

    // The receiver access lists the pointer analyses use.
    let a = program.var_named(main, "a").unwrap();
    assert_eq!(program.var(a).invokes, vec![1]);
    assert_eq!(program.var(a).store_fields, vec![4]);
    assert_eq!(program.var(a).load_fields, vec![5]);
    assert_eq!(program.var(arr).store_arrays, vec![9]);
    assert_eq!(program.var(arr).load_arrays, vec![10]);
    Ok(())
}

#[test]
fn instance_method_has_this() -> Result<(), String> {
    let source = r"class A {
  field f: A;
  method m(): A {
    x = this.f;
    return x;
  }
}
";
    let program = parse_string(source)?;
    let m = program.method_named("A", "m").unwrap();
    let body = program.body(m);
    let this_var = body.this_var.unwrap();
    assert_eq!(
        program.var(this_var).ty,
        Type::Class(program.class_named("A").unwrap())
    );
    assert_eq!(program.var(this_var).load_fields, vec![0]);
    assert_eq!(body.return_vars, vec![program.var_named(m, "x").unwrap()]);
    Ok(())
}

#[test]
fn undefined_variable_is_an_error() {
    let source = r"class Main {
  static method main() {
    x = y;
    return;
  }
}
";
    let error = parse_string(source).unwrap_err();
    assert!(error.contains("Undefined variable 'y'"));
}

#[test]
fn undefined_class_is_an_error() {
    let source = r"class Main : Missing {
  static method main() { return; }
}
";
    let error = parse_string(source).unwrap_err();
    assert!(error.contains("Undefined class 'Missing'"));
}

#[test]
fn undefined_label_is_an_error() {
    let source = r"class Main {
  static method main() {
    goto nowhere;
  }
}
";
    let error = parse_string(source).unwrap_err();
    assert!(error.contains("Undefined label 'nowhere'"));
}

#[test]
fn conflicting_types_are_an_error() {
    let source = r"class A { }
class Main {
  static method main() {
    x = 1;
    x = new A;
    return;
  }
}
";
    let error = parse_string(source).unwrap_err();
    assert!(error.contains("Conflicting types for 'x'"));
}

#[test]
fn program_without_main_has_no_entry() -> Result<(), String> {
    let source = r"class A {
  method m(): int { return 1; }
}
";
    let program = parse_string(source)?;
    assert_eq!(program.entry, None);
    Ok(())
}
