use analysis::cfg::ControlFlowGraph;

use super::cfg::*;
use super::parser_tests::parse_string;

#[test]
fn straight_line() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    x = 1;
    y = 2;
    return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let cfg = Cfg::new(&program, main);

    assert_eq!(cfg.node_count(), 5);
    assert_eq!(cfg.entry(), 3);
    assert_eq!(cfg.exit(), 4);
    assert_eq!(cfg.successors(cfg.entry()), &[0]);
    assert_eq!(cfg.successors(0), &[1]);
    assert_eq!(cfg.successors(2), &[cfg.exit()]);
    assert_eq!(cfg.predecessors(1), &[0]);
    assert_eq!(cfg.out_edges(2)[0].kind, EdgeKind::Return);
    assert_eq!(cfg.out_edges(cfg.entry())[0].kind, EdgeKind::Entry);
    Ok(())
}

#[test]
fn branches_and_loops() -> Result<(), String> {
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
    let cfg = Cfg::new(&program, main);

    // if: true edge to 4, false edge falls through to 2
    let if_edges = cfg.out_edges(1);
    assert_eq!(if_edges.len(), 2);
    assert_eq!(if_edges[0], Edge { kind: EdgeKind::IfTrue, target: 4 });
    assert_eq!(if_edges[1], Edge { kind: EdgeKind::IfFalse, target: 2 });

    // the back edge
    assert_eq!(cfg.out_edges(3), &[Edge { kind: EdgeKind::Goto, target: 1 }]);
    assert!(cfg.predecessors(1).contains(&3));
    Ok(())
}

#[test]
fn switch_edges() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
    k = 2;
    switch k { case 1: one; case 2: two; default: done; }
  one: nop;
  two: nop;
  done: return;
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let cfg = Cfg::new(&program, main);

    let edges = cfg.out_edges(1);
    assert_eq!(
        edges,
        &[
            Edge { kind: EdgeKind::SwitchCase(1), target: 2 },
            Edge { kind: EdgeKind::SwitchCase(2), target: 3 },
            Edge { kind: EdgeKind::SwitchDefault, target: 4 },
        ]
    );
    Ok(())
}

#[test]
fn empty_body_connects_entry_to_exit() -> Result<(), String> {
    let program = parse_string(
        r"class Main {
  static method main() {
  }
}
",
    )?;
    let main = program.entry.unwrap();
    let cfg = Cfg::new(&program, main);
    assert_eq!(cfg.node_count(), 2);
    assert_eq!(cfg.successors(cfg.entry()), &[cfg.exit()]);
    Ok(())
}
