use crate::cfg::*;

struct LineCfg {
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
}

impl ControlFlowGraph for LineCfg {
    fn node_count(&self) -> usize {
        self.succs.len()
    }

    fn entry(&self) -> usize {
        0
    }

    fn exit(&self) -> usize {
        self.succs.len() - 1
    }

    fn successors(&self, node: usize) -> &[usize] {
        &self.succs[node]
    }

    fn predecessors(&self, node: usize) -> &[usize] {
        &self.preds[node]
    }
}

#[test]
fn print_dot() {
    let cfg = LineCfg {
        succs: vec![vec![1], vec![]],
        preds: vec![vec![], vec![0]],
    };
    let expected = r#"digraph "test" {
  Node_0[label="n0"]
  Node_1[label="n1"]

  Node_0 -> Node_1
}
"#;
    let printed = print(Some("\"test\""), &cfg, |node| format!("n{node}"));
    assert_eq!(printed, expected);
}
