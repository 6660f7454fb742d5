/// Control flow graphs hand out dense `usize` node handles so analysis
/// facts can live in flat vectors indexed by node.
pub trait ControlFlowGraph {
    fn node_count(&self) -> usize;

    /// The distinguished entry node. Must have no predecessors.
    fn entry(&self) -> usize;

    /// The distinguished exit node. Must have no successors.
    fn exit(&self) -> usize;

    fn successors(&self, node: usize) -> &[usize];
    fn predecessors(&self, node: usize) -> &[usize];
}

/// Renders the graph in Graphviz format, one node per line followed by the
/// edge list. The label of each node is produced by the supplied closure.
pub fn print<Cfg: ControlFlowGraph>(
    name: Option<&str>,
    cfg: &Cfg,
    mut node_label: impl FnMut(usize) -> String,
) -> String {
    let mut result = String::new();
    result.push_str(&format!("digraph {} {{\n", name.unwrap_or("\"cfg\"")));
    for node in 0..cfg.node_count() {
        result.push_str(&format!(
            "  Node_{}[label=\"{}\"]\n",
            node,
            node_label(node)
        ));
    }
    result.push('\n');
    for node in 0..cfg.node_count() {
        for succ in cfg.successors(node) {
            result.push_str(&format!("  Node_{node} -> Node_{succ}\n"));
        }
    }
    result.push_str("}\n");
    result
}
