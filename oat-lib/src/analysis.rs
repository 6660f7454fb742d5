pub mod constant_propagation;
pub mod dead_code;
pub mod live_variables;

use std::collections::HashMap;

use crate::ir::{Annotations, MethodId, Program};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Analyses {
    ConstProp,
    LiveVars,
    DeadCode,
}

/// Runs the selected analysis on every method with a body and renders the
/// per-statement results as annotations for the printer.
pub fn get_analysis_results(
    analysis: Analyses,
    program: &Program,
) -> HashMap<MethodId, Annotations> {
    let mut results = HashMap::new();
    for index in 0..program.methods.len() {
        let method = MethodId(index);
        if program.method(method).body.is_none() {
            continue;
        }
        let anns = match analysis {
            Analyses::ConstProp => constant_propagation::annotate(program, method),
            Analyses::LiveVars => live_variables::annotate(program, method),
            Analyses::DeadCode => dead_code::annotate(program, method),
        };
        results.insert(method, anns);
    }
    results
}

#[cfg(test)]
mod constant_propagation_tests;

#[cfg(test)]
mod dead_code_tests;
