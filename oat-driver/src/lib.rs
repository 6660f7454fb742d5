use std::collections::BTreeSet;

use clap::Parser as CommandLineParser;
use clap::ValueEnum;

use oat_lib::analysis::{get_analysis_results, Analyses};
use oat_lib::callgraph::{CallGraph, ChaBuilder};
use oat_lib::cfg::{print_cfg, Cfg};
use oat_lib::ir::{print_method, MethodId, Program, VarId};
use oat_lib::lexer::Lexer;
use oat_lib::parser::Parser;
use oat_lib::pta::ci::PointerAnalysis;
use oat_lib::pta::context::{
    CallSiteSensitivity, ContextSelector, ObjectSensitivity, TypeSensitivity,
};
use oat_lib::pta::cs::CsPointerAnalysis;
use oat_lib::pta::{Obj, ObjId};
use utils::DiagnosticEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisChoice {
    Constprop,
    Live,
    Deadcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CallGraphChoice {
    Cha,
    Pta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ContextChoice {
    #[default]
    Insensitive,
    #[value(name = "1-call")]
    OneCall,
    #[value(name = "2-call")]
    TwoCall,
    #[value(name = "1-obj")]
    OneObj,
    #[value(name = "2-obj")]
    TwoObj,
    #[value(name = "1-type")]
    OneType,
    #[value(name = "2-type")]
    TwoType,
}

#[derive(Debug, CommandLineParser, Default)]
#[command(name = "oat", version, about = "Static analyses over a class-based IR.")]
pub struct Opt {
    /// Dump the control flow graph of every method in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Per-method dataflow analyses to run; the results are printed as
    /// annotated method bodies.
    #[arg(long, value_enum)]
    pub analyze: Vec<AnalysisChoice>,

    /// Build and print a whole-program call graph.
    #[arg(long, value_enum)]
    pub call_graph: Option<CallGraphChoice>,

    /// Run a pointer analysis and print the points-to sets.
    #[arg(long)]
    pub points_to: bool,

    /// Context sensitivity of the pointer analysis.
    #[arg(long, value_enum, default_value = "insensitive")]
    pub context: ContextChoice,

    /// File containing the program written in the language.
    pub filename: String,
}

fn concrete_methods(program: &Program) -> impl Iterator<Item = MethodId> + '_ {
    (0..program.methods.len())
        .map(MethodId)
        .filter(|&m| program.method(m).body.is_some())
}

fn fmt_obj(program: &Program, obj: &Obj) -> String {
    format!("{}/{}", program.qualified_name(obj.site.method), obj.site.stmt)
}

fn print_call_graph(program: &Program, call_graph: &CallGraph) -> String {
    let mut out = String::new();
    for edge in call_graph.edges() {
        out.push_str(&format!(
            "{}:{} -> {} [{:?}]\n",
            program.qualified_name(edge.call_site.method),
            edge.call_site.stmt,
            program.qualified_name(edge.callee),
            edge.kind
        ));
    }
    out
}

fn print_points_to<F, G>(program: &Program, points_to: F, obj_name: G) -> String
where
    F: Fn(VarId) -> BTreeSet<ObjId>,
    G: Fn(ObjId) -> String,
{
    let mut out = String::new();
    for method in concrete_methods(program) {
        for &var in &program.body(method).vars {
            let pts = points_to(var);
            if pts.is_empty() {
                continue;
            }
            let objs: Vec<String> = pts.iter().map(|&obj| obj_name(obj)).collect();
            out.push_str(&format!(
                "{}.{} -> {{{}}}\n",
                program.qualified_name(method),
                program.identifiers.get_name(program.var(var).name),
                objs.join(", ")
            ));
        }
    }
    out
}

fn run_context_sensitive<S: ContextSelector>(
    program: &Program,
    selector: S,
    diag: &mut DiagnosticEmitter,
) {
    let result = CsPointerAnalysis::new(program, selector).solve();
    let text = print_points_to(
        program,
        |var| result.var_points_to(var),
        |obj| fmt_obj(program, result.obj(obj)),
    );
    diag.out(&text);
}

pub fn process_source(src: &str, diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let lexer = Lexer::new(src, diag);
    let tokens = lexer.lex_all();
    if tokens.tokens.is_empty() {
        return None;
    }
    let parser = Parser::new(tokens, diag);
    let program = parser.parse()?;

    if opts.dump_cfg {
        for method in concrete_methods(&program) {
            let cfg = Cfg::new(&program, method);
            diag.out_ln(&print_cfg(&program, method, &cfg));
        }
    }

    for &choice in &opts.analyze {
        let analysis = match choice {
            AnalysisChoice::Constprop => Analyses::ConstProp,
            AnalysisChoice::Live => Analyses::LiveVars,
            AnalysisChoice::Deadcode => Analyses::DeadCode,
        };
        let results = get_analysis_results(analysis, &program);
        for method in concrete_methods(&program) {
            let anns = results.get(&method).cloned().unwrap_or_default();
            diag.out(&print_method(&program, method, &anns));
        }
    }

    if opts.call_graph.is_some() || opts.points_to {
        if program.entry.is_none() {
            diag.err_ln("Whole-program analysis needs a 'static method main()'.");
            return None;
        }
    }

    if let Some(choice) = opts.call_graph {
        let call_graph = match choice {
            CallGraphChoice::Cha => ChaBuilder::new(&program).build(),
            CallGraphChoice::Pta => PointerAnalysis::new(&program).solve().call_graph().clone(),
        };
        diag.out(&print_call_graph(&program, &call_graph));
    }

    if opts.points_to {
        match opts.context {
            ContextChoice::Insensitive => {
                let result = PointerAnalysis::new(&program).solve();
                let text = print_points_to(
                    &program,
                    |var| result.var_points_to(var),
                    |obj| fmt_obj(&program, result.obj(obj)),
                );
                diag.out(&text);
            }
            ContextChoice::OneCall => {
                run_context_sensitive(&program, CallSiteSensitivity { k: 1 }, diag)
            }
            ContextChoice::TwoCall => {
                run_context_sensitive(&program, CallSiteSensitivity { k: 2 }, diag)
            }
            ContextChoice::OneObj => {
                run_context_sensitive(&program, ObjectSensitivity { k: 1 }, diag)
            }
            ContextChoice::TwoObj => {
                run_context_sensitive(&program, ObjectSensitivity { k: 2 }, diag)
            }
            ContextChoice::OneType => {
                run_context_sensitive(&program, TypeSensitivity { k: 1 }, diag)
            }
            ContextChoice::TwoType => {
                run_context_sensitive(&program, TypeSensitivity { k: 2 }, diag)
            }
        }
    }

    Some(())
}
