use analysis::{
    domains::{Map, Value},
    solvers::{DataflowAnalysis, DataflowResult, WorklistSolver},
};

use crate::{cfg::Cfg, ir::*};

pub type CpFact = Map<VarId, Value>;

/// Intraprocedural constant propagation over the flat integer lattice.
/// Formal parameters enter as `Nac`; loads, allocations, casts, and call
/// results are never constant.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPropagation<'p> {
    program: &'p Program,
    method: MethodId,
}

impl<'p> ConstantPropagation<'p> {
    pub fn new(program: &'p Program, method: MethodId) -> Self {
        Self { program, method }
    }

    pub fn solve(&self, cfg: &Cfg) -> DataflowResult<CpFact> {
        WorklistSolver.solve(cfg, self)
    }
}

impl DataflowAnalysis<Cfg> for ConstantPropagation<'_> {
    type Fact = CpFact;

    fn is_forward(&self) -> bool {
        true
    }

    fn boundary_fact(&self, _cfg: &Cfg) -> CpFact {
        let mut fact = CpFact::new();
        for &param in &self.program.body(self.method).params {
            if self.program.var(param).ty.is_int_like() {
                fact.update(param, Value::Nac);
            }
        }
        fact
    }

    fn initial_fact(&self) -> CpFact {
        CpFact::new()
    }

    fn meet_into(&self, fact: &CpFact, target: &mut CpFact) {
        target.join_with(fact);
    }

    fn transfer_node(&self, node: usize, input: &CpFact, output: &mut CpFact) -> bool {
        let mut new = input.clone();
        // The synthetic entry and exit nodes transfer by identity.
        if let Some(stmt) = self.program.body(self.method).stmts.get(node) {
            if let Some(def) = stmt.def() {
                if self.program.var(def).ty.is_int_like() {
                    let value = match stmt {
                        Stmt::Assign { rhs, .. } => evaluate(rhs, &new),
                        _ => Value::Nac,
                    };
                    new.update(def, value);
                }
            }
        }
        output.assign_from(&new)
    }
}

/// Abstract evaluation of a right-hand side under the incoming fact.
/// Anything that is not an atom or a binary operation is `Nac`.
pub fn evaluate(exp: &Exp, fact: &CpFact) -> Value {
    match exp {
        Exp::Atom(atom) => evaluate_atom(atom, fact),
        Exp::Binary { op, lhs, rhs } => {
            evaluate_binary(*op, evaluate_atom(lhs, fact), evaluate_atom(rhs, fact))
        }
        _ => Value::Nac,
    }
}

pub fn evaluate_atom(atom: &Atom, fact: &CpFact) -> Value {
    match atom {
        Atom::Var(var) => fact.get_or_bottom(var),
        Atom::Int(value) => Value::Const(*value),
    }
}

/// An undefined operand poisons the result; division and remainder by a
/// constant zero also yield undefined instead of trapping. Arithmetic wraps
/// on 32-bit two's complement, `>>>` is the logical right shift.
pub fn evaluate_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    if lhs.is_undef() || rhs.is_undef() {
        return Value::Undef;
    }
    if op.is_division() && rhs == Value::Const(0) {
        return Value::Undef;
    }
    let (Value::Const(a), Value::Const(b)) = (lhs, rhs)
    else {
        return Value::Nac;
    };
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Rem => a.wrapping_rem(b),
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        BinaryOp::Ushr => ((a as u32).wrapping_shr(b as u32)) as i32,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Eq => (a == b) as i32,
        BinaryOp::Ne => (a != b) as i32,
        BinaryOp::Lt => (a < b) as i32,
        BinaryOp::Gt => (a > b) as i32,
        BinaryOp::Le => (a <= b) as i32,
        BinaryOp::Ge => (a >= b) as i32,
    };
    Value::Const(result)
}

/// Renders the value of each defined variable after its defining statement.
pub fn annotate(program: &Program, method: MethodId) -> Annotations {
    let cfg = Cfg::new(program, method);
    let result = ConstantPropagation::new(program, method).solve(&cfg);
    let mut anns = Annotations::default();
    for (index, stmt) in program.body(method).stmts.iter().enumerate() {
        let Some(def) = stmt.def()
        else {
            continue;
        };
        if !program.var(def).ty.is_int_like() {
            continue;
        }
        let value = result.out_fact(cfg.node_of_stmt(index)).get_or_bottom(&def);
        anns.post.entry(index).or_default().push(format!(
            "{}: {}",
            program.identifiers.get_name(program.var(def).name),
            value
        ));
    }
    anns
}
