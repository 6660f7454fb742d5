use core::fmt::Display;
use std::collections::HashMap;

use itertools::Itertools;

use crate::lexer::{Identifier, IdentifierTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Class(ClassId),
    Array(Box<Type>),
}

impl Type {
    /// The types constant propagation tracks. The IR collapses the narrow
    /// integer types (byte, short, char) into `int`; booleans are 0/1.
    pub fn is_int_like(&self) -> bool {
        matches!(self, Type::Int | Type::Bool)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Array(_))
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Type::Class(class) => Some(*class),
            _ => None,
        }
    }
}

/// Method name and descriptor without the declaring class. Overriding
/// methods share their overridden method's subsignature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subsignature {
    pub name: Identifier,
    pub params: Vec<Type>,
    pub ret: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Identifier,
    pub is_interface: bool,
    pub superclass: Option<ClassId>,
    /// Super-interfaces of an interface, implemented interfaces of a class.
    pub interfaces: Vec<ClassId>,
    pub subclasses: Vec<ClassId>,
    pub subinterfaces: Vec<ClassId>,
    pub implementors: Vec<ClassId>,
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Identifier,
    pub class: ClassId,
    pub ty: Type,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: Identifier,
    pub class: ClassId,
    pub subsig: Subsignature,
    pub is_static: bool,
    pub is_abstract: bool,
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    /// Every variable of the method, including `this` and the formals.
    pub vars: Vec<VarId>,
    /// Variables returned by some `return` statement.
    pub return_vars: Vec<VarId>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Var {
    pub name: Identifier,
    pub ty: Type,
    pub method: MethodId,
    /// Statement indices in the owning method where this variable is the
    /// base of the access or the receiver of the call. The pointer solvers
    /// consult these when the variable's points-to set grows.
    pub store_fields: Vec<usize>,
    pub load_fields: Vec<usize>,
    pub store_arrays: Vec<usize>,
    pub load_arrays: Vec<usize>,
    pub invokes: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    Var(VarId),
    Int(i32),
}

impl Atom {
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Atom::Var(var) => Some(*var),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }

    pub fn is_division(&self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// A field access; a missing base denotes a static field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccess {
    pub base: Option<VarId>,
    pub field: FieldId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayAccess {
    pub array: VarId,
    pub index: Atom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exp {
    Atom(Atom),
    Binary { op: BinaryOp, lhs: Atom, rhs: Atom },
    New(ClassId),
    NewArray { elem: Type, length: Atom },
    Cast { ty: Type, operand: VarId },
    LoadField(FieldAccess),
    LoadArray(ArrayAccess),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
    Dynamic,
}

/// The statically named target of a call site: the receiver class the call
/// is declared against, and a method carrying the referenced subsignature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef {
    pub class: ClassId,
    pub declared: MethodId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub kind: InvokeKind,
    pub recv: Option<VarId>,
    pub method_ref: MethodRef,
    pub args: Vec<Atom>,
    pub result: Option<VarId>,
}

/// Statements are a closed set; analyses match on the kind directly.
/// Branch targets are statement indices within the owning method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign {
        lhs: VarId,
        rhs: Exp,
    },
    StoreField {
        target: FieldAccess,
        value: Atom,
    },
    StoreArray {
        target: ArrayAccess,
        value: Atom,
    },
    Invoke(Invoke),
    If {
        op: BinaryOp,
        lhs: Atom,
        rhs: Atom,
        target: usize,
    },
    Goto {
        target: usize,
    },
    Switch {
        var: VarId,
        cases: Vec<(i32, usize)>,
        default: Option<usize>,
    },
    Return(Option<Atom>),
    Nop,
}

impl Stmt {
    /// The variable this statement defines, if any.
    pub fn def(&self) -> Option<VarId> {
        match self {
            Stmt::Assign { lhs, .. } => Some(*lhs),
            Stmt::Invoke(invoke) => invoke.result,
            _ => None,
        }
    }

    /// The variables this statement reads.
    pub fn uses(&self) -> Vec<VarId> {
        let mut uses = Vec::new();
        match self {
            Stmt::Assign { rhs, .. } => match rhs {
                Exp::Atom(a) => uses.extend(a.as_var()),
                Exp::Binary { lhs, rhs, .. } => {
                    uses.extend(lhs.as_var());
                    uses.extend(rhs.as_var());
                }
                Exp::New(_) => {}
                Exp::NewArray { length, .. } => uses.extend(length.as_var()),
                Exp::Cast { operand, .. } => uses.push(*operand),
                Exp::LoadField(access) => uses.extend(access.base),
                Exp::LoadArray(access) => {
                    uses.push(access.array);
                    uses.extend(access.index.as_var());
                }
            },
            Stmt::StoreField { target, value } => {
                uses.extend(target.base);
                uses.extend(value.as_var());
            }
            Stmt::StoreArray { target, value } => {
                uses.push(target.array);
                uses.extend(target.index.as_var());
                uses.extend(value.as_var());
            }
            Stmt::Invoke(invoke) => {
                uses.extend(invoke.recv);
                uses.extend(invoke.args.iter().filter_map(Atom::as_var));
            }
            Stmt::If { lhs, rhs, .. } => {
                uses.extend(lhs.as_var());
                uses.extend(rhs.as_var());
            }
            Stmt::Switch { var, .. } => uses.push(*var),
            Stmt::Return(value) => uses.extend(value.as_ref().and_then(Atom::as_var)),
            Stmt::Goto { .. } | Stmt::Nop => {}
        }
        uses
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub classes: Vec<Class>,
    pub methods: Vec<Method>,
    pub fields: Vec<Field>,
    pub vars: Vec<Var>,
    pub identifiers: IdentifierTable,
    /// The unique `static method main()`, when the program has one.
    pub entry: Option<MethodId>,
}

impl Program {
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0]
    }

    /// The body of a concrete method. Panics for abstract methods; the
    /// analyses only reach concrete ones.
    pub fn body(&self, method: MethodId) -> &Body {
        self.method(method)
            .body
            .as_ref()
            .expect("Method has no body.")
    }

    pub fn direct_subclasses_of(&self, class: ClassId) -> &[ClassId] {
        &self.class(class).subclasses
    }

    pub fn direct_subinterfaces_of(&self, class: ClassId) -> &[ClassId] {
        &self.class(class).subinterfaces
    }

    pub fn direct_implementors_of(&self, class: ClassId) -> &[ClassId] {
        &self.class(class).implementors
    }

    pub fn declared_method(&self, class: ClassId, subsig: &Subsignature) -> Option<MethodId> {
        self.class(class)
            .methods
            .iter()
            .copied()
            .find(|&m| self.method(m).subsig == *subsig)
    }

    /// Selects the concrete method a receiver of class `class` runs for
    /// `subsig`, walking the superclass chain. `None` when the chain has no
    /// concrete declaration.
    pub fn dispatch(&self, class: ClassId, subsig: &Subsignature) -> Option<MethodId> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(m) = self.declared_method(c, subsig) {
                if !self.method(m).is_abstract {
                    return Some(m);
                }
            }
            current = self.class(c).superclass;
        }
        None
    }

    pub fn class_named(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|c| self.identifiers.get_name(c.name) == name)
            .map(ClassId)
    }

    pub fn method_named(&self, class_name: &str, method_name: &str) -> Option<MethodId> {
        let class = self.class_named(class_name)?;
        self.class(class)
            .methods
            .iter()
            .copied()
            .find(|&m| self.identifiers.get_name(self.method(m).name) == method_name)
    }

    pub fn var_named(&self, method: MethodId, name: &str) -> Option<VarId> {
        self.body(method)
            .vars
            .iter()
            .copied()
            .find(|&v| self.identifiers.get_name(self.var(v).name) == name)
    }

    /// "Class.method", for diagnostics and printing.
    pub fn qualified_name(&self, method: MethodId) -> String {
        let m = self.method(method);
        format!(
            "{}.{}",
            self.identifiers.get_name(self.class(m.class).name),
            self.identifiers.get_name(m.name)
        )
    }
}

/////////////////////////
/// Printing the IR. ///
/////////////////////////

/// Per-statement annotations rendered as trailing comments by the printer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub post: HashMap<usize, Vec<String>>,
}

pub fn print_type(program: &Program, ty: &Type) -> String {
    match ty {
        Type::Int => "int".to_owned(),
        Type::Bool => "bool".to_owned(),
        Type::Class(class) => program
            .identifiers
            .get_name(program.class(*class).name)
            .to_owned(),
        Type::Array(elem) => format!("{}[]", print_type(program, elem)),
    }
}

fn print_atom(program: &Program, atom: &Atom) -> String {
    match atom {
        Atom::Var(var) => program.identifiers.get_name(program.var(*var).name).to_owned(),
        Atom::Int(value) => value.to_string(),
    }
}

fn print_field_access(program: &Program, access: &FieldAccess) -> String {
    let field = program.field(access.field);
    let base = match access.base {
        Some(var) => program.identifiers.get_name(program.var(var).name).to_owned(),
        None => program
            .identifiers
            .get_name(program.class(field.class).name)
            .to_owned(),
    };
    format!("{base}.{}", program.identifiers.get_name(field.name))
}

fn print_invoke(program: &Program, invoke: &Invoke) -> String {
    let callee = program.method(invoke.method_ref.declared);
    let recv = match invoke.recv {
        Some(var) => program.identifiers.get_name(program.var(var).name).to_owned(),
        None => program
            .identifiers
            .get_name(program.class(invoke.method_ref.class).name)
            .to_owned(),
    };
    let args = invoke
        .args
        .iter()
        .map(|arg| print_atom(program, arg))
        .join(", ");
    let call = format!(
        "{recv}.{}({args})",
        program.identifiers.get_name(callee.name)
    );
    match invoke.result {
        Some(var) => format!(
            "{} = {call}",
            program.identifiers.get_name(program.var(var).name)
        ),
        None => call,
    }
}

pub fn print_stmt(program: &Program, stmt: &Stmt) -> String {
    let var_name = |var: &VarId| program.identifiers.get_name(program.var(*var).name);
    match stmt {
        Stmt::Assign { lhs, rhs } => {
            let rhs = match rhs {
                Exp::Atom(atom) => print_atom(program, atom),
                Exp::Binary { op, lhs, rhs } => format!(
                    "{} {op} {}",
                    print_atom(program, lhs),
                    print_atom(program, rhs)
                ),
                Exp::New(class) => format!(
                    "new {}",
                    program.identifiers.get_name(program.class(*class).name)
                ),
                Exp::NewArray { elem, length } => format!(
                    "new {}[{}]",
                    print_type(program, elem),
                    print_atom(program, length)
                ),
                Exp::Cast { ty, operand } => {
                    format!("({}) {}", print_type(program, ty), var_name(operand))
                }
                Exp::LoadField(access) => print_field_access(program, access),
                Exp::LoadArray(access) => format!(
                    "{}[{}]",
                    var_name(&access.array),
                    print_atom(program, &access.index)
                ),
            };
            format!("{} = {rhs};", var_name(lhs))
        }
        Stmt::StoreField { target, value } => format!(
            "{} = {};",
            print_field_access(program, target),
            print_atom(program, value)
        ),
        Stmt::StoreArray { target, value } => format!(
            "{}[{}] = {};",
            var_name(&target.array),
            print_atom(program, &target.index),
            print_atom(program, value)
        ),
        Stmt::Invoke(invoke) => format!("{};", print_invoke(program, invoke)),
        Stmt::If {
            op,
            lhs,
            rhs,
            target,
        } => format!(
            "if {} {op} {} goto {target};",
            print_atom(program, lhs),
            print_atom(program, rhs)
        ),
        Stmt::Goto { target } => format!("goto {target};"),
        Stmt::Switch {
            var,
            cases,
            default,
        } => {
            let cases = cases
                .iter()
                .map(|(value, target)| format!("case {value}: {target};"))
                .join(" ");
            let default = match default {
                Some(target) => format!(" default: {target};"),
                None => String::new(),
            };
            format!("switch {} {{ {cases}{default} }}", var_name(var))
        }
        Stmt::Return(value) => match value {
            Some(atom) => format!("return {};", print_atom(program, atom)),
            None => "return;".to_owned(),
        },
        Stmt::Nop => "nop;".to_owned(),
    }
}

/// Prints a method body with statement indices, appending any annotations
/// as trailing comments.
pub fn print_method(program: &Program, method: MethodId, anns: &Annotations) -> String {
    let m = program.method(method);
    let params = m
        .body
        .as_ref()
        .map(|body| {
            body.params
                .iter()
                .map(|&p| {
                    format!(
                        "{}: {}",
                        program.identifiers.get_name(program.var(p).name),
                        print_type(program, &program.var(p).ty)
                    )
                })
                .join(", ")
        })
        .unwrap_or_default();
    let ret = match &m.subsig.ret {
        Some(ty) => format!(": {}", print_type(program, ty)),
        None => String::new(),
    };
    let mut result = format!("method {}({params}){ret} {{\n", program.qualified_name(method));
    if let Some(body) = &m.body {
        for (index, stmt) in body.stmts.iter().enumerate() {
            result.push_str(&format!("  {index}: {}", print_stmt(program, stmt)));
            if let Some(notes) = anns.post.get(&index) {
                result.push_str(&format!(" /* {} */", notes.iter().join(", ")));
            }
            result.push('\n');
        }
    }
    result.push_str("}\n");
    result
}
