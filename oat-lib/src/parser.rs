use std::collections::{HashMap, HashSet};

use utils::DiagnosticEmitter;

use crate::{
    ir::*,
    lexer::{Identifier, LexResult, Token, TokenValue},
};

/// Parses the token stream in two passes: a declaration scan that registers
/// every class, interface, field, and method signature (bodies are skipped
/// by brace matching), then a body pass that lowers statements with all
/// types resolved. Classes may therefore reference each other freely.
pub struct Parser<'src> {
    current_tok: usize,
    tokens: Vec<Token>,
    program: Program,
    class_map: HashMap<Identifier, ClassId>,
    declared: Vec<bool>,
    first_ref: Vec<Token>,
    pending_bodies: Vec<PendingBody>,

    // State of the body currently being lowered.
    current_method: MethodId,
    body: Body,
    symbols: HashMap<Identifier, VarId>,
    fixups: Vec<Fixup>,

    diag: &'src mut DiagnosticEmitter,
}

struct PendingBody {
    method: MethodId,
    params: Vec<(Identifier, Type)>,
    body_start: usize,
}

/// A branch target still naming a label; resolved once the whole body has
/// been parsed.
struct Fixup {
    stmt: usize,
    slot: FixupSlot,
    label: Identifier,
    tok: Token,
}

enum FixupSlot {
    If,
    Goto,
    Case(usize),
    Default,
}

enum Base {
    Var(VarId),
    Class(ClassId),
}

use TokenValue::*;

impl<'src> Parser<'src> {
    pub fn new(lexed: LexResult, diag: &'src mut DiagnosticEmitter) -> Self {
        let LexResult {
            tokens,
            identifier_table,
        } = lexed;

        Parser {
            current_tok: 0,
            tokens,
            program: Program {
                identifiers: identifier_table,
                ..Program::default()
            },
            class_map: HashMap::new(),
            declared: Vec::new(),
            first_ref: Vec::new(),
            pending_bodies: Vec::new(),
            current_method: MethodId(0),
            body: Body::default(),
            symbols: HashMap::new(),
            fixups: Vec::new(),
            diag,
        }
    }

    pub fn parse(mut self) -> Option<Program> {
        self.scan_declarations()?;
        self.link_hierarchy()?;
        self.parse_bodies()?;
        self.finalize();
        Some(self.program)
    }

    ////////////////////////////////
    /// Pass 1: declaration scan ///
    ////////////////////////////////

    fn scan_declarations(&mut self) -> Option<()> {
        while !self.is_at_end() {
            if self.try_consume(Class).is_some() {
                self.scan_class(false)?;
            } else if self.try_consume(Interface).is_some() {
                self.scan_class(true)?;
            } else {
                self.error(self.peek(), "'class' or 'interface' expected.");
                return None;
            }
        }
        Some(())
    }

    fn scan_class(&mut self, is_interface: bool) -> Option<()> {
        let (name_tok, name) = self.consume_id()?;
        let class = self.get_or_create_class(name, name_tok);
        if self.declared[class.0] {
            self.error(
                name_tok,
                &format!(
                    "Duplicate declaration of '{}'.",
                    self.program.identifiers.get_name(name)
                ),
            );
            return None;
        }
        self.declared[class.0] = true;
        self.program.classes[class.0].is_interface = is_interface;

        if self.try_consume(Colon).is_some() {
            if is_interface {
                loop {
                    let (tok, id) = self.consume_id()?;
                    let super_interface = self.get_or_create_class(id, tok);
                    self.program.classes[class.0].interfaces.push(super_interface);
                    if self.try_consume(Comma).is_none() {
                        break;
                    }
                }
            } else {
                let (tok, id) = self.consume_id()?;
                let superclass = self.get_or_create_class(id, tok);
                self.program.classes[class.0].superclass = Some(superclass);
            }
        }
        if self.try_consume(Impl).is_some() {
            if is_interface {
                self.error(self.previous(), "An interface cannot implement.");
                return None;
            }
            loop {
                let (tok, id) = self.consume_id()?;
                let interface = self.get_or_create_class(id, tok);
                self.program.classes[class.0].interfaces.push(interface);
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }

        self.consume(LeftBrace, "")?;
        while !self.check(RightBrace) {
            if self.is_at_end() {
                self.error(self.peek(), "Unterminated class body.");
                return None;
            }
            self.scan_member(class, is_interface)?;
        }
        self.consume(RightBrace, "")?;
        Some(())
    }

    fn scan_member(&mut self, class: ClassId, is_interface: bool) -> Option<()> {
        let is_static = self.try_consume(Static).is_some();
        let is_abstract = self.try_consume(Abstract).is_some();

        if let Some(tok) = self.try_consume(Field) {
            if is_abstract || is_interface {
                self.error(tok, "Fields cannot be abstract.");
                return None;
            }
            let (_, name) = self.consume_id()?;
            self.consume(Colon, "")?;
            let ty = self.parse_type(true)?;
            self.consume(Semicolon, "")?;
            let field = FieldId(self.program.fields.len());
            self.program.fields.push(crate::ir::Field {
                name,
                class,
                ty,
                is_static,
            });
            self.program.classes[class.0].fields.push(field);
            return Some(());
        }

        self.consume(Method, "")?;
        let (name_tok, name) = self.consume_id()?;
        self.consume(LeftParen, "")?;
        let mut params = Vec::new();
        if !self.check(RightParen) {
            loop {
                let (_, param) = self.consume_id()?;
                self.consume(Colon, "")?;
                let ty = self.parse_type(true)?;
                params.push((param, ty));
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume(RightParen, "")?;
        let ret = if self.try_consume(Colon).is_some() {
            Some(self.parse_type(true)?)
        } else {
            None
        };

        let is_abstract = is_abstract || is_interface;
        if is_abstract && is_static {
            self.error(name_tok, "A static method cannot be abstract.");
            return None;
        }
        let subsig = Subsignature {
            name,
            params: params.iter().map(|(_, ty)| ty.clone()).collect(),
            ret,
        };
        if self.program.declared_method(class, &subsig).is_some() {
            self.error(
                name_tok,
                &format!(
                    "Duplicate method '{}'.",
                    self.program.identifiers.get_name(name)
                ),
            );
            return None;
        }
        let method = MethodId(self.program.methods.len());
        self.program.methods.push(crate::ir::Method {
            name,
            class,
            subsig,
            is_static,
            is_abstract,
            body: None,
        });
        self.program.classes[class.0].methods.push(method);

        if is_abstract {
            self.consume(Semicolon, "")?;
        } else {
            self.consume(LeftBrace, "")?;
            let body_start = self.current_tok;
            self.skip_block()?;
            self.pending_bodies.push(PendingBody {
                method,
                params,
                body_start,
            });
        }
        Some(())
    }

    fn skip_block(&mut self) -> Option<()> {
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                self.error(self.peek(), "Unterminated method body.");
                return None;
            }
            match self.advance().value {
                LeftBrace => depth += 1,
                RightBrace => depth -= 1,
                _ => {}
            }
        }
        Some(())
    }

    fn get_or_create_class(&mut self, name: Identifier, tok: Token) -> ClassId {
        if let Some(&class) = self.class_map.get(&name) {
            return class;
        }
        let class = ClassId(self.program.classes.len());
        self.program.classes.push(crate::ir::Class {
            name,
            is_interface: false,
            superclass: None,
            interfaces: Vec::new(),
            subclasses: Vec::new(),
            subinterfaces: Vec::new(),
            implementors: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        });
        self.declared.push(false);
        self.first_ref.push(tok);
        self.class_map.insert(name, class);
        class
    }

    /// Checks that every referenced class was declared and records the
    /// direct subclass, subinterface, and implementor links the hierarchy
    /// queries serve.
    fn link_hierarchy(&mut self) -> Option<()> {
        for idx in 0..self.program.classes.len() {
            if !self.declared[idx] {
                let name = self.program.classes[idx].name;
                self.error(
                    self.first_ref[idx],
                    &format!(
                        "Undefined class '{}'.",
                        self.program.identifiers.get_name(name)
                    ),
                );
                return None;
            }
        }

        for idx in 0..self.program.classes.len() {
            let class = ClassId(idx);
            let is_interface = self.program.classes[idx].is_interface;
            if let Some(superclass) = self.program.classes[idx].superclass {
                if self.program.class(superclass).is_interface {
                    self.error(self.first_ref[idx], "Cannot extend an interface.");
                    return None;
                }
                self.program.classes[superclass.0].subclasses.push(class);
            }
            let interfaces = self.program.classes[idx].interfaces.clone();
            for interface in interfaces {
                if !self.program.class(interface).is_interface {
                    self.error(self.first_ref[idx], "Expected an interface.");
                    return None;
                }
                if is_interface {
                    self.program.classes[interface.0].subinterfaces.push(class);
                } else {
                    self.program.classes[interface.0].implementors.push(class);
                }
            }
        }
        Some(())
    }

    /////////////////////////
    /// Pass 2: bodies.   ///
    /////////////////////////

    fn parse_bodies(&mut self) -> Option<()> {
        let pending = core::mem::take(&mut self.pending_bodies);
        for pending_body in pending {
            self.parse_body(pending_body)?;
        }
        Some(())
    }

    fn parse_body(&mut self, pending: PendingBody) -> Option<()> {
        self.current_tok = pending.body_start;
        self.current_method = pending.method;
        self.body = Body::default();
        self.symbols = HashMap::new();
        self.fixups = Vec::new();

        let method = self.program.method(pending.method);
        let (class, is_static) = (method.class, method.is_static);
        if !is_static {
            let this_name = self.program.identifiers.get_identifier("this");
            let this_var = self.new_var(this_name, Type::Class(class));
            self.body.this_var = Some(this_var);
        }
        for (name, ty) in pending.params {
            let param = self.new_var(name, ty);
            self.body.params.push(param);
            self.symbols.insert(name, param);
        }

        let mut labels = HashMap::new();
        while !self.check(RightBrace) {
            if self.is_at_end() {
                self.error(self.peek(), "Unterminated method body.");
                return None;
            }
            while matches!(self.peek().value, Id(_)) && self.peek_ahead(1).value == Colon {
                let (tok, label) = self.consume_id()?;
                self.consume(Colon, "")?;
                if labels.insert(label, self.body.stmts.len()).is_some() {
                    self.error(tok, "Duplicate label.");
                    return None;
                }
            }
            let stmt = self.parse_stmt()?;
            self.body.stmts.push(stmt);
        }
        self.consume(RightBrace, "")?;

        let fixups = core::mem::take(&mut self.fixups);
        for fixup in fixups {
            let Some(&target) = labels.get(&fixup.label)
            else {
                self.error(
                    fixup.tok,
                    &format!(
                        "Undefined label '{}'.",
                        self.program.identifiers.get_name(fixup.label)
                    ),
                );
                return None;
            };
            match (&mut self.body.stmts[fixup.stmt], fixup.slot) {
                (Stmt::If { target: slot, .. }, FixupSlot::If) => *slot = target,
                (Stmt::Goto { target: slot }, FixupSlot::Goto) => *slot = target,
                (Stmt::Switch { cases, .. }, FixupSlot::Case(case)) => cases[case].1 = target,
                (Stmt::Switch { default, .. }, FixupSlot::Default) => *default = Some(target),
                _ => panic!("Fixup does not match its statement."),
            }
        }

        let body = core::mem::take(&mut self.body);
        self.program.methods[pending.method.0].body = Some(body);
        Some(())
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let stmt_index = self.body.stmts.len();

        if self.try_consume(If).is_some() {
            let lhs = self.parse_atom()?;
            let op = self.parse_comparison()?;
            let rhs = self.parse_atom()?;
            self.consume(Goto, "")?;
            let (tok, label) = self.consume_id()?;
            self.consume(Semicolon, "")?;
            self.fixups.push(Fixup {
                stmt: stmt_index,
                slot: FixupSlot::If,
                label,
                tok,
            });
            return Some(Stmt::If {
                op,
                lhs,
                rhs,
                target: 0,
            });
        }

        if self.try_consume(Goto).is_some() {
            let (tok, label) = self.consume_id()?;
            self.consume(Semicolon, "")?;
            self.fixups.push(Fixup {
                stmt: stmt_index,
                slot: FixupSlot::Goto,
                label,
                tok,
            });
            return Some(Stmt::Goto { target: 0 });
        }

        if self.try_consume(Switch).is_some() {
            let (var_tok, name) = self.consume_id()?;
            let Some(&var) = self.symbols.get(&name)
            else {
                self.undefined_variable(var_tok, name);
                return None;
            };
            self.consume(LeftBrace, "")?;
            let mut cases = Vec::new();
            let mut has_default = false;
            loop {
                if self.try_consume(Case).is_some() {
                    let value = self.consume_integer()?;
                    self.consume(Colon, "")?;
                    let (tok, label) = self.consume_id()?;
                    self.consume(Semicolon, "")?;
                    self.fixups.push(Fixup {
                        stmt: stmt_index,
                        slot: FixupSlot::Case(cases.len()),
                        label,
                        tok,
                    });
                    cases.push((value, 0));
                } else if let Some(default_tok) = self.try_consume(Default) {
                    if has_default {
                        self.error(default_tok, "Duplicate default case.");
                        return None;
                    }
                    has_default = true;
                    self.consume(Colon, "")?;
                    let (tok, label) = self.consume_id()?;
                    self.consume(Semicolon, "")?;
                    self.fixups.push(Fixup {
                        stmt: stmt_index,
                        slot: FixupSlot::Default,
                        label,
                        tok,
                    });
                } else {
                    break;
                }
            }
            self.consume(RightBrace, "")?;
            return Some(Stmt::Switch {
                var,
                cases,
                default: None,
            });
        }

        if self.try_consume(Return).is_some() {
            if self.try_consume(Semicolon).is_some() {
                return Some(Stmt::Return(None));
            }
            let value = self.parse_atom()?;
            self.consume(Semicolon, "")?;
            if let Some(var) = value.as_var() {
                if !self.body.return_vars.contains(&var) {
                    self.body.return_vars.push(var);
                }
            }
            return Some(Stmt::Return(Some(value)));
        }

        if self.try_consume(Nop).is_some() {
            self.consume(Semicolon, "")?;
            return Some(Stmt::Nop);
        }

        match (self.peek().value, self.peek_ahead(1).value) {
            // Field store or result-less invoke.
            (Id(_) | This, Dot) => {
                let base = self.parse_base()?;
                self.consume(Dot, "")?;
                let (member_tok, member) = self.consume_id()?;
                if self.check(LeftParen) {
                    let invoke = self.parse_invoke(base, member, member_tok, None)?;
                    self.consume(Semicolon, "")?;
                    return Some(Stmt::Invoke(invoke));
                }
                self.consume(Define, "")?;
                let value = self.parse_atom()?;
                self.consume(Semicolon, "")?;
                let target = self.resolve_field_access(base, member, member_tok)?;
                Some(Stmt::StoreField { target, value })
            }
            // Array store.
            (Id(_), LeftBracket) => {
                let (tok, name) = self.consume_id()?;
                let Some(&array) = self.symbols.get(&name)
                else {
                    self.undefined_variable(tok, name);
                    return None;
                };
                if !matches!(self.program.var(array).ty, Type::Array(_)) {
                    self.error(tok, "Not an array.");
                    return None;
                }
                self.consume(LeftBracket, "")?;
                let index = self.parse_atom()?;
                self.consume(RightBracket, "")?;
                self.consume(Define, "")?;
                let value = self.parse_atom()?;
                self.consume(Semicolon, "")?;
                Some(Stmt::StoreArray {
                    target: ArrayAccess { array, index },
                    value,
                })
            }
            // Assignment, possibly of a call result.
            (Id(_), Define) => {
                let (lhs_tok, lhs_name) = self.consume_id()?;
                self.consume(Define, "")?;
                if matches!(self.peek().value, Id(_) | This)
                    && self.peek_ahead(1).value == Dot
                    && self.peek_ahead(3).value == LeftParen
                {
                    let base = self.parse_base()?;
                    self.consume(Dot, "")?;
                    let (member_tok, member) = self.consume_id()?;
                    let invoke =
                        self.parse_invoke(base, member, member_tok, Some((lhs_tok, lhs_name)))?;
                    self.consume(Semicolon, "")?;
                    return Some(Stmt::Invoke(invoke));
                }
                let (rhs, ty) = self.parse_exp()?;
                self.consume(Semicolon, "")?;
                let lhs = self.define_var(lhs_tok, lhs_name, ty)?;
                Some(Stmt::Assign { lhs, rhs })
            }
            _ => {
                self.error(self.peek(), "Statement expected.");
                None
            }
        }
    }

    fn parse_exp(&mut self) -> Option<(Exp, Type)> {
        if self.try_consume(New).is_some() {
            let elem = self.parse_base_type()?;
            if self.try_consume(LeftBracket).is_some() {
                let length = self.parse_atom()?;
                self.consume(RightBracket, "")?;
                let ty = Type::Array(Box::new(elem.clone()));
                return Some((Exp::NewArray { elem, length }, ty));
            }
            let Some(class) = elem.as_class()
            else {
                self.error(self.previous(), "Can only allocate class instances or arrays.");
                return None;
            };
            if self.program.class(class).is_interface {
                self.error(self.previous(), "Cannot instantiate an interface.");
                return None;
            }
            return Some((Exp::New(class), Type::Class(class)));
        }

        if self.try_consume(LeftParen).is_some() {
            let ty = self.parse_type(false)?;
            self.consume(RightParen, "")?;
            let (tok, name) = self.consume_id()?;
            let Some(&operand) = self.symbols.get(&name)
            else {
                self.undefined_variable(tok, name);
                return None;
            };
            return Some((
                Exp::Cast {
                    ty: ty.clone(),
                    operand,
                },
                ty,
            ));
        }

        match (self.peek().value, self.peek_ahead(1).value) {
            (Id(_) | This, Dot) => {
                let base = self.parse_base()?;
                self.consume(Dot, "")?;
                let (member_tok, member) = self.consume_id()?;
                let access = self.resolve_field_access(base, member, member_tok)?;
                let ty = self.program.field(access.field).ty.clone();
                Some((Exp::LoadField(access), ty))
            }
            (Id(_), LeftBracket) => {
                let (tok, name) = self.consume_id()?;
                let Some(&array) = self.symbols.get(&name)
                else {
                    self.undefined_variable(tok, name);
                    return None;
                };
                let Type::Array(elem) = self.program.var(array).ty.clone()
                else {
                    self.error(tok, "Not an array.");
                    return None;
                };
                self.consume(LeftBracket, "")?;
                let index = self.parse_atom()?;
                self.consume(RightBracket, "")?;
                Some((Exp::LoadArray(ArrayAccess { array, index }), *elem))
            }
            _ => {
                let lhs = self.parse_atom()?;
                if let Some(op) = self.parse_binary_op() {
                    let rhs = self.parse_atom()?;
                    let ty = if op.is_comparison() {
                        Type::Bool
                    } else {
                        Type::Int
                    };
                    return Some((Exp::Binary { op, lhs, rhs }, ty));
                }
                let ty = match lhs {
                    Atom::Var(var) => self.program.var(var).ty.clone(),
                    Atom::Int(_) => Type::Int,
                };
                Some((Exp::Atom(lhs), ty))
            }
        }
    }

    fn parse_invoke(
        &mut self,
        base: Base,
        name: Identifier,
        name_tok: Token,
        result: Option<(Token, Identifier)>,
    ) -> Option<Invoke> {
        self.consume(LeftParen, "")?;
        let mut args = Vec::new();
        if !self.check(RightParen) {
            loop {
                args.push(self.parse_atom()?);
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume(RightParen, "")?;

        let (kind, recv, class) = match base {
            Base::Var(var) => {
                let Some(class) = self.program.var(var).ty.as_class()
                else {
                    self.error(name_tok, "Receiver is not a class instance.");
                    return None;
                };
                let kind = if self.program.class(class).is_interface {
                    InvokeKind::Interface
                } else {
                    InvokeKind::Virtual
                };
                (kind, Some(var), class)
            }
            Base::Class(class) => (InvokeKind::Static, None, class),
        };
        let declared = self.resolve_method_ref(class, name, args.len(), name_tok, kind)?;

        let result = match result {
            Some((tok, result_name)) => {
                let Some(ret) = self.program.method(declared).subsig.ret.clone()
                else {
                    self.error(name_tok, "Callee does not return a value.");
                    return None;
                };
                Some(self.define_var(tok, result_name, ret)?)
            }
            None => None,
        };

        Some(Invoke {
            kind,
            recv,
            method_ref: MethodRef { class, declared },
            args,
            result,
        })
    }

    /// Finds the method a call site names: in the receiver class itself for
    /// static calls, otherwise anywhere in the receiver's superclass chain
    /// and transitive interfaces.
    fn resolve_method_ref(
        &mut self,
        class: ClassId,
        name: Identifier,
        arity: usize,
        tok: Token,
        kind: InvokeKind,
    ) -> Option<MethodId> {
        let matches_sig = |program: &Program, m: MethodId| {
            let method = program.method(m);
            method.name == name && method.subsig.params.len() == arity
        };
        if kind == InvokeKind::Static {
            if let Some(&found) = self
                .program
                .class(class)
                .methods
                .iter()
                .find(|&&m| matches_sig(&self.program, m) && self.program.method(m).is_static)
            {
                return Some(found);
            }
        } else {
            let mut worklist = vec![class];
            let mut visited = HashSet::new();
            visited.insert(class);
            while let Some(current) = worklist.pop() {
                if let Some(&found) = self
                    .program
                    .class(current)
                    .methods
                    .iter()
                    .find(|&&m| matches_sig(&self.program, m) && !self.program.method(m).is_static)
                {
                    return Some(found);
                }
                let c = self.program.class(current);
                for next in c.superclass.iter().chain(c.interfaces.iter()) {
                    if visited.insert(*next) {
                        worklist.push(*next);
                    }
                }
            }
        }
        self.error(
            tok,
            &format!(
                "Unknown method '{}'.",
                self.program.identifiers.get_name(name)
            ),
        );
        None
    }

    fn resolve_field_access(
        &mut self,
        base: Base,
        name: Identifier,
        tok: Token,
    ) -> Option<FieldAccess> {
        let find = |program: &Program, class: ClassId, is_static: bool| {
            let mut current = Some(class);
            while let Some(c) = current {
                if let Some(&field) = program.class(c).fields.iter().find(|&&f| {
                    program.field(f).name == name && program.field(f).is_static == is_static
                }) {
                    return Some(field);
                }
                current = program.class(c).superclass;
            }
            None
        };
        match base {
            Base::Var(var) => {
                let Some(class) = self.program.var(var).ty.as_class()
                else {
                    self.error(tok, "Base is not a class instance.");
                    return None;
                };
                let Some(field) = find(&self.program, class, false)
                else {
                    self.unknown_field(tok, name);
                    return None;
                };
                Some(FieldAccess {
                    base: Some(var),
                    field,
                })
            }
            Base::Class(class) => {
                let Some(field) = find(&self.program, class, true)
                else {
                    self.unknown_field(tok, name);
                    return None;
                };
                Some(FieldAccess { base: None, field })
            }
        }
    }

    fn parse_base(&mut self) -> Option<Base> {
        if let Some(tok) = self.try_consume(This) {
            let Some(this_var) = self.body.this_var
            else {
                self.error(tok, "'this' in a static method.");
                return None;
            };
            return Some(Base::Var(this_var));
        }
        let (tok, name) = self.consume_id()?;
        if let Some(&var) = self.symbols.get(&name) {
            return Some(Base::Var(var));
        }
        if let Some(&class) = self.class_map.get(&name) {
            return Some(Base::Class(class));
        }
        self.undefined_variable(tok, name);
        None
    }

    fn parse_atom(&mut self) -> Option<Atom> {
        if let Some(tok) = self.try_consume(This) {
            let Some(this_var) = self.body.this_var
            else {
                self.error(tok, "'this' in a static method.");
                return None;
            };
            return Some(Atom::Var(this_var));
        }
        if let Integer(value) = self.peek().value {
            self.advance();
            return Some(Atom::Int(value));
        }
        let (tok, name) = self.consume_id()?;
        let Some(&var) = self.symbols.get(&name)
        else {
            self.undefined_variable(tok, name);
            return None;
        };
        Some(Atom::Var(var))
    }

    fn parse_binary_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek().value {
            Add => BinaryOp::Add,
            Sub => BinaryOp::Sub,
            Mul => BinaryOp::Mul,
            Div => BinaryOp::Div,
            Rem => BinaryOp::Rem,
            Shl => BinaryOp::Shl,
            Shr => BinaryOp::Shr,
            Ushr => BinaryOp::Ushr,
            BitAnd => BinaryOp::And,
            BitOr => BinaryOp::Or,
            BitXor => BinaryOp::Xor,
            Equal => BinaryOp::Eq,
            NotEqual => BinaryOp::Ne,
            LessThan => BinaryOp::Lt,
            GreaterThan => BinaryOp::Gt,
            LessThanOrEq => BinaryOp::Le,
            GreaterThanOrEq => BinaryOp::Ge,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Option<BinaryOp> {
        match self.parse_binary_op() {
            Some(op) if op.is_comparison() => Some(op),
            _ => {
                self.error(self.peek(), "Comparison operator expected.");
                None
            }
        }
    }

    /// A type without array suffixes: the element type of an allocation.
    fn parse_base_type(&mut self) -> Option<Type> {
        if self.try_consume(Int).is_some() {
            return Some(Type::Int);
        }
        if self.try_consume(Bool).is_some() {
            return Some(Type::Bool);
        }
        let (tok, name) = self.consume_id()?;
        self.lookup_class(tok, name).map(Type::Class)
    }

    fn parse_type(&mut self, allow_forward: bool) -> Option<Type> {
        let mut ty = if self.try_consume(Int).is_some() {
            Type::Int
        } else if self.try_consume(Bool).is_some() {
            Type::Bool
        } else if matches!(self.peek().value, Id(_)) {
            let (tok, name) = self.consume_id()?;
            if allow_forward {
                Type::Class(self.get_or_create_class(name, tok))
            } else {
                Type::Class(self.lookup_class(tok, name)?)
            }
        } else {
            self.error(self.peek(), "Type expected.");
            return None;
        };
        while self.try_consume(LeftBracket).is_some() {
            self.consume(RightBracket, "")?;
            ty = Type::Array(Box::new(ty));
        }
        Some(ty)
    }

    fn lookup_class(&mut self, tok: Token, name: Identifier) -> Option<ClassId> {
        if let Some(&class) = self.class_map.get(&name) {
            return Some(class);
        }
        self.error(
            tok,
            &format!(
                "Undefined class '{}'.",
                self.program.identifiers.get_name(name)
            ),
        );
        None
    }

    fn new_var(&mut self, name: Identifier, ty: Type) -> VarId {
        let var = VarId(self.program.vars.len());
        self.program.vars.push(Var {
            name,
            ty,
            method: self.current_method,
            store_fields: Vec::new(),
            load_fields: Vec::new(),
            store_arrays: Vec::new(),
            load_arrays: Vec::new(),
            invokes: Vec::new(),
        });
        self.body.vars.push(var);
        var
    }

    /// Variables are defined at their first assignment; later assignments
    /// have to agree on the type.
    fn define_var(&mut self, tok: Token, name: Identifier, ty: Type) -> Option<VarId> {
        if let Some(&var) = self.symbols.get(&name) {
            if self.program.var(var).ty != ty {
                self.error(
                    tok,
                    &format!(
                        "Conflicting types for '{}'.",
                        self.program.identifiers.get_name(name)
                    ),
                );
                return None;
            }
            return Some(var);
        }
        let var = self.new_var(name, ty);
        self.symbols.insert(name, var);
        Some(var)
    }

    //////////////////
    /// Finishing. ///
    //////////////////

    fn finalize(&mut self) {
        let main = self.program.identifiers.get_identifier("main");
        self.program.entry = self
            .program
            .methods
            .iter()
            .position(|m| m.is_static && m.name == main && m.subsig.params.is_empty())
            .map(MethodId);

        self.index_var_accesses();
    }

    /// Populates the per-variable lists of statements where the variable is
    /// a base or a receiver; the pointer solvers walk these.
    fn index_var_accesses(&mut self) {
        enum Access {
            LoadField,
            StoreField,
            LoadArray,
            StoreArray,
            Invoke,
        }
        let mut sites = Vec::new();
        for method in &self.program.methods {
            let Some(body) = &method.body
            else {
                continue;
            };
            for (index, stmt) in body.stmts.iter().enumerate() {
                match stmt {
                    Stmt::Assign {
                        rhs: Exp::LoadField(access),
                        ..
                    } => {
                        if let Some(base) = access.base {
                            sites.push((base, Access::LoadField, index));
                        }
                    }
                    Stmt::Assign {
                        rhs: Exp::LoadArray(access),
                        ..
                    } => sites.push((access.array, Access::LoadArray, index)),
                    Stmt::StoreField { target, .. } => {
                        if let Some(base) = target.base {
                            sites.push((base, Access::StoreField, index));
                        }
                    }
                    Stmt::StoreArray { target, .. } => {
                        sites.push((target.array, Access::StoreArray, index))
                    }
                    Stmt::Invoke(invoke) => {
                        if let Some(recv) = invoke.recv {
                            sites.push((recv, Access::Invoke, index));
                        }
                    }
                    _ => {}
                }
            }
        }
        for (var, access, index) in sites {
            let var = &mut self.program.vars[var.0];
            match access {
                Access::LoadField => var.load_fields.push(index),
                Access::StoreField => var.store_fields.push(index),
                Access::LoadArray => var.load_arrays.push(index),
                Access::StoreArray => var.store_arrays.push(index),
                Access::Invoke => var.invokes.push(index),
            }
        }
    }

    ///////////////////////////
    /// Token stream access ///
    ///////////////////////////

    fn peek(&self) -> Token {
        self.tokens[self.current_tok]
    }

    fn peek_ahead(&self, offset: usize) -> Token {
        let index = (self.current_tok + offset).min(self.tokens.len() - 1);
        self.tokens[index]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current_tok - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().value, EndOfFile)
    }

    fn check(&self, tok_val: TokenValue) -> bool {
        if self.is_at_end() {
            false
        } else {
            core::mem::discriminant(&self.peek().value) == core::mem::discriminant(&tok_val)
        }
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current_tok += 1;
        }
        self.previous()
    }

    fn consume(&mut self, tok_val: TokenValue, s: &str) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        let msg = if s.is_empty() {
            format!("'{tok_val}' expected.")
        } else {
            s.to_owned()
        };
        self.error(self.peek(), &msg);
        None
    }

    fn try_consume(&mut self, tok_val: TokenValue) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        None
    }

    fn consume_id(&mut self) -> Option<(Token, Identifier)> {
        if let Id(id) = self.peek().value {
            let token = self.advance();
            return Some((token, id));
        }
        self.error(self.peek(), "Identifier expected.");
        None
    }

    fn consume_integer(&mut self) -> Option<i32> {
        if let Integer(value) = self.peek().value {
            self.advance();
            return Some(value);
        }
        self.error(self.peek(), "Integer expected.");
        None
    }

    fn error(&mut self, tok: Token, s: &str) {
        if tok.value == EndOfFile {
            self.diag.report(tok.line_num.0, "at end of file", s);
        } else {
            self.diag.report(tok.line_num.0, &format!("at '{tok}'"), s);
        }
    }

    fn undefined_variable(&mut self, tok: Token, var: Identifier) {
        self.error(
            tok,
            &format!(
                "Undefined variable '{}'.",
                self.program.identifiers.get_name(var)
            ),
        );
    }

    fn unknown_field(&mut self, tok: Token, field: Identifier) {
        self.error(
            tok,
            &format!(
                "Unknown field '{}'.",
                self.program.identifiers.get_name(field)
            ),
        );
    }
}
