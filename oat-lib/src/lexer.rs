use std::collections::HashMap;
use utils::DiagnosticEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub usize);

#[derive(Clone, Debug, Copy, Eq, PartialEq, Hash)]
pub struct Location(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValue {
    Id(Identifier),
    Integer(i32),

    // Declarations
    Class,
    Interface,
    Impl,
    Field,
    Method,
    Static,
    Abstract,

    // Statements
    New,
    If,
    Goto,
    Switch,
    Case,
    Default,
    Return,
    Nop,
    This,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Shifts and bitwise
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,

    // Comparisons
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEq,
    GreaterThanOrEq,

    // Separators
    Define,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    Semicolon,
    Comma,
    Dot,

    // Builtin types
    Int,
    Bool,

    EndOfFile,
}

use TokenValue::*;

impl core::fmt::Display for TokenValue {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Id(i) => write!(f, "ident_{}", i.0),
            Integer(i) => write!(f, "{}", i),

            Class => write!(f, "class"),
            Interface => write!(f, "interface"),
            Impl => write!(f, "impl"),
            Field => write!(f, "field"),
            Method => write!(f, "method"),
            Static => write!(f, "static"),
            Abstract => write!(f, "abstract"),

            New => write!(f, "new"),
            If => write!(f, "if"),
            Goto => write!(f, "goto"),
            Switch => write!(f, "switch"),
            Case => write!(f, "case"),
            Default => write!(f, "default"),
            Return => write!(f, "return"),
            Nop => write!(f, "nop"),
            This => write!(f, "this"),

            Add => write!(f, "+"),
            Sub => write!(f, "-"),
            Mul => write!(f, "*"),
            Div => write!(f, "/"),
            Rem => write!(f, "%"),

            Shl => write!(f, "<<"),
            Shr => write!(f, ">>"),
            Ushr => write!(f, ">>>"),
            BitAnd => write!(f, "&"),
            BitOr => write!(f, "|"),
            BitXor => write!(f, "^"),

            Equal => write!(f, "=="),
            NotEqual => write!(f, "!="),
            LessThan => write!(f, "<"),
            GreaterThan => write!(f, ">"),
            LessThanOrEq => write!(f, "<="),
            GreaterThanOrEq => write!(f, ">="),

            Define => write!(f, "="),
            LeftParen => write!(f, "("),
            RightParen => write!(f, ")"),
            LeftBrace => write!(f, "{{"),
            RightBrace => write!(f, "}}"),
            LeftBracket => write!(f, "["),
            RightBracket => write!(f, "]"),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
            Comma => write!(f, ","),
            Dot => write!(f, "."),

            Int => write!(f, "int"),
            Bool => write!(f, "bool"),

            EndOfFile => write!(f, "END_OF_FILE"),
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<String, TokenValue> = {
        let mut m = HashMap::new();
        m.insert(format!("{Class}"), Class);
        m.insert(format!("{Interface}"), Interface);
        m.insert(format!("{Impl}"), Impl);
        m.insert(format!("{Field}"), Field);
        m.insert(format!("{Method}"), Method);
        m.insert(format!("{Static}"), Static);
        m.insert(format!("{Abstract}"), Abstract);

        m.insert(format!("{New}"), New);
        m.insert(format!("{If}"), If);
        m.insert(format!("{Goto}"), Goto);
        m.insert(format!("{Switch}"), Switch);
        m.insert(format!("{Case}"), Case);
        m.insert(format!("{Default}"), Default);
        m.insert(format!("{Return}"), Return);
        m.insert(format!("{Nop}"), Nop);
        m.insert(format!("{This}"), This);

        m.insert(format!("{Int}"), Int);
        m.insert(format!("{Bool}"), Bool);
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub value: TokenValue,

    pub line_num: Location,
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierTable(pub Vec<String>);

impl IdentifierTable {
    pub fn get_identifier(&mut self, ident: &str) -> Identifier {
        // TODO: more efficient lookup.
        match self.0.iter().position(|str| str == ident) {
            Some(pos) => Identifier(pos),
            _ => {
                self.0.push(ident.to_owned());
                Identifier(self.0.len() - 1)
            }
        }
    }

    pub fn get_name(&self, id: Identifier) -> &str {
        &self.0[id.0]
    }
}

pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line_num: u32,
    has_error: bool,
    diag: &'src mut DiagnosticEmitter,
    identifier_table: IdentifierTable,
}

#[derive(Debug, Clone, Default)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub identifier_table: IdentifierTable,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, diag: &'src mut DiagnosticEmitter) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
            line_num: 1,
            has_error: false,
            diag,
            identifier_table: IdentifierTable::default(),
        }
    }

    pub fn lex_all(mut self) -> LexResult {
        if !self.source.is_ascii() {
            self.diag
                .error(self.line_num, "Only ASCII input is supported.");
            return LexResult::default();
        }

        let mut tokens = Vec::new();
        while !self.is_at_end() {
            if let Some(tok) = self.lex() {
                tokens.push(tok);
            } else if self.has_error {
                return LexResult::default();
            }
        }

        tokens.push(Token {
            value: EndOfFile,
            line_num: Location(self.line_num),
        });

        LexResult {
            tokens,
            identifier_table: self.identifier_table,
        }
    }

    fn token(&self, value: TokenValue) -> Option<Token> {
        Some(Token {
            value,
            line_num: Location(self.line_num),
        })
    }

    fn lex(&mut self) -> Option<Token> {
        loop {
            if self.is_at_end() {
                return None;
            }

            self.start = self.current;
            match self.advance() {
                '(' => return self.token(LeftParen),
                ')' => return self.token(RightParen),
                '{' => return self.token(LeftBrace),
                '}' => return self.token(RightBrace),
                '[' => return self.token(LeftBracket),
                ']' => return self.token(RightBracket),
                ':' => return self.token(Colon),
                ';' => return self.token(Semicolon),
                ',' => return self.token(Comma),
                '.' => return self.token(Dot),
                '+' => return self.token(Add),
                '*' => return self.token(Mul),
                '%' => return self.token(Rem),
                '&' => return self.token(BitAnd),
                '|' => return self.token(BitOr),
                '^' => return self.token(BitXor),

                '=' => {
                    if self.match_char('=') {
                        return self.token(Equal);
                    }
                    return self.token(Define);
                }
                '!' => {
                    if self.match_char('=') {
                        return self.token(NotEqual);
                    }
                    self.diag
                        .error(self.line_num, "Expected '=' after '!'.");
                    self.has_error = true;
                    return None;
                }
                '<' => {
                    if self.match_char('<') {
                        return self.token(Shl);
                    }
                    if self.match_char('=') {
                        return self.token(LessThanOrEq);
                    }
                    return self.token(LessThan);
                }
                '>' => {
                    if self.match_char('>') {
                        if self.match_char('>') {
                            return self.token(Ushr);
                        }
                        return self.token(Shr);
                    }
                    if self.match_char('=') {
                        return self.token(GreaterThanOrEq);
                    }
                    return self.token(GreaterThan);
                }

                // Whitespace
                '\n' => {
                    self.line_num += 1;
                    continue;
                }
                ' ' | '\t' | '\r' => continue,

                // Comments
                '/' => {
                    if self.match_char('/') {
                        while self.advance() != '\n' && !self.is_at_end() {}
                        self.line_num += 1;
                        continue;
                    }
                    return self.token(Div);
                }

                // A '-' immediately followed by a digit is a negative
                // literal, otherwise it is subtraction.
                '-' => {
                    if self.peek().is_ascii_digit() {
                        return self.lex_number();
                    }
                    return self.token(Sub);
                }
                c => {
                    if c.is_ascii_digit() {
                        return self.lex_number();
                    }
                    if c.is_ascii_alphabetic() || c == '_' {
                        let ident = self.lex_identifier();
                        let line_num = self.line_num;
                        return Some(KEYWORDS.get(ident).map_or_else(
                            || Token {
                                value: Id(self.identifier_table.get_identifier(ident)),
                                line_num: Location(line_num),
                            },
                            |value| Token {
                                value: *value,
                                line_num: Location(line_num),
                            },
                        ));
                    }
                    self.diag.error(
                        self.line_num,
                        &format!(
                            "Unexpected token: '{}'.",
                            &self.source[self.start..self.current]
                        ),
                    );
                    self.has_error = true;
                    return None;
                }
            }
        }
    }

    fn lex_number(&mut self) -> Option<Token> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let Ok(value) = self.source[self.start..self.current].parse::<i32>()
        else {
            self.diag
                .error(self.line_num, "Integer literal out of range.");
            self.has_error = true;
            return None;
        };

        self.token(Integer(value))
    }

    fn lex_identifier(&mut self) -> &'src str {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        &self.source[self.start..self.current]
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> char {
        self.source.as_bytes().get(self.current).map_or('\0', |b| *b as char)
    }

    fn advance(&mut self) -> char {
        let prev = self.peek();
        self.current += 1;
        prev
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }
}
