//! A small expression language used as the reference [`ExecutionEngine`].
//!
//! Statements are separated by newlines or `;`. `let`/`var` bind variables,
//! `print` writes a line of output, and `throw` raises an error. A final
//! expression statement without a trailing `;` is the submission's return
//! value.

use async_trait::async_trait;
use serde_json::Number;
use weave_commands::Value;
use weave_commands::value::type_name;

use crate::language::{ExecutionEngine, ExecutionError, RunOutcome};
use crate::value_store::{StoredValue, ValueStore};

const DEFAULT_RUNTIME: &str = "script";
const DEFAULT_LANGUAGE: &str = "script";

#[derive(Debug, Clone)]
pub struct ScriptEngine {
    language: String,
    runtime: String,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
        }
    }
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl ExecutionEngine for ScriptEngine {
    fn language_name(&self) -> &str {
        &self.language
    }

    fn runtime(&self) -> &str {
        &self.runtime
    }

    async fn run(&mut self, code: &str, values: &mut ValueStore) -> Result<RunOutcome, ExecutionError> {
        let program = parse(code)?;
        let mut outcome = RunOutcome::default();
        let last = program.len().checked_sub(1);
        for (index, statement) in program.into_iter().enumerate() {
            match statement.stmt {
                Stmt::Let(name, expr) => {
                    let value = eval(&expr, values)?;
                    values.set(name, StoredValue::native(value));
                }
                Stmt::Print(expr) => outcome.output.push(render(&eval(&expr, values)?)),
                Stmt::Throw { kind, message } => {
                    let message = match message {
                        Some(expr) => render(&eval(&expr, values)?),
                        None => format!("Exception of type '{kind}' was thrown."),
                    };
                    return Err(ExecutionError::new(kind, message));
                }
                Stmt::Expr(expr) => {
                    let value = eval(&expr, values)?;
                    if Some(index) == last && !statement.terminated {
                        outcome.value = Some(value);
                    }
                }
            }
        }
        Ok(outcome)
    }

    fn diagnose(&self, code: &str) -> Result<(), ExecutionError> {
        parse(code).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Assign,
    Semi,
    Newline,
}

fn syntax(message: impl Into<String>) -> ExecutionError {
    ExecutionError::new("SyntaxError", message)
}

fn lex(code: &str) -> Result<Vec<Token>, ExecutionError> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                chars.next();
                tokens.push(Token::Newline);
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(d) = chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
                    text.push(d);
                }
                let token = if text.contains('.') {
                    text.parse()
                        .map(Token::Float)
                        .map_err(|_| syntax(format!("Invalid number '{text}'.")))?
                } else {
                    text.parse()
                        .map(Token::Int)
                        .map_err(|_| syntax(format!("Integral constant '{text}' is too large.")))?
                };
                tokens.push(token);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => return Err(syntax("Newline in constant.")),
                        },
                        Some('\n') | None => return Err(syntax("Newline in constant.")),
                        Some(other) => text.push(other),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    ident.push(c);
                }
                tokens.push(Token::Ident(ident));
            }
            '+' | '-' | '*' | '/' | '%' => {
                chars.next();
                if c == '/' && chars.next_if_eq(&'/').is_some() {
                    while chars.next_if(|&c| c != '\n').is_some() {}
                    continue;
                }
                tokens.push(Token::Op(c));
            }
            '(' | ')' | '=' | ';' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '=' => Token::Assign,
                    _ => Token::Semi,
                });
            }
            other => return Err(syntax(format!("Unexpected character '{other}'."))),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, char, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Stmt {
    Let(String, Expr),
    Print(Expr),
    Throw { kind: String, message: Option<Expr> },
    Expr(Expr),
}

#[derive(Debug, Clone)]
struct Statement {
    stmt: Stmt,
    terminated: bool,
}

fn parse(code: &str) -> Result<Vec<Statement>, ExecutionError> {
    Parser {
        tokens: lex(code)?,
        pos: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExecutionError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(syntax(format!("{what} expected.")))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn program(mut self) -> Result<Vec<Statement>, ExecutionError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&Token::Newline) || self.eat(&Token::Semi) {}
            if self.peek().is_none() {
                return Ok(statements);
            }
            let stmt = self.statement()?;
            let terminated = self.eat(&Token::Semi);
            statements.push(Statement { stmt, terminated });
            match self.peek() {
                None | Some(Token::Newline) => {}
                Some(_) if terminated => {}
                Some(token) => return Err(syntax(format!("Unexpected token {token:?}."))),
            }
        }
    }

    fn identifier(&mut self) -> Result<String, ExecutionError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(syntax("Identifier expected.")),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ExecutionError> {
        if self.peek_keyword("let") || self.peek_keyword("var") {
            self.advance();
            let name = self.identifier()?;
            self.expect(Token::Assign, "'='")?;
            return Ok(Stmt::Let(name, self.expression()?));
        }
        if self.peek_keyword("print") {
            self.advance();
            return Ok(Stmt::Print(self.expression()?));
        }
        if self.peek_keyword("throw") {
            self.advance();
            if !self.peek_keyword("new") {
                return Ok(Stmt::Throw {
                    kind: "Error".to_string(),
                    message: Some(self.expression()?),
                });
            }
            self.advance();
            let kind = self.identifier()?;
            self.expect(Token::LParen, "'('")?;
            let message = match self.peek() {
                Some(Token::RParen) => None,
                _ => Some(self.expression()?),
            };
            self.expect(Token::RParen, "')'")?;
            return Ok(Stmt::Throw { kind, message });
        }
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Let(name, self.expression()?));
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ExecutionError> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            left = Expr::Binary(Box::new(left), op, Box::new(self.term()?));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ExecutionError> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            let op = *op;
            self.advance();
            left = Expr::Binary(Box::new(left), op, Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExecutionError> {
        if self.eat(&Token::Op('-')) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExecutionError> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(f)) => Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| syntax("Invalid number.")),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::LParen) => {
                while self.eat(&Token::Newline) {}
                let inner = self.expression()?;
                while self.eat(&Token::Newline) {}
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(token) => Err(syntax(format!("Invalid expression term {token:?}."))),
            None => Err(syntax("Expression expected.")),
        }
    }
}

fn eval(expr: &Expr, values: &ValueStore) -> Result<Value, ExecutionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => values.get(name).map(|v| v.value.clone()).ok_or_else(|| {
            ExecutionError::new(
                "NameError",
                format!("The name '{name}' does not exist in the current context."),
            )
        }),
        Expr::Neg(inner) => match eval(inner, values)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.checked_neg().map(Value::from).ok_or_else(overflow),
                None => float_value(-n.as_f64().unwrap_or(f64::NAN), '-'),
            },
            other => Err(type_error('-', &other, None)),
        },
        Expr::Binary(left, op, right) => binary(*op, eval(left, values)?, eval(right, values)?),
    }
}

fn binary(op: char, left: Value, right: Value) -> Result<Value, ExecutionError> {
    if op == '+' && (left.is_string() || right.is_string()) {
        return Ok(Value::String(format!("{}{}", render(&left), render(&right))));
    }
    let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
        return Err(type_error(op, &left, Some(&right)));
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return integer(op, a, b);
    }
    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    if matches!(op, '/' | '%') && b == 0.0 {
        return Err(divide_by_zero());
    }
    let result = match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => a / b,
        _ => a % b,
    };
    float_value(result, op)
}

fn integer(op: char, a: i64, b: i64) -> Result<Value, ExecutionError> {
    let result = match op {
        '+' => a.checked_add(b),
        '-' => a.checked_sub(b),
        '*' => a.checked_mul(b),
        '/' | '%' if b == 0 => return Err(divide_by_zero()),
        '/' if a.checked_rem(b) != Some(0) => return float_value(a as f64 / b as f64, op),
        '/' => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.map(Value::from).ok_or_else(overflow)
}

fn float_value(result: f64, op: char) -> Result<Value, ExecutionError> {
    Number::from_f64(result).map(Value::Number).ok_or_else(|| {
        ExecutionError::new(
            "OverflowException",
            format!("Operator '{op}' produced a value that is not a finite number."),
        )
    })
}

fn overflow() -> ExecutionError {
    ExecutionError::new(
        "OverflowException",
        "Arithmetic operation resulted in an overflow.",
    )
}

fn divide_by_zero() -> ExecutionError {
    ExecutionError::new("DivideByZeroException", "Attempted to divide by zero.")
}

fn type_error(op: char, left: &Value, right: Option<&Value>) -> ExecutionError {
    let operands = match right {
        Some(right) => format!("'{}' and '{}'", type_name(left), type_name(right)),
        None => format!("'{}'", type_name(left)),
    };
    ExecutionError::new(
        "TypeError",
        format!("Operator '{op}' cannot be applied to operands of type {operands}."),
    )
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
