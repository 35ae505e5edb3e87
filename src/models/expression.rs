//! User expression models.
//!
//! A small arithmetic language in `x` and named parameters:
//!
//! - `+ - * / ^`, unary minus, parentheses
//! - constants `pi`, `e`
//! - one-argument functions `sin cos tan asin acos atan sinh cosh tanh exp ln
//!   log log10 sqrt abs` (`log` is base 10)
//! - `pow(a, b)`, `min(a, b)`, `max(a, b)`
//! - calls of registered user functions, `name(arg)`; the callee's parameters
//!   join the caller's parameter list
//!
//! Text is parsed once into an [`Ast`], then compiled against a parameter list
//! and a [`ModelRegistry`] into an [`Expr`] tree evaluated per point.

use std::collections::BTreeSet;

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::models::model::FitModel;
use crate::models::registry::ModelRegistry;

fn expression_error(expression: &str, message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(
        "Fit",
        ErrorKind::ExpressionError {
            expression: expression.to_string(),
            message: message.into(),
        },
    )
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when digits follow, so `2*e` stays a constant.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| expression_error(text, format!("invalid number '{literal}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(expression_error(text, format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

/// Parsed, unresolved expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    Ident(String),
    Neg(Box<Ast>),
    Binary(char, Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            _ => Err(expression_error(self.text, format!("expected {what}"))),
        }
    }

    fn expr(&mut self) -> Result<Ast> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Ast> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Ast> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Ast::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    /// `^` binds tighter than unary minus on its left and is right-associative.
    fn power(&mut self) -> Result<Ast> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Ast::Binary('^', Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Ast> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Ast::Number(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Ast::Ident(name));
                }
                self.pos += 1;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen, "')' after function arguments")?;
                Ok(Ast::Call(name, args))
            }
            Some(t) => Err(expression_error(self.text, format!("unexpected token {t:?}"))),
            None => Err(expression_error(self.text, "unexpected end of expression")),
        }
    }
}

impl Ast {
    pub fn parse(text: &str) -> Result<Ast> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(expression_error(text, "empty expression"));
        }
        let mut parser = Parser {
            text,
            tokens,
            pos: 0,
        };
        let ast = parser.expr()?;
        if parser.pos < parser.tokens.len() {
            return Err(expression_error(text, "trailing input"));
        }
        Ok(ast)
    }

    /// Names of called functions that are not built in.
    pub fn user_calls(&self, out: &mut BTreeSet<String>) {
        match self {
            Ast::Number(_) | Ast::Ident(_) => {}
            Ast::Neg(a) => a.user_calls(out),
            Ast::Binary(_, a, b) => {
                a.user_calls(out);
                b.user_calls(out);
            }
            Ast::Call(name, args) => {
                if Builtin::lookup(name).is_none() && Builtin2::lookup(name).is_none() {
                    out.insert(name.clone());
                }
                for a in args {
                    a.user_calls(out);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Builtin::Sin,
            "cos" => Builtin::Cos,
            "tan" => Builtin::Tan,
            "asin" => Builtin::Asin,
            "acos" => Builtin::Acos,
            "atan" => Builtin::Atan,
            "sinh" => Builtin::Sinh,
            "cosh" => Builtin::Cosh,
            "tanh" => Builtin::Tanh,
            "exp" => Builtin::Exp,
            "ln" => Builtin::Ln,
            "log" | "log10" => Builtin::Log10,
            "sqrt" => Builtin::Sqrt,
            "abs" => Builtin::Abs,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Builtin::Sin => v.sin(),
            Builtin::Cos => v.cos(),
            Builtin::Tan => v.tan(),
            Builtin::Asin => v.asin(),
            Builtin::Acos => v.acos(),
            Builtin::Atan => v.atan(),
            Builtin::Sinh => v.sinh(),
            Builtin::Cosh => v.cosh(),
            Builtin::Tanh => v.tanh(),
            Builtin::Exp => v.exp(),
            Builtin::Ln => v.ln(),
            Builtin::Log10 => v.log10(),
            Builtin::Sqrt => v.sqrt(),
            Builtin::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin2 {
    Pow,
    Min,
    Max,
}

impl Builtin2 {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "pow" => Some(Builtin2::Pow),
            "min" => Some(Builtin2::Min),
            "max" => Some(Builtin2::Max),
            _ => None,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Builtin2::Pow => a.powf(b),
            Builtin2::Min => a.min(b),
            Builtin2::Max => a.max(b),
        }
    }
}

/// Resolved expression: parameters are indices into the model's vector.
#[derive(Debug, Clone)]
enum Expr {
    Const(f64),
    X,
    Param(usize),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Func(Builtin, Box<Expr>),
    Func2(Builtin2, Box<Expr>, Box<Expr>),
    /// A user function body evaluated with `x` bound to `arg`.
    Call { body: Box<Expr>, arg: Box<Expr> },
}

impl Expr {
    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            Expr::Const(v) => *v,
            Expr::X => x,
            Expr::Param(i) => p[*i],
            Expr::Neg(a) => -a.eval(x, p),
            Expr::Add(a, b) => a.eval(x, p) + b.eval(x, p),
            Expr::Sub(a, b) => a.eval(x, p) - b.eval(x, p),
            Expr::Mul(a, b) => a.eval(x, p) * b.eval(x, p),
            Expr::Div(a, b) => a.eval(x, p) / b.eval(x, p),
            Expr::Pow(a, b) => a.eval(x, p).powf(b.eval(x, p)),
            Expr::Func(f, a) => f.apply(a.eval(x, p)),
            Expr::Func2(f, a, b) => f.apply(a.eval(x, p), b.eval(x, p)),
            Expr::Call { body, arg } => body.eval(arg.eval(x, p), p),
        }
    }
}

struct Compiler<'r> {
    registry: &'r ModelRegistry,
    /// Caller's parameter list, extended by callees.
    params: Vec<String>,
    /// Functions currently being inlined.
    stack: Vec<String>,
}

impl Compiler<'_> {
    fn param_index(&mut self, name: &str) -> usize {
        match self.params.iter().position(|p| p == name) {
            Some(i) => i,
            None => {
                self.params.push(name.to_string());
                self.params.len() - 1
            }
        }
    }

    /// `scope` lists the parameter names visible in the expression being
    /// compiled.
    fn compile(&mut self, ast: &Ast, scope: &[String], text: &str) -> Result<Expr> {
        let b = |e: Expr| Box::new(e);
        Ok(match ast {
            Ast::Number(v) => Expr::Const(*v),
            Ast::Ident(name) => match name.as_str() {
                "x" => Expr::X,
                _ if scope.iter().any(|s| s == name) => Expr::Param(self.param_index(name)),
                "pi" => Expr::Const(std::f64::consts::PI),
                "e" => Expr::Const(std::f64::consts::E),
                _ => return Err(expression_error(text, format!("unknown identifier '{name}'"))),
            },
            Ast::Neg(a) => Expr::Neg(b(self.compile(a, scope, text)?)),
            Ast::Binary(op, l, r) => {
                let (l, r) = (b(self.compile(l, scope, text)?), b(self.compile(r, scope, text)?));
                match op {
                    '+' => Expr::Add(l, r),
                    '-' => Expr::Sub(l, r),
                    '*' => Expr::Mul(l, r),
                    '/' => Expr::Div(l, r),
                    _ => Expr::Pow(l, r),
                }
            }
            Ast::Call(name, args) => self.compile_call(name, args, scope, text)?,
        })
    }

    fn compile_call(&mut self, name: &str, args: &[Ast], scope: &[String], text: &str) -> Result<Expr> {
        let arity = |n: usize| -> Result<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(expression_error(
                    text,
                    format!("'{name}' takes {n} argument(s), got {}", args.len()),
                ))
            }
        };
        if let Some(f) = Builtin::lookup(name) {
            arity(1)?;
            return Ok(Expr::Func(f, Box::new(self.compile(&args[0], scope, text)?)));
        }
        if let Some(f) = Builtin2::lookup(name) {
            arity(2)?;
            let a = self.compile(&args[0], scope, text)?;
            let b = self.compile(&args[1], scope, text)?;
            return Ok(Expr::Func2(f, Box::new(a), Box::new(b)));
        }

        let registry = self.registry;
        let function = registry.function(name).ok_or_else(|| {
            AnalysisError::new("Fit", ErrorKind::UnknownModel { name: name.to_string() })
        })?;
        arity(1)?;
        if self.stack.iter().any(|s| s == name) {
            let mut cycle = self.stack.clone();
            cycle.push(name.to_string());
            return Err(AnalysisError::new(
                "Fit",
                ErrorKind::RecursiveDefinitionError {
                    name: name.to_string(),
                    cycle: cycle.join(" -> "),
                },
            ));
        }
        let arg = self.compile(&args[0], scope, text)?;
        self.stack.push(name.to_string());
        let body = self.compile(function.ast(), function.parameters(), function.expression());
        self.stack.pop();
        Ok(Expr::Call {
            body: Box::new(body?),
            arg: Box::new(arg),
        })
    }
}

/// A model defined by an expression in `x`.
#[derive(Debug, Clone)]
pub struct ExpressionModel {
    label: String,
    expression: String,
    names: Vec<String>,
    expr: Expr,
}

impl ExpressionModel {
    /// Parse and resolve `expression` with the given parameter names.
    pub fn compile(
        label: &str,
        expression: &str,
        parameters: &[String],
        registry: &ModelRegistry,
    ) -> Result<Self> {
        let ast = Ast::parse(expression)?;
        Self::from_ast(label, expression, &ast, parameters, registry)
    }

    pub(crate) fn from_ast(
        label: &str,
        expression: &str,
        ast: &Ast,
        parameters: &[String],
        registry: &ModelRegistry,
    ) -> Result<Self> {
        if let Some(bad) = parameters.iter().find(|p| p.as_str() == "x") {
            return Err(expression_error(expression, format!("'{bad}' is reserved for the abscissa")));
        }
        let mut compiler = Compiler {
            registry,
            params: parameters.to_vec(),
            stack: vec![label.to_string()],
        };
        let expr = compiler.compile(ast, parameters, expression)?;
        Ok(Self {
            label: label.to_string(),
            expression: expression.to_string(),
            names: compiler.params,
            expr,
        })
    }
}

impl FitModel for ExpressionModel {
    fn label(&self) -> &str {
        &self.label
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        self.expression.clone()
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.expr.eval(x, params)
    }
}
