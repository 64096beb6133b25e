//! Surface parser for μ-calculus formulas.
//!
//! The accepted syntax follows the usual ASCII conventions (`!`, `&&`, `||`,
//! `->`, `<->`, `xor`, `mu X. φ`, `nu X. φ`, `< >`, `[ ]`) with common
//! Unicode alternatives. Identifiers starting with an uppercase letter are
//! fixpoint variables, all others are atomic propositions.
//!
//! Parsing produces formulas in the shape of [`FormulaNode`]: implication,
//! equivalence and exclusive or are desugared, negation is pushed down to
//! atomic propositions (dualizing connectives, modalities and fixpoint
//! binders on the way), and binders shadowing an enclosing binder of the
//! same name are renamed apart.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use super::{FormulaId, FormulaNode, Formulas, Symbol};

/// A byte range in the parsed input.
pub type Span = (usize, usize);

/// An error raised while parsing or normalizing a formula.
#[derive(Debug, Clone, Error)]
#[error("{msg} at offset {}", .span.0)]
pub struct ParseError {
    msg: String,
    span: Span,
}

impl ParseError {
    fn new(msg: impl Into<String>, span: Span) -> Self {
        Self {
            msg: msg.into(),
            span,
        }
    }

    /// Renders the error with a caret line pointing into the source.
    pub fn render(&self, source: &str) -> String {
        let (start, end) = self.span;
        let col = source[..start.min(source.len())].chars().count();
        let width = source[start.min(source.len())..end.min(source.len())]
            .chars()
            .count()
            .max(1);
        format!(
            "error: {}\n  {}\n  {}{}",
            self.msg,
            source,
            " ".repeat(col),
            "^".repeat(width)
        )
    }
}

/// Parses and normalizes a formula, interning it into `formulas`.
pub fn parse(formulas: &mut Formulas, input: &str) -> Result<FormulaId, ParseError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.formula()?;
    parser.expect_end()?;
    Lowering::new(formulas, &ast).lower_closed(&ast)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Lit(bool),
    Ident(String),
    Not,
    And,
    Or,
    Imp,
    Equiv,
    Xor,
    Mu,
    Nu,
    Dia,
    All,
    Dot,
    LParen,
    RParen,
    End,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Lit(true) => write!(f, "true"),
            Tok::Lit(false) => write!(f, "false"),
            Tok::Ident(name) => write!(f, "{}", name),
            Tok::Not => write!(f, "!"),
            Tok::And => write!(f, "&&"),
            Tok::Or => write!(f, "||"),
            Tok::Imp => write!(f, "->"),
            Tok::Equiv => write!(f, "<->"),
            Tok::Xor => write!(f, "xor"),
            Tok::Mu => write!(f, "mu"),
            Tok::Nu => write!(f, "nu"),
            Tok::Dia => write!(f, "< >"),
            Tok::All => write!(f, "[ ]"),
            Tok::Dot => write!(f, "."),
            Tok::LParen => write!(f, "("),
            Tok::RParen => write!(f, ")"),
            Tok::End => write!(f, "end of input"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(Tok, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut len = c.len_utf8();
        let tok = match c {
            '(' => {
                chars.next();
                Tok::LParen
            }
            ')' => {
                chars.next();
                Tok::RParen
            }
            '.' => {
                chars.next();
                Tok::Dot
            }
            '!' | '~' | '¬' => {
                chars.next();
                Tok::Not
            }
            '&' | '∧' | '∩' | '*' => {
                chars.next();
                if c == '&' && matches!(chars.peek(), Some(&(_, '&'))) {
                    chars.next();
                    len += 1;
                }
                Tok::And
            }
            '|' | '∨' | '∪' | '+' => {
                chars.next();
                if c == '|' && matches!(chars.peek(), Some(&(_, '|'))) {
                    chars.next();
                    len += 1;
                }
                Tok::Or
            }
            '/' => {
                // "/\" conjunction
                chars.next();
                match chars.next() {
                    Some((_, '\\')) => {
                        len += 1;
                        Tok::And
                    }
                    _ => return Err(ParseError::new("expected `/\\`", (start, start + 1))),
                }
            }
            '\\' => {
                // "\/" disjunction
                chars.next();
                match chars.next() {
                    Some((_, '/')) => {
                        len += 1;
                        Tok::Or
                    }
                    _ => return Err(ParseError::new("expected `\\/`", (start, start + 1))),
                }
            }
            '-' | '=' => {
                // "->", "-->" and "=>" implication
                chars.next();
                while matches!(chars.peek(), Some(&(_, '-'))) {
                    chars.next();
                    len += 1;
                }
                match chars.next() {
                    Some((end, '>')) => {
                        len = end + 1 - start;
                        Tok::Imp
                    }
                    _ => return Err(ParseError::new("expected `->`", (start, start + len))),
                }
            }
            '→' | '⟶' | '⇒' | '⇙' => {
                chars.next();
                Tok::Imp
            }
            '↔' | '⇔' => {
                chars.next();
                Tok::Equiv
            }
            '^' | '⊕' => {
                chars.next();
                Tok::Xor
            }
            'μ' => {
                chars.next();
                Tok::Mu
            }
            'ν' => {
                chars.next();
                Tok::Nu
            }
            '<' => {
                // "< >" diamond, or "<->"/"<=>"/"<-->" equivalence
                chars.next();
                let mut seen_arrow = false;
                loop {
                    match chars.peek() {
                        Some(&(_, '-')) | Some(&(_, '=')) => {
                            seen_arrow = true;
                            chars.next();
                            len += 1;
                        }
                        Some(&(_, ' ')) if !seen_arrow => {
                            chars.next();
                            len += 1;
                        }
                        _ => break,
                    }
                }
                match chars.next() {
                    Some((end, '>')) => {
                        len = end + 1 - start;
                        if seen_arrow {
                            Tok::Equiv
                        } else {
                            Tok::Dia
                        }
                    }
                    _ => return Err(ParseError::new("expected `< >`", (start, start + len))),
                }
            }
            '[' => {
                chars.next();
                while matches!(chars.peek(), Some(&(_, ' '))) {
                    chars.next();
                    len += 1;
                }
                match chars.next() {
                    Some((end, ']')) => {
                        len = end + 1 - start;
                        Tok::All
                    }
                    _ => return Err(ParseError::new("expected `[ ]`", (start, start + len))),
                }
            }
            '"' => {
                // quoted identifier
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((end, '"')) => {
                            len = end + 1 - start;
                            break;
                        }
                        Some((_, c)) => name.push(c),
                        None => {
                            return Err(ParseError::new(
                                "unterminated quoted identifier",
                                (start, input.len()),
                            ))
                        }
                    }
                }
                Tok::Ident(name)
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut name = String::new();
                while let Some(&(end, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        len = end + c.len_utf8() - start;
                        chars.next();
                    } else {
                        break;
                    }
                }
                match name.as_str() {
                    "true" | "True" | "1" => Tok::Lit(true),
                    "false" | "False" | "0" => Tok::Lit(false),
                    "xor" => Tok::Xor,
                    "mu" => Tok::Mu,
                    "nu" => Tok::Nu,
                    _ => Tok::Ident(name),
                }
            }
            c => {
                return Err(ParseError::new(
                    format!("unexpected character `{}`", c),
                    (start, start + c.len_utf8()),
                ))
            }
        };
        tokens.push((tok, (start, start + len)));
    }
    tokens.push((Tok::End, (input.len(), input.len())));
    Ok(tokens)
}

/// Raw syntax tree before normalization.
#[derive(Debug)]
enum Ast {
    Lit(bool),
    Ident(String, Span),
    Not(Box<Ast>, Span),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Imp(Box<Ast>, Box<Ast>),
    Equiv(Box<Ast>, Box<Ast>),
    Xor(Box<Ast>, Box<Ast>),
    Dia(Box<Ast>),
    All(Box<Ast>),
    Mu(String, Span, Box<Ast>),
    Nu(String, Span, Box<Ast>),
}

struct Parser {
    tokens: Vec<(Tok, Span)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].0
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> (Tok, Span) {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Tok::End => Ok(()),
            t => Err(ParseError::new(
                format!("unexpected `{}` after formula", t),
                self.span(),
            )),
        }
    }

    /// Implication and equivalence, right associative, loosest.
    fn formula(&mut self) -> Result<Ast, ParseError> {
        let lhs = self.xor_formula()?;
        match self.peek() {
            Tok::Imp => {
                self.advance();
                let rhs = self.formula()?;
                Ok(Ast::Imp(Box::new(lhs), Box::new(rhs)))
            }
            Tok::Equiv => {
                self.advance();
                let rhs = self.formula()?;
                Ok(Ast::Equiv(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn xor_formula(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.or_formula()?;
        while matches!(self.peek(), Tok::Xor) {
            self.advance();
            let rhs = self.or_formula()?;
            lhs = Ast::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or_formula(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.and_formula()?;
        while matches!(self.peek(), Tok::Or) {
            self.advance();
            let rhs = self.and_formula()?;
            lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_formula(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.unary_formula()?;
        while matches!(self.peek(), Tok::And) {
            self.advance();
            let rhs = self.unary_formula()?;
            lhs = Ast::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_formula(&mut self) -> Result<Ast, ParseError> {
        match self.peek() {
            Tok::Not => {
                let (_, span) = self.advance();
                let arg = self.unary_formula()?;
                Ok(Ast::Not(Box::new(arg), span))
            }
            Tok::Dia => {
                self.advance();
                let arg = self.unary_formula()?;
                Ok(Ast::Dia(Box::new(arg)))
            }
            Tok::All => {
                self.advance();
                let arg = self.unary_formula()?;
                Ok(Ast::All(Box::new(arg)))
            }
            Tok::Mu | Tok::Nu => {
                let (binder, _) = self.advance();
                let (name, span) = match self.advance() {
                    (Tok::Ident(name), span) => (name, span),
                    (t, span) => {
                        return Err(ParseError::new(
                            format!("expected variable after `{}`, found `{}`", binder, t),
                            span,
                        ))
                    }
                };
                match self.advance() {
                    (Tok::Dot, _) => (),
                    (t, span) => {
                        return Err(ParseError::new(
                            format!("expected `.` after bound variable, found `{}`", t),
                            span,
                        ))
                    }
                }
                let body = self.unary_formula()?;
                Ok(match binder {
                    Tok::Mu => Ast::Mu(name, span, Box::new(body)),
                    _ => Ast::Nu(name, span, Box::new(body)),
                })
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Ast, ParseError> {
        match self.advance() {
            (Tok::Lit(b), _) => Ok(Ast::Lit(b)),
            (Tok::Ident(name), span) => Ok(Ast::Ident(name, span)),
            (Tok::LParen, _) => {
                let inner = self.formula()?;
                match self.advance() {
                    (Tok::RParen, _) => Ok(inner),
                    (t, span) => Err(ParseError::new(
                        format!("expected `)`, found `{}`", t),
                        span,
                    )),
                }
            }
            (t, span) => Err(ParseError::new(
                format!("expected a formula, found `{}`", t),
                span,
            )),
        }
    }
}

/// A binder currently in scope during lowering.
struct Binding {
    surface: String,
    symbol: Symbol,
    /// Whether a negation was pushed through this binder.
    dual: bool,
}

/// Lowers the raw syntax tree into the interned normal form.
struct Lowering<'a> {
    formulas: &'a mut Formulas,
    scope: Vec<Binding>,
    used_names: HashSet<String>,
}

impl<'a> Lowering<'a> {
    fn new(formulas: &'a mut Formulas, ast: &Ast) -> Self {
        let mut used_names = HashSet::new();
        collect_names(ast, &mut used_names);
        Self {
            formulas,
            scope: Vec::new(),
            used_names,
        }
    }

    fn lower_closed(mut self, ast: &Ast) -> Result<FormulaId, ParseError> {
        self.lower(ast, false)
    }

    /// Picks a name for a binder, renaming apart if an enclosing binder
    /// already uses it.
    fn bind_name(&mut self, surface: &str) -> Symbol {
        if !self.scope.iter().any(|b| b.surface == surface) {
            return self.formulas.symbol(surface);
        }
        let mut n = 1;
        loop {
            let fresh = format!("{}{}", surface, n);
            if !self.used_names.contains(&fresh) {
                self.used_names.insert(fresh.clone());
                return self.formulas.symbol(&fresh);
            }
            n += 1;
        }
    }

    /// Lowers an equivalence of `lhs` and `rhs`, or with `neg` its
    /// exclusive-or dual.
    fn lower_equivalence(
        &mut self,
        lhs: &Ast,
        rhs: &Ast,
        neg: bool,
    ) -> Result<FormulaNode, ParseError> {
        if neg {
            let f = {
                let a = self.lower(lhs, false)?;
                let b = self.lower(rhs, true)?;
                self.formulas.intern(FormulaNode::And(a, b))
            };
            let g = {
                let a = self.lower(lhs, true)?;
                let b = self.lower(rhs, false)?;
                self.formulas.intern(FormulaNode::And(a, b))
            };
            Ok(FormulaNode::Or(f, g))
        } else {
            let fwd = {
                let a = self.lower(lhs, true)?;
                let b = self.lower(rhs, false)?;
                self.formulas.intern(FormulaNode::Or(a, b))
            };
            let bwd = {
                let a = self.lower(lhs, false)?;
                let b = self.lower(rhs, true)?;
                self.formulas.intern(FormulaNode::Or(b, a))
            };
            Ok(FormulaNode::And(fwd, bwd))
        }
    }

    /// Lowers `ast` (negated iff `neg`) into the normal form.
    fn lower(&mut self, ast: &Ast, neg: bool) -> Result<FormulaId, ParseError> {
        let node = match ast {
            Ast::Lit(b) => FormulaNode::Lit(*b != neg),
            Ast::Ident(name, span) => {
                if name.chars().next().map_or(false, char::is_uppercase) {
                    let binding = self
                        .scope
                        .iter()
                        .rev()
                        .find(|b| &b.surface == name)
                        .ok_or_else(|| {
                            ParseError::new(format!("unbound variable `{}`", name), *span)
                        })?;
                    if neg != binding.dual {
                        return Err(ParseError::new(
                            format!("fixpoint variable `{}` occurs under negation", name),
                            *span,
                        ));
                    }
                    FormulaNode::Var(binding.symbol)
                } else {
                    let p = self.formulas.symbol(name);
                    let prop = self.formulas.intern(FormulaNode::Prop(p));
                    if neg {
                        FormulaNode::Neg(prop)
                    } else {
                        return Ok(prop);
                    }
                }
            }
            Ast::Not(arg, _) => return self.lower(arg, !neg),
            Ast::And(lhs, rhs) => {
                let f = self.lower(lhs, neg)?;
                let g = self.lower(rhs, neg)?;
                if neg {
                    FormulaNode::Or(f, g)
                } else {
                    FormulaNode::And(f, g)
                }
            }
            Ast::Or(lhs, rhs) => {
                let f = self.lower(lhs, neg)?;
                let g = self.lower(rhs, neg)?;
                if neg {
                    FormulaNode::And(f, g)
                } else {
                    FormulaNode::Or(f, g)
                }
            }
            Ast::Imp(lhs, rhs) => {
                // a -> b is !a || b
                let f = self.lower(lhs, !neg)?;
                let g = self.lower(rhs, neg)?;
                if neg {
                    FormulaNode::And(f, g)
                } else {
                    FormulaNode::Or(f, g)
                }
            }
            // a <-> b is (!a || b) && (!b || a); a xor b is its negation
            Ast::Equiv(lhs, rhs) => self.lower_equivalence(lhs, rhs, neg)?,
            Ast::Xor(lhs, rhs) => self.lower_equivalence(lhs, rhs, !neg)?,
            Ast::Dia(arg) => {
                let f = self.lower(arg, neg)?;
                if neg {
                    FormulaNode::Box(f)
                } else {
                    FormulaNode::Dia(f)
                }
            }
            Ast::All(arg) => {
                let f = self.lower(arg, neg)?;
                if neg {
                    FormulaNode::Dia(f)
                } else {
                    FormulaNode::Box(f)
                }
            }
            Ast::Mu(name, _, body) | Ast::Nu(name, _, body) => {
                let symbol = self.bind_name(name);
                self.scope.push(Binding {
                    surface: name.clone(),
                    symbol,
                    dual: neg,
                });
                let lowered = self.lower(body, neg);
                self.scope.pop();
                let f = lowered?;
                let mu = matches!(ast, Ast::Mu(..)) != neg;
                if mu {
                    FormulaNode::Mu(symbol, f)
                } else {
                    FormulaNode::Nu(symbol, f)
                }
            }
        };
        Ok(self.formulas.intern(node))
    }
}

fn collect_names(ast: &Ast, names: &mut HashSet<String>) {
    match ast {
        Ast::Lit(_) => (),
        Ast::Ident(name, _) => {
            names.insert(name.clone());
        }
        Ast::Not(arg, _) | Ast::Dia(arg) | Ast::All(arg) => collect_names(arg, names),
        Ast::And(lhs, rhs)
        | Ast::Or(lhs, rhs)
        | Ast::Imp(lhs, rhs)
        | Ast::Equiv(lhs, rhs)
        | Ast::Xor(lhs, rhs) => {
            collect_names(lhs, names);
            collect_names(rhs, names);
        }
        Ast::Mu(name, _, body) | Ast::Nu(name, _, body) => {
            names.insert(name.clone());
            collect_names(body, names);
        }
    }
}
