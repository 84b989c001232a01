//! The file-selection rule language.
//!
//! Operators configure rules of the form `(include|exclude) <domain>[:
//! <expr>]`, where `<expr>` is a small boolean expression over allow-listed
//! identifiers and string literals. Rules compile to a parameterized SQL
//! fragment prefixed with `AND (...)` that the candidate-selection query
//! appends to its WHERE clause.
//!
//! Within a rule list, consecutive `include` rules OR together; each
//! `exclude` closes the current group and adds a conjunctive `NOT (...)`.
//! Identifiers are emitted with a leading underscore to namespace them
//! against real columns, and string literals become `?` placeholders.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Rule parsing and compilation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("expected include or exclude keyword")]
    ExpectedAction,

    #[error("expected filter domain")]
    ExpectedDomain,

    #[error("invalid filter domain {0:?}")]
    UnknownDomain(String),

    #[error("expected \":\" before filter expression")]
    ExpectedColon,

    #[error("unexpected identifier {0:?}")]
    UnknownIdent(String),

    #[error("unsupported operator {0:?}")]
    UnsupportedOperator(String),

    #[error("expression error: {0}")]
    Expr(String),

    #[error("rule {domain}[{index}]: {source}")]
    Rule {
        domain: String,
        index: usize,
        #[source]
        source: Box<FilterError>,
    },
}

/// A set of rules, grouped by domain, with per-domain identifier
/// allow-lists.
#[derive(Debug, Default)]
pub struct Filter {
    domains: BTreeMap<String, RuleSet>,
}

#[derive(Debug, Default)]
struct RuleSet {
    vars: BTreeSet<String>,
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
    exclude: bool,
    expr: Expr,
}

#[derive(Debug)]
enum Expr {
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Paren(Box<Expr>),
    Ident(String),
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    And,
    Or,
    Eq,
    Ne,
}

/// A compiled rule set: the SQL fragment, its parameters, and the
/// identifiers it references.
#[derive(Clone, Debug, Default)]
pub struct FilterQuery {
    expr: String,
    params: Vec<String>,
    vars: BTreeSet<String>,
}

impl FilterQuery {
    /// Whether the rule set compiled to nothing; callers skip appending.
    pub fn is_empty(&self) -> bool {
        self.expr.is_empty()
    }

    /// The SQL fragment, prefixed with `AND (` when non-empty.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Unquoted string-literal values, in placeholder order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Whether the fragment references the given identifier.
    pub fn has_var(&self, var: &str) -> bool {
        self.vars.contains(var)
    }

    /// Identifiers referenced by the fragment, in sorted order.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(String::as_str)
    }
}

/// Whether a string is a plain word: letters and digits only.
fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric())
}

/// Split a leading word (letters and digits) off a string.
fn parse_word(s: &str) -> (&str, &str) {
    match s.find(|c: char| !c.is_alphanumeric()) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a domain and the identifiers usable in its expressions.
    /// Non-word names are skipped.
    pub fn allow_domain(&mut self, domain: &str, vars: &[&str]) -> &mut Self {
        if !is_word(domain) {
            return self;
        }
        let set = self.domains.entry(domain.to_string()).or_default();
        for var in vars {
            if is_word(var) {
                set.vars.insert((*var).to_string());
            }
        }
        self
    }

    /// Parse and add a configured rule.
    pub fn append(&mut self, rule: &str) -> Result<(), FilterError> {
        let rest = rule.trim_start();
        let (action, rest) = parse_word(rest);
        let exclude = match action {
            "include" => false,
            "exclude" => true,
            _ => return Err(FilterError::ExpectedAction),
        };

        let rest = rest.trim_start();
        let (domain, rest) = parse_word(rest);
        if domain.is_empty() {
            return Err(FilterError::ExpectedDomain);
        }
        let set = self
            .domains
            .get_mut(domain)
            .ok_or_else(|| FilterError::UnknownDomain(domain.to_string()))?;

        let rest = rest.trim_start();
        let expr = if rest.is_empty() {
            Expr::Ident("true".to_string())
        } else {
            let rest = rest.strip_prefix(':').ok_or(FilterError::ExpectedColon)?;
            parse_expr(rest)?
        };

        set.rules.push(Rule { exclude, expr });
        Ok(())
    }

    /// Compile the rule set of a domain to a SQL fragment. An empty rule
    /// set compiles to an empty query.
    pub fn as_query(&self, domain: &str) -> Result<FilterQuery, FilterError> {
        let set = self
            .domains
            .get(domain)
            .ok_or_else(|| FilterError::UnknownDomain(domain.to_string()))?;
        if set.rules.is_empty() {
            return Ok(FilterQuery::default());
        }

        let mut query = FilterQuery {
            expr: String::from("AND ( "),
            ..FilterQuery::default()
        };
        // Every exclude after the first rule closes a group; open them all
        // up front so the closes pair up left-associatively.
        for rule in set.rules.iter().skip(1) {
            if rule.exclude {
                query.expr.push_str("( ");
            }
        }
        for (index, rule) in set.rules.iter().enumerate() {
            if index > 0 {
                query.expr.push_str(if rule.exclude { ") AND " } else { "OR " });
            }
            if rule.exclude {
                query.expr.push_str("NOT ");
            }
            query.expr.push_str("( ");
            emit(&mut query, &set.vars, &rule.expr).map_err(|source| FilterError::Rule {
                domain: domain.to_string(),
                index,
                source: Box::new(source),
            })?;
            query.expr.push_str(") ");
        }
        query.expr.push(')');
        Ok(query)
    }
}

fn emit(query: &mut FilterQuery, allowed: &BTreeSet<String>, expr: &Expr) -> Result<(), FilterError> {
    match expr {
        Expr::Binary { op, lhs, rhs } => {
            emit(query, allowed, lhs)?;
            query.expr.push_str(match op {
                BinOp::And => "AND ",
                BinOp::Or => "OR ",
                BinOp::Eq => "== ",
                BinOp::Ne => "!= ",
            });
            emit(query, allowed, rhs)
        }
        Expr::Paren(inner) => {
            query.expr.push_str("( ");
            emit(query, allowed, inner)?;
            query.expr.push_str(") ");
            Ok(())
        }
        Expr::Not(inner) => {
            query.expr.push_str("NOT ");
            emit(query, allowed, inner)
        }
        Expr::Ident(name) => {
            match name.as_str() {
                "true" => query.expr.push_str("TRUE "),
                "false" => query.expr.push_str("FALSE "),
                "nil" => query.expr.push_str("NULL "),
                _ => {
                    if !allowed.contains(name) {
                        return Err(FilterError::UnknownIdent(name.clone()));
                    }
                    query.expr.push('_');
                    query.expr.push_str(name);
                    query.expr.push(' ');
                    query.vars.insert(name.clone());
                }
            }
            Ok(())
        }
        Expr::Str(value) => {
            query.params.push(value.clone());
            query.expr.push_str("? ");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Expression parsing: a hand-written lexer and recursive-descent parser.
// Precedence, loosest first: ||, &&, (== !=), unary !.
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Not,
    And,
    Or,
    Eq,
    Ne,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            _ if c.is_alphanumeric() => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !c.is_alphanumeric() {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(word));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => value.push('"'),
                            Some('\\') => value.push('\\'),
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => {
                                return Err(FilterError::Expr(format!(
                                    "unknown escape \\{other}"
                                )));
                            }
                            None => {
                                return Err(FilterError::Expr(
                                    "unterminated string literal".to_string(),
                                ));
                            }
                        },
                        Some(other) => value.push(other),
                        None => {
                            return Err(FilterError::Expr(
                                "unterminated string literal".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some('&') => tokens.push(Token::And),
                    _ => return Err(FilterError::Expr("expected \"&&\"".to_string())),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some('|') => tokens.push(Token::Or),
                    _ => return Err(FilterError::Expr("expected \"||\"".to_string())),
                }
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Eq),
                    _ => return Err(FilterError::Expr("expected \"==\"".to_string())),
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' | '>' => {
                chars.next();
                let mut op = c.to_string();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    op.push('=');
                }
                return Err(FilterError::UnsupportedOperator(op));
            }
            other => {
                return Err(FilterError::Expr(format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn parse_expr(input: &str) -> Result<Expr, FilterError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(FilterError::Expr(format!("unexpected token {token:?}"))),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Eq) {
                BinOp::Eq
            } else if self.eat(&Token::Ne) {
                BinOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Token::Not) {
            Ok(Expr::Not(Box::new(self.parse_unary()?)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(FilterError::Expr("expected \")\"".to_string()));
                }
                Ok(Expr::Paren(Box::new(inner)))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Expr::Ident(name))
            }
            Some(Token::Str(value)) => {
                self.pos += 1;
                Ok(Expr::Str(value))
            }
            Some(token) => Err(FilterError::Expr(format!("unexpected token {token:?}"))),
            None => Err(FilterError::Expr("unexpected end of expression".to_string())),
        }
    }
}
