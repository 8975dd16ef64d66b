//! The IF_GOTO condition language.
//!
//! A deliberately tiny boolean grammar, parsed and evaluated by hand so no
//! general evaluation primitive exists anywhere in the engine. Scripts are
//! untrusted user data; the only names an expression can resolve are the two
//! fixed bindings:
//!
//! - `vars['key']` — read-only view of the variable store; a missing key
//!   evaluates to `none`
//! - `last_match` — presence test for the last pattern match (comparable to
//!   `none`); `last_match.name/.x/.y/.w/.h/.score` project its fields
//!
//! Grammar:
//!
//! ```text
//! expr    := or
//! or      := and ( "or" and )*
//! and     := unary ( "and" unary )*
//! unary   := "not" unary | cmp
//! cmp     := primary ( ("=="|"!="|"<"|"<="|">"|">=") primary )?
//! primary := literal | "(" expr ")" | binding
//! literal := int | float | string | "true" | "false" | "none" | "null"
//! ```
//!
//! Keywords are case-insensitive; strings accept single or double quotes.
//! Every parse or evaluation error is reported as [`ExprError`]; the caller
//! treats it as a false condition and the run continues.

use std::collections::BTreeMap;
use thiserror::Error;

use super::state::MatchResult;
use crate::script::Value;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("parse error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },
    #[error("evaluation error: {0}")]
    Eval(String),
}

/// The two bindings visible to a condition.
pub struct ExprEnv<'a> {
    pub vars: &'a BTreeMap<String, Value>,
    pub last_match: Option<&'a MatchResult>,
}

/// Parse and evaluate a condition against the environment.
pub fn eval_condition(input: &str, env: &ExprEnv<'_>) -> Result<bool, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(ExprError::Parse {
            pos: parser.tokens[parser.pos].pos,
            message: "unexpected trailing input".into(),
        });
    }
    Ok(truthy(&eval(&expr, env)?))
}

// ---- tokens ----

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
struct Tok {
    kind: TokKind,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<Tok>, ExprError> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                out.push(Tok { kind: TokKind::LParen, pos: i });
                i += 1;
            }
            ')' => {
                out.push(Tok { kind: TokKind::RParen, pos: i });
                i += 1;
            }
            '[' => {
                out.push(Tok { kind: TokKind::LBracket, pos: i });
                i += 1;
            }
            ']' => {
                out.push(Tok { kind: TokKind::RBracket, pos: i });
                i += 1;
            }
            '.' => {
                out.push(Tok { kind: TokKind::Dot, pos: i });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok { kind: TokKind::Eq, pos: i });
                    i += 2;
                } else {
                    return Err(ExprError::Parse {
                        pos: i,
                        message: "single '=' (did you mean '=='?)".into(),
                    });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok { kind: TokKind::Ne, pos: i });
                    i += 2;
                } else {
                    return Err(ExprError::Parse {
                        pos: i,
                        message: "unexpected '!'".into(),
                    });
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok { kind: TokKind::Le, pos: i });
                    i += 2;
                } else {
                    out.push(Tok { kind: TokKind::Lt, pos: i });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok { kind: TokKind::Ge, pos: i });
                    i += 2;
                } else {
                    out.push(Tok { kind: TokKind::Gt, pos: i });
                    i += 1;
                }
            }
            '\'' | '"' => {
                // Quotes are ASCII, so scanning bytes is UTF-8 safe and the
                // slice between them is valid text.
                let quote = bytes[i];
                let start = i;
                let mut end = i + 1;
                while end < bytes.len() && bytes[end] != quote {
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(ExprError::Parse {
                        pos: start,
                        message: "unterminated string literal".into(),
                    });
                }
                out.push(Tok {
                    kind: TokKind::Str(input[start + 1..end].to_string()),
                    pos: start,
                });
                i = end + 1;
            }
            '-' | '0'..='9' => {
                let start = i;
                if c == '-' {
                    i += 1;
                    if !bytes.get(i).is_some_and(u8::is_ascii_digit) {
                        return Err(ExprError::Parse {
                            pos: start,
                            message: "expected digits after '-'".into(),
                        });
                    }
                }
                let mut saw_dot = false;
                while let Some(&b) = bytes.get(i) {
                    if b.is_ascii_digit() {
                        i += 1;
                    } else if b == b'.' && !saw_dot {
                        saw_dot = true;
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text = &input[start..i];
                let kind = if saw_dot {
                    TokKind::Float(text.parse().map_err(|_| ExprError::Parse {
                        pos: start,
                        message: format!("malformed number '{text}'"),
                    })?)
                } else {
                    TokKind::Int(text.parse().map_err(|_| ExprError::Parse {
                        pos: start,
                        message: format!("malformed number '{text}'"),
                    })?)
                };
                out.push(Tok { kind, pos: start });
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while bytes
                    .get(i)
                    .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    i += 1;
                }
                out.push(Tok {
                    kind: TokKind::Ident(input[start..i].to_string()),
                    pos: start,
                });
            }
            _ => {
                return Err(ExprError::Parse {
                    pos: i,
                    message: format!("unexpected character '{c}'"),
                });
            }
        }
    }

    Ok(out)
}

// ---- AST ----

#[derive(Debug, Clone, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(EvalValue),
    Var(String),
    MatchPresent,
    MatchField(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ExprError {
        let pos = self.tokens.get(self.pos).map(|t| t.pos).unwrap_or_default();
        ExprError::Parse {
            pos,
            message: message.into(),
        }
    }

    /// Is the next token the given keyword (case-insensitive)?
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Some(TokKind::Ident(name)) = self.peek()
            && name.eq_ignore_ascii_case(kw)
        {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, kind: &TokKind, what: &str) -> Result<(), ExprError> {
        if self.peek() == Some(kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(TokKind::Eq) => CmpOp::Eq,
            Some(TokKind::Ne) => CmpOp::Ne,
            Some(TokKind::Lt) => CmpOp::Lt,
            Some(TokKind::Le) => CmpOp::Le,
            Some(TokKind::Gt) => CmpOp::Gt,
            Some(TokKind::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_primary()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().cloned() {
            Some(TokKind::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&TokKind::RParen, "')'")?;
                Ok(inner)
            }
            Some(TokKind::Int(i)) => {
                self.pos += 1;
                Ok(Expr::Lit(EvalValue::Int(i)))
            }
            Some(TokKind::Float(f)) => {
                self.pos += 1;
                Ok(Expr::Lit(EvalValue::Float(f)))
            }
            Some(TokKind::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Lit(EvalValue::Str(s)))
            }
            Some(TokKind::Ident(name)) => {
                if name.eq_ignore_ascii_case("true") {
                    self.pos += 1;
                    return Ok(Expr::Lit(EvalValue::Bool(true)));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.pos += 1;
                    return Ok(Expr::Lit(EvalValue::Bool(false)));
                }
                if name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("null") {
                    self.pos += 1;
                    return Ok(Expr::Lit(EvalValue::None));
                }
                if name == "vars" {
                    self.pos += 1;
                    self.expect(&TokKind::LBracket, "'[' after vars")?;
                    let key = match self.bump().map(|t| t.kind) {
                        Some(TokKind::Str(key)) => key,
                        _ => return Err(self.err("expected string key in vars[...]")),
                    };
                    self.expect(&TokKind::RBracket, "']'")?;
                    return Ok(Expr::Var(key));
                }
                if name == "last_match" {
                    self.pos += 1;
                    if self.peek() == Some(&TokKind::Dot) {
                        self.pos += 1;
                        let field = match self.bump().map(|t| t.kind) {
                            Some(TokKind::Ident(field)) => field,
                            _ => return Err(self.err("expected field after last_match.")),
                        };
                        return Ok(Expr::MatchField(field));
                    }
                    return Ok(Expr::MatchPresent);
                }
                Err(self.err(format!("unknown name '{name}'")))
            }
            _ => Err(self.err("expected a value")),
        }
    }
}

// ---- evaluation ----

#[derive(Debug, Clone, PartialEq)]
enum EvalValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

fn eval(expr: &Expr, env: &ExprEnv<'_>) -> Result<EvalValue, ExprError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Var(key) => Ok(env
            .vars
            .get(key)
            .map(|v| match v {
                Value::Bool(b) => EvalValue::Bool(*b),
                Value::Int(i) => EvalValue::Int(*i),
                Value::Float(f) => EvalValue::Float(*f),
                Value::Str(s) => EvalValue::Str(s.clone()),
            })
            .unwrap_or(EvalValue::None)),
        Expr::MatchPresent => Ok(if env.last_match.is_some() {
            EvalValue::Bool(true)
        } else {
            EvalValue::None
        }),
        Expr::MatchField(field) => {
            let m = env
                .last_match
                .ok_or_else(|| ExprError::Eval("last_match is none".into()))?;
            match field.as_str() {
                "name" => Ok(EvalValue::Str(m.name.clone())),
                "x" => Ok(EvalValue::Int(m.x as i64)),
                "y" => Ok(EvalValue::Int(m.y as i64)),
                "w" => Ok(EvalValue::Int(m.w as i64)),
                "h" => Ok(EvalValue::Int(m.h as i64)),
                "score" => Ok(EvalValue::Float(m.score)),
                other => Err(ExprError::Eval(format!(
                    "last_match has no field '{other}'"
                ))),
            }
        }
        Expr::Not(inner) => Ok(EvalValue::Bool(!truthy(&eval(inner, env)?))),
        Expr::And(a, b) => {
            if !truthy(&eval(a, env)?) {
                return Ok(EvalValue::Bool(false));
            }
            Ok(EvalValue::Bool(truthy(&eval(b, env)?)))
        }
        Expr::Or(a, b) => {
            if truthy(&eval(a, env)?) {
                return Ok(EvalValue::Bool(true));
            }
            Ok(EvalValue::Bool(truthy(&eval(b, env)?)))
        }
        Expr::Cmp(op, a, b) => {
            let lhs = eval(a, env)?;
            let rhs = eval(b, env)?;
            compare(op, &lhs, &rhs).map(EvalValue::Bool)
        }
    }
}

fn truthy(v: &EvalValue) -> bool {
    match v {
        EvalValue::None => false,
        EvalValue::Bool(b) => *b,
        EvalValue::Int(i) => *i != 0,
        EvalValue::Float(f) => *f != 0.0,
        EvalValue::Str(s) => !s.is_empty(),
    }
}

fn compare(op: &CmpOp, lhs: &EvalValue, rhs: &EvalValue) -> Result<bool, ExprError> {
    use EvalValue::*;

    // Equality is defined across every pairing; incompatible types are simply
    // unequal. Ordering is only defined within numbers and within strings.
    let equality = |eq: bool| match op {
        CmpOp::Eq => Ok(eq),
        CmpOp::Ne => Ok(!eq),
        _ => Err(ExprError::Eval(format!(
            "unordered comparison between {} and {}",
            type_name(lhs),
            type_name(rhs)
        ))),
    };

    match (lhs, rhs) {
        (Int(a), Int(b)) => Ok(apply_ord(op, a.cmp(b))),
        (Int(_) | Float(_), Int(_) | Float(_)) => {
            let a = as_f64(lhs);
            let b = as_f64(rhs);
            match a.partial_cmp(&b) {
                Some(ord) => Ok(apply_ord(op, ord)),
                Option::None => equality(false),
            }
        }
        (Str(a), Str(b)) => Ok(apply_ord(op, a.cmp(b))),
        (Bool(a), Bool(b)) => equality(a == b),
        (None, None) => equality(true),
        _ => equality(false),
    }
}

fn apply_ord(op: &CmpOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => ord == Equal,
        CmpOp::Ne => ord != Equal,
        CmpOp::Lt => ord == Less,
        CmpOp::Le => ord != Greater,
        CmpOp::Gt => ord == Greater,
        CmpOp::Ge => ord != Less,
    }
}

fn as_f64(v: &EvalValue) -> f64 {
    match v {
        EvalValue::Int(i) => *i as f64,
        EvalValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn type_name(v: &EvalValue) -> &'static str {
    match v {
        EvalValue::None => "none",
        EvalValue::Bool(_) => "bool",
        EvalValue::Int(_) => "int",
        EvalValue::Float(_) => "float",
        EvalValue::Str(_) => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(vars: &[(&str, Value)], last_match: Option<MatchResult>) -> (BTreeMap<String, Value>, Option<MatchResult>) {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        (map, last_match)
    }

    fn check(expr: &str, vars: &[(&str, Value)], last_match: Option<MatchResult>) -> Result<bool, ExprError> {
        let (map, m) = env_with(vars, last_match);
        let env = ExprEnv {
            vars: &map,
            last_match: m.as_ref(),
        };
        eval_condition(expr, &env)
    }

    fn sample_match() -> MatchResult {
        MatchResult {
            name: "ok_button".into(),
            x: 10,
            y: 20,
            w: 32,
            h: 16,
            score: 0.92,
        }
    }

    #[test]
    fn literals_and_boolean_operators() {
        assert!(check("true", &[], None).unwrap());
        assert!(!check("false", &[], None).unwrap());
        assert!(check("not false", &[], None).unwrap());
        assert!(check("true and true", &[], None).unwrap());
        assert!(!check("true and false", &[], None).unwrap());
        assert!(check("false or true", &[], None).unwrap());
        // 'and' binds tighter than 'or'.
        assert!(check("true or false and false", &[], None).unwrap());
        assert!(!check("(true or false) and false", &[], None).unwrap());
    }

    #[test]
    fn numeric_comparisons_unify_int_and_float() {
        assert!(check("1 < 3", &[], None).unwrap());
        assert!(check("2.5 >= 2", &[], None).unwrap());
        assert!(check("3 == 3.0", &[], None).unwrap());
        assert!(check("-1 < 0", &[], None).unwrap());
        assert!(!check("5 <= 4.9", &[], None).unwrap());
    }

    #[test]
    fn variable_binding_reads_the_store() {
        let vars = [("i", Value::Int(1)), ("name", Value::Str("alpha".into()))];
        assert!(check("vars['i'] < 3", &vars, None).unwrap());
        assert!(check("vars[\"name\"] == 'alpha'", &vars, None).unwrap());
        assert!(!check("vars['name'] == 'beta'", &vars, None).unwrap());
    }

    #[test]
    fn missing_variable_is_none() {
        assert!(check("vars['ghost'] == none", &[], None).unwrap());
        assert!(!check("vars['ghost'] == 0", &[], None).unwrap());
        // none is falsy in boolean position.
        assert!(check("not vars['ghost']", &[], None).unwrap());
    }

    #[test]
    fn last_match_presence_and_fields() {
        let m = sample_match();
        assert!(check("last_match != none", &[], Some(m.clone())).unwrap());
        assert!(check("last_match == none", &[], None).unwrap());
        assert!(check("last_match.score >= 0.9", &[], Some(m.clone())).unwrap());
        assert!(check("last_match.name == 'ok_button'", &[], Some(m.clone())).unwrap());
        assert!(check("last_match.x == 10 and last_match.h == 16", &[], Some(m)).unwrap());
    }

    #[test]
    fn field_access_on_absent_match_is_a_false_condition() {
        // The error is swallowed by eval_condition's caller; here we see it raw.
        let err = check("last_match.score > 0.5", &[], None).unwrap_err();
        assert!(matches!(err, ExprError::Eval(_)));
    }

    #[test]
    fn mixed_type_equality_is_false_and_ordering_is_an_error() {
        assert!(!check("'a' == 1", &[], None).unwrap());
        assert!(check("'a' != 1", &[], None).unwrap());
        assert!(matches!(
            check("'a' < 1", &[], None),
            Err(ExprError::Eval(_))
        ));
        assert!(matches!(
            check("true < false", &[], None),
            Err(ExprError::Eval(_))
        ));
    }

    #[test]
    fn malformed_expressions_are_parse_errors() {
        assert!(matches!(check("", &[], None), Err(ExprError::Parse { .. })));
        assert!(matches!(
            check("vars['i' < 3", &[], None),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            check("1 = 1", &[], None),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            check("import os", &[], None),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            check("true true", &[], None),
            Err(ExprError::Parse { .. })
        ));
    }

    #[test]
    fn only_the_two_bindings_resolve() {
        assert!(matches!(
            check("system == 1", &[], None),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            check("vars", &[], None),
            Err(ExprError::Parse { .. })
        ));
    }

    #[test]
    fn truthiness_in_boolean_position() {
        let vars = [
            ("n", Value::Int(2)),
            ("z", Value::Int(0)),
            ("s", Value::Str("x".into())),
            ("e", Value::Str(String::new())),
        ];
        assert!(check("vars['n']", &vars, None).unwrap());
        assert!(!check("vars['z']", &vars, None).unwrap());
        assert!(check("vars['s']", &vars, None).unwrap());
        assert!(!check("vars['e']", &vars, None).unwrap());
        assert!(check("last_match", &[], Some(sample_match())).unwrap());
        assert!(!check("last_match", &[], None).unwrap());
    }

    #[test]
    fn string_literals_keep_non_ascii_text() {
        let vars = [("name", Value::Str("héllo → wörld".into()))];
        assert!(check("vars['name'] == 'héllo → wörld'", &vars, None).unwrap());
        assert!(check("vars['name'] != \"hello\"", &vars, None).unwrap());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(check("TRUE AND NOT FALSE", &[], None).unwrap());
        assert!(check("vars['x'] == NONE", &[], None).unwrap());
    }
}
