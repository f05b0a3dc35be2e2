//! Special-formula sandbox.
//!
//! A formula is text with `{name}` placeholders. Evaluation:
//! 1. substitute every placeholder with its context value (missing or
//!    non-finite → 0, logged; negatives parenthesized)
//! 2. reject any character outside `0-9 . + - * / ( )` and whitespace
//! 3. tokenize and parse with a recursive-descent grammar
//!    `expr := term (('+'|'-') term)*`, `term := unary (('*'|'/') unary)*`,
//!    `unary := ('+'|'-') unary | primary`, `primary := number | '(' expr ')'`
//! 4. evaluate the tree
//!
//! Nothing but the four arithmetic operators is reachable from a formula.

use std::collections::{BTreeMap, BTreeSet};

use pe_core::CalcLog;
use serde::Serialize;
use thiserror::Error;

/// Named scalar values available to formulas.
pub type FormulaContext = BTreeMap<String, f64>;

/// Longest accepted expression, in bytes, after substitution.
pub const MAX_FORMULA_LEN: usize = 4096;
/// Deepest accepted nesting of parentheses and unary signs.
pub const MAX_DEPTH: usize = 64;

/// Value used for every placeholder by the dry-run validator.
const DRY_RUN_VALUE: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("formula contains disallowed character {ch:?} at position {position}")]
    RejectedToken { ch: char, position: usize },
    #[error("formula syntax error: {0}")]
    Syntax(String),
    #[error("formula longer than {} bytes", MAX_FORMULA_LEN)]
    TooLong,
    #[error("formula nesting deeper than {}", MAX_DEPTH)]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
}

// ----------------------------- Placeholders --------------------------------------------

/// Placeholder spans `(start, end_exclusive, name)` in source order.
fn placeholders(formula: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let mut rest = 0;
    while let Some(open) = formula[rest..].find('{') {
        let start = rest + open;
        let Some(close) = formula[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + close + 1;
        let name = formula[start + 1..end - 1].trim();
        if is_identifier(name) {
            out.push((start, end, name));
        }
        rest = end;
    }
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Distinct placeholder names in first-use order.
pub fn extract_variables(formula: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    placeholders(formula)
        .into_iter()
        .filter(|(_, _, n)| seen.insert(*n))
        .map(|(_, _, n)| n.to_string())
        .collect()
}

fn render(v: f64) -> String {
    if v < 0.0 {
        format!("({v})")
    } else {
        format!("{v}")
    }
}

/// Replace every `{name}` with its value from `ctx`. Malformed braces are left
/// in place for the whitelist check to reject.
pub fn substitute(formula: &str, ctx: &FormulaContext, log: &mut CalcLog) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for (start, end, name) in placeholders(formula) {
        out.push_str(&formula[last..start]);
        let value = match ctx.get(name) {
            Some(v) if v.is_finite() => *v,
            Some(v) => {
                tracing::debug!(
                    variable = name,
                    value = %v,
                    "non-finite formula variable replaced by 0"
                );
                log.push(format!("formula: {{{name}}} is {v}, using 0"));
                0.0
            }
            None => {
                tracing::debug!(variable = name, "unknown formula variable replaced by 0");
                log.push(format!("formula: {{{name}}} is undefined, using 0"));
                0.0
            }
        };
        out.push_str(&render(value));
        last = end;
    }
    out.push_str(&formula[last..]);
    out
}

/// Reject anything outside the arithmetic alphabet.
pub fn check_tokens(expr: &str) -> Result<(), FormulaError> {
    if expr.len() > MAX_FORMULA_LEN {
        return Err(FormulaError::TooLong);
    }
    match expr
        .chars()
        .enumerate()
        .find(|(_, c)| !(c.is_ascii_digit() || c.is_whitespace() || "+-*/().".contains(*c)))
    {
        Some((position, ch)) => Err(FormulaError::RejectedToken { ch, position }),
        None => Ok(()),
    }
}

// ----------------------------- Tokens & grammar ----------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::Syntax(format!("malformed number {text:?}")))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            other => {
                return Err(FormulaError::RejectedToken { ch: other, position: i });
            }
        }
        i += 1;
    }
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Neg(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0, depth: 0 }
    }

    fn parse(mut self) -> Result<Expr, FormulaError> {
        let expr = self.parse_add_sub()?;
        if self.index != self.tokens.len() {
            return Err(FormulaError::Syntax(format!(
                "unexpected trailing token at {}",
                self.index
            )));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.index).copied()
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.index += 1;
        }
        t
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        Ok(())
    }

    fn parse_add_sub(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_mul_div()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(rhs) };
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_unary()?;
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(rhs) };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) | Some(Token::Plus) => {
                let negate = self.consume() == Some(Token::Minus);
                self.descend()?;
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(if negate { Expr::Neg(Box::new(inner)) } else { inner })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.consume() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.parse_add_sub()?;
                if self.consume() != Some(Token::RParen) {
                    return Err(FormulaError::Syntax("missing ')'".into()));
                }
                self.depth -= 1;
                Ok(expr)
            }
            Some(t) => Err(FormulaError::Syntax(format!("unexpected {t:?}"))),
            None => Err(FormulaError::Syntax("unexpected end of formula".into())),
        }
    }
}

fn eval(expr: &Expr) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(v) => Ok(*v),
        Expr::Neg(inner) => Ok(-eval(inner)?),
        Expr::Binary { op, left, right } => {
            let l = eval(left)?;
            let r = eval(right)?;
            Ok(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    l / r
                }
            })
        }
    }
}

// ----------------------------- Entry points --------------------------------------------

/// Evaluate a placeholder-free arithmetic expression.
pub fn evaluate_expression(expr: &str) -> Result<f64, FormulaError> {
    if expr.trim().is_empty() {
        return Err(FormulaError::Empty);
    }
    check_tokens(expr)?;
    let tree = Parser::new(tokenize(expr)?).parse()?;
    eval(&tree)
}

/// Substitute `ctx` into `formula` and evaluate it.
///
/// Disallowed characters, syntax errors and limit violations are errors.
/// Division by zero and non-finite results are data-dependent: they are
/// logged and yield 0.
pub fn evaluate_special_formula(
    formula: &str,
    ctx: &FormulaContext,
    log: &mut CalcLog,
) -> Result<f64, FormulaError> {
    if formula.trim().is_empty() {
        return Err(FormulaError::Empty);
    }
    let expr = substitute(formula, ctx, log);
    log.push(format!("formula: {formula} → {expr}"));
    match evaluate_expression(&expr) {
        Ok(v) if v.is_finite() => {
            log.push(format!("formula result = {v:.4}"));
            Ok(v)
        }
        Ok(v) => {
            tracing::warn!(result = %v, "formula produced a non-finite value");
            log.push(format!("formula result {v} is not finite, using 0"));
            Ok(0.0)
        }
        Err(FormulaError::DivisionByZero) => {
            tracing::warn!(formula, "formula divided by zero");
            log.push("formula divided by zero, using 0");
            Ok(0.0)
        }
        Err(e) => Err(e),
    }
}

/// Dry-run verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormulaValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check a formula without live data: every placeholder becomes 1.
pub fn validate_special_formula(formula: &str) -> FormulaValidation {
    let ctx: FormulaContext = extract_variables(formula)
        .into_iter()
        .map(|n| (n, DRY_RUN_VALUE))
        .collect();
    let mut scratch = CalcLog::new();
    match evaluate_special_formula(formula, &ctx, &mut scratch) {
        Ok(_) => FormulaValidation { valid: true, error: None },
        Err(e) => FormulaValidation {
            valid: false,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, f64)]) -> FormulaContext {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn precedence_and_unary() {
        assert_eq!(evaluate_expression("1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(evaluate_expression("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(evaluate_expression("-2 * -3").unwrap(), 6.0);
        assert_eq!(evaluate_expression("10 / 4 - +1").unwrap(), 1.5);
    }

    #[test]
    fn substitution_parenthesizes_negatives() {
        let mut log = CalcLog::new();
        let vars = ctx(&[("a", 5.0), ("b", -3.0)]);
        let v = evaluate_special_formula("{a}-{b}", &vars, &mut log).unwrap();
        assert_eq!(v, 8.0);
    }

    #[test]
    fn unknown_variables_become_zero_and_are_logged() {
        let mut log = CalcLog::new();
        let vars = ctx(&[("kor_std", 120.0)]);
        let v = evaluate_special_formula("{kor_std} + {nope}", &vars, &mut log).unwrap();
        assert_eq!(v, 120.0);
        assert!(log.mentions("{nope} is undefined"));
    }

    #[test]
    fn letters_outside_placeholders_are_rejected() {
        let mut log = CalcLog::new();
        let vars = ctx(&[("kor_std", 1.0)]);
        let err = evaluate_special_formula("{kor_std} + DROP", &vars, &mut log).unwrap_err();
        assert!(matches!(err, FormulaError::RejectedToken { ch: 'D', .. }));
        assert!(matches!(
            evaluate_expression("1; 2"),
            Err(FormulaError::RejectedToken { ch: ';', .. })
        ));
        assert!(matches!(
            evaluate_expression("{x}"),
            Err(FormulaError::RejectedToken { ch: '{', .. })
        ));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let mut log = CalcLog::new();
        let vars = ctx(&[("a", 1.0), ("b", 0.0)]);
        let v = evaluate_special_formula("{a} / {b}", &vars, &mut log).unwrap();
        assert_eq!(v, 0.0);
        assert!(log.mentions("divided by zero"));
    }

    #[test]
    fn limits_and_syntax() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(evaluate_expression(&deep), Err(FormulaError::TooDeep));
        let long = "1+".repeat(MAX_FORMULA_LEN) + "1";
        assert_eq!(evaluate_expression(&long), Err(FormulaError::TooLong));
        assert!(matches!(evaluate_expression("1 +"), Err(FormulaError::Syntax(_))));
        assert!(matches!(evaluate_expression("1.2.3"), Err(FormulaError::Syntax(_))));
        assert_eq!(evaluate_expression("   "), Err(FormulaError::Empty));
    }

    #[test]
    fn validator_and_extractor() {
        assert!(validate_special_formula("({kor_std} + {math_std}) * 2").valid);
        let bad = validate_special_formula("{kor_std} +* 2");
        assert!(!bad.valid);
        assert!(bad.error.is_some());
        assert_eq!(
            extract_variables("{a} + { b } * {a} / {c-d}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
