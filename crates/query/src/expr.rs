//! Expressions used by `where` predicates and `extend` columns.

use hashbrown::HashMap;
use regex::Regex;
use relq_core::{Error, Result, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

/// Compiled patterns kept per thread before the cache is cleared.
const REGEX_CACHE_SIZE: usize = 64;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Pattern
    Match,
    NoMatch,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // String
    Cat,
}

impl BinaryOp {
    /// Returns true for the ordering comparisons and equality.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The operator with its operands swapped, for `5 < a` style terms.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            op => op,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "isnt",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Match => "=~",
            BinaryOp::NoMatch => "!~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Cat => "$",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression AST node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Literal value.
    Constant(Value),
    /// Column reference.
    Column(String),
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// IN expression.
    In { expr: Box<Expr>, list: Vec<Value> },
    /// Conjunction.
    And(Vec<Expr>),
    /// Disjunction.
    Or(Vec<Expr>),
}

impl Expr {
    /// Creates a literal expression.
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// Creates a column reference expression.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// Creates a binary expression.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    /// Creates a not-equal expression.
    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ne, right)
    }

    /// Creates a less-than expression.
    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Lt, right)
    }

    /// Creates a less-than-or-equal expression.
    pub fn le(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Le, right)
    }

    /// Creates a greater-than expression.
    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Gt, right)
    }

    /// Creates a greater-than-or-equal expression.
    pub fn ge(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ge, right)
    }

    /// Creates a regex match expression.
    pub fn matches(left: Expr, pattern: impl Into<Value>) -> Self {
        Self::binary(left, BinaryOp::Match, Expr::Constant(pattern.into()))
    }

    /// Creates an IN expression.
    pub fn in_list(expr: Expr, list: Vec<Value>) -> Self {
        Expr::In {
            expr: Box::new(expr),
            list,
        }
    }

    /// Creates a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Creates an AND of the given expressions, flattening nested ANDs.
    pub fn and(exprs: Vec<Expr>) -> Self {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            match e {
                Expr::And(inner) => out.extend(inner),
                e => out.push(e),
            }
        }
        Expr::And(out)
    }

    /// Creates an OR of the given expressions.
    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Or(exprs)
    }

    /// Splits a predicate into its top-level conjuncts.
    pub fn conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::And(exprs) => exprs.into_iter().flat_map(Expr::conjuncts).collect(),
            Expr::Constant(Value::Boolean(true)) => Vec::new(),
            e => vec![e],
        }
    }

    /// Returns the referenced column names.
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Column(c) => {
                out.insert(c.clone());
            }
            Expr::Unary { expr, .. } | Expr::In { expr, .. } => expr.collect_fields(out),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_fields(out);
                }
            }
        }
    }

    /// Returns true if the expression references no columns.
    pub fn is_constant(&self) -> bool {
        self.fields().is_empty()
    }

    /// Renames column references from `from[i]` to `to[i]`.
    pub fn rename(&self, from: &[String], to: &[String]) -> Expr {
        self.map_columns(&|c| match from.iter().position(|f| f == c) {
            Some(i) => Expr::Column(to[i].clone()),
            None => Expr::Column(c.to_string()),
        })
    }

    /// Replaces column references to `from[i]` with the expression `to[i]`.
    pub fn replace_fields(&self, from: &[String], to: &[Expr]) -> Expr {
        self.map_columns(&|c| match from.iter().position(|f| f == c) {
            Some(i) => to[i].clone(),
            None => Expr::Column(c.to_string()),
        })
    }

    fn map_columns(&self, f: &dyn Fn(&str) -> Expr) -> Expr {
        match self {
            Expr::Constant(v) => Expr::Constant(v.clone()),
            Expr::Column(c) => f(c),
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: Box::new(expr.map_columns(f)),
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.map_columns(f)),
                op: *op,
                right: Box::new(right.map_columns(f)),
            },
            Expr::In { expr, list } => Expr::In {
                expr: Box::new(expr.map_columns(f)),
                list: list.clone(),
            },
            Expr::And(exprs) => Expr::And(exprs.iter().map(|e| e.map_columns(f)).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.iter().map(|e| e.map_columns(f)).collect()),
        }
    }

    /// Evaluates the expression, reading columns through `get`.
    pub fn eval(&self, get: &dyn Fn(&str) -> Value) -> Result<Value> {
        match self {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::Column(c) => Ok(get(c)),
            Expr::Unary { op, expr } => {
                let v = expr.eval(get)?;
                match op {
                    UnaryOp::Not => Ok(Value::Boolean(!truth(&v)?)),
                    UnaryOp::Neg => match v {
                        Value::Int64(i) => Ok(i
                            .checked_neg()
                            .map_or(Value::Float64(-(i as f64)), Value::Int64)),
                        v => Ok(Value::Float64(-number(&v)?)),
                    },
                }
            }
            Expr::Binary { left, op, right } => {
                let l = left.eval(get)?;
                let r = right.eval(get)?;
                eval_binary(&l, *op, &r)
            }
            Expr::In { expr, list } => {
                let v = expr.eval(get)?;
                Ok(Value::Boolean(list.contains(&v)))
            }
            Expr::And(exprs) => {
                for e in exprs {
                    if !truth(&e.eval(get)?)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Expr::Or(exprs) => {
                for e in exprs {
                    if truth(&e.eval(get)?)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
        }
    }

    /// Evaluates the expression as a predicate.
    pub fn test(&self, get: &dyn Fn(&str) -> Value) -> Result<bool> {
        truth(&self.eval(get)?)
    }
}

fn truth(v: &Value) -> Result<bool> {
    match v {
        Value::Boolean(b) => Ok(*b),
        v => Err(Error::invalid_expression(format!(
            "conditionals require true or false, got {}",
            v
        ))),
    }
}

/// Numeric coercion for arithmetic; the empty value counts as zero.
fn number(v: &Value) -> Result<f64> {
    if v.is_null() {
        return Ok(0.0);
    }
    v.to_number()
        .ok_or_else(|| Error::invalid_expression(format!("can't convert {} to number", v)))
}

fn int(v: &Value) -> Option<i64> {
    match v {
        Value::Int64(i) => Some(*i),
        Value::Null => Some(0),
        _ => None,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

fn eval_binary(l: &Value, op: BinaryOp, r: &Value) -> Result<Value> {
    let v = match op {
        BinaryOp::Eq => Value::Boolean(l == r),
        BinaryOp::Ne => Value::Boolean(l != r),
        BinaryOp::Lt => Value::Boolean(l < r),
        BinaryOp::Le => Value::Boolean(l <= r),
        BinaryOp::Gt => Value::Boolean(l > r),
        BinaryOp::Ge => Value::Boolean(l >= r),
        BinaryOp::Match | BinaryOp::NoMatch => {
            let re = regex(&text(r))?;
            Value::Boolean(re.is_match(&text(l)) == (op == BinaryOp::Match))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            if let (Some(a), Some(b)) = (int(l), int(r)) {
                let exact = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                if let Some(x) = exact {
                    return Ok(Value::Int64(x));
                }
            }
            let (a, b) = (number(l)?, number(r)?);
            Value::Float64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            })
        }
        BinaryOp::Div => {
            let (a, b) = (number(l)?, number(r)?);
            if b == 0.0 {
                return Err(Error::invalid_expression("division by zero"));
            }
            let exact = match (int(l), int(r)) {
                (Some(x), Some(y)) if x.checked_rem(y) == Some(0) => x.checked_div(y),
                _ => None,
            };
            match exact {
                Some(x) => Value::Int64(x),
                None => Value::Float64(a / b),
            }
        }
        BinaryOp::Cat => Value::String(text(l) + &text(r)),
    };
    Ok(v)
}

/// Returns the compiled pattern, compiling it on first use.
fn regex(pattern: &str) -> Result<Regex> {
    REGEX_CACHE.with(|cache| {
        if let Some(re) = cache.borrow().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)
            .map_err(|e| Error::invalid_expression(format!("bad regex {:?}: {}", pattern, e)))?;
        let mut cache = cache.borrow_mut();
        if cache.len() >= REGEX_CACHE_SIZE {
            cache.clear();
        }
        cache.insert(pattern.to_string(), re.clone());
        Ok(re)
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(v) => write!(f, "{}", v),
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Unary { op: UnaryOp::Not, expr } => write!(f, "not {}", expr),
            Expr::Unary { op: UnaryOp::Neg, expr } => write!(f, "-{}", expr),
            Expr::Binary { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::In { expr, list } => {
                let items: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "{} in ({})", expr, items.join(", "))
            }
            Expr::And(exprs) => {
                let items: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", items.join(" and "))
            }
            Expr::Or(exprs) => {
                let items: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", items.join(" or "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(col: &str) -> Value {
        match col {
            "a" => Value::Int64(3),
            "b" => Value::String("hello".into()),
            "f" => Value::Float64(1.5),
            _ => Value::Null,
        }
    }

    fn eval(e: &Expr) -> Value {
        e.eval(&row).unwrap()
    }

    #[test]
    fn test_comparisons() {
        let a = || Expr::column("a");
        assert_eq!(eval(&Expr::eq(a(), Expr::constant(3))), Value::Boolean(true));
        assert_eq!(eval(&Expr::lt(a(), Expr::constant(3))), Value::Boolean(false));
        assert_eq!(eval(&Expr::ge(a(), Expr::constant(3.0))), Value::Boolean(true));
        assert_eq!(eval(&Expr::ne(Expr::column("x"), Expr::constant(""))), Value::Boolean(true));
        assert_eq!(eval(&Expr::eq(Expr::column("x"), Expr::Constant(Value::Null))), Value::Boolean(true));
    }

    #[test]
    fn test_arithmetic() {
        let e = Expr::binary(Expr::column("a"), BinaryOp::Mul, Expr::constant(2));
        assert_eq!(eval(&e), Value::Int64(6));
        let e = Expr::binary(Expr::column("a"), BinaryOp::Add, Expr::column("f"));
        assert_eq!(eval(&e), Value::Float64(4.5));
        let e = Expr::binary(Expr::column("a"), BinaryOp::Div, Expr::constant(2));
        assert_eq!(eval(&e), Value::Float64(1.5));
        let e = Expr::binary(Expr::column("x"), BinaryOp::Sub, Expr::constant(1));
        assert_eq!(eval(&e), Value::Int64(-1));

        let e = Expr::binary(Expr::column("b"), BinaryOp::Add, Expr::constant(1));
        assert!(matches!(e.eval(&row), Err(Error::InvalidExpression { .. })));
        let e = Expr::binary(Expr::column("a"), BinaryOp::Div, Expr::constant(0));
        assert!(e.eval(&row).is_err());
    }

    #[test]
    fn test_cat_and_match() {
        let e = Expr::binary(Expr::column("b"), BinaryOp::Cat, Expr::column("a"));
        assert_eq!(eval(&e), Value::String("hello3".into()));
        assert_eq!(eval(&Expr::matches(Expr::column("b"), "^he")), Value::Boolean(true));
        let e = Expr::binary(Expr::column("b"), BinaryOp::NoMatch, Expr::constant("z"));
        assert_eq!(eval(&e), Value::Boolean(true));
        assert!(Expr::matches(Expr::column("b"), "(").eval(&row).is_err());
    }

    #[test]
    fn test_match_compiles_pattern_once() {
        let e = Expr::matches(Expr::column("b"), "l+o$");
        for _ in 0..10 {
            assert_eq!(eval(&e), Value::Boolean(true));
        }
        assert!(REGEX_CACHE.with(|c| c.borrow().contains_key("l+o$")));
        assert!(regex("(").is_err());
        assert!(!REGEX_CACHE.with(|c| c.borrow().contains_key("(")));
    }

    #[test]
    fn test_division_overflow_falls_back_to_float() {
        let e = Expr::binary(Expr::constant(i64::MIN), BinaryOp::Div, Expr::constant(-1));
        assert_eq!(eval(&e), Value::Float64(-(i64::MIN as f64)));
        let e = Expr::binary(Expr::constant(-8), BinaryOp::Div, Expr::constant(-2));
        assert_eq!(eval(&e), Value::Int64(4));
    }

    #[test]
    fn test_logic() {
        let t = Expr::eq(Expr::column("a"), Expr::constant(3));
        let f = Expr::eq(Expr::column("a"), Expr::constant(4));
        assert!(Expr::or(vec![f.clone(), t.clone()]).test(&row).unwrap());
        assert!(!Expr::and(vec![t.clone(), f.clone()]).test(&row).unwrap());
        assert!(Expr::not(f).test(&row).unwrap());
        assert!(Expr::in_list(Expr::column("a"), vec![1.into(), 3.into()]).test(&row).unwrap());
        assert!(Expr::column("a").test(&row).is_err());
    }

    #[test]
    fn test_fields_and_rename() {
        let e = Expr::and(vec![
            Expr::eq(Expr::column("a"), Expr::constant(1)),
            Expr::and(vec![Expr::gt(Expr::column("b"), Expr::column("c"))]),
        ]);
        let fields: Vec<String> = e.fields().into_iter().collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
        assert_eq!(e.clone().conjuncts().len(), 2);

        let r = e.rename(&["a".to_string()], &["x".to_string()]);
        assert!(r.fields().contains("x"));
        assert!(!r.fields().contains("a"));

        let r = e.replace_fields(&["b".to_string()], &[Expr::Constant(Value::Null)]);
        assert!(!r.fields().contains("b"));
        assert_eq!(r.to_string(), "a = 1 and \"\" > c");
    }
}
