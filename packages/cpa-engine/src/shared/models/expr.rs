//! Expression IR carried by CFA edges
//!
//! Integer-valued, side-effect free expressions over program variables.
//! Booleans follow C: zero is false, anything else is true.
//!
//! Expressions serialize as their source text (`Display`) and deserialize
//! through [`Expr::parse`], so CFA descriptions stay human readable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use super::expr_parser::{self, ExprParseError};

/// Program variable name (frontends qualify locals, e.g. `f::x`)
pub type VarName = String;

/// Local that carries a function's return value (`f::__retval`)
pub const RETURN_VARIABLE: &str = "__retval";

/// Function owning a qualified local (`f::x` → `f`); None for globals
pub fn owner_function(var: &str) -> Option<&str> {
    var.split_once("::").map(|(function, _)| function)
}

/// Return-value variable of `function`
pub fn return_variable(function: &str) -> VarName {
    format!("{}::{}", function, RETURN_VARIABLE)
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOp {
    /// Arithmetic negation (`-e`)
    Neg,
    /// Logical negation (`!e`)
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Binding strength (higher binds tighter)
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }

    /// Comparison operators produce 0/1
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Logical connectives
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    /// Integer constant
    Int(i64),
    /// Variable read
    Var(VarName),
    /// Nondeterministic value (`nondet()`)
    Nondet,
    /// Memory read through a pointer (`*e`)
    Deref(Box<Expr>),
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Integer constant
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    /// Variable read
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Logical negation
    pub fn not(expr: Expr) -> Self {
        Expr::Unary(UnaryOp::Not, Box::new(expr))
    }

    /// Parse from C-like source text
    ///
    /// # Example
    /// ```
    /// use cpa_engine::shared::models::Expr;
    ///
    /// let cond = Expr::parse("i != j && n > 0").unwrap();
    /// assert_eq!(cond.to_string(), "i != j && n > 0");
    /// ```
    pub fn parse(text: &str) -> Result<Self, ExprParseError> {
        expr_parser::parse_expr(text)
    }

    /// Variable name if this is a plain variable read
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Constant value if this is a literal
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// All variables read by the expression (including pointer operands)
    pub fn vars(&self) -> BTreeSet<VarName> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<VarName>) {
        match self {
            Expr::Int(_) | Expr::Nondet => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Deref(inner) | Expr::Unary(_, inner) => inner.collect_vars(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
        }
    }

    /// Does the expression read `var`?
    pub fn mentions(&self, var: &str) -> bool {
        match self {
            Expr::Int(_) | Expr::Nondet => false,
            Expr::Var(name) => name == var,
            Expr::Deref(inner) | Expr::Unary(_, inner) => inner.mentions(var),
            Expr::Binary(_, lhs, rhs) => lhs.mentions(var) || rhs.mentions(var),
        }
    }

    /// Pointer operands of every dereference inside the expression
    pub fn dereferenced(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.collect_derefs(&mut out);
        out
    }

    fn collect_derefs<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Expr::Int(_) | Expr::Var(_) | Expr::Nondet => {}
            Expr::Deref(inner) => {
                out.push(inner);
                inner.collect_derefs(out);
            }
            Expr::Unary(_, inner) => inner.collect_derefs(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_derefs(out);
                rhs.collect_derefs(out);
            }
        }
    }

    /// Contains `nondet()` or a memory read
    pub fn is_opaque(&self) -> bool {
        match self {
            Expr::Int(_) | Expr::Var(_) => false,
            Expr::Nondet | Expr::Deref(_) => true,
            Expr::Unary(_, inner) => inner.is_opaque(),
            Expr::Binary(_, lhs, rhs) => lhs.is_opaque() || rhs.is_opaque(),
        }
    }

    /// Evaluate if the expression has no variables
    pub fn eval_constant(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            Expr::Var(_) | Expr::Nondet | Expr::Deref(_) => None,
            Expr::Unary(UnaryOp::Neg, inner) => inner.eval_constant()?.checked_neg(),
            Expr::Unary(UnaryOp::Not, inner) => Some((inner.eval_constant()? == 0) as i64),
            Expr::Binary(op, lhs, rhs) => {
                let l = lhs.eval_constant()?;
                let r = rhs.eval_constant()?;
                apply_binary(*op, l, r)
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(op, _, _) => op.precedence(),
            Expr::Unary(_, _) | Expr::Deref(_) => 7,
            Expr::Int(v) if *v < 0 => 7,
            _ => 8,
        }
    }
}

/// Concrete semantics of a binary operator (None on overflow or division by zero)
pub fn apply_binary(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        BinaryOp::Mul => l.checked_mul(r),
        BinaryOp::Div => l.checked_div(r),
        BinaryOp::Rem => l.checked_rem(r),
        BinaryOp::Eq => Some((l == r) as i64),
        BinaryOp::Ne => Some((l != r) as i64),
        BinaryOp::Lt => Some((l < r) as i64),
        BinaryOp::Le => Some((l <= r) as i64),
        BinaryOp::Gt => Some((l > r) as i64),
        BinaryOp::Ge => Some((l >= r) as i64),
        BinaryOp::And => Some((l != 0 && r != 0) as i64),
        BinaryOp::Or => Some((l != 0 || r != 0) as i64),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Nondet => write!(f, "nondet()"),
            Expr::Deref(inner) => {
                if inner.precedence() < 7 {
                    write!(f, "*({})", inner)
                } else {
                    write!(f, "*{}", inner)
                }
            }
            Expr::Unary(op, inner) => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                if inner.precedence() < 7 {
                    write!(f, "{}({})", symbol, inner)
                } else {
                    write!(f, "{}{}", symbol, inner)
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let p = op.precedence();
                if lhs.precedence() < p {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                if rhs.precedence() <= p {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Expr::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LValue {
    /// `x = ...`
    Var(VarName),
    /// `*p = ...`
    Deref(VarName),
}

impl LValue {
    /// Parse `x` or `*p`
    pub fn parse(text: &str) -> Result<Self, ExprParseError> {
        match Expr::parse(text)? {
            Expr::Var(name) => Ok(LValue::Var(name)),
            Expr::Deref(inner) => match *inner {
                Expr::Var(name) => Ok(LValue::Deref(name)),
                other => Err(ExprParseError::new(
                    0,
                    format!("unsupported assignment target '*({})'", other),
                )),
            },
            other => Err(ExprParseError::new(
                0,
                format!("'{}' is not assignable", other),
            )),
        }
    }

    /// Variable named by the target (the pointer for `*p`)
    pub fn name(&self) -> &str {
        match self {
            LValue::Var(name) | LValue::Deref(name) => name,
        }
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LValue::Var(name) => write!(f, "{}", name),
            LValue::Deref(name) => write!(f, "*{}", name),
        }
    }
}

impl Serialize for LValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        LValue::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_respects_precedence() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::int(1)),
            Expr::var("b"),
        );
        assert_eq!(e.to_string(), "(a + 1) * b");

        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::var("a"),
            Expr::binary(BinaryOp::Sub, Expr::var("b"), Expr::var("c")),
        );
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_vars_and_derefs() {
        let e = Expr::parse("*p + x * 2 > y").unwrap();
        let vars: Vec<_> = e.vars().into_iter().collect();
        assert_eq!(vars, vec!["p", "x", "y"]);
        assert_eq!(e.dereferenced(), vec![&Expr::var("p")]);
        assert!(e.is_opaque());
        assert!(e.mentions("x"));
        assert!(!e.mentions("z"));
    }

    #[test]
    fn test_eval_constant() {
        assert_eq!(Expr::parse("3 * (2 + 1)").unwrap().eval_constant(), Some(9));
        assert_eq!(Expr::parse("1 < 2 && 0").unwrap().eval_constant(), Some(0));
        assert_eq!(Expr::parse("1 / 0").unwrap().eval_constant(), None);
        assert_eq!(Expr::parse("x + 1").unwrap().eval_constant(), None);
    }

    #[test]
    fn test_lvalue_parse() {
        assert_eq!(LValue::parse("x").unwrap(), LValue::Var("x".to_string()));
        assert_eq!(LValue::parse("*p").unwrap(), LValue::Deref("p".to_string()));
        assert!(LValue::parse("x + 1").is_err());
    }

    #[test]
    fn test_qualified_names() {
        assert_eq!(owner_function("f::x"), Some("f"));
        assert_eq!(owner_function("g"), None);
        assert_eq!(return_variable("f"), "f::__retval");
    }

    #[test]
    fn test_serde_as_text() {
        let e = Expr::parse("!(a == b)").unwrap();
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"!(a == b)\"");
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
