//! Symbolic launch counts.
//!
//! An [`Expression`] is either terminated (an exact count, `Indeterminate` or
//! `Unbounded`) or deferred (a reference to another function's count, or a sum
//! that still contains one). Expressions are immutable; sums share their
//! operands through `Arc`, so one sub-expression can hang off several parents.

use launchgraph_core::{CountError, FunctionId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// A fully resolved count with no dependency on other functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Terminated {
    Constant(u64),
    /// Zero or more launches; the count depends on data or control flow.
    Indeterminate,
    /// No finite static bound, e.g. recursion through a launch.
    Unbounded,
}

impl Terminated {
    pub const ZERO: Terminated = Terminated::Constant(0);
    pub const ONE: Terminated = Terminated::Constant(1);
}

impl Add for Terminated {
    type Output = Terminated;

    /// `Indeterminate` absorbs everything, including `Unbounded`.
    fn add(self, rhs: Terminated) -> Terminated {
        match (self, rhs) {
            (Terminated::Indeterminate, _) | (_, Terminated::Indeterminate) => {
                Terminated::Indeterminate
            }
            (Terminated::Unbounded, _) | (_, Terminated::Unbounded) => Terminated::Unbounded,
            (Terminated::Constant(a), Terminated::Constant(b)) => {
                Terminated::Constant(a.saturating_add(b))
            }
        }
    }
}

impl fmt::Display for Terminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminated::Constant(n) => write!(f, "{}", n),
            Terminated::Indeterminate => f.write_str("Some coroutines could be launched"),
            Terminated::Unbounded => f.write_str("Infinity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Constant(u64),
    Indeterminate,
    Unbounded,
    /// Whatever the referenced function's own expression evaluates to.
    FunctionRef(FunctionId),
    /// Sum with at least one deferred operand.
    Sum(Arc<Expression>, Arc<Expression>),
}

impl Expression {
    pub const ZERO: Expression = Expression::Constant(0);
    pub const ONE: Expression = Expression::Constant(1);

    pub fn as_terminated(&self) -> Option<Terminated> {
        match self {
            Expression::Constant(n) => Some(Terminated::Constant(*n)),
            Expression::Indeterminate => Some(Terminated::Indeterminate),
            Expression::Unbounded => Some(Terminated::Unbounded),
            Expression::FunctionRef(_) | Expression::Sum(..) => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.as_terminated().is_some()
    }

    /// Combination for branches taken with some probability. There is no
    /// model for conditions yet, so this always fails.
    pub fn multiply(&self, _other: &Expression) -> Result<Expression> {
        Err(CountError::NotImplemented(
            "multiplicative combination needs an analysis of branch conditions",
        ))
    }
}

impl From<Terminated> for Expression {
    fn from(value: Terminated) -> Self {
        match value {
            Terminated::Constant(n) => Expression::Constant(n),
            Terminated::Indeterminate => Expression::Indeterminate,
            Terminated::Unbounded => Expression::Unbounded,
        }
    }
}

impl Add for Expression {
    type Output = Expression;

    /// Priority order: `Indeterminate`, then `Unbounded`, then constant
    /// folding. Anything else stays a deferred `Sum`.
    fn add(self, rhs: Expression) -> Expression {
        match (self, rhs) {
            (Expression::Indeterminate, _) | (_, Expression::Indeterminate) => {
                Expression::Indeterminate
            }
            (Expression::Unbounded, _) | (_, Expression::Unbounded) => Expression::Unbounded,
            (Expression::Constant(a), Expression::Constant(b)) => {
                Expression::Constant(a.saturating_add(b))
            }
            (lhs, rhs) => Expression::Sum(Arc::new(lhs), Arc::new(rhs)),
        }
    }
}

impl AddAssign for Expression {
    fn add_assign(&mut self, rhs: Expression) {
        let lhs = std::mem::replace(self, Expression::ZERO);
        *self = lhs + rhs;
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(n) => write!(f, "{}", n),
            Expression::Indeterminate => write!(f, "{}", Terminated::Indeterminate),
            Expression::Unbounded => write!(f, "{}", Terminated::Unbounded),
            Expression::FunctionRef(function) => write!(f, "Fun({})", function),
            Expression::Sum(l, r) => write!(f, "({} + {})", l, r),
        }
    }
}
