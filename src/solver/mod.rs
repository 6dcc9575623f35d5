//! # Solver Capability
//!
//! Analyses that need satisfiability checks (solver-backed division checks,
//! k-induction) talk to a [`Solver`] trait object. Queries are built from the
//! bound tree into a small integer/boolean term language and rendered to
//! SMT-LIB 2 (`QF_LIA`), so any SMT-LIB solver can sit behind the trait.
//!
//! Only linear integer arithmetic is encoded: a product needs a constant
//! factor, a division or remainder a non-zero constant divisor. Anything else
//! is reported as unencodable (`None`) and callers fall back to "unknown".

mod z3;

pub use z3::Z3Solver;

use crate::ast::{BinaryOp, UnaryOp};
use crate::binder::BoundExpr;
use crate::compiler::ir::{LiteralValue, SemanticType};
use crate::Result;
use std::fmt;
use std::time::Duration;

/// Outcome of a satisfiability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    /// A model exists
    Sat,
    /// No model exists
    Unsat,
    /// The solver gave up
    Unknown,
}

/// Satisfiability oracle
pub trait Solver: Send + Sync {
    /// Checks the conjunction of the query's assertions
    fn check_sat(&self, query: &SmtQuery, timeout: Duration) -> Result<SatResult>;
}

/// Sort of a declared constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtSort {
    Int,
    Bool,
}

impl SmtSort {
    /// Sort used for a semantic type, if it has one
    pub fn of(ty: SemanticType) -> Option<SmtSort> {
        match ty {
            SemanticType::Int | SemanticType::Long => Some(SmtSort::Int),
            SemanticType::Bool => Some(SmtSort::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for SmtSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtSort::Int => f.write_str("Int"),
            SmtSort::Bool => f.write_str("Bool"),
        }
    }
}

/// SMT-LIB term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtTerm {
    Int(i64),
    Bool(bool),
    Const(String),
    /// Operator application, e.g. `(+ a b)`
    App(&'static str, Vec<SmtTerm>),
}

impl SmtTerm {
    /// Named constant
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Const(name.into())
    }

    pub fn add(a: SmtTerm, b: SmtTerm) -> Self {
        SmtTerm::App("+", vec![a, b])
    }

    pub fn eq(a: SmtTerm, b: SmtTerm) -> Self {
        SmtTerm::App("=", vec![a, b])
    }

    pub fn lt(a: SmtTerm, b: SmtTerm) -> Self {
        SmtTerm::App("<", vec![a, b])
    }

    pub fn le(a: SmtTerm, b: SmtTerm) -> Self {
        SmtTerm::App("<=", vec![a, b])
    }

    pub fn ge(a: SmtTerm, b: SmtTerm) -> Self {
        SmtTerm::App(">=", vec![a, b])
    }

    pub fn not(a: SmtTerm) -> Self {
        SmtTerm::App("not", vec![a])
    }

    /// Conjunction; `true` when empty
    pub fn and(terms: Vec<SmtTerm>) -> Self {
        match terms.len() {
            0 => SmtTerm::Bool(true),
            1 => terms.into_iter().next().unwrap_or(SmtTerm::Bool(true)),
            _ => SmtTerm::App("and", terms),
        }
    }
}

impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtTerm::Int(v) if *v < 0 => write!(f, "(- {})", v.unsigned_abs()),
            SmtTerm::Int(v) => write!(f, "{}", v),
            SmtTerm::Bool(b) => write!(f, "{}", b),
            SmtTerm::Const(name) => f.write_str(&quote_symbol(name)),
            SmtTerm::App(op, args) => {
                write!(f, "({}", op)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Quotes symbols SMT-LIB would not accept bare
fn quote_symbol(name: &str) -> String {
    let simple = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_.!@$%^&*-+<>?/~".contains(c))
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if simple {
        name.to_string()
    } else {
        format!("|{}|", name.replace('|', "_"))
    }
}

/// Declarations plus assertions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmtQuery {
    declarations: Vec<(String, SmtSort)>,
    assertions: Vec<SmtTerm>,
}

impl SmtQuery {
    /// Creates an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a constant once
    pub fn declare(&mut self, name: impl Into<String>, sort: SmtSort) {
        let name = name.into();
        if !self.declarations.iter().any(|(n, _)| *n == name) {
            self.declarations.push((name, sort));
        }
    }

    /// Adds an assertion
    pub fn assert(&mut self, term: SmtTerm) {
        self.assertions.push(term);
    }

    pub fn declarations(&self) -> &[(String, SmtSort)] {
        &self.declarations
    }

    pub fn assertions(&self) -> &[SmtTerm] {
        &self.assertions
    }

    /// Encodes a bound expression, declaring the constants it reads
    ///
    /// `name_of` maps a variable to the constant standing for it (k-induction
    /// renames variables per unrolled state).
    pub fn encode(&mut self, expr: &BoundExpr, name_of: &dyn Fn(&str) -> String) -> Option<SmtTerm> {
        match expr {
            BoundExpr::Literal(LiteralValue::Bool(b)) => Some(SmtTerm::Bool(*b)),
            BoundExpr::Literal(value) => value.as_i64().map(SmtTerm::Int),

            BoundExpr::Variable { name, ty } => {
                let sort = SmtSort::of(*ty)?;
                let constant = name_of(name);
                self.declare(constant.clone(), sort);
                Some(SmtTerm::Const(constant))
            }

            BoundExpr::Unary { op, operand, .. } => {
                let inner = self.encode(operand, name_of)?;
                match op {
                    UnaryOp::Not => Some(SmtTerm::not(inner)),
                    UnaryOp::Neg => Some(SmtTerm::App("-", vec![inner])),
                    UnaryOp::BitNot => None,
                }
            }

            BoundExpr::Binary {
                op, left, right, ..
            } => {
                let l = self.encode(left, name_of)?;
                let r = self.encode(right, name_of)?;
                let app = |name: &'static str, l, r| Some(SmtTerm::App(name, vec![l, r]));
                match op {
                    BinaryOp::Add => app("+", l, r),
                    BinaryOp::Sub => app("-", l, r),
                    BinaryOp::Mul => {
                        let linear =
                            matches!(l, SmtTerm::Int(_)) || matches!(r, SmtTerm::Int(_));
                        if linear {
                            app("*", l, r)
                        } else {
                            None
                        }
                    }
                    BinaryOp::Div | BinaryOp::Mod => match r {
                        SmtTerm::Int(d) if d != 0 => {
                            app(if *op == BinaryOp::Div { "div" } else { "mod" }, l, r)
                        }
                        _ => None,
                    },
                    BinaryOp::Eq => app("=", l, r),
                    BinaryOp::Ne => Some(SmtTerm::not(SmtTerm::eq(l, r))),
                    BinaryOp::Lt => app("<", l, r),
                    BinaryOp::Le => app("<=", l, r),
                    BinaryOp::Gt => app(">", l, r),
                    BinaryOp::Ge => app(">=", l, r),
                    BinaryOp::And => app("and", l, r),
                    BinaryOp::Or => app("or", l, r),
                    BinaryOp::BitAnd
                    | BinaryOp::BitOr
                    | BinaryOp::BitXor
                    | BinaryOp::Shl
                    | BinaryOp::Shr => None,
                }
            }

            BoundExpr::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => {
                let c = self.encode(condition, name_of)?;
                let t = self.encode(when_true, name_of)?;
                let e = self.encode(when_false, name_of)?;
                Some(SmtTerm::App("ite", vec![c, t, e]))
            }

            BoundExpr::Call { .. } | BoundExpr::Error => None,
        }
    }

    /// SMT-LIB 2 script checking the query
    pub fn to_smtlib(&self) -> String {
        let mut out = String::from("(set-logic QF_LIA)\n");
        for (name, sort) in &self.declarations {
            out.push_str(&format!("(declare-const {} {})\n", quote_symbol(name), sort));
        }
        for assertion in &self.assertions {
            out.push_str(&format!("(assert {})\n", assertion));
        }
        out.push_str("(check-sat)\n");
        out
    }
}
