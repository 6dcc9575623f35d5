//! Normal-Form statements and expressions

use super::types::{LiteralValue, SemanticType};
use crate::ast::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};

/// Normal-Form expression
///
/// Outside the right-hand side of [`NfStatement::Assign`] only `Literal` and
/// `VariableRef` appear, and operands of compound expressions are themselves
/// atomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NfExpression {
    /// Constant
    Literal {
        /// Value
        value: LiteralValue,
        /// Type
        ty: SemanticType,
    },
    /// Read of a variable, parameter or temporary
    VariableRef {
        /// Name
        name: String,
        /// Type
        ty: SemanticType,
    },
    /// `left op right`
    BinaryOp {
        /// Operator (never `&&`/`||`, those are lowered to branches)
        op: BinaryOp,
        /// Left operand
        left: Box<NfExpression>,
        /// Right operand
        right: Box<NfExpression>,
        /// Result type
        ty: SemanticType,
    },
    /// `op operand`
    UnaryOp {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<NfExpression>,
        /// Result type
        ty: SemanticType,
    },
    /// Call of a named target
    Call {
        /// Callee
        target: String,
        /// Arguments
        args: Vec<NfExpression>,
        /// Result type
        ty: SemanticType,
    },
}

impl NfExpression {
    /// Literal with its natural type
    pub fn literal(value: LiteralValue) -> Self {
        let ty = value.natural_type();
        NfExpression::Literal { value, ty }
    }

    /// Variable reference
    pub fn var(name: impl Into<String>, ty: SemanticType) -> Self {
        NfExpression::VariableRef {
            name: name.into(),
            ty,
        }
    }

    /// Type of the expression
    pub fn ty(&self) -> SemanticType {
        match self {
            NfExpression::Literal { ty, .. }
            | NfExpression::VariableRef { ty, .. }
            | NfExpression::BinaryOp { ty, .. }
            | NfExpression::UnaryOp { ty, .. }
            | NfExpression::Call { ty, .. } => *ty,
        }
    }

    /// Literal or variable reference
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            NfExpression::Literal { .. } | NfExpression::VariableRef { .. }
        )
    }

    /// Compound expression whose operands are all atomic
    pub fn is_flat(&self) -> bool {
        match self {
            NfExpression::Literal { .. } | NfExpression::VariableRef { .. } => true,
            NfExpression::BinaryOp { left, right, .. } => left.is_atomic() && right.is_atomic(),
            NfExpression::UnaryOp { operand, .. } => operand.is_atomic(),
            NfExpression::Call { args, .. } => args.iter().all(NfExpression::is_atomic),
        }
    }

    /// Name, if this is a variable reference
    pub fn as_var(&self) -> Option<&str> {
        match self {
            NfExpression::VariableRef { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Normal-Form statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NfStatement {
    /// `target : ty = value`
    Assign {
        /// Assigned variable or temporary
        target: String,
        /// Flat expression
        value: NfExpression,
        /// Type of the target
        ty: SemanticType,
    },
    /// Two-way conditional jump
    Branch {
        /// Atomic boolean condition
        condition: NfExpression,
        /// Target when true
        true_label: String,
        /// Target when false
        false_label: String,
    },
    /// Unconditional jump
    Goto(String),
    /// Jump target
    Label(String),
    /// Return with optional atomic value
    Return(Option<NfExpression>),
    /// Throw an atomic value
    Throw(NfExpression),
    /// Structured exception region
    Try {
        /// Protected statements
        body: Vec<NfStatement>,
        /// Handlers in order
        catch_clauses: Vec<NfCatchClause>,
        /// Optional finally block
        finally_body: Option<Vec<NfStatement>>,
    },
}

/// Handler of a [`NfStatement::Try`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfCatchClause {
    /// Caught type (`None` catches everything)
    pub exception_type: Option<String>,
    /// Variable bound to the caught value
    pub variable: Option<String>,
    /// Handler statements
    pub body: Vec<NfStatement>,
}

impl NfStatement {
    /// Labels this statement jumps to
    pub fn jump_targets(&self) -> Vec<&str> {
        match self {
            NfStatement::Branch {
                true_label,
                false_label,
                ..
            } => vec![true_label.as_str(), false_label.as_str()],
            NfStatement::Goto(label) => vec![label.as_str()],
            _ => Vec::new(),
        }
    }

    /// Visits this statement and every statement nested in `Try` regions
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a NfStatement)) {
        visit(self);
        if let NfStatement::Try {
            body,
            catch_clauses,
            finally_body,
        } = self
        {
            for stmt in body {
                stmt.walk(visit);
            }
            for clause in catch_clauses {
                for stmt in &clause.body {
                    stmt.walk(visit);
                }
            }
            if let Some(finally) = finally_body {
                for stmt in finally {
                    stmt.walk(visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatness() {
        let x = NfExpression::var("x", SemanticType::Int);
        let one = NfExpression::literal(LiteralValue::Int(1));
        let add = NfExpression::BinaryOp {
            op: BinaryOp::Add,
            left: Box::new(x.clone()),
            right: Box::new(one),
            ty: SemanticType::Int,
        };
        assert!(add.is_flat());
        assert!(!add.is_atomic());

        let nested = NfExpression::UnaryOp {
            op: UnaryOp::Neg,
            operand: Box::new(add),
            ty: SemanticType::Int,
        };
        assert!(!nested.is_flat());
    }

    #[test]
    fn test_walk_enters_try_regions() {
        let stmt = NfStatement::Try {
            body: vec![NfStatement::Label("a".into())],
            catch_clauses: vec![NfCatchClause {
                exception_type: None,
                variable: None,
                body: vec![NfStatement::Goto("a".into())],
            }],
            finally_body: Some(vec![NfStatement::Return(None)]),
        };
        let mut count = 0;
        stmt.walk(&mut |_| count += 1);
        assert_eq!(count, 4);
    }
}
