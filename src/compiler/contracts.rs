//! # Contract Verifier
//!
//! Static well-formedness of `requires` / `ensures` clauses:
//! - every condition must be boolean (when its type can be inferred)
//! - preconditions may only name parameters
//! - postconditions may also name `result`, unless the function is void
//!
//! Findings go to the diagnostic bag; verification itself never fails.

use crate::ast::{BinaryOp, Expression, Function, Module, UnaryOp};
use crate::compiler::ir::SemanticType;
use crate::diagnostics::{DiagnosticBag, DiagnosticCode, Span};
use std::collections::HashSet;

/// Name a postcondition uses for the return value
pub const RESULT_NAME: &str = "result";

/// Checks the contracts of functions and reports into a shared bag
pub struct ContractVerifier<'a> {
    diagnostics: &'a DiagnosticBag,
}

impl<'a> ContractVerifier<'a> {
    /// Creates a verifier reporting into `diagnostics`
    pub fn new(diagnostics: &'a DiagnosticBag) -> Self {
        Self { diagnostics }
    }

    /// Verifies every function of the module
    pub fn verify(&self, module: &Module) {
        for function in &module.functions {
            self.verify_function(function);
        }
    }

    /// Verifies the preconditions and postconditions of one function
    pub fn verify_function(&self, function: &Function) {
        let parameters: HashSet<&str> = function
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let returns_value = SemanticType::from_return_type(function.return_type.as_deref())
            != SemanticType::Void;

        for clause in &function.preconditions {
            self.check_boolean(&clause.condition, clause.span, "precondition");
            for name in collect_references(&clause.condition) {
                if !parameters.contains(name.as_str()) {
                    self.diagnostics.error(
                        clause.span,
                        DiagnosticCode::UndefinedReference,
                        format!(
                            "Precondition of '{}' references '{}', which is not a parameter",
                            function.name, name
                        ),
                    );
                }
            }
        }

        for clause in &function.postconditions {
            self.check_boolean(&clause.condition, clause.span, "postcondition");
            for name in collect_references(&clause.condition) {
                if parameters.contains(name.as_str()) {
                    continue;
                }
                if name == RESULT_NAME {
                    if !returns_value {
                        self.diagnostics.error(
                            clause.span,
                            DiagnosticCode::InvalidReference,
                            format!(
                                "Postcondition of void function '{}' cannot reference 'result'",
                                function.name
                            ),
                        );
                    }
                    continue;
                }
                self.diagnostics.error(
                    clause.span,
                    DiagnosticCode::UndefinedReference,
                    format!(
                        "Postcondition of '{}' references unknown name '{}'",
                        function.name, name
                    ),
                );
            }
        }
    }

    fn check_boolean(&self, condition: &Expression, span: Span, what: &str) {
        if let Some(ty) = infer_type(condition) {
            if ty != SemanticType::Bool {
                self.diagnostics.error(
                    span,
                    DiagnosticCode::TypeMismatch,
                    format!("The {} condition must be boolean, found {}", what, ty),
                );
            }
        }
    }
}

/// Shallow type of a contract condition, `None` when it cannot be told
/// without a full type checker
pub fn infer_type(expr: &Expression) -> Option<SemanticType> {
    match expr {
        Expression::IntLiteral(_) => Some(SemanticType::Int),
        Expression::LongLiteral(_) => Some(SemanticType::Long),
        Expression::FloatLiteral(_) => Some(SemanticType::Float),
        Expression::DoubleLiteral(_) => Some(SemanticType::Double),
        Expression::BoolLiteral(_) => Some(SemanticType::Bool),
        Expression::StringLiteral(_) => Some(SemanticType::String),
        Expression::NullLiteral => Some(SemanticType::Object),
        Expression::Binary { op, left, .. } => {
            if op.yields_bool() {
                Some(SemanticType::Bool)
            } else {
                match op {
                    BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod => infer_type(left),
                    _ => None,
                }
            }
        }
        Expression::Unary {
            op: UnaryOp::Not, ..
        } => Some(SemanticType::Bool),
        _ => None,
    }
}

/// Distinct names a contract condition refers to, in first-seen order
pub fn collect_references(expr: &Expression) -> Vec<String> {
    let mut names = Vec::new();
    collect_into(expr, &mut names);
    names
}

fn collect_into(expr: &Expression, names: &mut Vec<String>) {
    match expr {
        Expression::Reference(name) => {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        Expression::Binary { left, right, .. } => {
            collect_into(left, names);
            collect_into(right, names);
        }
        Expression::Some(inner) | Expression::Ok(inner) | Expression::Err(inner) => {
            collect_into(inner, names)
        }
        Expression::FieldAccess { target, .. } => collect_into(target, names),
        Expression::RecordCreation { fields, .. } => {
            for field in fields {
                collect_into(&field.value, names);
            }
        }
        _ => {}
    }
}
