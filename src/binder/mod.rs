//! # Binder
//!
//! Resolves names and types of the structured tree into the bound tree the
//! verification analyses run on. Unknown names are reported as
//! `UndefinedReference` and bind to [`BoundExpr::Error`]; binding never fails,
//! so verification can proceed on whatever was produced.
//!
//! Calls to names that are not functions of the module are treated as
//! external library calls typed `Object`.

mod bound;

pub use bound::{
    BoundCatch, BoundElseIf, BoundExpr, BoundFunction, BoundModule, BoundStatement, VariableSymbol,
};

use crate::ast::{self, Expression, Statement, UnaryOp};
use crate::compiler::ir::{LiteralValue, SemanticType};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode, Span};
use std::collections::HashMap;

/// Structured tree to bound tree
pub struct Binder<'a> {
    diagnostics: &'a DiagnosticBag,
    signatures: HashMap<String, SemanticType>,
}

impl<'a> Binder<'a> {
    /// Creates a binder reporting into `diagnostics`
    pub fn new(diagnostics: &'a DiagnosticBag) -> Self {
        Self {
            diagnostics,
            signatures: HashMap::new(),
        }
    }

    /// Binds every function of a module
    pub fn bind_module(&mut self, module: &ast::Module) -> BoundModule {
        self.signatures = module
            .functions
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    SemanticType::from_return_type(f.return_type.as_deref()),
                )
            })
            .collect();

        let functions = module
            .functions
            .iter()
            .map(|f| self.bind_function(f))
            .collect();

        BoundModule {
            name: module.name.clone(),
            functions,
        }
    }

    /// Binds one function
    pub fn bind_function(&self, function: &ast::Function) -> BoundFunction {
        let parameters: Vec<VariableSymbol> = function
            .parameters
            .iter()
            .map(|p| VariableSymbol {
                name: p.name.clone(),
                ty: SemanticType::from_type_name(&p.type_name),
                is_parameter: true,
            })
            .collect();

        let mut scope = FunctionScope {
            binder: self,
            function: &function.name,
            scopes: vec![parameters
                .iter()
                .map(|p| (p.name.clone(), p.ty))
                .collect()],
            locals: Vec::new(),
            span: function.span,
        };
        let body = scope.bind_block(&function.body);
        let locals = scope.locals;

        tracing::debug!(
            "bound {} ({} parameters, {} locals)",
            function.name,
            parameters.len(),
            locals.len()
        );

        BoundFunction {
            id: function.id.clone(),
            name: function.name.clone(),
            parameters,
            locals,
            return_type: SemanticType::from_return_type(function.return_type.as_deref()),
            body,
            span: function.span,
        }
    }
}

/// Lexical scopes of the function being bound
struct FunctionScope<'b, 'a> {
    binder: &'b Binder<'a>,
    function: &'b str,
    scopes: Vec<HashMap<String, SemanticType>>,
    locals: Vec<VariableSymbol>,
    span: Span,
}

impl FunctionScope<'_, '_> {
    fn lookup(&self, name: &str) -> Option<SemanticType> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn declare(&mut self, name: &str, ty: SemanticType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
        if !self.locals.iter().any(|l| l.name == name) {
            self.locals.push(VariableSymbol {
                name: name.to_string(),
                ty,
                is_parameter: false,
            });
        }
    }

    fn undefined(&self, name: &str) {
        self.binder.diagnostics.error(
            self.span,
            DiagnosticCode::UndefinedReference,
            format!("'{}' is not defined in '{}'", name, self.function),
        );
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scopes.push(HashMap::new());
        let out = f(self);
        self.scopes.pop();
        out
    }

    fn bind_block(&mut self, stmts: &[Statement]) -> Vec<BoundStatement> {
        self.scoped(|s| stmts.iter().filter_map(|stmt| s.bind_statement(stmt)).collect())
    }

    fn bind_statement(&mut self, stmt: &Statement) -> Option<BoundStatement> {
        self.span = stmt.span();
        let span = self.span;
        let bound = match stmt {
            Statement::Bind {
                name,
                type_name,
                initializer,
                ..
            } => {
                let initializer = initializer.as_ref().map(|e| self.bind_expr(e));
                let ty = type_name
                    .as_deref()
                    .map(SemanticType::from_type_name)
                    .or_else(|| initializer.as_ref().map(BoundExpr::ty))
                    .unwrap_or(SemanticType::Object);
                self.declare(name, ty);
                BoundStatement::Bind {
                    name: name.clone(),
                    ty,
                    initializer,
                    span,
                }
            }
            Statement::Assign { target, value, .. } => {
                let value = self.bind_expr(value);
                if self.lookup(target).is_none() {
                    self.undefined(target);
                }
                BoundStatement::Assign {
                    target: target.clone(),
                    value,
                    span,
                }
            }
            Statement::Expression { expr, .. } => BoundStatement::Expression {
                expr: self.bind_expr(expr),
                span,
            },
            Statement::Return { value, .. } => BoundStatement::Return {
                value: value.as_ref().map(|v| self.bind_expr(v)),
                span,
            },
            Statement::If {
                condition,
                then_body,
                else_ifs,
                else_body,
                ..
            } => {
                let condition = self.bind_expr(condition);
                let then_body = self.bind_block(then_body);
                let else_ifs = else_ifs
                    .iter()
                    .map(|arm| BoundElseIf {
                        condition: self.bind_expr(&arm.condition),
                        body: self.bind_block(&arm.body),
                        span: arm.span,
                    })
                    .collect();
                let else_body = else_body.as_ref().map(|b| self.bind_block(b));
                BoundStatement::If {
                    condition,
                    then_body,
                    else_ifs,
                    else_body,
                    span,
                }
            }
            Statement::While {
                condition, body, ..
            } => BoundStatement::While {
                condition: self.bind_expr(condition),
                body: self.bind_block(body),
                span,
            },
            Statement::For {
                variable,
                from,
                to,
                step,
                body,
                ..
            } => {
                let from = self.bind_expr(from);
                let ty = from.ty();
                let (to, step, body) = self.scoped(|s| {
                    s.declare(variable, ty);
                    let to = s.bind_expr(to);
                    let step = step
                        .as_ref()
                        .map(|e| s.bind_expr(e))
                        .unwrap_or_else(|| BoundExpr::int(1));
                    let body = s.bind_block(body);
                    (to, step, body)
                });
                BoundStatement::For {
                    variable: variable.clone(),
                    ty,
                    from,
                    to,
                    step,
                    body,
                    span,
                }
            }
            Statement::Break { .. } => BoundStatement::Break { span },
            Statement::Continue { .. } => BoundStatement::Continue { span },
            Statement::Throw { value, .. } => BoundStatement::Throw {
                value: self.bind_expr(value),
                span,
            },
            Statement::Try {
                body,
                catch_clauses,
                finally_body,
                ..
            } => {
                let body = self.bind_block(body);
                let catch_clauses = catch_clauses
                    .iter()
                    .map(|clause| {
                        self.scoped(|s| {
                            if let Some(var) = &clause.variable {
                                s.declare(var, SemanticType::Object);
                            }
                            BoundCatch {
                                exception_type: clause.exception_type.clone(),
                                variable: clause.variable.clone(),
                                body: s.bind_block(&clause.body),
                            }
                        })
                    })
                    .collect();
                let finally_body = finally_body.as_ref().map(|b| self.bind_block(b));
                BoundStatement::Try {
                    body,
                    catch_clauses,
                    finally_body,
                    span,
                }
            }
            Statement::Opaque { kind, .. } => {
                tracing::debug!("binder skips '{}' in {}", kind, self.function);
                return None;
            }
        };
        Some(bound)
    }

    fn bind_expr(&mut self, expr: &Expression) -> BoundExpr {
        match expr {
            Expression::IntLiteral(v) => BoundExpr::Literal(LiteralValue::Int(*v)),
            Expression::LongLiteral(v) => BoundExpr::Literal(LiteralValue::Long(*v)),
            Expression::FloatLiteral(v) => BoundExpr::Literal(LiteralValue::Float(*v)),
            Expression::DoubleLiteral(v) => BoundExpr::Literal(LiteralValue::Double(*v)),
            Expression::BoolLiteral(v) => BoundExpr::Literal(LiteralValue::Bool(*v)),
            Expression::StringLiteral(v) => BoundExpr::Literal(LiteralValue::String(v.clone())),
            Expression::NullLiteral => BoundExpr::Literal(LiteralValue::Null),
            Expression::Reference(name) => match self.lookup(name) {
                Some(ty) => BoundExpr::var(name.clone(), ty),
                None => {
                    self.undefined(name);
                    BoundExpr::Error
                }
            },
            Expression::Binary { op, left, right } => {
                let left = self.bind_expr(left);
                let right = self.bind_expr(right);
                BoundExpr::binary(*op, left, right)
            }
            Expression::Unary { op, operand } => {
                let operand = self.bind_expr(operand);
                let ty = match op {
                    UnaryOp::Not => SemanticType::Bool,
                    UnaryOp::Neg | UnaryOp::BitNot => operand.ty(),
                };
                BoundExpr::Unary {
                    op: *op,
                    operand: Box::new(operand),
                    ty,
                }
            }
            Expression::Call { target, args } => {
                let ty = self
                    .binder
                    .signatures
                    .get(target)
                    .copied()
                    .unwrap_or(SemanticType::Object);
                self.bind_call(target.clone(), args.iter(), ty)
            }
            Expression::Conditional {
                condition,
                when_true,
                when_false,
            } => {
                let condition = self.bind_expr(condition);
                let when_true = self.bind_expr(when_true);
                let when_false = self.bind_expr(when_false);
                let ty = when_true.ty();
                BoundExpr::Conditional {
                    condition: Box::new(condition),
                    when_true: Box::new(when_true),
                    when_false: Box::new(when_false),
                    ty,
                }
            }
            Expression::Some(inner) => {
                self.bind_call("Some".into(), std::iter::once(&**inner), SemanticType::Object)
            }
            Expression::None => {
                self.bind_call("None".into(), std::iter::empty(), SemanticType::Object)
            }
            Expression::Ok(inner) => {
                self.bind_call("Ok".into(), std::iter::once(&**inner), SemanticType::Object)
            }
            Expression::Err(inner) => {
                self.bind_call("Err".into(), std::iter::once(&**inner), SemanticType::Object)
            }
            Expression::FieldAccess { target, field } => self.bind_call(
                format!(".{}", field),
                std::iter::once(&**target),
                SemanticType::Object,
            ),
            Expression::RecordCreation { type_name, fields } => self.bind_call(
                format!("new {}", type_name),
                fields.iter().map(|f| &f.value),
                SemanticType::Object,
            ),
            Expression::Opaque { .. } => BoundExpr::Error,
        }
    }

    fn bind_call<'e>(
        &mut self,
        target: String,
        args: impl Iterator<Item = &'e Expression>,
        ty: SemanticType,
    ) -> BoundExpr {
        let args = args.map(|a| self.bind_expr(a)).collect();
        BoundExpr::Call { target, args, ty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Function, Module};

    #[test]
    fn test_binds_parameters_and_locals() {
        let bag = DiagnosticBag::new();
        let module = Module::new("m", "m").with_function(
            Function::new("f", "f").param("x", "i64").body(vec![
                Statement::bind("y", None, Some(Expression::var("x"))),
                Statement::assign(
                    "y",
                    Expression::binary(BinaryOp::Add, Expression::var("y"), Expression::int(1)),
                ),
            ]),
        );
        let bound = Binder::new(&bag).bind_module(&module);
        let f = &bound.functions[0];
        assert!(bag.is_empty());
        assert_eq!(f.type_of("x"), Some(SemanticType::Long));
        assert_eq!(f.type_of("y"), Some(SemanticType::Long));
        assert!(f.is_parameter("x"));
        assert!(!f.is_parameter("y"));
    }

    #[test]
    fn test_unknown_name_reports_and_binds_error() {
        let bag = DiagnosticBag::new();
        let f = Function::new("f", "f").body(vec![Statement::ret(Some(Expression::var("ghost")))]);
        let bound = Binder::new(&bag).bind_function(&f);
        assert_eq!(bag.count_code(DiagnosticCode::UndefinedReference), 1);
        assert_eq!(
            bound.body[0],
            BoundStatement::Return {
                value: Some(BoundExpr::Error),
                span: Span::default()
            }
        );
    }

    #[test]
    fn test_block_scoping() {
        let bag = DiagnosticBag::new();
        let f = Function::new("f", "f").body(vec![
            Statement::if_else(
                Expression::bool(true),
                vec![Statement::bind("inner", Some("i32"), None)],
                None,
            ),
            Statement::ret(Some(Expression::var("inner"))),
        ]);
        Binder::new(&bag).bind_function(&f);
        assert_eq!(bag.count_code(DiagnosticCode::UndefinedReference), 1);
    }

    #[test]
    fn test_constant_folding() {
        let e = BoundExpr::binary(
            BinaryOp::Sub,
            BoundExpr::int(3),
            BoundExpr::binary(BinaryOp::Add, BoundExpr::int(1), BoundExpr::int(2)),
        );
        assert_eq!(e.constant_value(), Some(LiteralValue::Int(0)));
        let x = BoundExpr::var("x", SemanticType::Int);
        assert_eq!(BoundExpr::binary(BinaryOp::Add, x, BoundExpr::int(1)).constant_value(), None);
    }
}
