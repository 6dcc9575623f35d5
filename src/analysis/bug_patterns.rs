//! # Bug Patterns
//!
//! Syntactic checks over the bound tree, plus one solver-backed check:
//! a non-constant integer divisor is queried against the conditions of the
//! enclosing branches and loops, and a satisfiable `divisor == 0` is reported
//! as a possible division by zero.

use crate::ast::{BinaryOp, UnaryOp};
use crate::binder::{BoundExpr, BoundFunction, BoundStatement};
use crate::compiler::ir::{LiteralValue, SemanticType};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode, Span};
use crate::solver::{SatResult, SmtQuery, SmtTerm, Solver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which patterns run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BugPatternOptions {
    /// `/` or `%` by zero
    pub division_by_zero: bool,
    /// Constant integer arithmetic that overflows
    pub integer_overflow: bool,
    /// `x = x`
    pub self_assignment: bool,
    /// `if`/`while` on a constant
    pub constant_condition: bool,
}

impl Default for BugPatternOptions {
    fn default() -> Self {
        Self {
            division_by_zero: true,
            integer_overflow: true,
            self_assignment: true,
            constant_condition: true,
        }
    }
}

/// Runs the enabled patterns over one function
pub struct BugPatternRunner {
    options: BugPatternOptions,
    solver: Option<Arc<dyn Solver>>,
    timeout: Duration,
}

impl BugPatternRunner {
    /// Runner without solver-backed checks
    pub fn new(options: BugPatternOptions) -> Self {
        Self {
            options,
            solver: None,
            timeout: Duration::from_millis(5000),
        }
    }

    /// Enables solver-backed checks; `timeout` bounds the whole run
    pub fn with_solver(mut self, solver: Arc<dyn Solver>, timeout: Duration) -> Self {
        self.solver = Some(solver);
        self.timeout = timeout;
        self
    }

    /// Reports findings into `diagnostics`
    pub fn run(&self, function: &BoundFunction, diagnostics: &DiagnosticBag) {
        let mut walk = PatternWalk {
            runner: self,
            diagnostics,
            path: Vec::new(),
            deadline: Instant::now() + self.timeout,
            span: function.span,
        };
        walk.statements(&function.body);
    }
}

struct PatternWalk<'r> {
    runner: &'r BugPatternRunner,
    diagnostics: &'r DiagnosticBag,
    /// Conditions known to hold; `None` once a variable they read is written
    path: Vec<Option<BoundExpr>>,
    deadline: Instant,
    span: Span,
}

impl PatternWalk<'_> {
    fn options(&self) -> &BugPatternOptions {
        &self.runner.options
    }

    fn with_condition(&mut self, condition: BoundExpr, f: impl FnOnce(&mut Self)) {
        self.path.push(Some(condition));
        f(self);
        self.path.pop();
    }

    fn invalidate(&mut self, name: &str) {
        for slot in self.path.iter_mut() {
            if slot.as_ref().map_or(false, |c| c.reads().contains(&name)) {
                *slot = None;
            }
        }
    }

    fn statements(&mut self, stmts: &[BoundStatement]) {
        for stmt in stmts {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &BoundStatement) {
        self.span = stmt.span();
        match stmt {
            BoundStatement::Bind {
                name, initializer, ..
            } => {
                if let Some(value) = initializer {
                    self.expression(value);
                }
                self.invalidate(name);
            }
            BoundStatement::Assign { target, value, .. } => {
                self.expression(value);
                if self.options().self_assignment {
                    if let BoundExpr::Variable { name, .. } = value {
                        if name == target {
                            self.diagnostics.warning(
                                self.span,
                                DiagnosticCode::SelfAssignment,
                                format!("'{}' is assigned to itself", target),
                            );
                        }
                    }
                }
                self.invalidate(target);
            }
            BoundStatement::Expression { expr, .. } => self.expression(expr),
            BoundStatement::Return { value, .. } => {
                if let Some(value) = value {
                    self.expression(value);
                }
            }
            BoundStatement::Throw { value, .. } => self.expression(value),
            BoundStatement::If {
                condition,
                then_body,
                else_ifs,
                else_body,
                ..
            } => {
                self.condition(condition, "if");
                self.with_condition(condition.clone(), |w| w.statements(then_body));

                let mut negated = vec![negate(condition)];
                for arm in else_ifs {
                    self.span = arm.span;
                    let depth = self.path.len();
                    self.path.extend(negated.iter().cloned().map(Some));
                    self.condition(&arm.condition, "elseif");
                    self.with_condition(arm.condition.clone(), |w| w.statements(&arm.body));
                    self.path.truncate(depth);
                    negated.push(negate(&arm.condition));
                }
                if let Some(body) = else_body {
                    let depth = self.path.len();
                    self.path.extend(negated.into_iter().map(Some));
                    self.statements(body);
                    self.path.truncate(depth);
                }
            }
            BoundStatement::While {
                condition, body, ..
            } => {
                self.condition(condition, "while");
                self.with_condition(condition.clone(), |w| w.statements(body));
            }
            BoundStatement::For {
                variable,
                ty,
                from,
                to,
                step,
                body,
                ..
            } => {
                self.expression(from);
                self.expression(to);
                self.expression(step);
                self.invalidate(variable);
                // Steps are ascending, so `from <= variable < to` in the body
                let counter = || BoundExpr::var(variable.clone(), *ty);
                let depth = self.path.len();
                self.path.push(Some(BoundExpr::binary(BinaryOp::Ge, counter(), from.clone())));
                self.path.push(Some(BoundExpr::binary(BinaryOp::Lt, counter(), to.clone())));
                self.statements(body);
                self.path.truncate(depth);
            }
            BoundStatement::Break { .. } | BoundStatement::Continue { .. } => {}
            BoundStatement::Try {
                body,
                catch_clauses,
                finally_body,
                ..
            } => {
                self.statements(body);
                for clause in catch_clauses {
                    self.statements(&clause.body);
                }
                if let Some(finally) = finally_body {
                    self.statements(finally);
                }
            }
        }
    }

    fn condition(&mut self, condition: &BoundExpr, construct: &str) {
        self.expression(condition);
        if !self.options().constant_condition {
            return;
        }
        if let Some(LiteralValue::Bool(value)) = condition.constant_value() {
            // `while true` is how infinite loops are written
            if construct == "while" && value {
                return;
            }
            self.diagnostics.warning(
                self.span,
                DiagnosticCode::ConstantCondition,
                format!("The {} condition is always {}", construct, value),
            );
        }
    }

    /// Walks an expression in evaluation order. Operands that only run under
    /// a guard (`&&`, `||`, `?:`) are checked with the guard on the path, and
    /// operands a constant guard skips are not checked.
    fn expression(&mut self, expr: &BoundExpr) {
        match expr {
            BoundExpr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => {
                self.expression(left);
                if constant_bool(left) != Some(false) {
                    self.with_condition((**left).clone(), |w| w.expression(right));
                }
            }
            BoundExpr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => {
                self.expression(left);
                if constant_bool(left) != Some(true) {
                    self.with_condition(negate(left), |w| w.expression(right));
                }
            }
            BoundExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                self.expression(left);
                self.expression(right);
                match op {
                    BinaryOp::Div | BinaryOp::Mod => {
                        if self.options().division_by_zero {
                            self.division(right);
                        }
                    }
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                        if self.options().integer_overflow && overflows_width(*op, left, right, *ty) {
                            self.diagnostics.warning(
                                self.span,
                                DiagnosticCode::IntegerOverflow,
                                format!("Constant expression '{}' overflows {}", expr, ty),
                            );
                        }
                    }
                    _ => {}
                }
            }
            BoundExpr::Unary { operand, .. } => self.expression(operand),
            BoundExpr::Call { args, .. } => {
                for arg in args {
                    self.expression(arg);
                }
            }
            BoundExpr::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => {
                self.expression(condition);
                match constant_bool(condition) {
                    Some(true) => self.expression(when_true),
                    Some(false) => self.expression(when_false),
                    None => {
                        self.with_condition((**condition).clone(), |w| w.expression(when_true));
                        self.with_condition(negate(condition), |w| w.expression(when_false));
                    }
                }
            }
            BoundExpr::Literal(_) | BoundExpr::Variable { .. } | BoundExpr::Error => {}
        }
    }

    fn division(&mut self, divisor: &BoundExpr) {
        match divisor.constant_value() {
            Some(value) if value.as_i64() == Some(0) => {
                self.diagnostics.error(
                    self.span,
                    DiagnosticCode::DivisionByZero,
                    format!("Division by zero: '{}' is always 0", divisor),
                );
            }
            Some(_) => {}
            None if divisor.ty().is_integral() => self.solver_division(divisor),
            None => {}
        }
    }

    fn solver_division(&mut self, divisor: &BoundExpr) {
        let solver = match &self.runner.solver {
            Some(solver) => solver,
            None => return,
        };
        let now = Instant::now();
        if now >= self.deadline {
            tracing::debug!("bug-pattern deadline passed, skipping solver check");
            return;
        }

        let plain = |name: &str| name.to_string();
        let mut query = SmtQuery::new();
        let divisor_term = match query.encode(divisor, &plain) {
            Some(term) => term,
            None => return,
        };
        for condition in self.path.iter().flatten() {
            if let Some(term) = query.encode(condition, &plain) {
                query.assert(term);
            }
        }
        query.assert(SmtTerm::eq(divisor_term, SmtTerm::Int(0)));

        match solver.check_sat(&query, self.deadline - now) {
            Ok(SatResult::Sat) => self.diagnostics.warning(
                self.span,
                DiagnosticCode::PossibleDivisionByZero,
                format!("Divisor '{}' may be zero", divisor),
            ),
            Ok(_) => {}
            Err(e) if e.is_inconclusive() => {
                tracing::debug!("division check inconclusive: {}", e)
            }
            Err(e) => tracing::warn!("division check failed: {}", e),
        }
    }
}

fn constant_bool(expr: &BoundExpr) -> Option<bool> {
    match expr.constant_value() {
        Some(LiteralValue::Bool(value)) => Some(value),
        _ => None,
    }
}

fn negate(condition: &BoundExpr) -> BoundExpr {
    BoundExpr::Unary {
        op: UnaryOp::Not,
        operand: Box::new(condition.clone()),
        ty: SemanticType::Bool,
    }
}

fn overflows_width(op: BinaryOp, left: &BoundExpr, right: &BoundExpr, ty: SemanticType) -> bool {
    let (a, b) = match (
        left.constant_value().and_then(|v| v.as_i64()),
        right.constant_value().and_then(|v| v.as_i64()),
    ) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    let wide = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        _ => return false,
    };
    match ty {
        SemanticType::Int => wide.map_or(true, |v| i32::try_from(v).is_err()),
        SemanticType::Long => wide.is_none(),
        _ => false,
    }
}
