//! CNF Lowering - transforms the structured tree into Normal Form
//!
//! Every sub-expression is evaluated left to right into an atom (literal or
//! variable reference); compound values are assigned to fresh temporaries
//! `t0`, `t1`, ... and structured control flow becomes labels, branches and
//! gotos. Counters live in a per-function context, so lowering the same
//! function twice yields the same Normal Form.
//!
//! ## Label scheme
//!
//! | Construct | Labels |
//! |-----------|--------|
//! | `requires` | `requires_ok_N`, `requires_fail_N` |
//! | `if` | `then_N`, `elseif_next_N_i`, `elseif_then_N_i`, `else_N`, `endif_N` |
//! | `while` | `while_header_N`, `while_body_N`, `while_exit_N` |
//! | `for` | `for_header_N`, `for_body_N`, `for_step_N`, `for_exit_N` |
//! | `&&` / `\|\|` | `and_then_N`, `and_end_N` / `or_else_N`, `or_end_N` |
//! | `?:` | `cond_then_N`, `cond_else_N`, `cond_end_N` |
//!
//! Labels nothing would jump to are not emitted.

use super::instruction::{NfCatchClause, NfExpression, NfStatement};
use super::program::{NfFunction, NfModule, NfParameter};
use super::types::{LiteralValue, SemanticType};
use crate::ast::{
    BinaryOp, CatchClause, ElseIfClause, Expression, Function, Module, RequiresClause, Statement,
    UnaryOp,
};
use crate::diagnostics::Span;
use std::collections::HashMap;
use std::fmt;

/// Callee used to build the value thrown by a failed precondition
pub const CONTRACT_VIOLATION_CTOR: &str = "ContractViolationException";

/// Discriminator carried by precondition violations
pub const REQUIRES_TAG: &str = "Requires";

/// Lowering gap: a node that was skipped or replaced by a placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct LoweringWarning {
    /// Function being lowered
    pub function: String,
    /// What was not lowered
    pub message: String,
    /// Span of the enclosing statement
    pub span: Span,
}

impl fmt::Display for LoweringWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.function, self.span, self.message)
    }
}

/// Structured tree to Normal Form translator
#[derive(Debug, Default)]
pub struct CnfLowering {
    /// Return types of the functions of the module being lowered
    signatures: HashMap<String, SemanticType>,
    /// Gaps found so far
    warnings: Vec<LoweringWarning>,
}

impl CnfLowering {
    /// Creates a lowering with no known callee signatures
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers every function of a module
    pub fn lower_module(&mut self, module: &Module) -> NfModule {
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
            .map(|f| self.lower_function(f))
            .collect();

        NfModule {
            id: module.id.clone(),
            name: module.name.clone(),
            functions,
        }
    }

    /// Lowers one function
    pub fn lower_function(&mut self, function: &Function) -> NfFunction {
        let mut ctx = FunctionContext::new(function, &self.signatures);
        for clause in &function.preconditions {
            ctx.lower_precondition(clause);
        }
        ctx.lower_block(&function.body);

        tracing::debug!(
            "lowered {} into {} statements ({} temporaries, {} label groups)",
            function.name,
            ctx.statements.len(),
            ctx.temp_counter,
            ctx.label_counter
        );

        self.warnings.append(&mut ctx.warnings);

        NfFunction {
            id: function.id.clone(),
            name: function.name.clone(),
            parameters: function
                .parameters
                .iter()
                .map(|p| NfParameter {
                    name: p.name.clone(),
                    ty: SemanticType::from_type_name(&p.type_name),
                })
                .collect(),
            return_type: SemanticType::from_return_type(function.return_type.as_deref()),
            body: ctx.statements,
        }
    }

    /// Nodes that were skipped or replaced so far
    pub fn warnings(&self) -> &[LoweringWarning] {
        &self.warnings
    }

    /// Drains the collected warnings
    pub fn take_warnings(&mut self) -> Vec<LoweringWarning> {
        std::mem::take(&mut self.warnings)
    }
}

/// Jump targets of the innermost enclosing loop
struct LoopTargets {
    continue_label: String,
    break_label: String,
    continue_used: bool,
}

/// Per-function lowering state
struct FunctionContext<'a> {
    function: &'a Function,
    signatures: &'a HashMap<String, SemanticType>,
    locals: HashMap<String, SemanticType>,
    statements: Vec<NfStatement>,
    temp_counter: u32,
    label_counter: u32,
    loops: Vec<LoopTargets>,
    current_span: Span,
    warnings: Vec<LoweringWarning>,
}

impl<'a> FunctionContext<'a> {
    fn new(function: &'a Function, signatures: &'a HashMap<String, SemanticType>) -> Self {
        let locals = function
            .parameters
            .iter()
            .map(|p| (p.name.clone(), SemanticType::from_type_name(&p.type_name)))
            .collect();

        Self {
            function,
            signatures,
            locals,
            statements: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
            loops: Vec::new(),
            current_span: function.span,
            warnings: Vec::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    fn emit(&mut self, stmt: NfStatement) {
        self.statements.push(stmt);
    }

    fn new_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn next_label_id(&mut self) -> u32 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    /// Assigns a flat expression to a fresh temporary and returns a reference to it
    fn emit_temp(&mut self, value: NfExpression, ty: SemanticType) -> NfExpression {
        let target = self.new_temp();
        self.emit(NfStatement::Assign {
            target: target.clone(),
            value,
            ty,
        });
        NfExpression::var(target, ty)
    }

    fn type_of(&self, name: &str) -> SemanticType {
        self.locals
            .get(name)
            .copied()
            .unwrap_or(SemanticType::Object)
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(
            "lowering gap in {} at {}: {}",
            self.function.name,
            self.current_span,
            message
        );
        self.warnings.push(LoweringWarning {
            function: self.function.name.clone(),
            message,
            span: self.current_span,
        });
    }

    /// Lowers statements into a separate sequence (for `Try` regions)
    fn lower_nested(&mut self, stmts: &[Statement]) -> Vec<NfStatement> {
        let outer = std::mem::take(&mut self.statements);
        self.lower_block(stmts);
        std::mem::replace(&mut self.statements, outer)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONTRACTS
    // ═══════════════════════════════════════════════════════════════════════

    fn lower_precondition(&mut self, clause: &RequiresClause) {
        self.current_span = clause.span;
        let id = self.next_label_id();
        let ok_label = format!("requires_ok_{}", id);
        let fail_label = format!("requires_fail_{}", id);

        let condition = self.lower_expr(&clause.condition);
        self.emit(NfStatement::Branch {
            condition,
            true_label: ok_label.clone(),
            false_label: fail_label.clone(),
        });

        self.emit(NfStatement::Label(fail_label));
        let args = vec![
            string_literal(&self.function.id),
            string_literal(clause.message.as_deref().unwrap_or("")),
            string_literal(REQUIRES_TAG),
        ];
        let violation = self.emit_temp(
            NfExpression::Call {
                target: CONTRACT_VIOLATION_CTOR.to_string(),
                args,
                ty: SemanticType::Object,
            },
            SemanticType::Object,
        );
        self.emit(NfStatement::Throw(violation));
        self.emit(NfStatement::Label(ok_label));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════

    fn lower_block(&mut self, stmts: &[Statement]) {
        for stmt in stmts {
            self.lower_statement(stmt);
        }
    }

    fn lower_statement(&mut self, stmt: &Statement) {
        self.current_span = stmt.span();
        match stmt {
            Statement::Bind {
                name,
                type_name,
                initializer,
                ..
            } => {
                let declared = type_name.as_deref().map(SemanticType::from_type_name);
                let value = initializer.as_ref().map(|init| self.lower_expr(init));
                let ty = declared
                    .or_else(|| value.as_ref().map(NfExpression::ty))
                    .unwrap_or(SemanticType::Object);
                let value = value.unwrap_or_else(|| NfExpression::Literal {
                    value: ty.default_value(),
                    ty,
                });
                self.locals.insert(name.clone(), ty);
                self.emit(NfStatement::Assign {
                    target: name.clone(),
                    value,
                    ty,
                });
            }

            Statement::Assign { target, value, .. } => {
                let value = self.lower_expr(value);
                let ty = self.locals.get(target).copied().unwrap_or_else(|| value.ty());
                self.emit(NfStatement::Assign {
                    target: target.clone(),
                    value,
                    ty,
                });
            }

            Statement::Expression { expr, .. } => {
                self.lower_expr(expr);
            }

            Statement::Return { value, .. } => {
                let value = value.as_ref().map(|v| self.lower_expr(v));
                self.emit(NfStatement::Return(value));
            }

            Statement::If {
                condition,
                then_body,
                else_ifs,
                else_body,
                ..
            } => self.lower_if(condition, then_body, else_ifs, else_body.as_deref()),

            Statement::While {
                condition, body, ..
            } => self.lower_while(condition, body),

            Statement::For {
                variable,
                from,
                to,
                step,
                body,
                ..
            } => self.lower_for(variable, from, to, step.as_ref(), body),

            Statement::Break { .. } => match self.loops.last() {
                Some(targets) => {
                    let label = targets.break_label.clone();
                    self.emit(NfStatement::Goto(label));
                }
                None => self.warn("break outside of a loop dropped".to_string()),
            },

            Statement::Continue { .. } => match self.loops.last_mut() {
                Some(targets) => {
                    targets.continue_used = true;
                    let label = targets.continue_label.clone();
                    self.emit(NfStatement::Goto(label));
                }
                None => self.warn("continue outside of a loop dropped".to_string()),
            },

            Statement::Throw { value, .. } => {
                let value = self.lower_expr(value);
                self.emit(NfStatement::Throw(value));
            }

            Statement::Try {
                body,
                catch_clauses,
                finally_body,
                ..
            } => self.lower_try(body, catch_clauses, finally_body.as_deref()),

            Statement::Opaque { kind, .. } => {
                self.warn(format!("unsupported statement '{}' skipped", kind));
            }
        }
    }

    fn lower_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_ifs: &[ElseIfClause],
        else_body: Option<&[Statement]>,
    ) {
        let id = self.next_label_id();
        let then_label = format!("then_{}", id);
        let else_label = format!("else_{}", id);
        let endif_label = format!("endif_{}", id);
        let next_test = |i: usize| format!("elseif_next_{}_{}", id, i);

        // Where control goes when the arm at `i` does not match
        let fallthrough = |i: usize| {
            if i < else_ifs.len() {
                next_test(i)
            } else if else_body.is_some() {
                else_label.clone()
            } else {
                endif_label.clone()
            }
        };

        let cond = self.lower_expr(condition);
        self.emit(NfStatement::Branch {
            condition: cond,
            true_label: then_label.clone(),
            false_label: fallthrough(0),
        });
        self.emit(NfStatement::Label(then_label));
        self.lower_block(then_body);
        self.emit(NfStatement::Goto(endif_label.clone()));

        for (i, clause) in else_ifs.iter().enumerate() {
            let arm_label = format!("elseif_then_{}_{}", id, i);
            self.emit(NfStatement::Label(next_test(i)));
            self.current_span = clause.span;
            let cond = self.lower_expr(&clause.condition);
            self.emit(NfStatement::Branch {
                condition: cond,
                true_label: arm_label.clone(),
                false_label: fallthrough(i + 1),
            });
            self.emit(NfStatement::Label(arm_label));
            self.lower_block(&clause.body);
            self.emit(NfStatement::Goto(endif_label.clone()));
        }

        if let Some(body) = else_body {
            self.emit(NfStatement::Label(else_label.clone()));
            self.lower_block(body);
            self.emit(NfStatement::Goto(endif_label.clone()));
        }

        self.emit(NfStatement::Label(endif_label));
    }

    fn lower_while(&mut self, condition: &Expression, body: &[Statement]) {
        let id = self.next_label_id();
        let header = format!("while_header_{}", id);
        let body_label = format!("while_body_{}", id);
        let exit = format!("while_exit_{}", id);

        self.emit(NfStatement::Label(header.clone()));
        let cond = self.lower_expr(condition);
        self.emit(NfStatement::Branch {
            condition: cond,
            true_label: body_label.clone(),
            false_label: exit.clone(),
        });
        self.emit(NfStatement::Label(body_label));

        self.loops.push(LoopTargets {
            continue_label: header.clone(),
            break_label: exit.clone(),
            continue_used: false,
        });
        self.lower_block(body);
        self.loops.pop();

        self.emit(NfStatement::Goto(header));
        self.emit(NfStatement::Label(exit));
    }

    fn lower_for(
        &mut self,
        variable: &str,
        from: &Expression,
        to: &Expression,
        step: Option<&Expression>,
        body: &[Statement],
    ) {
        let init = self.lower_expr(from);
        let var_ty = init.ty();
        self.locals.insert(variable.to_string(), var_ty);
        self.emit(NfStatement::Assign {
            target: variable.to_string(),
            value: init,
            ty: var_ty,
        });

        let id = self.next_label_id();
        let header = format!("for_header_{}", id);
        let body_label = format!("for_body_{}", id);
        let step_label = format!("for_step_{}", id);
        let exit = format!("for_exit_{}", id);

        self.emit(NfStatement::Label(header.clone()));
        let bound = self.lower_expr(to);
        let test = self.emit_temp(
            NfExpression::BinaryOp {
                op: BinaryOp::Lt,
                left: Box::new(NfExpression::var(variable, var_ty)),
                right: Box::new(bound),
                ty: SemanticType::Bool,
            },
            SemanticType::Bool,
        );
        self.emit(NfStatement::Branch {
            condition: test,
            true_label: body_label.clone(),
            false_label: exit.clone(),
        });
        self.emit(NfStatement::Label(body_label));

        self.loops.push(LoopTargets {
            continue_label: step_label.clone(),
            break_label: exit.clone(),
            continue_used: false,
        });
        self.lower_block(body);
        let targets = self.loops.pop();
        if targets.map(|t| t.continue_used).unwrap_or(false) {
            self.emit(NfStatement::Label(step_label));
        }

        let step = match step {
            Some(expr) => self.lower_expr(expr),
            None => NfExpression::literal(LiteralValue::Int(1)),
        };
        self.emit(NfStatement::Assign {
            target: variable.to_string(),
            value: NfExpression::BinaryOp {
                op: BinaryOp::Add,
                left: Box::new(NfExpression::var(variable, var_ty)),
                right: Box::new(step),
                ty: var_ty,
            },
            ty: var_ty,
        });
        self.emit(NfStatement::Goto(header));
        self.emit(NfStatement::Label(exit));
    }

    fn lower_try(
        &mut self,
        body: &[Statement],
        catch_clauses: &[CatchClause],
        finally_body: Option<&[Statement]>,
    ) {
        let body = self.lower_nested(body);
        let catch_clauses = catch_clauses
            .iter()
            .map(|clause| {
                if let Some(var) = &clause.variable {
                    self.locals.insert(var.clone(), SemanticType::Object);
                }
                NfCatchClause {
                    exception_type: clause.exception_type.clone(),
                    variable: clause.variable.clone(),
                    body: self.lower_nested(&clause.body),
                }
            })
            .collect();
        let finally_body = finally_body.map(|stmts| self.lower_nested(stmts));

        self.emit(NfStatement::Try {
            body,
            catch_clauses,
            finally_body,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Lowers an expression and returns an atom holding its value
    fn lower_expr(&mut self, expr: &Expression) -> NfExpression {
        match expr {
            Expression::IntLiteral(v) => NfExpression::literal(LiteralValue::Int(*v)),
            Expression::LongLiteral(v) => NfExpression::literal(LiteralValue::Long(*v)),
            Expression::FloatLiteral(v) => NfExpression::literal(LiteralValue::Float(*v)),
            Expression::DoubleLiteral(v) => NfExpression::literal(LiteralValue::Double(*v)),
            Expression::BoolLiteral(v) => NfExpression::literal(LiteralValue::Bool(*v)),
            Expression::StringLiteral(v) => NfExpression::literal(LiteralValue::String(v.clone())),
            Expression::NullLiteral => NfExpression::literal(LiteralValue::Null),

            Expression::Reference(name) => NfExpression::var(name.clone(), self.type_of(name)),

            Expression::Binary { op, left, right } => match op {
                BinaryOp::And => self.lower_and(left, right),
                BinaryOp::Or => self.lower_or(left, right),
                _ => {
                    let left = self.lower_expr(left);
                    let right = self.lower_expr(right);
                    let ty = SemanticType::binary_result(*op, left.ty(), right.ty());
                    self.emit_temp(
                        NfExpression::BinaryOp {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                            ty,
                        },
                        ty,
                    )
                }
            },

            Expression::Unary { op, operand } => {
                let operand = self.lower_expr(operand);
                let ty = match op {
                    UnaryOp::Not => SemanticType::Bool,
                    UnaryOp::Neg | UnaryOp::BitNot => operand.ty(),
                };
                self.emit_temp(
                    NfExpression::UnaryOp {
                        op: *op,
                        operand: Box::new(operand),
                        ty,
                    },
                    ty,
                )
            }

            Expression::Call { target, args } => {
                let ty = self
                    .signatures
                    .get(target)
                    .copied()
                    .unwrap_or(SemanticType::Object);
                self.lower_call(target.clone(), args.iter(), ty)
            }

            Expression::Conditional {
                condition,
                when_true,
                when_false,
            } => self.lower_conditional(condition, when_true, when_false),

            Expression::Some(inner) => {
                self.lower_call("Some".to_string(), std::iter::once(&**inner), SemanticType::Object)
            }
            Expression::None => {
                self.lower_call("None".to_string(), std::iter::empty(), SemanticType::Object)
            }
            Expression::Ok(inner) => {
                self.lower_call("Ok".to_string(), std::iter::once(&**inner), SemanticType::Object)
            }
            Expression::Err(inner) => {
                self.lower_call("Err".to_string(), std::iter::once(&**inner), SemanticType::Object)
            }

            Expression::FieldAccess { target, field } => self.lower_call(
                format!(".{}", field),
                std::iter::once(&**target),
                SemanticType::Object,
            ),

            Expression::RecordCreation { type_name, fields } => self.lower_call(
                format!("new {}", type_name),
                fields.iter().map(|f| &f.value),
                SemanticType::Object,
            ),

            Expression::Opaque { kind } => {
                self.warn(format!(
                    "unsupported expression '{}' replaced by null",
                    kind
                ));
                NfExpression::literal(LiteralValue::Null)
            }
        }
    }

    fn lower_call<'e>(
        &mut self,
        target: String,
        args: impl Iterator<Item = &'e Expression>,
        ty: SemanticType,
    ) -> NfExpression {
        let args = args.map(|arg| self.lower_expr(arg)).collect();
        self.emit_temp(NfExpression::Call { target, args, ty }, ty)
    }

    /// `a && b`: `b` is only reached when `a` holds
    fn lower_and(&mut self, left: &Expression, right: &Expression) -> NfExpression {
        let id = self.next_label_id();
        let then_label = format!("and_then_{}", id);
        let end_label = format!("and_end_{}", id);

        let result = self.new_temp();
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: NfExpression::literal(LiteralValue::Bool(false)),
            ty: SemanticType::Bool,
        });
        let lhs = self.lower_expr(left);
        self.emit(NfStatement::Branch {
            condition: lhs,
            true_label: then_label.clone(),
            false_label: end_label.clone(),
        });
        self.emit(NfStatement::Label(then_label));
        let rhs = self.lower_expr(right);
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: rhs,
            ty: SemanticType::Bool,
        });
        self.emit(NfStatement::Goto(end_label.clone()));
        self.emit(NfStatement::Label(end_label));

        NfExpression::var(result, SemanticType::Bool)
    }

    /// `a || b`: `b` is only reached when `a` does not hold
    fn lower_or(&mut self, left: &Expression, right: &Expression) -> NfExpression {
        let id = self.next_label_id();
        let else_label = format!("or_else_{}", id);
        let end_label = format!("or_end_{}", id);

        let result = self.new_temp();
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: NfExpression::literal(LiteralValue::Bool(true)),
            ty: SemanticType::Bool,
        });
        let lhs = self.lower_expr(left);
        self.emit(NfStatement::Branch {
            condition: lhs,
            true_label: end_label.clone(),
            false_label: else_label.clone(),
        });
        self.emit(NfStatement::Label(else_label));
        let rhs = self.lower_expr(right);
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: rhs,
            ty: SemanticType::Bool,
        });
        self.emit(NfStatement::Goto(end_label.clone()));
        self.emit(NfStatement::Label(end_label));

        NfExpression::var(result, SemanticType::Bool)
    }

    /// Both arms assign one temporary, typed from the then-arm
    fn lower_conditional(
        &mut self,
        condition: &Expression,
        when_true: &Expression,
        when_false: &Expression,
    ) -> NfExpression {
        let id = self.next_label_id();
        let then_label = format!("cond_then_{}", id);
        let else_label = format!("cond_else_{}", id);
        let end_label = format!("cond_end_{}", id);

        let result = self.new_temp();
        let cond = self.lower_expr(condition);
        self.emit(NfStatement::Branch {
            condition: cond,
            true_label: then_label.clone(),
            false_label: else_label.clone(),
        });

        self.emit(NfStatement::Label(then_label));
        let then_value = self.lower_expr(when_true);
        let ty = then_value.ty();
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: then_value,
            ty,
        });
        self.emit(NfStatement::Goto(end_label.clone()));

        self.emit(NfStatement::Label(else_label));
        let else_value = self.lower_expr(when_false);
        self.emit(NfStatement::Assign {
            target: result.clone(),
            value: else_value,
            ty,
        });
        self.emit(NfStatement::Goto(end_label.clone()));
        self.emit(NfStatement::Label(end_label));

        NfExpression::var(result, ty)
    }
}

fn string_literal(value: &str) -> NfExpression {
    NfExpression::literal(LiteralValue::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Function, Statement};

    fn gt(l: Expression, r: Expression) -> Expression {
        Expression::binary(BinaryOp::Gt, l, r)
    }

    fn lower(function: &Function) -> NfFunction {
        CnfLowering::new().lower_function(function)
    }

    #[test]
    fn test_binary_operands_lowered_left_to_right() {
        // (a * b) + (c * d)
        let f = Function::new("f1", "f")
            .param("a", "i32")
            .param("b", "i32")
            .param("c", "i32")
            .param("d", "i32")
            .returns("i32")
            .body(vec![Statement::ret(Some(Expression::binary(
                BinaryOp::Add,
                Expression::binary(BinaryOp::Mul, Expression::var("a"), Expression::var("b")),
                Expression::binary(BinaryOp::Mul, Expression::var("c"), Expression::var("d")),
            )))]);

        let nf = lower(&f);
        let targets: Vec<&str> = nf
            .body
            .iter()
            .filter_map(|s| match s {
                NfStatement::Assign { target, .. } => Some(target.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec!["t0", "t1", "t2"]);

        match &nf.body[0] {
            NfStatement::Assign {
                value: NfExpression::BinaryOp { left, .. },
                ..
            } => assert_eq!(left.as_var(), Some("a")),
            other => panic!("expected a*b first, got {:?}", other),
        }
        assert_eq!(
            nf.body.last(),
            Some(&NfStatement::Return(Some(NfExpression::var(
                "t2",
                SemanticType::Int
            ))))
        );
    }

    #[test]
    fn test_precondition_lowering() {
        let f = Function::new("f", "f")
            .param("x", "i32")
            .requires(gt(Expression::var("x"), Expression::int(0)), None);
        let nf = lower(&f);

        // t0 = x > 0; branch t0 ? requires_ok_0 : requires_fail_0
        assert!(matches!(
            &nf.body[1],
            NfStatement::Branch { true_label, false_label, .. }
                if true_label == "requires_ok_0" && false_label == "requires_fail_0"
        ));
        assert_eq!(nf.body[2], NfStatement::Label("requires_fail_0".into()));
        match &nf.body[3] {
            NfStatement::Assign {
                value: NfExpression::Call { target, args, .. },
                ..
            } => {
                assert_eq!(target, CONTRACT_VIOLATION_CTOR);
                assert_eq!(
                    args,
                    &vec![string_literal("f"), string_literal(""), string_literal("Requires")]
                );
            }
            other => panic!("expected violation construction, got {:?}", other),
        }
        assert!(matches!(&nf.body[4], NfStatement::Throw(_)));
        assert_eq!(nf.body[5], NfStatement::Label("requires_ok_0".into()));
    }

    #[test]
    fn test_postconditions_are_not_lowered() {
        let f = Function::new("f", "f")
            .returns("i32")
            .ensures(gt(Expression::var("result"), Expression::int(0)));
        assert!(lower(&f).body.is_empty());
    }

    #[test]
    fn test_bind_without_initializer_gets_zero_value() {
        let f = Function::new("f", "f").body(vec![
            Statement::bind("a", Some("i64"), None),
            Statement::bind("b", Some("f32"), None),
            Statement::bind("c", Some("string"), None),
        ]);
        let nf = lower(&f);
        let values: Vec<&NfExpression> = nf
            .body
            .iter()
            .map(|s| match s {
                NfStatement::Assign { value, .. } => value,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(values[0], &NfExpression::literal(LiteralValue::Long(0)));
        assert_eq!(values[1], &NfExpression::literal(LiteralValue::Float(0.0)));
        assert_eq!(
            values[2],
            &NfExpression::literal(LiteralValue::String(String::new()))
        );
    }

    #[test]
    fn test_while_lowering_shape() {
        let f = Function::new("f", "f").param("n", "i32").body(vec![Statement::while_loop(
            gt(Expression::var("n"), Expression::int(0)),
            vec![Statement::assign(
                "n",
                Expression::binary(BinaryOp::Sub, Expression::var("n"), Expression::int(1)),
            )],
        )]);
        let nf = lower(&f);
        assert_eq!(nf.body[0], NfStatement::Label("while_header_0".into()));
        assert!(matches!(&nf.body[2], NfStatement::Branch { false_label, .. } if false_label == "while_exit_0"));
        assert_eq!(nf.body[3], NfStatement::Label("while_body_0".into()));
        assert_eq!(
            nf.body[nf.body.len() - 2],
            NfStatement::Goto("while_header_0".into())
        );
        assert_eq!(
            nf.body.last(),
            Some(&NfStatement::Label("while_exit_0".into()))
        );
    }

    #[test]
    fn test_for_lowering_uses_strict_less_than_and_default_step() {
        let f = Function::new("f", "f").param("n", "i32").body(vec![Statement::For {
            variable: "i".into(),
            from: Expression::int(0),
            to: Expression::var("n"),
            step: None,
            body: vec![],
            span: Span::default(),
        }]);
        let nf = lower(&f);
        assert!(matches!(&nf.body[0], NfStatement::Assign { target, .. } if target == "i"));
        assert_eq!(nf.body[1], NfStatement::Label("for_header_0".into()));
        assert!(matches!(
            &nf.body[2],
            NfStatement::Assign { value: NfExpression::BinaryOp { op: BinaryOp::Lt, .. }, .. }
        ));
        match &nf.body[5] {
            NfStatement::Assign {
                target,
                value: NfExpression::BinaryOp { op, right, .. },
                ..
            } => {
                assert_eq!(target, "i");
                assert_eq!(*op, BinaryOp::Add);
                assert_eq!(**right, NfExpression::literal(LiteralValue::Int(1)));
            }
            other => panic!("expected step, got {:?}", other),
        }
        // No continue, so no step label
        assert!(!nf
            .body
            .iter()
            .any(|s| matches!(s, NfStatement::Label(l) if l.starts_with("for_step"))));
    }

    #[test]
    fn test_continue_in_for_targets_step_label() {
        let f = Function::new("f", "f").body(vec![Statement::For {
            variable: "i".into(),
            from: Expression::int(0),
            to: Expression::int(10),
            step: Some(Expression::int(2)),
            body: vec![Statement::Continue { span: Span::default() }],
            span: Span::default(),
        }]);
        let nf = lower(&f);
        assert!(nf.body.contains(&NfStatement::Goto("for_step_0".into())));
        assert!(nf.body.contains(&NfStatement::Label("for_step_0".into())));
    }

    #[test]
    fn test_if_without_else_branches_to_endif() {
        let f = Function::new("f", "f").param("x", "i32").body(vec![Statement::if_else(
            gt(Expression::var("x"), Expression::int(0)),
            vec![Statement::ret(None)],
            None,
        )]);
        let nf = lower(&f);
        assert!(matches!(
            &nf.body[1],
            NfStatement::Branch { true_label, false_label, .. }
                if true_label == "then_0" && false_label == "endif_0"
        ));
    }

    #[test]
    fn test_short_circuit_and_guards_right_operand() {
        let f = Function::new("f", "f").body(vec![Statement::expr(Expression::binary(
            BinaryOp::And,
            Expression::bool(false),
            Expression::call("side_effect", vec![]),
        ))]);
        let nf = lower(&f);

        assert_eq!(
            nf.body[0],
            NfStatement::Assign {
                target: "t0".into(),
                value: NfExpression::literal(LiteralValue::Bool(false)),
                ty: SemanticType::Bool,
            }
        );
        assert!(matches!(
            &nf.body[1],
            NfStatement::Branch { true_label, false_label, .. }
                if true_label == "and_then_0" && false_label == "and_end_0"
        ));
        assert_eq!(nf.body[2], NfStatement::Label("and_then_0".into()));
        // The call is present, after the guard label and before the end label
        let call_at = nf
            .body
            .iter()
            .position(|s| matches!(s, NfStatement::Assign { value: NfExpression::Call { target, .. }, .. } if target == "side_effect"))
            .unwrap();
        let end_at = nf
            .body
            .iter()
            .position(|s| s == &NfStatement::Label("and_end_0".into()))
            .unwrap();
        assert!(call_at > 2 && call_at < end_at);
    }

    #[test]
    fn test_conditional_typed_from_then_arm() {
        let f = Function::new("f", "f").param("c", "bool").body(vec![Statement::bind(
            "v",
            None,
            Some(Expression::conditional(
                Expression::var("c"),
                Expression::LongLiteral(1),
                Expression::int(2),
            )),
        )]);
        let nf = lower(&f);
        let last = nf.body.last().unwrap();
        assert_eq!(
            last,
            &NfStatement::Assign {
                target: "v".into(),
                value: NfExpression::var("t0", SemanticType::Long),
                ty: SemanticType::Long,
            }
        );
    }

    #[test]
    fn test_opaque_nodes_are_recorded() {
        let f = Function::new("f", "f").body(vec![
            Statement::Opaque {
                kind: "match".into(),
                span: Span::default(),
            },
            Statement::expr(Expression::Opaque {
                kind: "lambda".into(),
            }),
        ]);
        let mut lowering = CnfLowering::new();
        let nf = lowering.lower_function(&f);
        assert!(nf.body.is_empty());
        assert_eq!(lowering.warnings().len(), 2);
        assert!(lowering.warnings()[0].message.contains("match"));
    }

    #[test]
    fn test_module_signatures_type_calls() {
        let module = Module::new("m", "demo")
            .with_function(Function::new("g1", "g").returns("i64"))
            .with_function(
                Function::new("f1", "f")
                    .body(vec![Statement::bind("x", None, Some(Expression::call("g", vec![])))]),
            );
        let nf = CnfLowering::new().lower_module(&module);
        let f = nf.function("f").unwrap();
        assert!(matches!(
            &f.body[1],
            NfStatement::Assign { target, ty: SemanticType::Long, .. } if target == "x"
        ));
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let f = Function::new("f", "f")
            .param("x", "i32")
            .requires(gt(Expression::var("x"), Expression::int(0)), Some("positive"))
            .body(vec![Statement::if_else(
                Expression::binary(
                    BinaryOp::Or,
                    Expression::var("x"),
                    Expression::bool(true),
                ),
                vec![Statement::ret(Some(Expression::var("x")))],
                Some(vec![Statement::ret(Some(Expression::int(0)))]),
            )]);
        let mut lowering = CnfLowering::new();
        let first = lowering.lower_function(&f);
        let second = lowering.lower_function(&f);
        assert_eq!(first, second);
    }

    /// Labels and jump targets in order, assignments left out
    fn control_flow(nf: &NfFunction) -> Vec<String> {
        nf.body
            .iter()
            .filter_map(|s| match s {
                NfStatement::Branch {
                    true_label,
                    false_label,
                    ..
                } => Some(format!("branch {} {}", true_label, false_label)),
                NfStatement::Goto(label) => Some(format!("goto {}", label)),
                NfStatement::Label(label) => Some(format!("{}:", label)),
                _ => None,
            })
            .collect()
    }

    fn arm(bound: i32, value: i32) -> ElseIfClause {
        ElseIfClause {
            condition: gt(Expression::var("a"), Expression::int(bound)),
            body: vec![Statement::assign("b", Expression::int(value))],
            span: Span::default(),
        }
    }

    fn cascade(else_body: Option<Vec<Statement>>) -> Function {
        Function::new("f1", "grade")
            .param("a", "i32")
            .param("b", "i32")
            .body(vec![Statement::If {
                condition: gt(Expression::var("a"), Expression::int(0)),
                then_body: vec![Statement::assign("b", Expression::int(1))],
                else_ifs: vec![arm(1, 2), arm(2, 3)],
                else_body,
                span: Span::default(),
            }])
    }

    #[test]
    fn test_elseif_cascade_falls_through_to_else() {
        let nf = lower(&cascade(Some(vec![Statement::assign("b", Expression::int(4))])));
        assert_eq!(
            control_flow(&nf),
            vec![
                "branch then_0 elseif_next_0_0",
                "then_0:",
                "goto endif_0",
                "elseif_next_0_0:",
                "branch elseif_then_0_0 elseif_next_0_1",
                "elseif_then_0_0:",
                "goto endif_0",
                "elseif_next_0_1:",
                "branch elseif_then_0_1 else_0",
                "elseif_then_0_1:",
                "goto endif_0",
                "else_0:",
                "goto endif_0",
                "endif_0:",
            ]
        );
    }

    #[test]
    fn test_elseif_cascade_without_else_ends_at_endif() {
        let nf = lower(&cascade(None));
        let flow = control_flow(&nf);
        assert!(flow.contains(&"branch elseif_then_0_1 endif_0".to_string()));
        assert!(!flow.iter().any(|s| s.starts_with("else_0")));
        assert_eq!(flow.last().map(String::as_str), Some("endif_0:"));
    }

    #[test]
    fn test_or_skips_right_operand_when_left_holds() {
        // return a > 0 || b > 0
        let f = Function::new("f1", "either")
            .param("a", "i32")
            .param("b", "i32")
            .returns("bool")
            .body(vec![Statement::ret(Some(Expression::binary(
                BinaryOp::Or,
                gt(Expression::var("a"), Expression::int(0)),
                gt(Expression::var("b"), Expression::int(0)),
            )))]);
        let nf = lower(&f);
        let lines: Vec<String> = nf.body.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "t0 : Bool = true",
                "t1 : Bool = a > 0",
                "branch t1 ? or_end_0 : or_else_0",
                "or_else_0:",
                "t2 : Bool = b > 0",
                "t0 : Bool = t2",
                "goto or_end_0",
                "or_end_0:",
                "return t0",
            ]
        );
    }
}
