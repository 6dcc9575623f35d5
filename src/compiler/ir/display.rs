//! Text dump of the Normal Form

use super::instruction::{NfCatchClause, NfExpression, NfStatement};
use super::program::{NfFunction, NfModule};
use std::fmt;

impl fmt::Display for NfExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfExpression::Literal { value, .. } => write!(f, "{}", value),
            NfExpression::VariableRef { name, .. } => f.write_str(name),
            NfExpression::BinaryOp {
                op, left, right, ..
            } => write!(f, "{} {} {}", left, op, right),
            NfExpression::UnaryOp { op, operand, .. } => write!(f, "{}{}", op, operand),
            NfExpression::Call { target, args, .. } => {
                write!(f, "{}(", target)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[NfStatement], depth: usize) -> fmt::Result {
    for stmt in stmts {
        write_statement(f, stmt, depth)?;
    }
    Ok(())
}

fn write_statement(f: &mut fmt::Formatter<'_>, stmt: &NfStatement, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match stmt {
        // Labels sit one level out
        NfStatement::Label(name) => {
            writeln!(f, "{}{}:", "  ".repeat(depth.saturating_sub(1)), name)
        }
        NfStatement::Try {
            body,
            catch_clauses,
            finally_body,
        } => {
            writeln!(f, "{}try {{", indent)?;
            write_block(f, body, depth + 1)?;
            for NfCatchClause {
                exception_type,
                variable,
                body,
            } in catch_clauses
            {
                write!(f, "{}}} catch", indent)?;
                if let Some(ty) = exception_type {
                    write!(f, " {}", ty)?;
                }
                if let Some(var) = variable {
                    write!(f, " {}", var)?;
                }
                writeln!(f, " {{")?;
                write_block(f, body, depth + 1)?;
            }
            if let Some(finally) = finally_body {
                writeln!(f, "{}}} finally {{", indent)?;
                write_block(f, finally, depth + 1)?;
            }
            writeln!(f, "{}}}", indent)
        }
        other => writeln!(f, "{}{}", indent, other),
    }
}

impl fmt::Display for NfStatement {
    /// Single-line form; `Try` regions are only rendered in full by the
    /// function dump
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfStatement::Assign { target, value, ty } => {
                write!(f, "{} : {} = {}", target, ty, value)
            }
            NfStatement::Branch {
                condition,
                true_label,
                false_label,
            } => write!(f, "branch {} ? {} : {}", condition, true_label, false_label),
            NfStatement::Goto(label) => write!(f, "goto {}", label),
            NfStatement::Label(name) => write!(f, "{}:", name),
            NfStatement::Return(Some(value)) => write!(f, "return {}", value),
            NfStatement::Return(None) => f.write_str("return"),
            NfStatement::Throw(value) => write!(f, "throw {}", value),
            NfStatement::Try { catch_clauses, .. } => {
                write!(f, "try {{ ... }} ({} handlers)", catch_clauses.len())
            }
        }
    }
}

impl fmt::Display for NfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        write_block(f, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for NfModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} ({})", self.name, self.id)?;
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::compiler::ir::{LiteralValue, NfParameter, SemanticType};

    #[test]
    fn test_statement_forms() {
        let assign = NfStatement::Assign {
            target: "t0".into(),
            value: NfExpression::BinaryOp {
                op: BinaryOp::Add,
                left: Box::new(NfExpression::var("x", SemanticType::Int)),
                right: Box::new(NfExpression::literal(LiteralValue::Int(1))),
                ty: SemanticType::Int,
            },
            ty: SemanticType::Int,
        };
        assert_eq!(assign.to_string(), "t0 : Int = x + 1");

        let branch = NfStatement::Branch {
            condition: NfExpression::var("t1", SemanticType::Bool),
            true_label: "then_0".into(),
            false_label: "endif_0".into(),
        };
        assert_eq!(branch.to_string(), "branch t1 ? then_0 : endif_0");
        assert_eq!(NfStatement::Label("then_0".into()).to_string(), "then_0:");
    }

    #[test]
    fn test_function_dump() {
        let f = NfFunction {
            id: "f1".into(),
            name: "id".into(),
            parameters: vec![NfParameter {
                name: "x".into(),
                ty: SemanticType::Int,
            }],
            return_type: SemanticType::Int,
            body: vec![NfStatement::Return(Some(NfExpression::var(
                "x",
                SemanticType::Int,
            )))],
        };
        assert_eq!(f.to_string(), "fn id(x: Int) -> Int {\n  return x\n}\n");
    }

    #[test]
    fn test_call_dump() {
        let call = NfExpression::Call {
            target: "new Point".into(),
            args: vec![
                NfExpression::literal(LiteralValue::Int(1)),
                NfExpression::literal(LiteralValue::String("a".into())),
            ],
            ty: SemanticType::Object,
        };
        assert_eq!(call.to_string(), "new Point(1, \"a\")");
    }
}
