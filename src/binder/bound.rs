use crate::ast::{BinaryOp, UnaryOp};
use crate::compiler::ir::{LiteralValue, SemanticType};
use crate::diagnostics::Span;
use std::fmt;

/// Bound compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct BoundModule {
    /// Module name
    pub name: String,
    /// Bound functions in declaration order
    pub functions: Vec<BoundFunction>,
}

/// Resolved variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSymbol {
    /// Name
    pub name: String,
    /// Normalized type
    pub ty: SemanticType,
    /// Declared as a parameter
    pub is_parameter: bool,
}

/// Function after name and type resolution
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFunction {
    /// Stable identifier
    pub id: String,
    /// Name
    pub name: String,
    /// Parameters in order
    pub parameters: Vec<VariableSymbol>,
    /// Locals in declaration order (loop and catch variables included)
    pub locals: Vec<VariableSymbol>,
    /// Normalized return type
    pub return_type: SemanticType,
    /// Body
    pub body: Vec<BoundStatement>,
    /// Declaration span
    pub span: Span,
}

impl BoundFunction {
    /// Type of a parameter or local
    pub fn type_of(&self, name: &str) -> Option<SemanticType> {
        self.parameters
            .iter()
            .chain(self.locals.iter())
            .find(|s| s.name == name)
            .map(|s| s.ty)
    }

    /// Whether `name` is a parameter
    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }
}

/// Bound statements
#[derive(Debug, Clone, PartialEq)]
pub enum BoundStatement {
    /// Local declaration
    Bind {
        name: String,
        ty: SemanticType,
        initializer: Option<BoundExpr>,
        span: Span,
    },
    /// Assignment to a declared variable
    Assign {
        target: String,
        value: BoundExpr,
        span: Span,
    },
    /// Expression statement
    Expression { expr: BoundExpr, span: Span },
    /// Return
    Return {
        value: Option<BoundExpr>,
        span: Span,
    },
    /// `if` / `elseif`* / `else`
    If {
        condition: BoundExpr,
        then_body: Vec<BoundStatement>,
        else_ifs: Vec<BoundElseIf>,
        else_body: Option<Vec<BoundStatement>>,
        span: Span,
    },
    /// `while`
    While {
        condition: BoundExpr,
        body: Vec<BoundStatement>,
        span: Span,
    },
    /// Ascending `for variable in from..to step`
    For {
        variable: String,
        ty: SemanticType,
        from: BoundExpr,
        to: BoundExpr,
        step: BoundExpr,
        body: Vec<BoundStatement>,
        span: Span,
    },
    /// Leave the innermost loop
    Break { span: Span },
    /// Next iteration of the innermost loop
    Continue { span: Span },
    /// Throw
    Throw { value: BoundExpr, span: Span },
    /// `try` / `catch`* / `finally`
    Try {
        body: Vec<BoundStatement>,
        catch_clauses: Vec<BoundCatch>,
        finally_body: Option<Vec<BoundStatement>>,
        span: Span,
    },
}

impl BoundStatement {
    /// Span of any statement
    pub fn span(&self) -> Span {
        match self {
            BoundStatement::Bind { span, .. }
            | BoundStatement::Assign { span, .. }
            | BoundStatement::Expression { span, .. }
            | BoundStatement::Return { span, .. }
            | BoundStatement::If { span, .. }
            | BoundStatement::While { span, .. }
            | BoundStatement::For { span, .. }
            | BoundStatement::Break { span }
            | BoundStatement::Continue { span }
            | BoundStatement::Throw { span, .. }
            | BoundStatement::Try { span, .. } => *span,
        }
    }
}

/// Bound `elseif` arm
#[derive(Debug, Clone, PartialEq)]
pub struct BoundElseIf {
    pub condition: BoundExpr,
    pub body: Vec<BoundStatement>,
    pub span: Span,
}

/// Bound `catch` handler
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCatch {
    pub exception_type: Option<String>,
    pub variable: Option<String>,
    pub body: Vec<BoundStatement>,
}

/// Bound expressions
///
/// Wrapper constructors, field access and record creation bind to calls with
/// the same target conventions as the Normal Form (`Some`, `.field`,
/// `new Type`).
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    /// Constant
    Literal(LiteralValue),
    /// Resolved variable
    Variable { name: String, ty: SemanticType },
    /// Binary operation (`&&`/`||` keep short-circuit meaning)
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
        ty: SemanticType,
    },
    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
        ty: SemanticType,
    },
    /// Call
    Call {
        target: String,
        args: Vec<BoundExpr>,
        ty: SemanticType,
    },
    /// `c ? a : b`
    Conditional {
        condition: Box<BoundExpr>,
        when_true: Box<BoundExpr>,
        when_false: Box<BoundExpr>,
        ty: SemanticType,
    },
    /// Placeholder for something that did not bind
    Error,
}

impl BoundExpr {
    /// Integer literal
    pub fn int(value: i32) -> Self {
        BoundExpr::Literal(LiteralValue::Int(value))
    }

    /// Variable reference
    pub fn var(name: impl Into<String>, ty: SemanticType) -> Self {
        BoundExpr::Variable {
            name: name.into(),
            ty,
        }
    }

    /// Binary operation typed by the usual promotion rules
    pub fn binary(op: BinaryOp, left: BoundExpr, right: BoundExpr) -> Self {
        let ty = SemanticType::binary_result(op, left.ty(), right.ty());
        BoundExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    /// Type of the expression (`Object` for errors)
    pub fn ty(&self) -> SemanticType {
        match self {
            BoundExpr::Literal(value) => value.natural_type(),
            BoundExpr::Variable { ty, .. }
            | BoundExpr::Binary { ty, .. }
            | BoundExpr::Unary { ty, .. }
            | BoundExpr::Call { ty, .. }
            | BoundExpr::Conditional { ty, .. } => *ty,
            BoundExpr::Error => SemanticType::Object,
        }
    }

    /// Visits this expression and all sub-expressions, parents first
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a BoundExpr)) {
        f(self);
        match self {
            BoundExpr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            BoundExpr::Unary { operand, .. } => operand.visit(f),
            BoundExpr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            BoundExpr::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => {
                condition.visit(f);
                when_true.visit(f);
                when_false.visit(f);
            }
            BoundExpr::Literal(_) | BoundExpr::Variable { .. } | BoundExpr::Error => {}
        }
    }

    /// Names of variables read, in evaluation order (with repeats)
    pub fn reads(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.visit(&mut |e| {
            if let BoundExpr::Variable { name, .. } = e {
                names.push(name.as_str());
            }
        });
        names
    }

    /// Constant value, folding integer and boolean operators
    ///
    /// Integer folding uses 64-bit wrapping arithmetic and gives up on
    /// division by zero.
    pub fn constant_value(&self) -> Option<LiteralValue> {
        match self {
            BoundExpr::Literal(value) => Some(value.clone()),
            BoundExpr::Unary { op, operand, .. } => {
                let value = operand.constant_value()?;
                match (op, value) {
                    (UnaryOp::Not, LiteralValue::Bool(b)) => Some(LiteralValue::Bool(!b)),
                    (UnaryOp::Neg, LiteralValue::Int(v)) => Some(LiteralValue::Int(v.wrapping_neg())),
                    (UnaryOp::Neg, LiteralValue::Long(v)) => {
                        Some(LiteralValue::Long(v.wrapping_neg()))
                    }
                    _ => None,
                }
            }
            BoundExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                let l = left.constant_value()?;
                let r = right.constant_value()?;
                fold_binary(*op, &l, &r, *ty)
            }
            _ => None,
        }
    }
}

fn fold_binary(
    op: BinaryOp,
    l: &LiteralValue,
    r: &LiteralValue,
    ty: SemanticType,
) -> Option<LiteralValue> {
    if let (Some(a), Some(b)) = (l.as_bool(), r.as_bool()) {
        return match op {
            BinaryOp::And => Some(LiteralValue::Bool(a && b)),
            BinaryOp::Or => Some(LiteralValue::Bool(a || b)),
            BinaryOp::Eq => Some(LiteralValue::Bool(a == b)),
            BinaryOp::Ne => Some(LiteralValue::Bool(a != b)),
            _ => None,
        };
    }

    let a = l.as_i64()?;
    let b = r.as_i64()?;
    let int = |v: i64| match ty {
        SemanticType::Int => Some(LiteralValue::Int(v as i32)),
        SemanticType::Long => Some(LiteralValue::Long(v)),
        _ => None,
    };
    match op {
        BinaryOp::Add => int(a.wrapping_add(b)),
        BinaryOp::Sub => int(a.wrapping_sub(b)),
        BinaryOp::Mul => int(a.wrapping_mul(b)),
        BinaryOp::Div if b != 0 => int(a.wrapping_div(b)),
        BinaryOp::Mod if b != 0 => int(a.wrapping_rem(b)),
        BinaryOp::Eq => Some(LiteralValue::Bool(a == b)),
        BinaryOp::Ne => Some(LiteralValue::Bool(a != b)),
        BinaryOp::Lt => Some(LiteralValue::Bool(a < b)),
        BinaryOp::Le => Some(LiteralValue::Bool(a <= b)),
        BinaryOp::Gt => Some(LiteralValue::Bool(a > b)),
        BinaryOp::Ge => Some(LiteralValue::Bool(a >= b)),
        _ => None,
    }
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Literal(value) => write!(f, "{}", value),
            BoundExpr::Variable { name, .. } => f.write_str(name),
            BoundExpr::Binary {
                op, left, right, ..
            } => {
                let wrap = |e: &BoundExpr| matches!(e, BoundExpr::Binary { .. });
                if wrap(left) {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op)?;
                if wrap(right) {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
            BoundExpr::Unary { op, operand, .. } => write!(f, "{}{}", op, operand),
            BoundExpr::Call { target, args, .. } => {
                write!(f, "{}(", target)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            BoundExpr::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => write!(f, "({} ? {} : {})", condition, when_true, when_false),
            BoundExpr::Error => f.write_str("<error>"),
        }
    }
}
