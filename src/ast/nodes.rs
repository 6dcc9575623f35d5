use crate::diagnostics::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compilation unit as delivered by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Stable module identifier
    pub id: String,
    /// Module name
    pub name: String,
    /// Functions in declaration order
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// Function declaration with its contracts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Stable function identifier (carried into contract-violation values)
    pub id: String,
    /// Function name
    pub name: String,
    /// Parameters in order
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Declared return type name (`None` means void)
    #[serde(default)]
    pub return_type: Option<String>,
    /// `requires` clauses in order
    #[serde(default)]
    pub preconditions: Vec<RequiresClause>,
    /// `ensures` clauses in order
    #[serde(default)]
    pub postconditions: Vec<EnsuresClause>,
    /// Body statements
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Declaration span
    #[serde(default)]
    pub span: Span,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Declared type name (free-form, normalized later)
    pub type_name: String,
    /// Declaration span
    #[serde(default)]
    pub span: Span,
}

/// `requires condition [message]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiresClause {
    /// Condition that must hold on entry
    pub condition: Expression,
    /// Optional user message for the violation
    #[serde(default)]
    pub message: Option<String>,
    /// Clause span
    #[serde(default)]
    pub span: Span,
}

/// `ensures condition`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsuresClause {
    /// Condition that must hold on exit (`result` names the return value)
    pub condition: Expression,
    /// Clause span
    #[serde(default)]
    pub span: Span,
}

/// Structured statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Local binding: `let name [: type] [= initializer]`
    Bind {
        /// Bound name
        name: String,
        /// Declared type name, if any
        type_name: Option<String>,
        /// Initial value, if any
        initializer: Option<Expression>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Assignment to an existing variable
    Assign {
        /// Assigned variable
        target: String,
        /// New value
        value: Expression,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Expression evaluated for its effects (usually a call)
    Expression {
        /// The expression
        expr: Expression,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Return with optional value
    Return {
        /// Returned value
        value: Option<Expression>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// `if` / `elseif`* / `else`
    If {
        /// Condition of the first arm
        condition: Expression,
        /// Statements of the first arm
        then_body: Vec<Statement>,
        /// `elseif` arms in order
        #[serde(default)]
        else_ifs: Vec<ElseIfClause>,
        /// Optional `else` arm
        #[serde(default)]
        else_body: Option<Vec<Statement>>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// `while condition body`
    While {
        /// Loop condition
        condition: Expression,
        /// Loop body
        body: Vec<Statement>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// `for variable from .. to [step]` (ascending, exclusive upper bound)
    For {
        /// Loop variable
        variable: String,
        /// Initial value
        from: Expression,
        /// Exclusive upper bound
        to: Expression,
        /// Increment (defaults to literal 1)
        #[serde(default)]
        step: Option<Expression>,
        /// Loop body
        body: Vec<Statement>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Leave the innermost loop
    Break {
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Jump to the next iteration of the innermost loop
    Continue {
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Throw a value
    Throw {
        /// Thrown value
        value: Expression,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// `try` / `catch`* / `finally`
    Try {
        /// Protected statements
        body: Vec<Statement>,
        /// Handlers in order
        #[serde(default)]
        catch_clauses: Vec<CatchClause>,
        /// Optional finally block
        #[serde(default)]
        finally_body: Option<Vec<Statement>>,
        /// Statement span
        #[serde(default)]
        span: Span,
    },

    /// Parser node the middle end does not model (match, defer, ...)
    Opaque {
        /// Parser-side node kind, for diagnostics
        kind: String,
        /// Statement span
        #[serde(default)]
        span: Span,
    },
}

/// `elseif condition body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIfClause {
    /// Arm condition
    pub condition: Expression,
    /// Arm statements
    pub body: Vec<Statement>,
    /// Clause span
    #[serde(default)]
    pub span: Span,
}

/// `catch [Type] [variable] body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Caught exception type name (`None` catches everything)
    #[serde(default)]
    pub exception_type: Option<String>,
    /// Variable bound to the caught value
    #[serde(default)]
    pub variable: Option<String>,
    /// Handler statements
    pub body: Vec<Statement>,
    /// Clause span
    #[serde(default)]
    pub span: Span,
}

/// Record field initializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    /// Field name
    pub name: String,
    /// Field value
    pub value: Expression,
}

/// Structured expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    // Literals
    /// 32-bit integer literal
    IntLiteral(i32),
    /// 64-bit integer literal
    LongLiteral(i64),
    /// 32-bit float literal
    FloatLiteral(f32),
    /// 64-bit float literal
    DoubleLiteral(f64),
    /// Boolean literal
    BoolLiteral(bool),
    /// String literal
    StringLiteral(String),
    /// Null literal
    NullLiteral,

    /// Variable or parameter reference
    Reference(String),

    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand (evaluated first)
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },

    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },

    /// Call of a named function
    Call {
        /// Callee name
        target: String,
        /// Arguments, evaluated left to right
        args: Vec<Expression>,
    },

    /// `condition ? when_true : when_false`
    Conditional {
        /// Condition
        condition: Box<Expression>,
        /// Value when the condition holds
        when_true: Box<Expression>,
        /// Value otherwise
        when_false: Box<Expression>,
    },

    /// `Some(value)`
    Some(Box<Expression>),
    /// `None`
    None,
    /// `Ok(value)`
    Ok(Box<Expression>),
    /// `Err(value)`
    Err(Box<Expression>),

    /// `target.field`
    FieldAccess {
        /// Accessed value
        target: Box<Expression>,
        /// Field name
        field: String,
    },

    /// `TypeName { field: value, ... }`
    RecordCreation {
        /// Record type name
        type_name: String,
        /// Field initializers in declaration order
        fields: Vec<FieldInit>,
    },

    /// Parser node the middle end does not model (lambda, match, ...)
    Opaque {
        /// Parser-side node kind
        kind: String,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` (short-circuit)
    And,
    /// `||` (short-circuit)
    Or,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

impl BinaryOp {
    /// `==`, `!=`, `<`, `<=`, `>`, `>=`
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// `&&`, `||`
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operators whose result is always boolean
    pub fn yields_bool(&self) -> bool {
        self.is_comparison() || self.is_logical()
    }

    /// Source-level symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

impl UnaryOp {
    /// Source-level symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
