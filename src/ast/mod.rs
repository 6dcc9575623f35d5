//! # Structured Tree
//!
//! The tree the parser hands to the middle end. CNF lowering and the contract
//! verifier consume it directly; the binder turns it into the bound tree used
//! by the verification analyses.
//!
//! Trees usually arrive as JSON from the front end:
//!
//! ```
//! use calor::ast::Module;
//!
//! let json = r#"{
//!     "id": "m1",
//!     "name": "demo",
//!     "functions": [{
//!         "id": "f001",
//!         "name": "inc",
//!         "parameters": [{ "name": "x", "type_name": "i32" }],
//!         "return_type": "i32",
//!         "body": [{ "Return": { "value": { "Binary": {
//!             "op": "Add",
//!             "left": { "Reference": "x" },
//!             "right": { "IntLiteral": 1 }
//!         } } } }]
//!     }]
//! }"#;
//!
//! let module = Module::from_json(json).unwrap();
//! assert_eq!(module.functions[0].name, "inc");
//! ```
//!
//! The constructor helpers below keep hand-built trees in tests short.

mod nodes;

pub use nodes::{
    BinaryOp, CatchClause, ElseIfClause, EnsuresClause, Expression, FieldInit, Function, Module,
    Parameter, RequiresClause, Statement, UnaryOp,
};

use crate::diagnostics::Span;
use crate::Result;

impl Module {
    /// Creates an empty module
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Adds a function
    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Decodes a module from the front end's JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes the module as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Function {
    /// Creates a void function with no parameters, contracts or body
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters: Vec::new(),
            return_type: None,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            body: Vec::new(),
            span: Span::default(),
        }
    }

    /// Adds a parameter
    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            type_name: type_name.into(),
            span: Span::default(),
        });
        self
    }

    /// Sets the declared return type
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    /// Adds a `requires` clause
    pub fn requires(mut self, condition: Expression, message: Option<&str>) -> Self {
        self.preconditions.push(RequiresClause {
            condition,
            message: message.map(str::to_string),
            span: Span::default(),
        });
        self
    }

    /// Adds an `ensures` clause
    pub fn ensures(mut self, condition: Expression) -> Self {
        self.postconditions.push(EnsuresClause {
            condition,
            span: Span::default(),
        });
        self
    }

    /// Sets the body
    pub fn body(mut self, body: Vec<Statement>) -> Self {
        self.body = body;
        self
    }
}

impl Expression {
    /// Int literal
    pub fn int(value: i32) -> Self {
        Expression::IntLiteral(value)
    }

    /// Bool literal
    pub fn bool(value: bool) -> Self {
        Expression::BoolLiteral(value)
    }

    /// String literal
    pub fn string(value: impl Into<String>) -> Self {
        Expression::StringLiteral(value.into())
    }

    /// Variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Expression::Reference(name.into())
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Unary operation
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Call
    pub fn call(target: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            target: target.into(),
            args,
        }
    }

    /// Conditional expression
    pub fn conditional(
        condition: Expression,
        when_true: Expression,
        when_false: Expression,
    ) -> Self {
        Expression::Conditional {
            condition: Box::new(condition),
            when_true: Box::new(when_true),
            when_false: Box::new(when_false),
        }
    }
}

impl Statement {
    /// `let name [: type] [= init]`
    pub fn bind(
        name: impl Into<String>,
        type_name: Option<&str>,
        initializer: Option<Expression>,
    ) -> Self {
        Statement::Bind {
            name: name.into(),
            type_name: type_name.map(str::to_string),
            initializer,
            span: Span::default(),
        }
    }

    /// `target = value`
    pub fn assign(target: impl Into<String>, value: Expression) -> Self {
        Statement::Assign {
            target: target.into(),
            value,
            span: Span::default(),
        }
    }

    /// Expression statement
    pub fn expr(expr: Expression) -> Self {
        Statement::Expression {
            expr,
            span: Span::default(),
        }
    }

    /// `return [value]`
    pub fn ret(value: Option<Expression>) -> Self {
        Statement::Return {
            value,
            span: Span::default(),
        }
    }

    /// `while condition body`
    pub fn while_loop(condition: Expression, body: Vec<Statement>) -> Self {
        Statement::While {
            condition,
            body,
            span: Span::default(),
        }
    }

    /// `if condition then_body [else else_body]`
    pub fn if_else(
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
    ) -> Self {
        Statement::If {
            condition,
            then_body,
            else_ifs: Vec::new(),
            else_body,
            span: Span::default(),
        }
    }

    /// Sets the span of any statement
    pub fn at(mut self, line: u32) -> Self {
        let new_span = Span::at_line(line);
        match &mut self {
            Statement::Bind { span, .. }
            | Statement::Assign { span, .. }
            | Statement::Expression { span, .. }
            | Statement::Return { span, .. }
            | Statement::If { span, .. }
            | Statement::While { span, .. }
            | Statement::For { span, .. }
            | Statement::Break { span }
            | Statement::Continue { span }
            | Statement::Throw { span, .. }
            | Statement::Try { span, .. }
            | Statement::Opaque { span, .. } => *span = new_span,
        }
        self
    }

    /// Span of any statement
    pub fn span(&self) -> Span {
        match self {
            Statement::Bind { span, .. }
            | Statement::Assign { span, .. }
            | Statement::Expression { span, .. }
            | Statement::Return { span, .. }
            | Statement::If { span, .. }
            | Statement::While { span, .. }
            | Statement::For { span, .. }
            | Statement::Break { span }
            | Statement::Continue { span }
            | Statement::Throw { span, .. }
            | Statement::Try { span, .. }
            | Statement::Opaque { span, .. } => *span,
        }
    }
}
