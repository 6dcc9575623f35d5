//! Semantic types and literal values of the Normal Form

use crate::ast::BinaryOp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of types the middle end reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Boolean
    Bool,
    /// String
    String,
    /// No value
    Void,
    /// Anything else (records, options, results, unknown)
    Object,
}

impl SemanticType {
    /// Normalizes a declared type name (case-insensitive)
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INT" | "I32" => SemanticType::Int,
            "I64" | "LONG" => SemanticType::Long,
            "F32" | "FLOAT" => SemanticType::Float,
            "F64" | "DOUBLE" => SemanticType::Double,
            "BOOL" => SemanticType::Bool,
            "STRING" => SemanticType::String,
            "VOID" => SemanticType::Void,
            _ => SemanticType::Object,
        }
    }

    /// Normalizes an optional return type name (absent means void)
    pub fn from_return_type(name: Option<&str>) -> Self {
        name.map(Self::from_type_name).unwrap_or(SemanticType::Void)
    }

    /// Int, Long, Float or Double
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Int or Long
    pub fn is_integral(&self) -> bool {
        matches!(self, SemanticType::Int | SemanticType::Long)
    }

    fn numeric_rank(&self) -> Option<u8> {
        match self {
            SemanticType::Int => Some(0),
            SemanticType::Long => Some(1),
            SemanticType::Float => Some(2),
            SemanticType::Double => Some(3),
            _ => None,
        }
    }

    /// Widest of two numeric types; the left type when either is non-numeric
    pub fn widen(left: SemanticType, right: SemanticType) -> SemanticType {
        match (left.numeric_rank(), right.numeric_rank()) {
            (Some(l), Some(r)) if r > l => right,
            _ => left,
        }
    }

    /// Result type of a binary operator applied to operands of these types
    pub fn binary_result(op: BinaryOp, left: SemanticType, right: SemanticType) -> SemanticType {
        if op.yields_bool() {
            SemanticType::Bool
        } else {
            Self::widen(left, right)
        }
    }

    /// Canonical zero value used for bindings without initializer
    pub fn default_value(&self) -> LiteralValue {
        match self {
            SemanticType::Int => LiteralValue::Int(0),
            SemanticType::Long => LiteralValue::Long(0),
            SemanticType::Float => LiteralValue::Float(0.0),
            SemanticType::Double => LiteralValue::Double(0.0),
            SemanticType::Bool => LiteralValue::Bool(false),
            SemanticType::String => LiteralValue::String(String::new()),
            SemanticType::Void | SemanticType::Object => LiteralValue::Null,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Bool(bool),
    /// String
    String(String),
    /// Null
    Null,
}

impl LiteralValue {
    /// Type a literal of this kind has on its own
    pub fn natural_type(&self) -> SemanticType {
        match self {
            LiteralValue::Int(_) => SemanticType::Int,
            LiteralValue::Long(_) => SemanticType::Long,
            LiteralValue::Float(_) => SemanticType::Float,
            LiteralValue::Double(_) => SemanticType::Double,
            LiteralValue::Bool(_) => SemanticType::Bool,
            LiteralValue::String(_) => SemanticType::String,
            LiteralValue::Null => SemanticType::Object,
        }
    }

    /// Integral value, if this is an Int or Long
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LiteralValue::Int(v) => Some(*v as i64),
            LiteralValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value, if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LiteralValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(v) => write!(f, "{}", v),
            LiteralValue::Long(v) => write!(f, "{}L", v),
            LiteralValue::Float(v) => write!(f, "{:?}f", v),
            LiteralValue::Double(v) => write!(f, "{:?}", v),
            LiteralValue::Bool(v) => write!(f, "{}", v),
            LiteralValue::String(v) => write!(f, "{:?}", v),
            LiteralValue::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name_normalization() {
        assert_eq!(SemanticType::from_type_name("i32"), SemanticType::Int);
        assert_eq!(SemanticType::from_type_name("INT"), SemanticType::Int);
        assert_eq!(SemanticType::from_type_name("Long"), SemanticType::Long);
        assert_eq!(SemanticType::from_type_name("i64"), SemanticType::Long);
        assert_eq!(SemanticType::from_type_name("f32"), SemanticType::Float);
        assert_eq!(SemanticType::from_type_name("double"), SemanticType::Double);
        assert_eq!(SemanticType::from_type_name("bool"), SemanticType::Bool);
        assert_eq!(SemanticType::from_type_name("string"), SemanticType::String);
        assert_eq!(SemanticType::from_type_name("void"), SemanticType::Void);
        assert_eq!(SemanticType::from_type_name("Customer"), SemanticType::Object);
        assert_eq!(SemanticType::from_return_type(None), SemanticType::Void);
    }

    #[test]
    fn test_numeric_widening() {
        use SemanticType::*;
        assert_eq!(SemanticType::binary_result(BinaryOp::Add, Int, Long), Long);
        assert_eq!(SemanticType::binary_result(BinaryOp::Mul, Float, Int), Float);
        assert_eq!(SemanticType::binary_result(BinaryOp::Sub, Long, Double), Double);
        assert_eq!(SemanticType::binary_result(BinaryOp::Add, Double, Float), Double);
        assert_eq!(SemanticType::binary_result(BinaryOp::Lt, Int, Int), Bool);
        assert_eq!(SemanticType::binary_result(BinaryOp::And, Bool, Bool), Bool);
        assert_eq!(SemanticType::binary_result(BinaryOp::Add, String, Int), String);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(SemanticType::Int.default_value(), LiteralValue::Int(0));
        assert_eq!(SemanticType::Long.default_value(), LiteralValue::Long(0));
        assert_eq!(SemanticType::Float.default_value(), LiteralValue::Float(0.0));
        assert_eq!(SemanticType::Double.default_value(), LiteralValue::Double(0.0));
        assert_eq!(SemanticType::Bool.default_value(), LiteralValue::Bool(false));
        assert_eq!(
            SemanticType::String.default_value(),
            LiteralValue::String(String::new())
        );
    }
}
