//! Normal-Form module and function definitions

use super::instruction::NfStatement;
use super::types::SemanticType;
use serde::{Deserialize, Serialize};

/// Lowered parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfParameter {
    /// Name
    pub name: String,
    /// Semantic type
    pub ty: SemanticType,
}

/// Lowered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfFunction {
    /// Stable identifier
    pub id: String,
    /// Name
    pub name: String,
    /// Parameters in order
    pub parameters: Vec<NfParameter>,
    /// Return type
    pub return_type: SemanticType,
    /// Flat statement sequence
    pub body: Vec<NfStatement>,
}

impl NfFunction {
    /// Visits every statement of the body, including those inside `Try` regions
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a NfStatement)) {
        for stmt in &self.body {
            stmt.walk(visit);
        }
    }

    /// All statements in visiting order
    pub fn all_statements(&self) -> Vec<&NfStatement> {
        let mut out = Vec::new();
        self.walk(&mut |s| out.push(s));
        out
    }
}

/// Lowered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfModule {
    /// Stable identifier
    pub id: String,
    /// Name
    pub name: String,
    /// Functions in declaration order
    pub functions: Vec<NfFunction>,
}

impl NfModule {
    /// Looks a function up by name
    pub fn function(&self, name: &str) -> Option<&NfFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}
