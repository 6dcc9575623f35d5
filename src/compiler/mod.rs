//! # Calor Compiler Middle End
//!
//! Takes the structured tree from the front end through contract checking,
//! Normal-Form lowering and the verification analyses.
//!
//! ## Architecture
//!
//! ```text
//! ast::Module → Contract Verifier → diagnostics
//!             → CNF Lowering      → NfModule (+ lowering warnings)
//!             → Binder → BoundModule → Verification Analysis Pass → diagnostics
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use calor::compiler::{Compiler, CompileOptions};
//!
//! let module = calor::ast::Module::from_json(&json)?;
//! let result = Compiler::new(CompileOptions::default()).compile(&module);
//! for diagnostic in &result.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

pub mod contracts;
pub mod ir;

pub use contracts::ContractVerifier;
pub use ir::{CnfLowering, LoweringWarning, NfModule, NfViolation};

use crate::analysis::{VerificationAnalysisPass, VerificationOptions, VerificationPassResult};
use crate::ast;
use crate::binder::Binder;
use crate::diagnostics::{Diagnostic, DiagnosticBag, Severity};
use crate::solver::Solver;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Compilation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Check `requires`/`ensures` clauses
    pub verify_contracts: bool,
    /// Produce the Normal Form
    pub lower: bool,
    /// Check Normal-Form shape after lowering
    pub validate_normal_form: bool,
    /// Bind the tree and run the verification analyses
    pub run_verification: bool,
    /// Verification analysis configuration
    pub verification: VerificationOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            verify_contracts: true,
            lower: true,
            validate_normal_form: false,
            run_verification: true,
            verification: VerificationOptions::default(),
        }
    }
}

impl CompileOptions {
    /// Options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Compilation result
#[derive(Debug)]
pub struct CompileResult {
    /// Normal Form, when lowering ran
    pub nf_module: Option<NfModule>,
    /// Every diagnostic, in the order the stages produced them
    pub diagnostics: Vec<Diagnostic>,
    /// Constructs lowering could not express
    pub lowering_warnings: Vec<LoweringWarning>,
    /// Shape problems found in the Normal Form
    pub nf_violations: Vec<NfViolation>,
    /// Verification analysis counts, when the pass ran
    pub verification: Option<VerificationPassResult>,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }
}

/// Calor middle-end driver
pub struct Compiler {
    options: CompileOptions,
    solver: Option<Arc<dyn Solver>>,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            solver: None,
        }
    }

    /// Solver handed to the verification pass
    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Compile a module given as JSON
    pub fn compile_json(&self, json: &str) -> Result<CompileResult> {
        let module = ast::Module::from_json(json)?;
        Ok(self.compile(&module))
    }

    /// Run every enabled stage over `module`
    pub fn compile(&self, module: &ast::Module) -> CompileResult {
        let diagnostics = DiagnosticBag::new();

        // Phase 1: Contracts
        if self.options.verify_contracts {
            ContractVerifier::new(&diagnostics).verify(module);
        }

        // Phase 2: Normal Form
        let mut lowering_warnings = Vec::new();
        let mut nf_violations = Vec::new();
        let nf_module = if self.options.lower {
            let mut lowering = CnfLowering::new();
            let nf = lowering.lower_module(module);
            lowering_warnings = lowering.take_warnings();
            for warning in &lowering_warnings {
                tracing::warn!("{}", warning);
            }
            if self.options.validate_normal_form {
                nf_violations = ir::validate_module(&nf);
                for violation in &nf_violations {
                    tracing::warn!("Normal Form violation: {}", violation);
                }
            }
            Some(nf)
        } else {
            None
        };

        // Phase 3: Binding and verification analyses
        let verification = if self.options.run_verification {
            let bound = Binder::new(&diagnostics).bind_module(module);
            let mut pass = VerificationAnalysisPass::new(self.options.verification.clone());
            if let Some(solver) = &self.solver {
                pass = pass.with_solver(solver.clone());
            }
            Some(pass.run(&bound, &diagnostics))
        } else {
            None
        };

        tracing::debug!(
            "Compiled {}: {} diagnostics, {} lowering warnings",
            module.name,
            diagnostics.len(),
            lowering_warnings.len()
        );

        CompileResult {
            nf_module,
            diagnostics: diagnostics.into_vec(),
            lowering_warnings,
            nf_violations,
            verification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expression, Function, Module, Statement};
    use crate::diagnostics::DiagnosticCode;

    fn sample() -> Module {
        Module::new("m1", "demo").with_function(
            Function::new("f001", "inc")
                .param("x", "i32")
                .returns("i32")
                .requires(
                    Expression::binary(BinaryOp::Gt, Expression::var("x"), Expression::int(0)),
                    None,
                )
                .body(vec![Statement::ret(Some(Expression::binary(
                    BinaryOp::Add,
                    Expression::var("x"),
                    Expression::int(1),
                )))]),
        )
    }

    #[test]
    fn test_compile_runs_every_stage() {
        let result = Compiler::new(CompileOptions::default()).compile(&sample());
        let nf = result.nf_module.as_ref().unwrap();
        assert_eq!(nf.functions.len(), 1);
        assert!(!result.has_errors());
        assert_eq!(result.verification.as_ref().unwrap().functions_analyzed, 1);
    }

    #[test]
    fn test_stages_can_be_disabled() {
        let options = CompileOptions {
            lower: false,
            run_verification: false,
            ..CompileOptions::default()
        };
        let result = Compiler::new(options).compile(&sample());
        assert!(result.nf_module.is_none());
        assert!(result.verification.is_none());
    }

    #[test]
    fn test_contract_errors_reach_result() {
        let module = Module::new("m1", "demo").with_function(
            Function::new("f002", "bad")
                .requires(Expression::int(1), None)
                .body(vec![]),
        );
        let result = Compiler::new(CompileOptions::default()).compile(&module);
        assert!(result
            .errors()
            .any(|d| d.code == DiagnosticCode::TypeMismatch));
    }

    #[test]
    fn test_lowered_normal_form_is_valid() {
        let options = CompileOptions {
            validate_normal_form: true,
            ..CompileOptions::default()
        };
        let result = Compiler::new(options).compile(&sample());
        assert!(result.nf_violations.is_empty());
    }

    #[test]
    fn test_compile_json_rejects_bad_input() {
        assert!(Compiler::new(CompileOptions::default())
            .compile_json("{")
            .is_err());
    }
}
