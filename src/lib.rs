#![allow(dead_code, unused_imports, unused_variables, missing_docs)]
//! # Calor - Compiler Middle End
//!
//! The middle end of the compiler for Calor, a statically-typed language with
//! `requires`/`ensures` contracts. It takes the structured tree produced by
//! the front end and:
//!
//! - **lowers** it into Normal Form (CNF), a flat, order-explicit
//!   three-address IR with temporaries and labels,
//! - **checks contracts** for well-typed conditions and valid references,
//! - **verifies** bound functions with dataflow analyses, bug-pattern
//!   detection, taint tracking and k-induction loop-invariant synthesis.
//!
//! ## Quick Start
//!
//! ```rust
//! use calor::ast::{BinaryOp, Expression, Function, Module, Statement};
//! use calor::compiler::{CompileOptions, Compiler};
//!
//! let module = Module::new("m1", "demo").with_function(
//!     Function::new("f001", "half")
//!         .param("x", "i32")
//!         .returns("i32")
//!         .requires(
//!             Expression::binary(BinaryOp::Ge, Expression::var("x"), Expression::int(0)),
//!             Some("x must be non-negative"),
//!         )
//!         .body(vec![Statement::ret(Some(Expression::binary(
//!             BinaryOp::Div,
//!             Expression::var("x"),
//!             Expression::int(2),
//!         )))]),
//! );
//!
//! let result = Compiler::new(CompileOptions::default()).compile(&module);
//! assert!(!result.has_errors());
//!
//! let nf = result.nf_module.unwrap();
//! println!("{}", nf);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ast::Module ─┬─> compiler::contracts ──────────────────────────> diagnostics
//!              ├─> compiler::ir::CnfLowering ──> NfModule
//!              └─> binder::Binder ──> BoundModule ──> analysis ──> diagnostics
//!                                                     ├── cfg
//!                                                     ├── dataflow
//!                                                     ├── bug_patterns ─┐
//!                                                     ├── taint         ├─> solver
//!                                                     └── kinduction ───┘
//! ```
//!
//! ### Main Components
//!
//! - [`ast`] - Structured tree from the front end, JSON-decodable
//! - [`compiler::ir`] - Normal Form model, lowering, validation, text dump
//! - [`compiler::contracts`] - Contract verifier
//! - [`binder`] - Name and type resolution into the bound tree
//! - [`analysis`] - Verification analysis pass and its analyses
//! - [`solver`] - SMT solver capability and the Z3 process backend
//! - [`diagnostics`] - Shared, append-only diagnostic bag
//!
//! ## Error Handling
//!
//! Compilation stages report problems as [`diagnostics::Diagnostic`]s and
//! never fail. Decoding input, building a CFG and solver calls return
//! [`Result`]:
//!
//! ```rust
//! use calor::{ast::Module, Error};
//!
//! match Module::from_json("{ not json") {
//!     Err(Error::InvalidInput(msg)) => println!("bad input: {}", msg),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```
//!
//! ## Solver
//!
//! Solver-backed analyses take any [`solver::Solver`]. [`solver::Z3Solver`]
//! runs `z3` as a child process; when the binary is missing the analyses
//! treat every query as inconclusive.

// Allow specific clippy warnings that are false positives or intentional design choices
#![allow(clippy::only_used_in_recursion)] // False positive for recursive helper functions
#![allow(clippy::collapsible_match)] // Separate error handling for clarity

/// Version of the Calor middle end
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod analysis;
pub mod ast;
pub mod binder;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod solver;

// Re-export main types
pub use analysis::{VerificationAnalysisPass, VerificationOptions, VerificationPassResult};
pub use binder::{Binder, BoundFunction, BoundModule};
pub use compiler::ir::{CnfLowering, NfFunction, NfModule};
pub use compiler::{CompileOptions, CompileResult, Compiler, ContractVerifier};
pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Severity, Span};
pub use error::{Error, Result};
pub use solver::{SatResult, Solver, Z3Solver};
