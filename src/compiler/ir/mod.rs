//! # Normal Form (CNF)
//!
//! The structured tree is lowered into a flat, order-explicit three-address
//! IR. Code generation consumes it; the verification analyses do not (they
//! work on the bound tree).
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # SemanticType, LiteralValue
//! ├── instruction.rs  # NfExpression, NfStatement, NfCatchClause
//! ├── program.rs      # NfFunction, NfModule
//! ├── lowering.rs     # CnfLowering (structured tree -> Normal Form)
//! ├── validate.rs     # Well-formedness checks
//! └── display.rs      # Text dump
//! ```
//!
//! ## Shape guarantees
//!
//! - Operands of every compound expression are atomic.
//! - Compound expressions only appear as the right-hand side of an `Assign`.
//! - Every `Branch`/`Goto` target is a `Label` of the same function, and
//!   every label is unique and referenced.
//!
//! [`validate_function`] checks all of these.

mod display;
mod instruction;
mod lowering;
mod program;
mod types;
mod validate;

pub use instruction::{NfCatchClause, NfExpression, NfStatement};
pub use lowering::{CnfLowering, LoweringWarning, CONTRACT_VIOLATION_CTOR, REQUIRES_TAG};
pub use program::{NfFunction, NfModule, NfParameter};
pub use types::{LiteralValue, SemanticType};
pub use validate::{validate_function, validate_module, NfViolation};
