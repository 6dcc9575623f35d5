//! Error types for the Calor middle end

use std::time::Duration;
use thiserror::Error;

/// Middle-end errors
///
/// Most passes never surface these to callers: failures inside an analysis are
/// converted into diagnostics or a skipped pass. The variants below are what
/// the fallible building blocks (input decoding, CFG construction, solver
/// calls) return.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Input errors
    /// Structured tree or options could not be decoded
    ///
    /// **Triggered by:** Malformed JSON handed to `Module::from_json` or
    /// `VerificationOptions::from_json`
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Analysis errors
    /// Control-flow graph could not be built for a function
    ///
    /// **Triggered by:** `break`/`continue` outside a loop in a bound body
    /// **Recovery:** The verification pass skips dataflow for that function
    #[error("Malformed control-flow graph in {function}: {reason}")]
    MalformedCfg {
        /// Function whose body was being translated
        function: String,
        /// What went wrong
        reason: String,
    },

    /// Dataflow fixpoint did not converge within the iteration limit
    #[error("Dataflow analysis did not converge after {iterations} iterations")]
    NoFixpoint {
        /// Iterations performed before giving up
        iterations: usize,
    },

    // Solver errors
    /// No solver binary could be started
    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    /// Solver process failed or produced unreadable output
    #[error("Solver error: {message}")]
    SolverError {
        /// Error description
        message: String,
    },

    /// Solver query exceeded its time budget
    #[error("Solver timeout after {0:?}")]
    SolverTimeout(Duration),

    /// General compiler error
    #[error("Compiler error: {0}")]
    CompilerError(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal error that cannot be recovered from
    Fatal,
    /// Recoverable error: the affected analysis is skipped or inconclusive
    Recoverable,
}

impl Error {
    /// Create a compiler error with a message
    pub fn compiler(msg: impl Into<String>) -> Self {
        Error::CompilerError(msg.into())
    }

    /// Create a solver error with a message
    pub fn solver(msg: impl Into<String>) -> Self {
        Error::SolverError {
            message: msg.into(),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::InvalidInput(_) => ErrorSeverity::Fatal,
            Error::CompilerError(_) => ErrorSeverity::Fatal,

            Error::MalformedCfg { .. } => ErrorSeverity::Recoverable,
            Error::NoFixpoint { .. } => ErrorSeverity::Recoverable,
            Error::SolverUnavailable(_) => ErrorSeverity::Recoverable,
            Error::SolverError { .. } => ErrorSeverity::Recoverable,
            Error::SolverTimeout(_) => ErrorSeverity::Recoverable,
        }
    }

    /// True for errors that only mean "no answer" from the solver
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            Error::SolverUnavailable(_) | Error::SolverTimeout(_) | Error::SolverError { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

/// Result type for Calor operations
pub type Result<T> = std::result::Result<T, Error>;
