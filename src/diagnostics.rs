//! # Diagnostics
//!
//! Every pass in the middle end reports problems by appending a
//! [`Diagnostic`] to a caller-owned [`DiagnosticBag`]. The bag is append-only:
//! entries are never removed or rewritten, only read back at the end for
//! reporting. Appends take `&self` so one bag can be shared between
//! per-function workers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Definite bug or ill-formed program
    Error,
    /// Likely bug
    Warning,
    /// Informational finding (e.g. a synthesized invariant)
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Source span (byte offsets plus 1-based line/column of the start)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Start line
    pub line: u32,
    /// Start column
    pub column: u32,
}

impl Span {
    /// Creates a span from offsets and a start position
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span carrying only a line number, as used by hand-built trees
    pub fn at_line(line: u32) -> Self {
        Self {
            line,
            column: 1,
            ..Self::default()
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Diagnostic codes produced by the middle end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Contracts
    /// Contract condition is not boolean
    TypeMismatch,
    /// Name not visible at this point
    UndefinedReference,
    /// `result` used in a postcondition of a void function
    InvalidReference,

    // Dataflow
    /// Variable read before it is definitely assigned
    UninitializedVariable,
    /// Assigned value is never read
    DeadStore,

    // Bug patterns
    /// Divisor is always zero
    DivisionByZero,
    /// Divisor can be zero on some path (solver-backed)
    PossibleDivisionByZero,
    /// Constant arithmetic overflows its type
    IntegerOverflow,
    /// Variable assigned to itself
    SelfAssignment,
    /// Branch condition is a compile-time constant
    ConstantCondition,

    // Taint
    /// Untrusted data reaches a SQL sink
    SqlInjection,
    /// Untrusted data reaches a process/shell sink
    CommandInjection,
    /// Untrusted data reaches a file-path sink
    PathTraversal,
    /// Untrusted data reaches an evaluation sink
    CodeInjection,
    /// Untrusted data reaches an HTML output sink
    CrossSiteScripting,

    // Loop invariants
    /// K-induction proved a loop invariant
    InvariantSynthesized,
}

impl DiagnosticCode {
    /// Stable short identifier used in rendered output
    pub fn id(&self) -> &'static str {
        match self {
            DiagnosticCode::TypeMismatch => "Calor0101",
            DiagnosticCode::UndefinedReference => "Calor0102",
            DiagnosticCode::InvalidReference => "Calor0103",
            DiagnosticCode::UninitializedVariable => "Calor0201",
            DiagnosticCode::DeadStore => "Calor0202",
            DiagnosticCode::DivisionByZero => "Calor0301",
            DiagnosticCode::PossibleDivisionByZero => "Calor0302",
            DiagnosticCode::IntegerOverflow => "Calor0303",
            DiagnosticCode::SelfAssignment => "Calor0304",
            DiagnosticCode::ConstantCondition => "Calor0305",
            DiagnosticCode::SqlInjection => "Calor0401",
            DiagnosticCode::CommandInjection => "Calor0402",
            DiagnosticCode::PathTraversal => "Calor0403",
            DiagnosticCode::CodeInjection => "Calor0404",
            DiagnosticCode::CrossSiteScripting => "Calor0405",
            DiagnosticCode::InvariantSynthesized => "Calor0501",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single reported problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Where in the source
    pub span: Span,
    /// What kind of problem
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] at {}: {}",
            self.severity,
            self.code.id(),
            self.code,
            self.span,
            self.message
        )
    }
}

/// Append-only, thread-safe diagnostic collection
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticBag {
    /// Creates an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic
    pub fn report(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }

    /// Appends an error
    pub fn error(&self, span: Span, code: DiagnosticCode, message: impl Into<String>) {
        self.push(Severity::Error, span, code, message);
    }

    /// Appends a warning
    pub fn warning(&self, span: Span, code: DiagnosticCode, message: impl Into<String>) {
        self.push(Severity::Warning, span, code, message);
    }

    /// Appends an informational diagnostic
    pub fn info(&self, span: Span, code: DiagnosticCode, message: impl Into<String>) {
        self.push(Severity::Info, span, code, message);
    }

    fn push(
        &self,
        severity: Severity,
        span: Span,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.report(Diagnostic {
            severity,
            span,
            code,
            message: message.into(),
        });
    }

    /// Appends every diagnostic of another bag, preserving order
    pub fn extend_from(&self, other: DiagnosticBag) {
        let moved = other.into_vec();
        self.entries.lock().extend(moved);
    }

    /// Number of diagnostics reported so far
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing has been reported
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True if any error-severity diagnostic was reported
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Number of diagnostics with the given code
    pub fn count_code(&self, code: DiagnosticCode) -> usize {
        self.entries.lock().iter().filter(|d| d.code == code).count()
    }

    /// Number of diagnostics with the given code reported after `since`
    pub fn count_code_since(&self, since: usize, code: DiagnosticCode) -> usize {
        self.entries
            .lock()
            .iter()
            .skip(since)
            .filter(|d| d.code == code)
            .count()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Consumes the bag
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries.into_inner()
    }
}
