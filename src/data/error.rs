use std::path::PathBuf;

// ---------------------------------------------------------------------------
// DiagnosticError – failures of the fiber throughput diagnostic
// ---------------------------------------------------------------------------

/// Errors raised by the classifier, the bundle compressor and the quickred
/// reader boundary.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosticError {
    /// Structurally invalid caller input (missing master column, length
    /// mismatch, empty profile, ...). A programming error: fail fast.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The quickred frame backing an exposure could not be read.
    #[error("data unavailable at {}: {reason}", path.display())]
    DataUnavailable { path: PathBuf, reason: String },

    /// Fiber IDs handed to the compressor are not strictly increasing 1-based IDs.
    #[error("malformed fiber sequence: {0}")]
    MalformedSequence(String),
}

pub type DiagnosticResult<T> = Result<T, DiagnosticError>;
