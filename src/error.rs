//! Error types for the SVGD core.
//!
//! All failures are deterministic numerical faults; there is no retry
//! semantics. An error aborts the current `update` call and retains the
//! particle positions produced by completed earlier iterations.

/// Errors raised by kernel evaluation, gradient computation and the update loop.
#[derive(Debug, thiserror::Error)]
pub enum SvgdError {
    /// Malformed input: fewer than two particles, zero-dimensional particles,
    /// non-positive density values or mismatched tensor shapes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The computation became numerically meaningless: zero or non-finite
    /// bandwidth, or NaN/Inf gradients.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
}

pub type Result<T> = std::result::Result<T, SvgdError>;
