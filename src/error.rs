use crate::LaneId;
use thiserror::Error;

/// An error raised while building or stepping a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("the road's vehicles have not been placed; initialize the road first")]
    NotInitialized,

    #[error("implicit solve did not converge after {iterations} iterations (residual {residual:e})")]
    NumericalConvergenceFailure { iterations: usize, residual: f64 },

    #[error("invalid value for `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("lane length {got} does not match the road circumference {expected}")]
    LaneLengthMismatch { expected: f64, got: f64 },

    #[error("{what} length {got} does not match vehicle count {expected}")]
    StateLengthMismatch {
        expected: usize,
        got: usize,
        what: &'static str,
    },

    #[error("lane {0:?} does not belong to this road")]
    UnknownLane(LaneId),
}

pub type SimResult<T> = Result<T, SimError>;

/// Fails with [SimError::InvalidParameter] unless `value` is finite and `> 0`.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter { name, value })
    }
}

/// Fails with [SimError::InvalidParameter] unless `value` is finite and `>= 0`.
pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter { name, value })
    }
}
