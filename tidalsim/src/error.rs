//! Error types for configuring and running a simulation.

use thiserror::Error;

/// Errors reported by the simulation core.
///
/// None of these are recovered internally: a configuration problem stops the
/// run before any sampling, and a numerical failure aborts the run at the step
/// where it was detected.
#[derive(Debug, Error)]
pub enum SimError {
    /// Missing, invalid or out-of-range parameter
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tree opening criterion this engine does not implement
    #[error("unsupported tree criterion `{0}` (supported: sw93)")]
    UnsupportedCriterion(String),

    /// Non-finite position, velocity or acceleration detected mid-run
    #[error("numerical instability during {phase} at step {step} (t = {time}): body {body} has non-finite {quantity}")]
    NumericalInstability {
        phase: &'static str,
        step: usize,
        time: f64,
        body: usize,
        quantity: &'static str,
    },
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type SimResult<T> = Result<T, SimError>;
