//! Error types for the tuner engine.
//!
//! Only caller misconfiguration is an error. Silence, weak correlation and
//! notes outside the table are ordinary outcomes and live in
//! [`crate::estimator::Estimate`] and [`crate::TickOutcome`].

use thiserror::Error;

/// Tuner engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// Frame too short for the analysis window plus the largest searched lag
    #[error("Buffer too short: {len} samples, need at least {required}")]
    BufferTooShort { len: usize, required: usize },

    /// Sample rate is zero, negative or not finite
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),

    /// Estimator settings are inconsistent
    #[error("Invalid estimator configuration: {0}")]
    InvalidConfig(String),

    /// Manual target frequency is not a positive finite number
    #[error("Invalid target frequency: {0}")]
    InvalidTarget(f32),
}

/// Result type for tuner operations
pub type TunerResult<T> = Result<T, TunerError>;
