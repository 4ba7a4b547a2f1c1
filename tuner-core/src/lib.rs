// tuner-core/src/lib.rs

//! The core logic for the string tuner.
//! This crate is responsible for pitch detection, note mapping and
//! cents-deviation calculations. It is completely headless: it does no
//! audio capture, no I/O and contains no UI code.

pub mod error;
pub mod estimator;
pub mod notes;
pub mod resolver;
pub mod session;

pub use error::{TunerError, TunerResult};
pub use estimator::{Estimate, Estimator, EstimatorConfig};
pub use notes::NoteTableEntry;
pub use session::{DetectionSession, Mode, SessionState, SharedContext, TunerTarget, TuningContext};

use serde::Serialize;
use std::sync::Arc;

/// A pitch reading for one audio frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// The detected frequency in Hz.
    pub frequency: f32,
    /// Pitch-class name of the target note, shared with the target it came from.
    pub note_name: Arc<str>,
    /// Octave of the target note.
    pub octave: u8,
    /// The deviation from the target note in cents (positive = sharp).
    pub cents_deviation: f32,
    pub has_signal: bool,
}

/// What a single processing tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A frequency and its deviation from the target.
    Detected(DetectionResult),
    /// Too quiet or not periodic; show "waiting for audio".
    NoSignal,
    /// Auto mode found a pitch outside the note table.
    OutOfRange { frequency: f32 },
    /// Manual mode with nothing selected; show "select a target".
    NoTarget { frequency: f32 },
}
