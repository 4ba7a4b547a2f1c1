//! Terminal presentation of tick outcomes.
//!
//! Readings print as one line each with a cents meter; repeated status
//! lines ("waiting for audio") are printed only when the status changes.

use std::collections::VecDeque;
use tuner_core::{DetectionResult, TickOutcome};

/// Display range of the cents meter, each side of zero.
const METER_RANGE: f32 = 50.0;
/// Characters on each side of the meter's centre mark.
const METER_HALF_WIDTH: usize = 10;
/// Readings closer than this to the target count as in tune.
const IN_TUNE_CENTS: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Reading,
    NoSignal,
    OutOfRange,
    NoTarget,
}

/// Turns tick outcomes into printable lines.
#[derive(Debug)]
pub struct Display {
    json: bool,
    smoothing: usize,
    smoothing_buffer: VecDeque<f32>,
    last_note: Option<(String, u8)>,
    last_status: Option<Status>,
}

impl Display {
    pub fn new(smoothing: usize, json: bool) -> Self {
        Self {
            json,
            smoothing: smoothing.max(1),
            smoothing_buffer: VecDeque::with_capacity(smoothing.max(1)),
            last_note: None,
            last_status: None,
        }
    }

    /// Line to print for `outcome`, or `None` to stay quiet.
    pub fn update(&mut self, outcome: &TickOutcome) -> Option<String> {
        let status = match outcome {
            TickOutcome::Detected(_) => Status::Reading,
            TickOutcome::NoSignal => Status::NoSignal,
            TickOutcome::OutOfRange { .. } => Status::OutOfRange,
            TickOutcome::NoTarget { .. } => Status::NoTarget,
        };
        let repeated = self.last_status == Some(status);
        self.last_status = Some(status);

        let TickOutcome::Detected(result) = outcome else {
            self.smoothing_buffer.clear();
            self.last_note = None;
            if repeated {
                return None;
            }
            return Some(if self.json {
                status_json(outcome)
            } else {
                status_text(outcome)
            });
        };

        if self.json {
            return serde_json::to_string(result).ok();
        }

        let cents = self.smooth(result);
        Some(format_reading(result, cents))
    }

    /// Moving average of the cents; restarts when the target note changes.
    fn smooth(&mut self, result: &DetectionResult) -> f32 {
        let note = (result.note_name.to_string(), result.octave);
        if self.last_note.as_ref() != Some(&note) {
            self.smoothing_buffer.clear();
            self.last_note = Some(note);
        }

        self.smoothing_buffer.push_back(result.cents_deviation);
        if self.smoothing_buffer.len() > self.smoothing {
            self.smoothing_buffer.pop_front();
        }
        self.smoothing_buffer.iter().sum::<f32>() / self.smoothing_buffer.len() as f32
    }
}

fn status_text(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::NoSignal => "waiting for audio...".to_string(),
        TickOutcome::OutOfRange { frequency } => format!("--   {frequency:8.2} Hz  (out of range)"),
        TickOutcome::NoTarget { frequency } => format!("??   {frequency:8.2} Hz  (select a target)"),
        TickOutcome::Detected(result) => format_reading(result, result.cents_deviation),
    }
}

fn status_json(outcome: &TickOutcome) -> String {
    let value = match outcome {
        TickOutcome::NoSignal => serde_json::json!({ "status": "no_signal" }),
        TickOutcome::OutOfRange { frequency } => {
            serde_json::json!({ "status": "out_of_range", "frequency": frequency })
        }
        TickOutcome::NoTarget { frequency } => {
            serde_json::json!({ "status": "no_target", "frequency": frequency })
        }
        TickOutcome::Detected(result) => serde_json::json!(result),
    };
    value.to_string()
}

/// `E2    82.35 Hz   -1.3 cents  [---------|          ]`
pub fn format_reading(result: &DetectionResult, cents: f32) -> String {
    let label = format!("{}{}", result.note_name, result.octave);
    let marker = if cents.abs() < IN_TUNE_CENTS { " ok" } else { "" };
    format!(
        "{label:<4} {:8.2} Hz  {cents:+6.1} cents  [{}]{marker}",
        result.frequency,
        meter(cents)
    )
}

/// Needle position on a fixed-width bar; cents beyond ±50 pin to the ends.
pub fn meter(cents: f32) -> String {
    let clamped = if cents.is_finite() { cents.clamp(-METER_RANGE, METER_RANGE) } else { 0.0 };
    let width = METER_HALF_WIDTH * 2 + 1;
    let position =
        ((clamped + METER_RANGE) / (2.0 * METER_RANGE) * (width - 1) as f32).round() as usize;

    (0..width)
        .map(|i| match i {
            _ if i == position => '|',
            _ if i == METER_HALF_WIDTH => ':',
            _ => ' ',
        })
        .collect()
}
