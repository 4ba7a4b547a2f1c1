//! # Detection Session
//!
//! Per-frame orchestration: estimate the frequency, pick a target (nearest
//! note in Auto mode, the pinned note in Manual mode) and report the
//! deviation.
//!
//! The Auto/Manual choice and the pinned target live together in a
//! [`TuningContext`] that the caller passes into every tick. When capture
//! runs on its own thread, wrap it in a [`SharedContext`] so the selection
//! side and the analysis side always see the mode and target as one value.

use crate::{
    estimator::{Estimate, Estimator, EstimatorConfig},
    error::{TunerError, TunerResult},
    notes::{NoteTableEntry, PITCH_CLASSES},
    resolver, DetectionResult, TickOutcome,
};
use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared pitch-class names, so results built from table notes never allocate.
static PITCH_CLASS_NAMES: Lazy<Vec<Arc<str>>> =
    Lazy::new(|| PITCH_CLASSES.iter().map(|&name| Arc::from(name)).collect());

fn pitch_class_name(note: &NoteTableEntry) -> Arc<str> {
    Arc::clone(&PITCH_CLASS_NAMES[note.index() % PITCH_CLASSES.len()])
}

/// How the target note is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Target is whichever table note is nearest to the detected pitch
    #[default]
    Auto,
    /// Target is the note the user pinned
    Manual,
}

/// A note pinned by the user in Manual mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerTarget {
    pub note_name: Arc<str>,
    pub octave: u8,
    /// Target frequency in Hz
    pub frequency: f32,
}

impl TunerTarget {
    pub fn new(note_name: impl Into<Arc<str>>, octave: u8, frequency: f32) -> Self {
        Self {
            note_name: note_name.into(),
            octave,
            frequency,
        }
    }

    /// Scientific pitch label, e.g. "E2".
    pub fn label(&self) -> String {
        format!("{}{}", self.note_name, self.octave)
    }
}

impl From<&NoteTableEntry> for TunerTarget {
    fn from(note: &NoteTableEntry) -> Self {
        Self {
            note_name: pitch_class_name(note),
            octave: note.octave(),
            frequency: note.frequency,
        }
    }
}

/// The selection state read by every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningContext {
    mode: Mode,
    target: Option<TunerTarget>,
}

impl TuningContext {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn target(&self) -> Option<&TunerTarget> {
        self.target.as_ref()
    }

    /// Switches mode. Entering Auto drops any pinned target.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Auto {
            self.target = None;
        }
        if self.mode != mode {
            info!("[session] mode: {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Pins `target`, switching to Manual mode if needed.
    ///
    /// # Errors
    /// * [`TunerError::InvalidTarget`] if the frequency is not positive and
    ///   finite; the current selection is left untouched
    pub fn set_target(&mut self, target: TunerTarget) -> TunerResult<()> {
        if !target.frequency.is_finite() || target.frequency <= 0.0 {
            return Err(TunerError::InvalidTarget(target.frequency));
        }
        info!("[session] target: {} ({:.2} Hz)", target.label(), target.frequency);
        self.mode = Mode::Manual;
        self.target = Some(target);
        Ok(())
    }

    /// Unpins the target. The mode is left as it is.
    pub fn clear_target(&mut self) {
        if self.target.take().is_some() {
            info!("[session] target cleared");
        }
    }
}

/// [`TuningContext`] behind a lock, for capture on a separate thread.
///
/// Writers (the selection side) replace mode and target under one write
/// lock; the analysis side holds a read guard for the length of a tick.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<TuningContext>>,
}

impl SharedContext {
    pub fn new(context: TuningContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TuningContext> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TuningContext> {
        self.inner.write()
    }

    pub fn set_mode(&self, mode: Mode) {
        self.write().set_mode(mode);
    }

    pub fn set_target(&self, target: TunerTarget) -> TunerResult<()> {
        self.write().set_target(target)
    }

    pub fn clear_target(&self) {
        self.write().clear_target();
    }

    /// Copy of the current selection.
    pub fn snapshot(&self) -> TuningContext {
        self.read().clone()
    }
}

/// Whether the session is consuming frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
}

/// Turns audio frames into tick outcomes.
#[derive(Debug)]
pub struct DetectionSession {
    estimator: Estimator,
    state: SessionState,
}

impl DetectionSession {
    pub fn new(config: EstimatorConfig) -> TunerResult<Self> {
        Ok(Self {
            estimator: Estimator::new(config)?,
            state: SessionState::Idle,
        })
    }

    /// Wraps an already configured estimator.
    pub fn with_estimator(estimator: Estimator) -> Self {
        Self {
            estimator,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == SessionState::Listening
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Capture has started delivering frames.
    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            info!("[session] Idle -> Listening");
        }
        self.state = SessionState::Listening;
    }

    /// The user stopped listening.
    pub fn stop(&mut self) {
        if self.state == SessionState::Listening {
            info!("[session] Listening -> Idle");
        }
        self.state = SessionState::Idle;
    }

    /// The capture device went away.
    pub fn capture_lost(&mut self, reason: &str) {
        if self.state == SessionState::Listening {
            warn!("[session] capture lost ({reason}), Listening -> Idle");
        }
        self.state = SessionState::Idle;
    }

    /// Analyses one frame.
    ///
    /// Returns `Ok(None)` while idle; frames are ignored until [`start`].
    ///
    /// # Errors
    /// Configuration errors from [`Estimator::estimate`] are passed through
    /// and never turned into [`TickOutcome::NoSignal`].
    ///
    /// [`start`]: DetectionSession::start
    pub fn process(
        &mut self,
        frame: &[f32],
        sample_rate: f32,
        context: &TuningContext,
    ) -> TunerResult<Option<TickOutcome>> {
        if self.state != SessionState::Listening {
            return Ok(None);
        }
        let outcome = match self.estimator.estimate(frame, sample_rate)? {
            Estimate::NoSignal => TickOutcome::NoSignal,
            Estimate::Frequency(frequency) => resolve(frequency, context),
        };
        Ok(Some(outcome))
    }
}

/// Resolves a detected frequency against the current selection.
///
/// The result shares the note name with the table or the pinned target;
/// nothing is allocated per tick.
pub fn resolve(frequency: f32, context: &TuningContext) -> TickOutcome {
    let (note_name, octave, target_frequency) = match (context.mode, context.target.as_ref()) {
        (Mode::Auto, _) => match resolver::closest_note(frequency) {
            Some(note) => (pitch_class_name(note), note.octave(), note.frequency),
            None => return TickOutcome::OutOfRange { frequency },
        },
        (Mode::Manual, Some(target)) => {
            (Arc::clone(&target.note_name), target.octave, target.frequency)
        }
        (Mode::Manual, None) => return TickOutcome::NoTarget { frequency },
    };

    TickOutcome::Detected(DetectionResult {
        frequency,
        cents_deviation: resolver::cents(frequency, target_frequency),
        note_name,
        octave,
        has_signal: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SAMPLE_RATE: f32 = 44100.0;

    fn generate_sine(freq: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn listening_session() -> DetectionSession {
        let mut session = DetectionSession::new(EstimatorConfig::default()).unwrap();
        session.start();
        session
    }

    fn detected(outcome: TickOutcome) -> DetectionResult {
        match outcome {
            TickOutcome::Detected(result) => result,
            other => panic!("expected a detection, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_session_ignores_frames() {
        let mut session = DetectionSession::new(EstimatorConfig::default()).unwrap();
        let frame = generate_sine(440.0, 4096);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.process(&frame, SAMPLE_RATE, &TuningContext::default()).unwrap(), None);
    }

    #[test]
    fn test_state_transitions() {
        let mut session = DetectionSession::new(EstimatorConfig::default()).unwrap();
        session.start();
        assert!(session.is_listening());
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        session.start();
        session.capture_lost("device unplugged");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_auto_mode_uses_nearest_note() {
        let mut session = listening_session();
        let frame = generate_sine(445.0, 4096);
        let outcome = session.process(&frame, SAMPLE_RATE, &TuningContext::default()).unwrap().unwrap();

        let result = detected(outcome);
        assert_eq!(&*result.note_name, "A");
        assert_eq!(result.octave, 4);
        assert!(result.has_signal);
        assert!(result.cents_deviation > 0.0);
    }

    #[test]
    fn test_silence_reports_no_signal() {
        let mut session = listening_session();
        let frame = vec![0.0; 4096];
        let outcome = session.process(&frame, SAMPLE_RATE, &TuningContext::default()).unwrap();
        assert_eq!(outcome, Some(TickOutcome::NoSignal));
    }

    #[test]
    fn test_configuration_errors_are_not_swallowed() {
        let mut session = listening_session();
        let frame = vec![0.0; 1024];
        assert!(matches!(
            session.process(&frame, SAMPLE_RATE, &TuningContext::default()),
            Err(TunerError::BufferTooShort { .. })
        ));
        assert!(matches!(
            session.process(&vec![0.0; 4096], 0.0, &TuningContext::default()),
            Err(TunerError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_manual_without_target_asks_for_one() {
        let mut context = TuningContext::default();
        context.set_mode(Mode::Manual);
        assert_eq!(resolve(330.0, &context), TickOutcome::NoTarget { frequency: 330.0 });
    }

    #[test]
    fn test_manual_target_is_stable() {
        let mut context = TuningContext::default();
        context.set_target(TunerTarget::new("E", 2, 82.41)).unwrap();

        let mut last_cents = None;
        for freq in [78.0, 82.41, 87.0, 110.0] {
            let result = detected(resolve(freq, &context));
            assert_eq!(&*result.note_name, "E");
            assert_eq!(result.octave, 2);
            assert_ne!(Some(result.cents_deviation), last_cents);
            last_cents = Some(result.cents_deviation);
        }

        // 110 Hz would be A2 in Auto mode
        let auto = detected(resolve(110.0, &TuningContext::default()));
        assert_eq!(&*auto.note_name, "A");
        assert_eq!(auto.octave, 2);
    }

    #[test]
    fn test_mode_change_applies_to_next_tick() {
        let mut session = listening_session();
        let frame = generate_sine(110.0, 4096);
        let shared = SharedContext::default();

        let first = session.process(&frame, SAMPLE_RATE, &shared.read()).unwrap().unwrap();
        assert_eq!(&*detected(first).note_name, "A");

        shared.set_target(TunerTarget::new("G", 2, 98.0)).unwrap();
        let second = detected(session.process(&frame, SAMPLE_RATE, &shared.read()).unwrap().unwrap());
        assert_eq!(&*second.note_name, "G");
        assert!(second.cents_deviation > 150.0);

        shared.set_mode(Mode::Auto);
        let third = detected(session.process(&frame, SAMPLE_RATE, &shared.read()).unwrap().unwrap());
        assert_eq!(&*third.note_name, "A");
        assert!(shared.read().target().is_none());
    }

    #[test]
    fn test_auto_out_of_range() {
        assert_eq!(resolve(9000.0, &TuningContext::default()), TickOutcome::OutOfRange { frequency: 9000.0 });
    }

    #[test]
    fn test_set_target_switches_to_manual() {
        let mut context = TuningContext::default();
        assert_eq!(context.mode(), Mode::Auto);
        context.set_target(TunerTarget::new("A", 2, 110.0)).unwrap();
        assert_eq!(context.mode(), Mode::Manual);

        context.clear_target();
        assert_eq!(context.mode(), Mode::Manual);
        assert!(context.target().is_none());
    }

    #[test]
    fn test_invalid_target_keeps_previous() {
        let mut context = TuningContext::default();
        context.set_target(TunerTarget::new("D", 3, 146.83)).unwrap();
        assert_eq!(
            context.set_target(TunerTarget::new("D", 3, 0.0)),
            Err(TunerError::InvalidTarget(0.0))
        );
        assert_eq!(context.target().unwrap().frequency, 146.83);
    }

    #[test]
    fn test_target_from_table_entry() {
        let note = resolver::parse_note("B3").unwrap();
        let target = TunerTarget::from(note);
        assert_eq!(target.label(), "B3");
        assert_abs_diff_eq!(target.frequency, 246.94, epsilon = 0.01);
    }

    #[test]
    fn test_results_share_note_names() {
        let mut context = TuningContext::default();
        context.set_target(TunerTarget::new(String::from("D"), 2, 73.42)).unwrap();
        let pinned = Arc::clone(&context.target().unwrap().note_name);
        for freq in [72.0, 73.42, 75.0] {
            let result = detected(resolve(freq, &context));
            assert!(Arc::ptr_eq(&result.note_name, &pinned));
        }

        let first = detected(resolve(110.0, &TuningContext::default()));
        let second = detected(resolve(112.0, &TuningContext::default()));
        assert_eq!(&*first.note_name, "A");
        assert!(Arc::ptr_eq(&first.note_name, &second.note_name));
    }

    #[test]
    fn test_exact_target_has_zero_cents() {
        let mut context = TuningContext::default();
        context.set_target(TunerTarget::new("A", 4, 440.0)).unwrap();
        let result = detected(resolve(440.0, &context));
        assert_eq!(result.cents_deviation, 0.0);
    }
}
