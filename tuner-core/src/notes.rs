//! # Note Table Module
//!
//! The equal-tempered note table the resolver maps frequencies onto.
//!
//! ## Layout
//! - 9 octaves × 12 pitch classes = 108 entries (C0 to B8)
//! - Index `i` is octave `i / 12`, pitch class `i % 12` (C = 0)
//! - A4 sits at index 57 and is exactly 440 Hz
//! - `freq(i) = 440 * 2^((i - 57) / 12)`
//!
//! The table is computed once on first use and never mutated.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

/// Chromatic pitch-class names, sharps only, starting at C.
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Number of octaves covered by the table.
pub const OCTAVES: usize = 9;

/// Number of entries in the table.
pub const TABLE_SIZE: usize = OCTAVES * PITCH_CLASSES.len();

/// Index of A4 in the table.
pub const A4_INDEX: usize = 4 * 12 + 9;

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// Table indices of a six-string guitar in standard tuning (E2 A2 D3 G3 B3 E4).
pub const STANDARD_GUITAR: [usize; 6] = [28, 33, 38, 43, 47, 52];

/// A single note of the equal-tempered table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteTableEntry {
    /// Pitch-class name (e.g. "E", "C#")
    pub name: &'static str,
    /// Reference frequency in Hz
    pub frequency: f32,
    index: u8,
}

impl NoteTableEntry {
    /// Position of this entry in the table.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Octave number, C-based (C4 is middle C).
    pub fn octave(&self) -> u8 {
        self.index / 12
    }

    /// Scientific pitch label, e.g. "E2".
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave())
    }
}

/// Builds the note table.
///
/// Deterministic and pure; [`note_table`] caches the result for the
/// lifetime of the process, so callers rarely need this directly.
pub fn build() -> Vec<NoteTableEntry> {
    (0..TABLE_SIZE)
        .map(|i| {
            // Work in f64 so octave ratios survive the cast back to f32.
            let semitones = i as f64 - A4_INDEX as f64;
            let frequency = (A4_FREQUENCY as f64 * 2.0_f64.powf(semitones / 12.0)) as f32;
            NoteTableEntry {
                name: PITCH_CLASSES[i % 12],
                frequency,
                index: i as u8,
            }
        })
        .collect()
}

static NOTES: Lazy<Vec<NoteTableEntry>> = Lazy::new(build);

/// Label to table index, e.g. "C#3" -> 37.
static NOTE_MAP: Lazy<BTreeMap<String, usize>> = Lazy::new(|| {
    NOTES
        .iter()
        .map(|note| (note.label(), note.index()))
        .collect()
});

/// The process-wide note table.
pub fn note_table() -> &'static [NoteTableEntry] {
    &NOTES
}

/// Entry at `index`, or `None` past the end of the table.
pub fn entry(index: usize) -> Option<&'static NoteTableEntry> {
    NOTES.get(index)
}

/// Table index for a sharp-spelled label such as "A#4".
pub fn index_of_label(label: &str) -> Option<usize> {
    NOTE_MAP.get(label).copied()
}

/// Reference strings of a standard-tuned guitar, low to high.
pub fn standard_guitar() -> impl Iterator<Item = &'static NoteTableEntry> {
    STANDARD_GUITAR.iter().map(|&i| &NOTES[i])
}
