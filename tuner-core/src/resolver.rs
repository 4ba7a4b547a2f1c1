//! # Note Resolver
//!
//! Maps detected frequencies onto the note table and measures how far off
//! they are, in cents.
//!
//! Nearest-note ties (a frequency exactly halfway between two notes on the
//! log scale) always resolve to the higher note.

use crate::notes::{self, NoteTableEntry, A4_FREQUENCY, A4_INDEX, TABLE_SIZE};

/// Resolution of the semitone offset before rounding to a note.
const OFFSET_STEPS: f64 = 10_000.0;

/// Finds the table entry closest to `frequency`.
///
/// Returns `None` when the nearest note falls outside the table, or when
/// `frequency` is not a positive finite number.
///
/// # Arguments
/// * `frequency` - Detected frequency in Hz
///
/// # Returns
/// * The canonical table entry; deviation should be measured against its
///   reference frequency, not the input
pub fn closest_note(frequency: f32) -> Option<&'static NoteTableEntry> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    let offset = 12.0 * (frequency as f64 / A4_FREQUENCY as f64).log2();
    // Snap to 1/10000 semitone, below f32 resolution in this range, so a
    // frequency on the geometric midpoint of two notes is an exact tie.
    let offset = (offset * OFFSET_STEPS).round() / OFFSET_STEPS;
    nearest_index(offset).and_then(notes::entry)
}

/// Table index nearest to a (fractional) semitone offset from A4.
///
/// Halfway offsets round up: `0.5` maps to A#4, `-0.5` to A4.
pub fn nearest_index(semitone_offset: f64) -> Option<usize> {
    if !semitone_offset.is_finite() {
        return None;
    }
    let index = (semitone_offset + 0.5).floor() + A4_INDEX as f64;
    if index < 0.0 || index >= TABLE_SIZE as f64 {
        return None;
    }
    Some(index as usize)
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone, 1200 cents = 1 octave
/// - Positive values are sharp, negative values are flat
/// - No clamping; limiting the range is a display concern
pub fn cents(detected: f32, target: f32) -> f32 {
    1200.0 * (detected / target).log2()
}

/// Looks up a note by pitch-class name and octave, e.g. `("Bb", 2)`.
///
/// Sharps and flats are both accepted; the returned entry always carries
/// the table's sharp spelling.
pub fn find_note(name: &str, octave: u8) -> Option<&'static NoteTableEntry> {
    let pitch_class = parse_pitch_class(name)?;
    let index = octave as i32 * 12 + pitch_class;
    if index < 0 {
        return None;
    }
    notes::entry(index as usize)
}

/// Parses a scientific pitch label such as `"E2"`, `"c#3"` or `"Bb1"`.
pub fn parse_note(label: &str) -> Option<&'static NoteTableEntry> {
    let label = label.trim();
    let split = label.find(|c: char| c.is_ascii_digit())?;
    let (name, octave) = label.split_at(split);
    find_note(name, octave.parse().ok()?)
}

/// Semitone of a pitch-class name relative to C of the same octave.
///
/// Can be -1 (`Cb`) or 12 (`B#`); the caller folds that into the octave.
fn parse_pitch_class(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let base = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let accidental = match chars.as_str() {
        "" => 0,
        "#" | "♯" => 1,
        "b" | "♭" => -1,
        _ => return None,
    };
    Some(base + accidental)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cents_sign_convention() {
        assert!(cents(466.16, 440.0) > 0.0);
        assert!(cents(415.30, 440.0) < 0.0);
        assert_eq!(cents(440.0, 440.0), 0.0);
    }

    #[test]
    fn test_cents_magnitudes() {
        assert_abs_diff_eq!(cents(880.0, 440.0), 1200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(cents(220.0, 440.0), -1200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(cents(466.1638, 440.0), 100.0, epsilon = 0.01);
    }

    #[test]
    fn test_closest_note_returns_canonical_entry() {
        let note = closest_note(442.0).unwrap();
        assert_eq!(note.label(), "A4");
        assert_eq!(note.frequency, 440.0);

        assert_eq!(closest_note(82.0).unwrap().label(), "E2");
        assert_eq!(closest_note(110.0).unwrap().label(), "A2");
        assert_eq!(closest_note(261.0).unwrap().label(), "C4");
        assert_eq!(closest_note(16.35).unwrap().label(), "C0");
        assert_eq!(closest_note(7902.0).unwrap().label(), "B8");
    }

    #[test]
    fn test_closest_note_out_of_range() {
        assert!(closest_note(10.0).is_none());
        assert!(closest_note(9000.0).is_none());
        assert!(closest_note(0.0).is_none());
        assert!(closest_note(-440.0).is_none());
        assert!(closest_note(f32::NAN).is_none());
        assert!(closest_note(f32::INFINITY).is_none());
    }

    #[test]
    fn test_halfway_rounds_up() {
        assert_eq!(nearest_index(0.5), Some(A4_INDEX + 1));
        assert_eq!(nearest_index(-0.5), Some(A4_INDEX));
        assert_eq!(nearest_index(-1.5), Some(A4_INDEX - 1));
        assert_eq!(nearest_index(0.49), Some(A4_INDEX));
    }

    #[test]
    fn test_geometric_midpoint_rounds_up() {
        let table = notes::note_table();
        let midpoint = |lower: usize| (table[lower].frequency * table[lower + 1].frequency).sqrt();

        // A4 / A#4, G#4 / A4, and far from A4 at E2 / F2 and A#7 / B7
        for lower in [A4_INDEX, A4_INDEX - 1, 28, 94] {
            let tie = midpoint(lower);
            assert_eq!(closest_note(tie).unwrap().index(), lower + 1, "tie above {lower}");

            let just_below = tie * 2f32.powf(-0.05 / 1200.0);
            assert_eq!(closest_note(just_below).unwrap().index(), lower, "below {lower}");
        }
    }

    #[test]
    fn test_nearest_index_bounds() {
        assert_eq!(nearest_index(-(A4_INDEX as f64)), Some(0));
        assert_eq!(nearest_index(-(A4_INDEX as f64) - 0.6), None);
        assert_eq!(nearest_index((TABLE_SIZE - 1 - A4_INDEX) as f64), Some(TABLE_SIZE - 1));
        assert_eq!(nearest_index((TABLE_SIZE - A4_INDEX) as f64), None);
        assert_eq!(nearest_index(f64::NAN), None);
    }

    #[test]
    fn test_parse_note() {
        assert_eq!(parse_note("E2").unwrap().index(), 28);
        assert_eq!(parse_note("a4").unwrap().index(), A4_INDEX);
        assert_eq!(parse_note(" C#3 ").unwrap().label(), "C#3");
        assert_eq!(parse_note("Bb2").unwrap().label(), "A#2");
        assert_eq!(parse_note("Cb4").unwrap().label(), "B3");
        assert_eq!(parse_note("B#3").unwrap().label(), "C4");

        assert!(parse_note("Cb0").is_none());
        assert!(parse_note("C9").is_none());
        assert!(parse_note("H2").is_none());
        assert!(parse_note("E").is_none());
        assert!(parse_note("E#b2").is_none());
        assert!(parse_note("").is_none());
    }

    #[test]
    fn test_find_note() {
        let a2 = find_note("A", 2).unwrap();
        assert_eq!(a2.label(), "A2");
        assert_abs_diff_eq!(a2.frequency, 110.0, epsilon = 1e-3);
        assert!(find_note("X", 2).is_none());
    }
}
