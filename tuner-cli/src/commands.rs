//! Keyboard commands read from stdin while listening.
//!
//! ```text
//! auto        nearest-note mode
//! E2, c#3     tune to that note (entering it again returns to auto)
//! 1..6        guitar string, 1 = high E, 6 = low E
//! clear       forget the selected note, stay in manual mode
//! strings     list the standard guitar strings
//! quit        stop listening
//! ```

use anyhow::{Result, anyhow, bail};
use tracing::warn;
use tuner_core::{Mode, NoteTableEntry, SharedContext, TunerTarget, notes, resolver};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Auto,
    Target(&'static NoteTableEntry),
    Clear,
    Strings,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let word = line.trim();
    let command = match word.to_ascii_lowercase().as_str() {
        "" => bail!("empty command"),
        "auto" | "a" => Command::Auto,
        "clear" | "c" => Command::Clear,
        "strings" | "s" => Command::Strings,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => {
            if let Ok(string) = word.parse::<usize>() {
                let note = (1..=6)
                    .contains(&string)
                    .then(|| notes::standard_guitar().nth(6 - string))
                    .flatten()
                    .ok_or_else(|| anyhow!("guitar strings are numbered 1 to 6, got {string}"))?;
                Command::Target(note)
            } else {
                let note = resolver::parse_note(word)
                    .ok_or_else(|| anyhow!("unknown command or note: {word}"))?;
                Command::Target(note)
            }
        }
    };
    Ok(command)
}

/// Applies a selection command to the shared context.
///
/// Returns a message for the user, if any.
pub fn apply(command: Command, context: &SharedContext) -> Option<String> {
    match command {
        Command::Auto => {
            context.set_mode(Mode::Auto);
            Some("auto mode".into())
        }
        Command::Target(note) => {
            let mut guard = context.write();
            let same = guard
                .target()
                .is_some_and(|t| &*t.note_name == note.name && t.octave == note.octave());
            if same {
                guard.set_mode(Mode::Auto);
                return Some("auto mode".into());
            }
            match guard.set_target(TunerTarget::from(note)) {
                Ok(()) => Some(format!("tuning to {} ({:.2} Hz)", note.label(), note.frequency)),
                Err(err) => {
                    warn!("[cli] {err}");
                    None
                }
            }
        }
        Command::Clear => {
            context.clear_target();
            Some("target cleared".into())
        }
        Command::Strings => Some(
            notes::standard_guitar()
                .enumerate()
                .map(|(i, n)| format!("{}: {} {:.2} Hz", 6 - i, n.label(), n.frequency))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Command::Help => Some(HELP.trim().to_string()),
        Command::Quit => None,
    }
}

const HELP: &str = r"
auto        nearest-note mode
E2, c#3     tune to that note (entering it again returns to auto)
1..6        guitar string, 1 = high E, 6 = low E
clear       forget the selected note
strings     list the standard guitar strings
quit        stop listening
";
