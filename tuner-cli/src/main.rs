//! # Tuner - terminal string tuner
//!
//! Listens on the default microphone and prints the detected note, its
//! frequency and the deviation in cents, one line per analysis frame.
//!
//! ## Architecture
//! - **Audio callback**: CPAL thread, cuts input into fixed-size frames
//! - **Analysis thread**: runs the detection session on each frame
//! - **Input thread**: reads selection commands from stdin
//! - **Main thread**: owns the stream, applies commands, handles shutdown
//! - **Communication**: crossbeam channels; the note selection is shared
//!   through a lock-guarded context

mod audio;
mod commands;
mod config;
mod render;
mod telemetry;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};
use tuner_core::{DetectionSession, Estimator, SharedContext, TunerTarget, notes, resolver};

use audio::CaptureEvent;
use commands::Command;
use config::AppConfig;
use render::Display;

/// Real-time string tuner
#[derive(Parser)]
#[command(name = "tuner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen on the default input device (the default command)
    Listen {
        /// Start in manual mode, tuning to this note (e.g. E2, C#3)
        #[arg(short, long)]
        target: Option<String>,

        /// Print one JSON object per reading instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the note table
    Notes {
        /// Only the standard guitar strings
        #[arg(long)]
        guitar: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Listen { target: None, json: false }) {
        Commands::Listen { target, json } => run_listen(config, target, json),
        Commands::Notes { guitar, json } => print_notes(guitar, json),
    }
}

fn print_notes(guitar: bool, json: bool) -> Result<()> {
    let entries: Vec<_> = if guitar {
        notes::standard_guitar().collect()
    } else {
        notes::note_table().iter().collect()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for note in entries {
            println!("{:>3}  {:<4} {:9.3} Hz", note.index(), note.label(), note.frequency);
        }
    }
    Ok(())
}

/// Runs a listening session until `quit`, end of input, or capture failure.
fn run_listen(config: AppConfig, target: Option<String>, json: bool) -> Result<()> {
    let context = SharedContext::default();
    if let Some(label) = target {
        let note = resolver::parse_note(&label).ok_or_else(|| anyhow!("unknown note: {label}"))?;
        context.set_target(TunerTarget::from(note))?;
    }

    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<CaptureEvent>(8);
    let (stream, sample_rate) =
        audio::start_audio_capture(frame_tx, config.sample_rate, config.buffer_size)
            .context("starting audio capture")?;

    // The device may not honour the requested rate; recheck the frame length.
    config.validate(sample_rate)?;
    let estimator = Estimator::with_sample_rate(config.estimator, sample_rate as f32)?;
    let display = Display::new(config.smoothing, json);

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let worker = spawn_analysis_worker(
        DetectionSession::with_estimator(estimator),
        sample_rate as f32,
        context.clone(),
        display,
        frame_rx,
        shutdown_rx,
        done_tx,
    );
    let command_rx = spawn_input_reader();

    eprintln!("Listening. Type a note (E2), a string number (1-6), 'auto', 'help' or 'quit'.");

    'control: loop {
        crossbeam_channel::select! {
            recv(command_rx) -> msg => match msg {
                Ok(Command::Quit) | Err(_) => {
                    info!("[cli] quit requested");
                    break 'control;
                }
                Ok(command) => {
                    if let Some(message) = commands::apply(command, &context) {
                        eprintln!("{message}");
                    }
                }
            },
            recv(done_rx) -> _ => {
                info!("[cli] analysis worker stopped");
                break 'control;
            },
        }
    }

    let _ = shutdown_tx.send(());
    let result = worker
        .join()
        .map_err(|_| anyhow!("analysis thread panicked"))?;

    if let Err(e) = stream.pause() {
        warn!("[audio] error pausing stream: {e}");
    }
    drop(stream);
    result
}

/// Spawns the analysis thread. It owns the session and is the only reader
/// of frames; it signals `done` when it exits for any reason.
fn spawn_analysis_worker(
    mut session: DetectionSession,
    sample_rate: f32,
    context: SharedContext,
    mut display: Display,
    frames: Receiver<CaptureEvent>,
    shutdown: Receiver<()>,
    done: Sender<()>,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        session.start();
        let result = 'analysis: loop {
            crossbeam_channel::select! {
                recv(frames) -> msg => match msg {
                    Ok(CaptureEvent::Frame(frame)) => {
                        // Hold the selection steady for the whole tick.
                        let outcome = session.process(&frame, sample_rate, &context.read());
                        match outcome {
                            Ok(Some(outcome)) => {
                                if let Some(line) = display.update(&outcome) {
                                    println!("{line}");
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                error!("[cli] analysis failed: {e}");
                                session.stop();
                                break 'analysis Err(e.into());
                            }
                        }
                    }
                    Ok(CaptureEvent::Lost(reason)) => {
                        session.capture_lost(&reason);
                        break 'analysis Err(anyhow!("audio capture lost: {reason}"));
                    }
                    Err(_) => {
                        session.capture_lost("frame channel closed");
                        break 'analysis Ok(());
                    }
                },
                recv(shutdown) -> _ => {
                    session.stop();
                    break 'analysis Ok(());
                },
            }
        };
        let _ = done.send(());
        result
    })
}

/// Reads commands from stdin on a background thread.
///
/// The channel closes at end of input, which the caller treats as quit.
fn spawn_input_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match commands::parse_command(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    });
    rx
}
