//! The operator's keyboard: raw terminal mode, key bindings and the calibration prompts.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ems_pilot_lib::calibration::{CalibrationEvent, CalibrationInput, Operator};
use log::warn;
use std::{
    io::{self, Write},
    time::Duration,
};

/// Writes one line to the terminal. Raw mode disables the translation of `\n` into a carriage return and line feed,
/// so both are written.
pub fn say(line: impl AsRef<str>) {
    let mut stdout = io::stdout().lock();
    // prompts are best effort; a closed stdout must not take the session down
    let _ = write!(stdout, "{}\r\n", line.as_ref());
    let _ = stdout.flush();
}

/// Keeps the terminal in raw mode, so single key presses arrive without waiting for Enter and Ctrl-C arrives as a
/// key instead of a signal. Restores the terminal when dropped.
pub struct RawTerminal(());

impl RawTerminal {
    /// Switches the terminal to raw mode.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Could not restore the terminal: {e}");
        }
    }
}

/// Maps a key press to a calibration input. Key releases and repeats on platforms that report them are ignored.
pub fn translate(key: &KeyEvent) -> Option<CalibrationInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Up => Some(CalibrationInput::Increase),
        KeyCode::Down => Some(CalibrationInput::Decrease),
        KeyCode::Char('0') => Some(CalibrationInput::Panic),
        KeyCode::Char(' ') => Some(CalibrationInput::Confirm),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(CalibrationInput::Abort)
        }
        KeyCode::Esc | KeyCode::Char('q') => Some(CalibrationInput::Abort),
        _ => None,
    }
}

/// Checks, waiting at most `timeout`, whether the operator asked to stop. Other keys are discarded.
pub fn abort_requested(timeout: Duration) -> io::Result<bool> {
    if !event::poll(timeout)? {
        return Ok(false);
    }
    Ok(match event::read()? {
        Event::Key(key) => translate(&key) == Some(CalibrationInput::Abort),
        _ => false,
    })
}

/// Reads calibration inputs from the terminal and prints progress.
pub struct KeyboardOperator {
    _raw: RawTerminal,
}

impl KeyboardOperator {
    /// Takes over the terminal.
    pub fn new() -> io::Result<Self> {
        let raw = RawTerminal::enable()?;
        say("Up/Down: adjust   0: panic (zero)   Space: confirm   Esc/q/Ctrl-C: abort");
        Ok(Self { _raw: raw })
    }
}

impl Operator for KeyboardOperator {
    fn next_input(&mut self) -> io::Result<CalibrationInput> {
        loop {
            if let Event::Key(key) = event::read()? {
                if let Some(input) = translate(&key) {
                    return Ok(input);
                }
            }
        }
    }

    fn notify(&mut self, event: &CalibrationEvent) {
        match event {
            CalibrationEvent::ChannelStarted { channel, attempt: 1 } => {
                say(format!("=== Calibrating {channel} ==="));
            }
            CalibrationEvent::ChannelStarted { channel, attempt } => {
                say(format!("=== Calibrating {channel} again (attempt {attempt}) ==="));
            }
            CalibrationEvent::StepStarted {
                step,
                index,
                total,
                start,
                ..
            } => {
                say(format!("Step {}/{total}: find the {}", index + 1, step.prompt));
                say(format!("Intensity: {start}"));
            }
            CalibrationEvent::IntensityChanged(intensity) => say(format!("Intensity: {intensity}")),
            CalibrationEvent::Panicked => say("PANIC: output zeroed"),
            CalibrationEvent::StepConfirmed(intensity) => say(format!("Recorded {intensity}")),
            CalibrationEvent::Rejected { violation, .. } => {
                say(format!("Values out of order: {violation}. Starting this channel over."));
            }
            CalibrationEvent::Committed { channel, profile } => {
                let values: Vec<String> = profile.values().iter().map(ToString::to_string).collect();
                say(format!("{channel} calibrated: {}", values.join(" <= ")));
            }
        }
    }
}
