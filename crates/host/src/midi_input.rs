//! MIDI capture. A reader thread owns the byte stream, frames it and forwards note events over a channel, so the
//! control thread can wait on MIDI with a timeout and still notice the abort key.

use crate::keyboard;
use anyhow::{Context, Result};
use ems_pilot_lib::{
    mapping::{SourceEvent, TriggerSource},
    midi::{MidiFramer, TriggerEvent},
};
use log::{error, info};
use std::{
    fs::File,
    io::{self, Read},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

/// How long a read from a serial MIDI adapter may block before the reader checks whether anyone is still listening.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens the MIDI input at `path`: a serial MIDI adapter when `baud` is given, otherwise anything readable that
/// carries raw MIDI bytes, such as an ALSA raw MIDI device (`/dev/snd/midiC1D0`) or a FIFO.
pub fn open(path: &str, baud: Option<u32>) -> Result<Box<dyn Read + Send>> {
    match baud {
        Some(baud) => {
            info!("Opening serial MIDI input {path} at {baud} bps");
            let port = serialport::new(path, baud)
                .timeout(SERIAL_READ_TIMEOUT)
                .open()
                .with_context(|| format!("Failed to open serial MIDI input {path}"))?;
            Ok(Box::new(port))
        }
        None => {
            info!("Opening MIDI input {path}");
            let file =
                File::open(path).with_context(|| format!("Failed to open MIDI input {path}"))?;
            Ok(Box::new(file))
        }
    }
}

/// Reads `input` until it ends, fails, or nobody is listening any more.
fn capture(mut input: Box<dyn Read + Send>, events: Sender<io::Result<TriggerEvent>>) {
    let mut framer = MidiFramer::new();
    let mut buffer = [0u8; 64];
    loop {
        match input.read(&mut buffer) {
            Ok(0) => {
                info!("MIDI input closed");
                return;
            }
            Ok(n) => {
                for event in framer.triggers(&buffer[..n]) {
                    if events.send(Ok(event)).is_err() {
                        return;
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                continue;
            }
            Err(e) => {
                error!("MIDI input failed: {e}");
                let _ = events.send(Err(e));
                return;
            }
        }
    }
}

/// Note events captured from a MIDI byte stream, plus the operator's abort key.
pub struct MidiTriggers {
    events: Receiver<io::Result<TriggerEvent>>,
}

impl MidiTriggers {
    /// Starts capturing from `input` on a dedicated thread.
    ///
    /// The thread is detached: a blocked read cannot be interrupted, and the thread exits on its own once the
    /// receiving side is gone and the next read returns.
    pub fn spawn(input: Box<dyn Read + Send>) -> Result<Self> {
        let (sender, events) = mpsc::channel();
        thread::Builder::new()
            .name("midi-capture".into())
            .spawn(move || capture(input, sender))
            .context("Failed to start the MIDI capture thread")?;
        Ok(Self { events })
    }
}

impl TriggerSource for MidiTriggers {
    fn next_event(&mut self, timeout: Duration) -> io::Result<SourceEvent> {
        if keyboard::abort_requested(Duration::ZERO)? {
            info!("Stopped by operator");
            return Ok(SourceEvent::Stop);
        }
        match self.events.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(SourceEvent::Trigger(event)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(SourceEvent::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourceEvent::Stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::{Note, U7};

    fn collect(bytes: &'static [u8]) -> Vec<io::Result<TriggerEvent>> {
        let (sender, events) = mpsc::channel();
        capture(Box::new(bytes), sender);
        events.into_iter().collect()
    }

    #[test]
    fn capture_forwards_note_events_until_end_of_input() {
        let events: Vec<TriggerEvent> = collect(&[0x90, 64, 100, 0xF8, 64, 0])
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            vec![
                TriggerEvent::onset(Note::E4, U7::from_u8_lossy(100)),
                TriggerEvent::release(Note::E4),
            ],
            events,
            "Expected left but got right"
        );
    }

    #[test]
    fn capture_reports_read_failure() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            }
        }

        let (sender, events) = mpsc::channel();
        capture(Box::new(Broken), sender);
        let received: Vec<_> = events.into_iter().collect();
        assert_eq!(1, received.len());
        assert!(received[0].is_err());
    }
}
