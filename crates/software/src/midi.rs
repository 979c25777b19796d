//! Turns a raw MIDI 1.0 byte stream into [`TriggerEvent`]s.
//!
//! Bytes may arrive from anything that carries MIDI unframed (an ALSA raw MIDI device node, a FIFO, a serial
//! MIDI adapter) and in arbitrary chunks, so messages are reassembled one byte at a time. Running status is honored,
//! real-time bytes are skipped wherever they appear, and System Exclusive payloads are discarded.

use log::{debug, error, info};
use tinyvec::{ArrayVec, array_vec};
use wmidi::{MidiMessage, Note, U7};

/// Highest velocity a MIDI note can carry.
pub const MAX_VELOCITY: u8 = 127;

/// Whether a trigger starts or ends a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// A key went down (or a pulse fired) this hard.
    Onset {
        /// Always non-zero; a zero-velocity note-on is a [`TriggerKind::Release`].
        velocity: U7,
    },
    /// A key came up.
    Release,
}

/// A gesture boundary from the outside world, identified by its note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Which note (or drum pad) produced the event.
    pub source: Note,
    /// What happened.
    pub kind: TriggerKind,
}

impl TriggerEvent {
    /// An onset of `source` at `velocity`; zero velocity yields a release, as on the wire.
    pub fn onset(source: Note, velocity: U7) -> Self {
        let kind = if u8::from(velocity) == 0 {
            TriggerKind::Release
        } else {
            TriggerKind::Onset { velocity }
        };
        Self { source, kind }
    }

    /// A release of `source`.
    pub fn release(source: Note) -> Self {
        Self {
            source,
            kind: TriggerKind::Release,
        }
    }

    /// Interprets a MIDI message, returning `None` for anything other than a note event.
    pub fn from_midi(msg: &MidiMessage) -> Option<Self> {
        match *msg {
            MidiMessage::NoteOn(channel, note, velocity) => {
                info!(
                    "Received NoteOn: channel {}, note {}, velocity: {}",
                    channel.number(),
                    note.to_str(),
                    u8::from(velocity)
                );
                Some(Self::onset(note, velocity))
            }
            MidiMessage::NoteOff(channel, note, _) => {
                info!(
                    "Received NoteOff: channel {}, note {}",
                    channel.number(),
                    note.to_str()
                );
                Some(Self::release(note))
            }
            _ => {
                debug!("Ignoring non-note MIDI message: {msg:?}");
                None
            }
        }
    }

    /// Parses one complete frame as produced by [`MidiFramer`].
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        match MidiMessage::try_from(frame) {
            Ok(msg) => Self::from_midi(&msg),
            Err(e) => {
                error!("Discarding malformed MIDI frame {frame:02x?}: {e:?}");
                None
            }
        }
    }
}

/// A status byte followed by its data bytes.
pub type Frame = ArrayVec<[u8; 3]>;

/// Reassembles channel messages from a byte stream.
#[derive(Debug, Default, Clone)]
pub struct MidiFramer {
    /// Status of the message being assembled; kept after a message completes to support running status.
    status: Option<u8>,
    data: ArrayVec<[u8; 2]>,
    in_sysex: bool,
}

impl MidiFramer {
    /// Constructs a framer with no running status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data bytes that follow a channel status byte.
    fn data_len(status: u8) -> usize {
        match status & 0xF0 {
            0xC0 | 0xD0 => 1,
            _ => 2,
        }
    }

    /// Consumes one byte, returning a frame whenever a channel message completes.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match byte {
            // real-time messages may interleave anything and carry no data
            0xF8..=0xFF => None,
            0xF0 => {
                self.in_sysex = true;
                self.status = None;
                None
            }
            0xF7 => {
                self.in_sysex = false;
                None
            }
            // system common messages cancel running status; none of them are of interest
            0xF1..=0xF6 => {
                self.in_sysex = false;
                self.status = None;
                self.data.clear();
                None
            }
            0x80..=0xEF => {
                self.in_sysex = false;
                self.status = Some(byte);
                self.data.clear();
                None
            }
            _ if self.in_sysex => None,
            _ => {
                let status = self.status?;
                self.data.push(byte);
                if self.data.len() < Self::data_len(status) {
                    return None;
                }
                let mut frame = array_vec!([u8; 3] => status);
                frame.extend_from_slice(&self.data);
                self.data.clear();
                Some(frame)
            }
        }
    }

    /// Feeds `bytes` through the framer, collecting every note event they complete.
    pub fn triggers(&mut self, bytes: &[u8]) -> Vec<TriggerEvent> {
        bytes
            .iter()
            .filter_map(|&byte| self.push(byte))
            .filter_map(|frame| TriggerEvent::from_frame(&frame))
            .collect()
    }
}
