//! The serial link to the stimulator and the guard that keeps it safe.
//!
//! Every command is a single text line naming both channels (see [`encode`]). [`ArmedLink`] owns a connected
//! [`DeviceLink`] and zeroes both channels on its way out, however the session ends.

use crate::intensity::ChannelCommand;
use log::{debug, info, warn};
use serialport::SerialPort;
use std::{io::Write, time::Duration};
use thiserror::Error;

/// Baud rate the stimulator's controller listens at.
pub const DEFAULT_BAUD: u32 = 9600;

/// How long the controller needs after the port opens (and the line is asserted) before it accepts commands.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Per-write timeout handed to the serial driver.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Failures talking to the stimulator. None of these are retried: driving the device through a faulty link is
/// unsafe, so they unwind to the [`ArmedLink`] and end the session.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The port could not be opened.
    #[error("could not open device port {port}")]
    Connection {
        /// The port that was requested.
        port: String,
        /// What the serial driver reported.
        #[source]
        source: serialport::Error,
    },
    /// A write failed part way through a session.
    #[error("write to device failed")]
    Io(#[from] std::io::Error),
    /// A command was sent after the link was released.
    #[error("device link has already been released")]
    Closed,
}

/// Anything that accepts [`ChannelCommand`]s on behalf of the stimulator.
pub trait Actuator {
    /// Transmits `command`, setting both channels at once.
    fn send(&mut self, command: ChannelCommand) -> Result<(), LinkError>;

    /// Zeroes both channels.
    fn reset(&mut self) -> Result<(), LinkError> {
        self.send(ChannelCommand::OFF)
    }
}

/// Encodes `command` as the line the controller expects, e.g. `1:30,2:0\n`.
pub fn encode(command: ChannelCommand) -> String {
    format!("{command}\n")
}

/// A byte stream to the stimulator's controller.
pub struct DeviceLink<W: Write> {
    name: String,
    writer: W,
}

impl DeviceLink<Box<dyn SerialPort>> {
    /// Opens the serial port at `port`.
    ///
    /// Opening the port resets the controller; callers must wait [`SETTLE_DELAY`] before the first command.
    pub fn connect(port: &str, baud: u32) -> Result<Self, LinkError> {
        info!("Opening device port {port} at {baud} bps");
        let serial = serialport::new(port, baud)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|source| LinkError::Connection {
                port: port.to_owned(),
                source,
            })?;
        Ok(Self::new(port, serial))
    }
}

impl<W: Write> DeviceLink<W> {
    /// Wraps an already-open byte stream.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    /// Name of the underlying port, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the underlying stream. A failure to flush at this point is logged and otherwise ignored: the
    /// link is going away regardless, and whatever brought the session down is the error worth reporting.
    pub fn close(mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Ignoring error while closing {}: {e}", self.name);
        }
        info!("Closed device port {}", self.name);
    }
}

impl<W: Write> Actuator for DeviceLink<W> {
    fn send(&mut self, command: ChannelCommand) -> Result<(), LinkError> {
        let line = encode(command);
        // one write per line so a command is never split around another
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        debug!("Sent {command} to {}", self.name);
        Ok(())
    }
}

/// Owns a connected [`DeviceLink`] for the length of a session.
///
/// Whether the session returns normally, bails out with `?`, or unwinds from a panic, the guard transmits exactly
/// one final all-zero command and then closes the link. Call [`ArmedLink::release`] to do this explicitly and
/// observe whether the final reset succeeded.
pub struct ArmedLink<W: Write> {
    link: Option<DeviceLink<W>>,
}

impl<W: Write> ArmedLink<W> {
    /// Takes ownership of `link`.
    pub fn new(link: DeviceLink<W>) -> Self {
        Self { link: Some(link) }
    }

    /// Zeroes both channels and closes the link, returning the outcome of the reset.
    pub fn release(mut self) -> Result<(), LinkError> {
        match self.link.take() {
            Some(link) => Self::disarm(link),
            None => Ok(()),
        }
    }

    fn disarm(mut link: DeviceLink<W>) -> Result<(), LinkError> {
        info!("Zeroing both channels before closing {}", link.name());
        let reset = link.reset();
        link.close();
        reset
    }
}

impl<W: Write> Actuator for ArmedLink<W> {
    fn send(&mut self, command: ChannelCommand) -> Result<(), LinkError> {
        match self.link.as_mut() {
            Some(link) => link.send(command),
            None => Err(LinkError::Closed),
        }
    }
}

impl<W: Write> Drop for ArmedLink<W> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = Self::disarm(link) {
                warn!("Final reset failed; the device may be unreachable: {e}");
            }
        }
    }
}
