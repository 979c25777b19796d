//! Command-line arguments and their translation into library settings.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ems_pilot_lib::{
    calibration::Variant,
    configuration::{DEFAULT_PROFILE_PATH, MappingConfig, MappingMode},
    link::DEFAULT_BAUD,
};
use std::{num::NonZeroU32, path::PathBuf, time::Duration};

/// Calibrates and drives a two-channel EMS stimulator.
#[derive(Parser, Debug)]
#[command(name = "ems_pilot", version, about)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// The tools the binary bundles.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find each channel's thresholds interactively and save them.
    Calibrate(CalibrateArgs),
    /// Drive the stimulator from MIDI note events.
    Map(MapArgs),
    /// Print incoming MIDI note events without touching the stimulator.
    Monitor(MidiArgs),
    /// List serial ports.
    Ports,
}

/// Where the stimulator is attached.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial port of the stimulator's controller (e.g. /dev/ttyACM0 or COM3).
    #[arg(long)]
    pub port: String,

    /// Baud rate of the controller.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Calibration profile to write (calibrate) or read (map).
    #[arg(long, default_value = DEFAULT_PROFILE_PATH)]
    pub profile: PathBuf,
}

/// Where MIDI comes from.
#[derive(Args, Debug)]
pub struct MidiArgs {
    /// Raw MIDI byte source: an ALSA raw MIDI device such as /dev/snd/midiC1D0, a FIFO, or a serial MIDI adapter.
    #[arg(long)]
    pub midi: String,

    /// Treat --midi as a serial port running at this baud rate (31250 for a DIN MIDI adapter).
    #[arg(long)]
    pub midi_baud: Option<u32>,
}

/// Arguments of `calibrate`.
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Measurement protocol.
    #[arg(long, value_enum, default_value_t = VariantArg::Advanced)]
    pub variant: VariantArg,

    /// Give up on a channel after this many out-of-order attempts. Unlimited when omitted.
    #[arg(long)]
    pub max_attempts: Option<NonZeroU32>,
}

/// Arguments of `map`.
#[derive(Args, Debug)]
pub struct MapArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub midi: MidiArgs,

    /// How long a stimulation lasts.
    #[arg(long, value_enum, default_value_t = ModeArg::Sustain)]
    pub mode: ModeArg,

    /// Pulse length in milliseconds, for --mode pulse.
    #[arg(long, default_value_t = 50)]
    pub pulse_ms: u64,

    /// JSON rule file binding notes to channels. Built-in rules for the mode are used when omitted.
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

impl MapArgs {
    /// The session settings these arguments describe.
    pub fn mapping_config(&self) -> MappingConfig {
        MappingConfig::new(self.mode.into()).with_pulse(Duration::from_millis(self.pulse_ms))
    }
}

/// Command-line spelling of [`Variant`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VariantArg {
    /// Four thresholds per channel.
    Advanced,
    /// Minimum and maximum only; channel 1 stays on while channel 2 is calibrated.
    Legacy,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Advanced => Self::Advanced,
            VariantArg::Legacy => Self::Legacy,
        }
    }
}

/// Command-line spelling of [`MappingMode`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Hold until note-off.
    Sustain,
    /// Fixed-length pulse per note-on.
    Pulse,
}

impl From<ModeArg> for MappingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Sustain => Self::Sustain,
            ModeArg::Pulse => Self::Pulse,
        }
    }
}
