//! This crate contains the host-agnostic logic of EMS Pilot, which drives a two-channel
//! [electrical muscle stimulation](https://en.wikipedia.org/wiki/Electrical_muscle_stimulation) device over a serial
//! link. It calibrates safe intensity bounds for each channel with a person in the loop, then translates
//! [MIDI](https://midi.org/midi-1-0) note events into stimulation within those bounds.
//!
//! Everything that touches the outside world does so through a trait: the device is a [`std::io::Write`] wrapped in
//! a [`DeviceLink`], the operator is an [`Operator`](calibration::Operator), triggers come from a
//! [`TriggerSource`](mapping::TriggerSource) and pulse timing is an [`embedded_hal::delay::DelayNs`].

#![deny(missing_docs)]

/// Per-channel threshold measurement.
pub mod calibration;

pub mod configuration;
pub mod intensity;
pub mod link;
pub mod mapping;
pub mod midi;
pub mod store;

#[cfg(test)]
mod testing;

pub use intensity::{Channel, ChannelCommand, Intensity};
pub use link::{Actuator, ArmedLink, DeviceLink, LinkError};
