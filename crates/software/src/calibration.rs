//! Interactive, per-channel calibration.
//!
//! The operator searches for each threshold of a [`Variant`] in turn, nudging a live intensity up and down while
//! feeling its effect. Each search starts from the previous threshold, since thresholds only ever rise. Once every
//! threshold of a channel is confirmed, the set is checked for ordering; an out-of-order set is thrown away and the
//! channel is measured again from the first step.

mod profile;
pub use profile::*;

use crate::{
    intensity::{Channel, ChannelCommand, Intensity},
    link::{Actuator, LinkError},
};
use core::num::NonZeroU32;
use log::{info, warn};
use thiserror::Error;
use tinyvec::ArrayVec;

/// A discrete request from the operator during a calibration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationInput {
    /// One step stronger.
    Increase,
    /// One step weaker.
    Decrease,
    /// Drop to zero immediately, without ending the step.
    Panic,
    /// Accept the current intensity as this step's threshold.
    Confirm,
    /// Stop calibrating altogether.
    Abort,
}

/// Progress reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEvent {
    /// Measurement of `channel` is (re)starting; `attempt` counts from 1.
    ChannelStarted {
        /// Channel being measured.
        channel: Channel,
        /// How many times this channel has been started, including this one.
        attempt: u32,
    },
    /// A step is waiting for input.
    StepStarted {
        /// Channel being measured.
        channel: Channel,
        /// The threshold being searched for.
        step: Step,
        /// Zero-based position of the step.
        index: usize,
        /// Number of steps in the protocol.
        total: usize,
        /// Live intensity at the start of the step.
        start: Intensity,
    },
    /// The live intensity changed.
    IntensityChanged(Intensity),
    /// The panic input zeroed the device.
    Panicked,
    /// A step was confirmed at this intensity.
    StepConfirmed(Intensity),
    /// The measured thresholds were out of order and the channel will be measured again.
    Rejected {
        /// Channel being measured.
        channel: Channel,
        /// What was wrong.
        violation: OrderViolation,
    },
    /// The channel's thresholds were accepted.
    Committed {
        /// Channel that was measured.
        channel: Channel,
        /// The accepted thresholds.
        profile: CalibrationProfile,
    },
}

/// The person holding the electrodes.
pub trait Operator {
    /// Blocks until the operator's next input.
    fn next_input(&mut self) -> std::io::Result<CalibrationInput>;

    /// Reports progress. Does nothing unless overridden.
    fn notify(&mut self, _event: &CalibrationEvent) {}
}

/// Reasons calibration stops without a result.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// The device link failed.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Operator input could not be read.
    #[error("could not read operator input")]
    Input(#[source] std::io::Error),
    /// The operator aborted.
    #[error("calibration cancelled by operator")]
    Cancelled,
    /// The configured number of attempts ran out with the thresholds still out of order.
    #[error("{channel} was still out of order after {attempts} attempts")]
    RetriesExhausted {
        /// Channel being measured.
        channel: Channel,
        /// Attempts made.
        attempts: u32,
    },
}

/// Where a channel's calibration stands.
#[derive(Debug)]
enum State {
    /// Waiting for the step at this index.
    AwaitingStep(usize),
    /// Every step was measured but the values are out of order.
    Rejected(OrderViolation),
    /// Every step was measured and the values are in order.
    Committed(CalibrationProfile),
}

/// Drives the calibration protocol against a device and an operator.
pub struct CalibrationEngine<'a, A, O> {
    link: &'a mut A,
    operator: &'a mut O,
    variant: Variant,
    max_attempts: Option<NonZeroU32>,
}

impl<'a, A: Actuator, O: Operator> CalibrationEngine<'a, A, O> {
    /// Constructs a [`CalibrationEngine`] that retries out-of-order channels for as long as the operator keeps going.
    pub fn new(link: &'a mut A, operator: &'a mut O, variant: Variant) -> Self {
        Self {
            link,
            operator,
            variant,
            max_attempts: None,
        }
    }

    /// Gives up on a channel after `attempts` out-of-order measurements.
    pub fn with_max_attempts(mut self, attempts: Option<NonZeroU32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Calibrates channel 1, then channel 2.
    ///
    /// With [`Variant::Legacy`], channel 1 is held at its newly committed top value while channel 2 is measured.
    pub fn calibrate(&mut self) -> Result<ProfileSet, CalibrationError> {
        let channel_1 = self.calibrate_channel(Channel::One, Intensity::ZERO)?;
        let hold = if self.variant.holds_previous_channel() {
            channel_1.top()
        } else {
            Intensity::ZERO
        };
        let channel_2 = self.calibrate_channel(Channel::Two, hold)?;
        Ok(ProfileSet {
            channel_1,
            channel_2,
        })
    }

    /// Measures every step of one channel until the thresholds come out in order.
    ///
    /// `hold` is the intensity applied to the other channel whenever the live intensity is transmitted.
    pub fn calibrate_channel(
        &mut self,
        channel: Channel,
        hold: Intensity,
    ) -> Result<CalibrationProfile, CalibrationError> {
        let steps = self.variant.steps();
        let mut attempt = 1;
        let mut measured = ArrayVec::<[Intensity; MAX_STEPS]>::new();
        let mut state = State::AwaitingStep(0);

        info!("Calibrating {channel} ({} steps)", steps.len());
        self.operator
            .notify(&CalibrationEvent::ChannelStarted { channel, attempt });

        loop {
            state = match state {
                State::AwaitingStep(index) if index < steps.len() => {
                    let start = measured.last().copied().unwrap_or_default();
                    self.operator.notify(&CalibrationEvent::StepStarted {
                        channel,
                        step: steps[index],
                        index,
                        total: steps.len(),
                        start,
                    });
                    let value = self.measure_step(channel, start, hold)?;
                    info!("{channel}: {} = {value}", steps[index].name);
                    measured.push(value);
                    State::AwaitingStep(index + 1)
                }
                State::AwaitingStep(_) => {
                    match CalibrationProfile::from_measurements(self.variant, &measured) {
                        Ok(profile) => State::Committed(profile),
                        Err(violation) => State::Rejected(violation),
                    }
                }
                State::Rejected(violation) => {
                    warn!("{channel}: thresholds out of order ({violation}); measuring again");
                    self.operator
                        .notify(&CalibrationEvent::Rejected { channel, violation });
                    if self.max_attempts.is_some_and(|max| attempt >= max.get()) {
                        return Err(CalibrationError::RetriesExhausted {
                            channel,
                            attempts: attempt,
                        });
                    }
                    attempt += 1;
                    measured.clear();
                    self.operator
                        .notify(&CalibrationEvent::ChannelStarted { channel, attempt });
                    State::AwaitingStep(0)
                }
                State::Committed(profile) => {
                    info!("{channel} committed: {profile:?}");
                    self.operator
                        .notify(&CalibrationEvent::Committed { channel, profile });
                    return Ok(profile);
                }
            };
        }
    }

    /// Runs the adjustment loop for a single step, returning the confirmed intensity.
    ///
    /// The live intensity begins at `start` and is transmitted on `channel` at once and after every change, with the
    /// other channel at `hold`.
    pub fn measure_step(
        &mut self,
        channel: Channel,
        start: Intensity,
        hold: Intensity,
    ) -> Result<Intensity, CalibrationError> {
        let mut live = start;
        self.link.send(ChannelCommand::with(channel, live, hold))?;

        loop {
            let input = self
                .operator
                .next_input()
                .map_err(CalibrationError::Input)?;
            let adjusted = match input {
                CalibrationInput::Increase => live.increment(),
                CalibrationInput::Decrease => live.decrement(),
                CalibrationInput::Panic => {
                    live = Intensity::ZERO;
                    self.link.reset()?;
                    self.operator.notify(&CalibrationEvent::Panicked);
                    continue;
                }
                CalibrationInput::Confirm => {
                    self.operator
                        .notify(&CalibrationEvent::StepConfirmed(live));
                    return Ok(live);
                }
                CalibrationInput::Abort => return Err(CalibrationError::Cancelled),
            };
            if adjusted != live {
                live = adjusted;
                self.link.send(ChannelCommand::with(channel, live, hold))?;
                self.operator
                    .notify(&CalibrationEvent::IntensityChanged(live));
            }
        }
    }
}
