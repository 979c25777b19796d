//! Real-time translation of trigger events into stimulation.
//!
//! A [`MappingEngine`] looks each [`TriggerEvent`] up in its [`RuleSet`] and, for mapped sources, drives the target
//! channel at the derived intensity. How long the stimulation lasts depends on the [`MappingMode`]: a sustained
//! stimulation lasts until its source is released, a pulse lasts for a fixed time.

mod held_sources;
pub use held_sources::*;

mod rule;
pub use rule::*;

use crate::{
    calibration::ProfileSet,
    configuration::{MappingConfig, MappingMode},
    intensity::{ChannelCommand, Intensity},
    link::{Actuator, LinkError},
    midi::{TriggerEvent, TriggerKind},
};
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use log::{debug, info};
use thiserror::Error;
use wmidi::U7;

/// What a [`TriggerSource`] produced while it was being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// A trigger arrived.
    Trigger(TriggerEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The session is over: the operator aborted, or the input ended.
    Stop,
}

/// Anything that produces trigger events.
pub trait TriggerSource {
    /// Waits at most `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> std::io::Result<SourceEvent>;
}

/// Reasons a mapping session stops early.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The device link failed.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Triggers could not be read.
    #[error("could not read trigger source")]
    Source(#[source] std::io::Error),
}

/// What became of a single trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// A stimulation started (and, for a pulse, ended).
    Actuated(ChannelCommand),
    /// A sustained stimulation ended.
    Released,
    /// Nothing was transmitted.
    Ignored,
}

/// Counters describing a finished session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Events that caused a transmission.
    pub handled: u32,
    /// Events that did not.
    pub ignored: u32,
}

/// Turns trigger events into device commands according to a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct MappingEngine {
    config: MappingConfig,
    rules: RuleSet,
    profiles: ProfileSet,
    held: HeldSources,
}

impl MappingEngine {
    /// Constructs a [`MappingEngine`]. `profiles` supplies the ranges of [`Derivation::Calibrated`] rules.
    pub fn new(config: MappingConfig, rules: RuleSet, profiles: ProfileSet) -> Self {
        Self {
            config,
            rules,
            profiles,
            held: HeldSources::new(),
        }
    }

    /// Reacts to one event, transmitting through `link` and, in [`MappingMode::Pulse`], holding with `delay`.
    pub fn handle<A: Actuator, D: DelayNs>(
        &mut self,
        event: TriggerEvent,
        link: &mut A,
        delay: &mut D,
    ) -> Result<Response, LinkError> {
        let Some(rule) = self.rules.find(event.source).copied() else {
            debug!("Ignoring unmapped source {}", event.source.to_str());
            return Ok(Response::Ignored);
        };

        match (self.config.mode, event.kind) {
            (MappingMode::Sustain, TriggerKind::Onset { velocity }) => {
                if self.held.remove(event.source).is_some() {
                    // the previous hold never saw its release; end it before starting over
                    info!("Retriggering {} before its release", event.source.to_str());
                    link.send(self.held.output())?;
                }
                let intensity = self.intensity_for(&rule, velocity);
                if let Some(displaced) = self.held.add(event.source, rule.channel, intensity) {
                    info!(
                        "{} takes {} over from {}",
                        event.source.to_str(),
                        rule.channel,
                        displaced.to_str()
                    );
                }
                let command = self.held.output();
                link.send(command)?;
                info!("Holding {command} for {}", event.source.to_str());
                Ok(Response::Actuated(command))
            }
            (MappingMode::Sustain, TriggerKind::Release) => match self.held.remove(event.source) {
                Some(channel) => {
                    link.send(self.held.output())?;
                    info!("Released {} on {channel}", event.source.to_str());
                    Ok(Response::Released)
                }
                None => {
                    debug!("Ignoring release of {}, which is not held", event.source.to_str());
                    Ok(Response::Ignored)
                }
            },
            (MappingMode::Pulse, TriggerKind::Onset { velocity }) => {
                let command = ChannelCommand::single(rule.channel, self.intensity_for(&rule, velocity));
                link.send(command)?;
                delay.delay_us(u32::try_from(self.config.pulse.as_micros()).unwrap_or(u32::MAX));
                link.reset()?;
                match rule.role {
                    Some(role) => info!("Pulsed {command} for {role:?} {}", event.source.to_str()),
                    None => info!("Pulsed {command} for {}", event.source.to_str()),
                }
                Ok(Response::Actuated(command))
            }
            (MappingMode::Pulse, TriggerKind::Release) => Ok(Response::Ignored),
        }
    }

    /// Handles events from `source` until it reports [`SourceEvent::Stop`] or something fails.
    ///
    /// The engine never resets the device on the way out; that is the job of the [`ArmedLink`](crate::ArmedLink)
    /// that `link` normally is.
    pub fn run<S, A, D>(
        &mut self,
        source: &mut S,
        link: &mut A,
        delay: &mut D,
    ) -> Result<SessionStats, MappingError>
    where
        S: TriggerSource,
        A: Actuator,
        D: DelayNs,
    {
        info!("Mapping triggers in {} mode", self.config.mode);
        let mut stats = SessionStats::default();
        loop {
            match source
                .next_event(self.config.poll)
                .map_err(MappingError::Source)?
            {
                SourceEvent::Trigger(event) => match self.handle(event, link, delay)? {
                    Response::Ignored => stats.ignored += 1,
                    Response::Actuated(_) | Response::Released => stats.handled += 1,
                },
                SourceEvent::Idle => {}
                SourceEvent::Stop => break,
            }
        }
        info!(
            "Mapping stopped after {} handled and {} ignored events",
            stats.handled, stats.ignored
        );
        if !self.held.is_empty() {
            info!("Holds still running at stop: {}", self.held.output());
        }
        self.held.clear();
        Ok(stats)
    }

    fn intensity_for(&self, rule: &MappingRule, velocity: U7) -> Intensity {
        let calibrated = self.profiles.get(rule.channel).actuation_range();
        rule.intensity.resolve(calibrated, velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::{CalibrationProfile, Variant},
        intensity::Channel,
        testing::{Entry, Transcript, command, intensity},
    };
    use std::{collections::VecDeque, io};
    use wmidi::Note;

    fn profiles() -> ProfileSet {
        let channel_1 = CalibrationProfile::from_measurements(
            Variant::Advanced,
            &[intensity(2), intensity(5), intensity(10), intensity(90)],
        )
        .unwrap();
        let channel_2 =
            CalibrationProfile::from_measurements(Variant::Legacy, &[intensity(20), intensity(40)])
                .unwrap();
        ProfileSet {
            channel_1,
            channel_2,
        }
    }

    fn engine(mode: MappingMode) -> MappingEngine {
        MappingEngine::new(
            MappingConfig::new(mode),
            RuleSet::default_for(mode),
            profiles(),
        )
    }

    fn fixed_engine(mode: MappingMode, rules: &[(Note, Channel, u8)]) -> MappingEngine {
        let rules = rules
            .iter()
            .map(|&(note, channel, value)| MappingRule {
                note,
                role: None,
                channel,
                intensity: Derivation::Fixed(intensity(value)),
            })
            .collect();
        MappingEngine::new(MappingConfig::new(mode), RuleSet::new(rules).unwrap(), profiles())
    }

    fn onset(note: Note, velocity: u8) -> TriggerEvent {
        TriggerEvent::onset(note, U7::from_u8_lossy(velocity))
    }

    /// Replays a fixed list of events, then stops.
    struct Replay {
        events: VecDeque<io::Result<SourceEvent>>,
        timeouts: Vec<Duration>,
    }

    impl Replay {
        fn new(events: impl IntoIterator<Item = SourceEvent>) -> Self {
            Self {
                events: events.into_iter().map(Ok).collect(),
                timeouts: Vec::new(),
            }
        }
    }

    impl TriggerSource for Replay {
        fn next_event(&mut self, timeout: Duration) -> io::Result<SourceEvent> {
            self.timeouts.push(timeout);
            self.events.pop_front().unwrap_or(Ok(SourceEvent::Stop))
        }
    }

    mod sustain {
        use super::*;

        #[test]
        fn onset_scales_over_calibrated_range() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let response = engine
                .handle(onset(Note::E4, 64), &mut link, &mut delay)
                .unwrap();
            assert_eq!(Response::Actuated(command(50, 0)), response, "Expected left but got right");
            assert_eq!(vec![command(50, 0)], link.sent(), "Expected left but got right");
            assert!(engine.held.contains(Note::E4));
        }

        #[test]
        fn release_ends_hold() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::E4, 127), &mut link, &mut delay).unwrap();
            engine
                .handle(TriggerEvent::release(Note::E4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(
                vec![command(90, 0), ChannelCommand::OFF],
                link.sent(),
                "Expected left but got right"
            );
            assert!(engine.held.is_empty());
        }

        #[test]
        fn zero_velocity_releases() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::E4, 30), &mut link, &mut delay).unwrap();
            let response = engine.handle(onset(Note::E4, 0), &mut link, &mut delay).unwrap();
            assert_eq!(Response::Released, response);
            assert_eq!(Some(&ChannelCommand::OFF), link.sent().last());
        }

        #[test]
        fn release_without_hold_sends_nothing() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let response = engine
                .handle(TriggerEvent::release(Note::E4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(Response::Ignored, response);
            assert!(link.sent().is_empty());
        }

        #[test]
        fn retrigger_releases_previous_hold_first() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::E4, 127), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::E4, 0), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::E4, 127), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::E4, 127), &mut link, &mut delay).unwrap();
            engine
                .handle(TriggerEvent::release(Note::E4), &mut link, &mut delay)
                .unwrap();
            engine
                .handle(TriggerEvent::release(Note::E4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(
                vec![
                    command(90, 0),
                    ChannelCommand::OFF,
                    command(90, 0),
                    ChannelCommand::OFF,
                    command(90, 0),
                    ChannelCommand::OFF,
                ],
                link.sent(),
                "Expected left but got right"
            );
        }

        #[test]
        fn never_waits() {
            let mut engine = engine(MappingMode::Sustain);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::E4, 64), &mut link, &mut delay).unwrap();
            assert!(
                link.entries()
                    .iter()
                    .all(|entry| matches!(entry, Entry::Sent(_)))
            );
        }

        #[test]
        fn holds_on_different_channels_are_independent() {
            let mut engine = fixed_engine(
                MappingMode::Sustain,
                &[(Note::C4, Channel::One, 40), (Note::D4, Channel::Two, 20)],
            );
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::C4, 100), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::D4, 100), &mut link, &mut delay).unwrap();
            engine
                .handle(TriggerEvent::release(Note::D4), &mut link, &mut delay)
                .unwrap();
            assert!(engine.held.contains(Note::C4), "Expected C4 to still be held");
            engine
                .handle(TriggerEvent::release(Note::C4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(
                vec![command(40, 0), command(40, 20), command(40, 0), ChannelCommand::OFF],
                link.sent(),
                "Expected left but got right"
            );
            assert!(engine.held.is_empty());
        }

        #[test]
        fn later_source_takes_the_channel_over() {
            let mut engine = fixed_engine(
                MappingMode::Sustain,
                &[(Note::C4, Channel::One, 40), (Note::D4, Channel::One, 20)],
            );
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::C4, 100), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::D4, 100), &mut link, &mut delay).unwrap();
            let response = engine
                .handle(TriggerEvent::release(Note::C4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(Response::Ignored, response, "Expected the displaced source to hold nothing");
            engine
                .handle(TriggerEvent::release(Note::D4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(
                vec![command(40, 0), command(20, 0), ChannelCommand::OFF],
                link.sent(),
                "Expected left but got right"
            );
        }

        #[test]
        fn retrigger_keeps_the_other_channel() {
            let mut engine = fixed_engine(
                MappingMode::Sustain,
                &[(Note::C4, Channel::One, 40), (Note::D4, Channel::Two, 20)],
            );
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::D4, 100), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::C4, 100), &mut link, &mut delay).unwrap();
            engine.handle(onset(Note::C4, 100), &mut link, &mut delay).unwrap();
            assert_eq!(
                vec![command(0, 20), command(40, 20), command(0, 20), command(40, 20)],
                link.sent(),
                "Expected left but got right"
            );
        }
    }

    mod pulse {
        use super::*;

        #[test]
        fn fixed_pulse_then_zero() {
            let mut engine = engine(MappingMode::Pulse);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::C4, 12), &mut link, &mut delay).unwrap();
            assert_eq!(
                vec![
                    Entry::Sent(command(30, 0)),
                    Entry::Waited(Duration::from_millis(50)),
                    Entry::Sent(ChannelCommand::OFF),
                ],
                link.entries(),
                "Expected left but got right"
            );
        }

        #[test]
        fn velocity_scaled_pulse_on_channel_two() {
            let mut engine = engine(MappingMode::Pulse);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let response = engine.handle(onset(Note::D4, 127), &mut link, &mut delay).unwrap();
            assert_eq!(Response::Actuated(command(0, 99)), response, "Expected left but got right");
            assert_eq!(vec![command(0, 99), ChannelCommand::OFF], link.sent());
        }

        #[test]
        fn configured_duration() {
            let mut engine = MappingEngine::new(
                MappingConfig::new(MappingMode::Pulse).with_pulse(Duration::from_millis(120)),
                RuleSet::default_for(MappingMode::Pulse),
                profiles(),
            );
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::C4, 90), &mut link, &mut delay).unwrap();
            assert_eq!(Entry::Waited(Duration::from_millis(120)), link.entries()[1]);
        }

        #[test]
        fn zero_velocity_onset_fires_nothing() {
            let mut engine = engine(MappingMode::Pulse);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let response = engine.handle(onset(Note::D4, 0), &mut link, &mut delay).unwrap();
            assert_eq!(Response::Ignored, response, "Expected left but got right");
            assert!(link.entries().is_empty());
        }

        #[test]
        fn release_is_ignored() {
            let mut engine = engine(MappingMode::Pulse);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let response = engine
                .handle(TriggerEvent::release(Note::C4), &mut link, &mut delay)
                .unwrap();
            assert_eq!(Response::Ignored, response);
            assert!(link.entries().is_empty());
        }

        #[test]
        fn calibrated_rule_uses_channel_profile() {
            let rules = RuleSet::new(vec![MappingRule {
                note: Note::A4,
                role: None,
                channel: Channel::Two,
                intensity: Derivation::Calibrated,
            }])
            .unwrap();
            let mut engine =
                MappingEngine::new(MappingConfig::new(MappingMode::Pulse), rules, profiles());
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::A4, 127), &mut link, &mut delay).unwrap();
            assert_eq!(command(0, 40), link.sent()[0], "Expected left but got right");
        }
    }

    #[test]
    fn unmapped_sources_are_ignored_in_both_modes() {
        for mode in [MappingMode::Sustain, MappingMode::Pulse] {
            let mut engine = engine(mode);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.handle(onset(Note::B2, 100), &mut link, &mut delay).unwrap();
            engine
                .handle(TriggerEvent::release(Note::B2), &mut link, &mut delay)
                .unwrap();
            assert!(link.entries().is_empty(), "Expected no traffic in {mode} mode");
        }
    }

    mod run {
        use super::*;

        #[test]
        fn handles_until_stop() {
            let mut engine = engine(MappingMode::Sustain);
            let mut source = Replay::new([
                SourceEvent::Idle,
                SourceEvent::Trigger(onset(Note::E4, 64)),
                SourceEvent::Trigger(onset(Note::C4, 64)),
                SourceEvent::Idle,
                SourceEvent::Trigger(TriggerEvent::release(Note::E4)),
                SourceEvent::Stop,
                SourceEvent::Trigger(onset(Note::E4, 64)),
            ]);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            let stats = engine.run(&mut source, &mut link, &mut delay).unwrap();
            assert_eq!(
                SessionStats {
                    handled: 2,
                    ignored: 1
                },
                stats,
                "Expected left but got right"
            );
            assert_eq!(vec![command(50, 0), ChannelCommand::OFF], link.sent());
            assert_eq!(1, source.events.len(), "Expected events after stop to stay unread");
        }

        #[test]
        fn waits_at_most_the_poll_interval() {
            let mut engine = engine(MappingMode::Pulse);
            let mut source = Replay::new([SourceEvent::Idle, SourceEvent::Idle]);
            let mut link = Transcript::default();
            let mut delay = link.clone();
            engine.run(&mut source, &mut link, &mut delay).unwrap();
            assert!(
                source
                    .timeouts
                    .iter()
                    .all(|&timeout| timeout == Duration::from_millis(10))
            );
        }

        #[test]
        fn source_failure_stops_session() {
            let mut engine = engine(MappingMode::Pulse);
            let mut source = Replay::new([]);
            source
                .events
                .push_back(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "gone")));
            let mut link = Transcript::default();
            let mut delay = link.clone();
            assert!(matches!(
                engine.run(&mut source, &mut link, &mut delay),
                Err(MappingError::Source(_))
            ));
        }

        #[test]
        fn link_failure_stops_session() {
            let mut engine = engine(MappingMode::Pulse);
            let mut source = Replay::new([
                SourceEvent::Trigger(onset(Note::C4, 64)),
                SourceEvent::Trigger(onset(Note::C4, 64)),
            ]);
            let mut link = Transcript::failing_after(2);
            let mut delay = link.clone();
            assert!(matches!(
                engine.run(&mut source, &mut link, &mut delay),
                Err(MappingError::Link(LinkError::Io(_)))
            ));
            assert_eq!(vec![command(30, 0), ChannelCommand::OFF], link.sent());
        }
    }
}
