//! Rules binding a trigger source to a channel and a way of deriving its intensity.

use crate::{
    configuration::MappingMode,
    intensity::{Channel, Intensity},
    midi::MAX_VELOCITY,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wmidi::{Note, U7};

/// Musical function of a trigger source. Purely descriptive; it shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The strong beat.
    Downbeat,
    /// The weak beat between downbeats.
    Offbeat,
}

/// How the intensity of a stimulation is worked out from the onset that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// Always this intensity, whatever the velocity.
    Fixed(Intensity),
    /// Velocity scaled over the target channel's calibrated actuation range.
    Calibrated,
    /// Velocity scaled over an explicit range.
    Range {
        /// Intensity at the lowest velocity.
        min: Intensity,
        /// Intensity at the highest velocity.
        max: Intensity,
    },
}

impl Derivation {
    /// Resolves the intensity for an onset at `velocity`. `calibrated` is the target channel's actuation range and
    /// is only consulted by [`Derivation::Calibrated`].
    pub fn resolve(&self, calibrated: (Intensity, Intensity), velocity: U7) -> Intensity {
        match *self {
            Self::Fixed(intensity) => intensity,
            Self::Calibrated => scale(calibrated.0, calibrated.1, velocity),
            Self::Range { min, max } => scale(min, max, velocity),
        }
    }
}

/// Maps `velocity` linearly onto `min..=max`, rounding down: `min + (max - min) * velocity / 127`.
///
/// Integer arithmetic keeps the result exact, so full velocity lands on `max` and never beyond it.
pub fn scale(min: Intensity, max: Intensity, velocity: U7) -> Intensity {
    let min = u16::from(min.value());
    let span = u16::from(max.value()).saturating_sub(min);
    let scaled = min + span * u16::from(u8::from(velocity)) / u16::from(MAX_VELOCITY);
    u8::try_from(scaled).map_or(Intensity::MAX, Intensity::saturating)
}

/// Binds one trigger source to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// MIDI note number of the source, `0..=127`.
    #[serde(with = "note_number")]
    pub note: Note,
    /// Optional label for the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Channel to stimulate.
    pub channel: Channel,
    /// How hard to stimulate it.
    pub intensity: Derivation,
}

/// Notes are persisted as their MIDI note number.
mod note_number {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use wmidi::{Note, U7};

    pub fn serialize<S: Serializer>(note: &Note, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*note as u8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Note, D::Error> {
        let number = u8::deserialize(deserializer)?;
        U7::new(number)
            .map(Note::from)
            .map_err(|_| D::Error::custom(format!("note {number} is outside 0..=127")))
    }
}

/// Problems that make a set of rules unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Two rules claim the same source; which one applies would be ambiguous.
    #[error("note {} is mapped more than once", .0.to_str())]
    DuplicateSource(Note),
    /// An explicit range runs backwards.
    #[error("note {} has a range minimum of {min} above its maximum of {max}", .note.to_str())]
    InvertedRange {
        /// Source of the offending rule.
        note: Note,
        /// Its lower bound.
        min: Intensity,
        /// Its upper bound.
        max: Intensity,
    },
}

/// The rules of a mapping session, at most one per source. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MappingRule>", into = "Vec<MappingRule>")]
pub struct RuleSet {
    rules: Vec<MappingRule>,
}

impl RuleSet {
    /// Validates `rules` and wraps them.
    pub fn new(rules: Vec<MappingRule>) -> Result<Self, RuleError> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|earlier| earlier.note == rule.note) {
                return Err(RuleError::DuplicateSource(rule.note));
            }
            if let Derivation::Range { min, max } = rule.intensity {
                if min > max {
                    return Err(RuleError::InvertedRange {
                        note: rule.note,
                        min,
                        max,
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    /// The rules used when none are configured.
    ///
    /// Sustaining maps E4 (note 64) to channel 1 over its calibrated range. Pulsing maps a C4 (note 60) downbeat to a
    /// fixed 30 on channel 1 and a D4 (note 62) offbeat to the full range of channel 2.
    pub fn default_for(mode: MappingMode) -> Self {
        let rules = match mode {
            MappingMode::Sustain => vec![MappingRule {
                note: Note::E4,
                role: None,
                channel: Channel::One,
                intensity: Derivation::Calibrated,
            }],
            MappingMode::Pulse => vec![
                MappingRule {
                    note: Note::C4,
                    role: Some(Role::Downbeat),
                    channel: Channel::One,
                    intensity: Derivation::Fixed(Intensity::saturating(30)),
                },
                MappingRule {
                    note: Note::D4,
                    role: Some(Role::Offbeat),
                    channel: Channel::Two,
                    intensity: Derivation::Range {
                        min: Intensity::ZERO,
                        max: Intensity::MAX,
                    },
                },
            ],
        };
        Self { rules }
    }

    /// The rule for `source`, if there is one.
    pub fn find(&self, source: Note) -> Option<&MappingRule> {
        self.rules.iter().find(|rule| rule.note == source)
    }

    /// Whether any rule derives its intensity from a calibration profile.
    pub fn needs_calibration(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.intensity == Derivation::Calibrated)
    }

    /// Returns an [`Iterator`] over the rules in the order they were given.
    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter()
    }
}

impl TryFrom<Vec<MappingRule>> for RuleSet {
    type Error = RuleError;

    fn try_from(rules: Vec<MappingRule>) -> Result<Self, Self::Error> {
        Self::new(rules)
    }
}

impl From<RuleSet> for Vec<MappingRule> {
    fn from(set: RuleSet) -> Self {
        set.rules
    }
}
