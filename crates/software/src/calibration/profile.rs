//! The thresholds a calibration session produces, and the ordering they must obey before they may be kept.

use crate::intensity::{Channel, Intensity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tinyvec::{ArrayVec, array_vec};

/// One threshold the operator is asked to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Field name of the threshold, as persisted.
    pub name: &'static str,
    /// What the operator is looking for.
    pub prompt: &'static str,
}

const ADVANCED_STEPS: [Step; 4] = [
    Step {
        name: "min_perception",
        prompt: "minimum perception: the point where stimulation is barely felt",
    },
    Step {
        name: "comfortable_haptic",
        prompt: "comfortable haptic: the strongest vibration that causes no movement",
    },
    Step {
        name: "min_actuation",
        prompt: "minimum actuation: the point where the muscle first twitches",
    },
    Step {
        name: "max_actuation",
        prompt: "maximum actuation: the strongest contraction that is still comfortable",
    },
];

const LEGACY_STEPS: [Step; 2] = [
    Step {
        name: "min_intensity",
        prompt: "minimum intensity: the weakest stimulation that should ever be applied",
    },
    Step {
        name: "max_intensity",
        prompt: "maximum intensity: the strongest stimulation that should ever be applied",
    },
];

/// Most steps any protocol asks for.
pub const MAX_STEPS: usize = ADVANCED_STEPS.len();

/// Which measurement protocol to run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Four thresholds, from first perception to the strongest comfortable contraction.
    #[default]
    Advanced,
    /// Two thresholds bounding the usable range.
    Legacy,
}

impl Variant {
    /// The steps of this protocol, in the order they are measured. Each threshold must be no lower than the one
    /// before it.
    pub fn steps(self) -> &'static [Step] {
        match self {
            Self::Advanced => &ADVANCED_STEPS,
            Self::Legacy => &LEGACY_STEPS,
        }
    }

    /// Whether channel 2 is calibrated with channel 1 held at its committed top value.
    pub fn holds_previous_channel(self) -> bool {
        self == Self::Legacy
    }
}

/// Raised when measured thresholds are not in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{lower} ({lower_value}) must not exceed {upper} ({upper_value})")]
pub struct OrderViolation {
    /// Name of the threshold that came out too high.
    pub lower: &'static str,
    /// Its value.
    pub lower_value: Intensity,
    /// Name of the threshold it was compared against.
    pub upper: &'static str,
    /// Its value.
    pub upper_value: Intensity,
}

/// Checks that `values` never decrease, naming the first pair that does.
fn check_order(steps: &[Step], values: &[Intensity]) -> Result<(), OrderViolation> {
    steps
        .iter()
        .zip(values)
        .zip(steps.iter().zip(values).skip(1))
        .find(|((_, lower), (_, upper))| lower > upper)
        .map_or(Ok(()), |((lower, &lower_value), (upper, &upper_value))| {
            Err(OrderViolation {
                lower: lower.name,
                lower_value,
                upper: upper.name,
                upper_value,
            })
        })
}

/// Thresholds found by the four-step protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedProfile {
    /// Barely perceptible.
    pub min_perception: Intensity,
    /// Strongest vibration without movement.
    pub comfortable_haptic: Intensity,
    /// First muscle twitch.
    pub min_actuation: Intensity,
    /// Strongest comfortable contraction.
    pub max_actuation: Intensity,
}

/// Thresholds found by the two-step protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyProfile {
    /// Weakest stimulation to apply.
    pub min_intensity: Intensity,
    /// Strongest stimulation to apply.
    pub max_intensity: Intensity,
}

/// The calibrated thresholds of one channel.
///
/// A profile can only be built (or loaded) if its thresholds are in ascending order, so anything holding a
/// `CalibrationProfile` may rely on that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalibrationProfile {
    /// Produced by [`Variant::Advanced`].
    Advanced(AdvancedProfile),
    /// Produced by [`Variant::Legacy`].
    Legacy(LegacyProfile),
}

impl CalibrationProfile {
    /// Builds a profile from one value per step of `variant`, in step order.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly one value per step.
    pub fn from_measurements(variant: Variant, values: &[Intensity]) -> Result<Self, OrderViolation> {
        let steps = variant.steps();
        assert_eq!(
            steps.len(),
            values.len(),
            "one measurement per calibration step is required"
        );
        check_order(steps, values)?;
        Ok(match variant {
            Variant::Advanced => Self::Advanced(AdvancedProfile {
                min_perception: values[0],
                comfortable_haptic: values[1],
                min_actuation: values[2],
                max_actuation: values[3],
            }),
            Variant::Legacy => Self::Legacy(LegacyProfile {
                min_intensity: values[0],
                max_intensity: values[1],
            }),
        })
    }

    /// The protocol this profile came from.
    pub fn variant(&self) -> Variant {
        match self {
            Self::Advanced(_) => Variant::Advanced,
            Self::Legacy(_) => Variant::Legacy,
        }
    }

    /// Thresholds in step order.
    pub fn values(&self) -> ArrayVec<[Intensity; MAX_STEPS]> {
        match *self {
            Self::Advanced(p) => array_vec!([Intensity; MAX_STEPS] =>
                p.min_perception,
                p.comfortable_haptic,
                p.min_actuation,
                p.max_actuation
            ),
            Self::Legacy(p) => array_vec!([Intensity; MAX_STEPS] => p.min_intensity, p.max_intensity),
        }
    }

    /// Re-checks the ordering; used on profiles that arrive from outside, e.g. a file.
    pub fn validate(&self) -> Result<(), OrderViolation> {
        check_order(self.variant().steps(), &self.values())
    }

    /// The range that velocity-driven stimulation is scaled over: `(min, max)`.
    pub fn actuation_range(&self) -> (Intensity, Intensity) {
        match self {
            Self::Advanced(p) => (p.min_actuation, p.max_actuation),
            Self::Legacy(p) => (p.min_intensity, p.max_intensity),
        }
    }

    /// The highest threshold.
    pub fn top(&self) -> Intensity {
        self.actuation_range().1
    }
}

/// Calibration results for both channels, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    /// Thresholds for [`Channel::One`].
    pub channel_1: CalibrationProfile,
    /// Thresholds for [`Channel::Two`].
    pub channel_2: CalibrationProfile,
}

impl ProfileSet {
    /// Returns the profile for `channel`.
    pub fn get(&self, channel: Channel) -> &CalibrationProfile {
        match channel {
            Channel::One => &self.channel_1,
            Channel::Two => &self.channel_2,
        }
    }

    /// Validates both profiles, naming the channel at fault.
    pub fn validate(&self) -> Result<(), (Channel, OrderViolation)> {
        Channel::ALL
            .into_iter()
            .try_for_each(|channel| self.get(channel).validate().map_err(|v| (channel, v)))
    }
}
