//! Value types shared by every layer that talks to the stimulator: the bounded [`Intensity`], the output
//! [`Channel`]s and the dual-channel [`ChannelCommand`] that is the only unit the device accepts.

use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when an integer falls outside the range the stimulator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("intensity {0} is outside the accepted range 0..={max}", max = Intensity::MAX_VALUE)]
pub struct IntensityOutOfRange(pub u8);

/// A stimulation intensity, guaranteed to lie within `0..=99`.
///
/// Adjustments saturate at either end of the range instead of wrapping, so an over-eager operator holding the
/// up arrow can never push the device past its ceiling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
    /// Highest value the device accepts.
    pub const MAX_VALUE: u8 = 99;
    /// No stimulation.
    pub const ZERO: Self = Self(0);
    /// Strongest stimulation the device accepts.
    pub const MAX: Self = Self(Self::MAX_VALUE);

    /// Constructs an [`Intensity`], failing if `value` is above [`Intensity::MAX_VALUE`].
    pub const fn new(value: u8) -> Result<Self, IntensityOutOfRange> {
        if value > Self::MAX_VALUE {
            Err(IntensityOutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Constructs an [`Intensity`], clamping `value` into range.
    pub const fn saturating(value: u8) -> Self {
        if value > Self::MAX_VALUE {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// One step stronger, stopping at [`Intensity::MAX`].
    pub const fn increment(self) -> Self {
        Self::saturating(self.0.saturating_add(1))
    }

    /// One step weaker, stopping at [`Intensity::ZERO`].
    pub const fn decrement(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Getter.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns `true` when no stimulation would be applied.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for Intensity {
    type Error = IntensityOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Intensity> for u8 {
    fn from(intensity: Intensity) -> Self {
        intensity.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One independently addressable stimulation output. The discriminants are the indices used on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Channel {
    /// The first output, addressed as `1`.
    One = 1,
    /// The second output, addressed as `2`.
    Two = 2,
}

impl Channel {
    /// Both channels in wire order.
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    /// The wire index of this channel.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// The channel that is not `self`.
    pub const fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

/// Returned when a channel index other than `1` or `2` is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel {0} does not exist; the device has channels 1 and 2")]
pub struct UnknownChannel(pub u8);

impl TryFrom<u8> for Channel {
    type Error = UnknownChannel;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        <Self as num_traits::FromPrimitive>::from_u8(index).ok_or(UnknownChannel(index))
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.index()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.index())
    }
}

/// The intensities of both channels, always transmitted together.
///
/// The device protocol has no partial update, so every command names a value for each channel; leaving one out would
/// let a stale intensity linger on the untouched output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCommand {
    /// Intensity for [`Channel::One`].
    pub channel_1: Intensity,
    /// Intensity for [`Channel::Two`].
    pub channel_2: Intensity,
}

impl ChannelCommand {
    /// Both channels at zero: the safety reset.
    pub const OFF: Self = Self {
        channel_1: Intensity::ZERO,
        channel_2: Intensity::ZERO,
    };

    /// Constructs a [`ChannelCommand`] from a pair of intensities.
    pub const fn new(channel_1: Intensity, channel_2: Intensity) -> Self {
        Self {
            channel_1,
            channel_2,
        }
    }

    /// Drives `channel` at `intensity` while holding the other channel at `other`.
    pub const fn with(channel: Channel, intensity: Intensity, other: Intensity) -> Self {
        match channel {
            Channel::One => Self::new(intensity, other),
            Channel::Two => Self::new(other, intensity),
        }
    }

    /// Drives `channel` at `intensity` with the other channel off.
    pub const fn single(channel: Channel, intensity: Intensity) -> Self {
        Self::with(channel, intensity, Intensity::ZERO)
    }

    /// Returns the intensity addressed to `channel`.
    pub const fn get(&self, channel: Channel) -> Intensity {
        match channel {
            Channel::One => self.channel_1,
            Channel::Two => self.channel_2,
        }
    }
}

impl fmt::Display for ChannelCommand {
    /// Formats the command exactly as it travels on the wire, minus the line terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{}:{}",
            Channel::One.index(),
            self.channel_1,
            Channel::Two.index(),
            self.channel_2
        )
    }
}
