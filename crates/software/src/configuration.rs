//! Settings fixed before a session starts, and the constants they default to.

mod mapping_mode;
pub use mapping_mode::*;

use core::time::Duration;

/// File the calibration profile is written to and read from unless another path is given.
pub const DEFAULT_PROFILE_PATH: &str = "calibration_advanced.json";

/// How long a [`MappingMode::Pulse`] stimulation is held before the device is zeroed again.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(50);

/// Longest the mapping loop waits for a trigger before checking in again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a mapping session behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingConfig {
    /// Sustain or pulse.
    pub mode: MappingMode,
    /// Hold time in [`MappingMode::Pulse`]; unused when sustaining.
    pub pulse: Duration,
    /// Upper bound on each wait for the next trigger.
    pub poll: Duration,
}

impl MappingConfig {
    /// A configuration for `mode` with the default timings.
    pub fn new(mode: MappingMode) -> Self {
        Self {
            mode,
            pulse: DEFAULT_PULSE,
            poll: POLL_INTERVAL,
        }
    }

    /// Replaces the pulse hold time.
    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::new(MappingMode::default())
    }
}
