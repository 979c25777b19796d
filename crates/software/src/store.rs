//! Reading and writing the JSON files a session is configured from: the calibration profile and, optionally, the
//! mapping rules.

use crate::{
    calibration::{OrderViolation, ProfileSet},
    intensity::Channel,
    mapping::RuleSet,
};
use log::info;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// A file that cannot be used. Always fatal, and always raised before the device is touched.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The file does not exist.
    #[error("{} not found; run calibration first", .path.display())]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },
    /// The file exists but could not be read or written.
    #[error("could not access {}", .path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// What the OS reported.
        #[source]
        source: io::Error,
    },
    /// The file is not the expected JSON, or holds out-of-range values.
    #[error("{} is malformed", .path.display())]
    Malformed {
        /// The path involved.
        path: PathBuf,
        /// What the parser reported.
        #[source]
        source: serde_json::Error,
    },
    /// A stored profile's thresholds are out of order.
    #[error("{} holds an invalid profile for {channel}", .path.display())]
    Invalid {
        /// The path involved.
        path: PathBuf,
        /// The channel whose profile is at fault.
        channel: Channel,
        /// What is out of order.
        #[source]
        violation: OrderViolation,
    },
}

fn read(path: &Path) -> Result<String, ConfigurationError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ConfigurationError::Missing {
            path: path.to_owned(),
        },
        _ => ConfigurationError::Io {
            path: path.to_owned(),
            source,
        },
    })
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, json: &str) -> Result<T, ConfigurationError> {
    serde_json::from_str(json).map_err(|source| ConfigurationError::Malformed {
        path: path.to_owned(),
        source,
    })
}

/// Loads the profiles of both channels, rejecting any whose thresholds are out of order.
pub fn load_profiles(path: &Path) -> Result<ProfileSet, ConfigurationError> {
    let profiles: ProfileSet = parse(path, &read(path)?)?;
    profiles
        .validate()
        .map_err(|(channel, violation)| ConfigurationError::Invalid {
            path: path.to_owned(),
            channel,
            violation,
        })?;
    info!("Loaded calibration profile from {}", path.display());
    Ok(profiles)
}

/// Writes `profiles` as pretty-printed JSON, replacing whatever was at `path`.
pub fn save_profiles(path: &Path, profiles: &ProfileSet) -> Result<(), ConfigurationError> {
    let json = serde_json::to_string_pretty(profiles).map_err(|source| {
        ConfigurationError::Malformed {
            path: path.to_owned(),
            source,
        }
    })?;
    fs::write(path, json).map_err(|source| ConfigurationError::Io {
        path: path.to_owned(),
        source,
    })?;
    info!("Saved calibration profile to {}", path.display());
    Ok(())
}

/// Loads a rule file: a JSON array of rules with at most one per source.
pub fn load_rules(path: &Path) -> Result<RuleSet, ConfigurationError> {
    let rules: RuleSet = parse(path, &read(path)?)?;
    info!("Loaded {} mapping rules from {}", rules.iter().count(), path.display());
    Ok(rules)
}
