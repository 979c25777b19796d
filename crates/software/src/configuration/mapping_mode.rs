use core::fmt;

/// Determines how long a stimulation triggered by an onset lasts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Stimulation starts with the onset and lasts until the matching release, like a held key.
    #[default]
    Sustain,
    /// Every onset fires a stimulation of fixed length; releases are ignored. Suited to drum pads and sequencers,
    /// whose note-offs carry no meaning.
    Pulse,
}

impl fmt::Display for MappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sustain => "sustain",
            Self::Pulse => "pulse",
        })
    }
}
