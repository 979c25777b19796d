//! Provides [`HeldSources`], which tracks the trigger sources whose sustained stimulation has not yet been released
//! and the output they add up to.

use crate::intensity::{Channel, ChannelCommand, Intensity};
use wmidi::Note;

/// Per channel, the source currently holding it, together with the command that reproduces every live hold.
///
/// A channel has at most one holder. A later onset on the same channel takes the channel over, and the displaced
/// source is no longer considered held.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeldSources {
    holders: [Option<Note>; 2],
    output: ChannelCommand,
}

/// Position of `channel` in per-channel arrays.
fn slot(channel: Channel) -> usize {
    usize::from(channel.index() - 1)
}

impl HeldSources {
    /// Construct a new `HeldSources` with nothing held and both channels off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `source` holding `channel` at `intensity`. Returns the source that held the channel before, if it
    /// was a different one.
    pub fn add(&mut self, source: Note, channel: Channel, intensity: Intensity) -> Option<Note> {
        let displaced = self.holders[slot(channel)]
            .replace(source)
            .filter(|&previous| previous != source);
        self.output = ChannelCommand::with(channel, intensity, self.output.get(channel.other()));
        displaced
    }

    /// Releases `source`, zeroing its channel. Returns the channel it held, or `None` if it held nothing.
    pub fn remove(&mut self, source: Note) -> Option<Channel> {
        let channel = Channel::ALL
            .into_iter()
            .find(|&channel| self.holders[slot(channel)] == Some(source))?;
        self.holders[slot(channel)] = None;
        self.output = ChannelCommand::with(channel, Intensity::ZERO, self.output.get(channel.other()));
        Some(channel)
    }

    /// Whether `source` is held.
    pub fn contains(&self, source: Note) -> bool {
        self.holders.contains(&Some(source))
    }

    /// Determine if anything is held.
    pub fn is_empty(&self) -> bool {
        self.holders.iter().all(Option::is_none)
    }

    /// The command that applies every live hold, with unheld channels off.
    pub fn output(&self) -> ChannelCommand {
        self.output
    }

    /// Forgets every hold.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
