//! Test doubles shared across modules.

use crate::{
    intensity::{ChannelCommand, Intensity},
    link::{Actuator, LinkError},
};
use embedded_hal::delay::DelayNs;
use std::{cell::RefCell, rc::Rc, time::Duration};

/// Something that happened on the fake device, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Sent(ChannelCommand),
    Waited(Duration),
}

/// Records commands and delays side by side so their relative order can be asserted.
///
/// Clones share one log, so one clone can stand in as the delay while another acts as the link.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Rc<RefCell<Vec<Entry>>>,
    /// When set, sends fail once this many commands have been accepted.
    fail_after: Option<usize>,
}

impl Transcript {
    pub fn failing_after(accepted: usize) -> Self {
        Self {
            fail_after: Some(accepted),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.borrow().clone()
    }

    pub fn sent(&self) -> Vec<ChannelCommand> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Sent(command) => Some(*command),
                Entry::Waited(_) => None,
            })
            .collect()
    }
}

impl Actuator for Transcript {
    fn send(&mut self, command: ChannelCommand) -> Result<(), LinkError> {
        if self.fail_after.is_some_and(|limit| self.sent().len() >= limit) {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )));
        }
        self.entries.borrow_mut().push(Entry::Sent(command));
        Ok(())
    }
}

impl DelayNs for Transcript {
    fn delay_ns(&mut self, ns: u32) {
        let waited = Duration::from_nanos(ns.into());
        let mut entries = self.entries.borrow_mut();
        // the provided `delay_ms`/`delay_us` may split one wait into several calls
        if let Some(Entry::Waited(total)) = entries.last_mut() {
            *total += waited;
        } else {
            entries.push(Entry::Waited(waited));
        }
    }
}

pub fn intensity(value: u8) -> Intensity {
    Intensity::new(value).unwrap()
}

pub fn command(channel_1: u8, channel_2: u8) -> ChannelCommand {
    ChannelCommand::new(intensity(channel_1), intensity(channel_2))
}
