//! Blocking waits for the control thread.

use embedded_hal::delay::DelayNs;
use std::{thread, time::Duration};

/// A [`DelayNs`] that puts the calling thread to sleep, leaving the core free while a pulse is held.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sleep;

impl DelayNs for Sleep {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms.into()));
    }
}
