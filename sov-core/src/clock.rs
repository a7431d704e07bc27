use std::fmt;

use sov_utils::time::now_unix_secs;

/// Wall-clock source for action timestamps and mute expiries.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_unix(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        now_unix_secs()
    }
}
