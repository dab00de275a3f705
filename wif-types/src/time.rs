/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Time source abstraction so that expiry logic can be tested

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Trait with a `now()` function returning the current time
pub trait TimeSource: Debug + Send + Sync {
    /// Returns the current time
    fn now(&self) -> SystemTime;
}

/// Time source that delegates to [`SystemTime::now`]
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        SystemTimeSource
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A shared, cheaply clonable [`TimeSource`]
#[derive(Debug, Clone)]
pub struct SharedTimeSource(Arc<dyn TimeSource>);

impl SharedTimeSource {
    pub fn new(source: impl TimeSource + 'static) -> Self {
        Self(Arc::new(source))
    }
}

impl Default for SharedTimeSource {
    fn default() -> Self {
        SharedTimeSource::new(SystemTimeSource)
    }
}

impl TimeSource for SharedTimeSource {
    fn now(&self) -> SystemTime {
        self.0.now()
    }
}

/// Time source that can be manually moved for tests
///
/// # Examples
///
/// ```rust
/// use wif_types::time::{ManualTimeSource, TimeSource};
/// use std::time::{Duration, UNIX_EPOCH};
/// let time = ManualTimeSource::new(UNIX_EPOCH);
/// time.advance(Duration::from_secs(100));
/// assert_eq!(time.now(), UNIX_EPOCH + Duration::from_secs(100));
/// ```
#[derive(Clone, Debug)]
pub struct ManualTimeSource {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualTimeSource {
    /// Creates `ManualTimeSource` with `start_time`.
    pub fn new(start_time: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_time)),
        }
    }

    /// Sets time to the specified `time`.
    pub fn set_time(&self, time: SystemTime) {
        let mut now = self.now.lock().unwrap();
        *now = time;
    }

    /// Advances time by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::{ManualTimeSource, SharedTimeSource, TimeSource};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn manual_time_source_is_shared_between_clones() {
        let time = ManualTimeSource::new(UNIX_EPOCH);
        let shared = SharedTimeSource::new(time.clone());
        assert_eq!(shared.now(), UNIX_EPOCH);
        time.advance(Duration::from_secs(10));
        assert_eq!(shared.now(), UNIX_EPOCH + Duration::from_secs(10));
    }
}
