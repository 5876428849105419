// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wall-clock sources used by the sampler to decide what "now" is.

use std::sync::Arc;

use parking_lot::Mutex;

/// Supplies the current time in seconds on an arbitrary but monotonic timeline.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds elapsed since the source was created.
#[cfg(not(feature = "quanta"))]
pub struct MonotonicTime {
    origin: std::time::Instant,
}

#[cfg(not(feature = "quanta"))]
impl MonotonicTime {
    pub fn new() -> MonotonicTime {
        MonotonicTime {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(feature = "quanta"))]
impl TimeSource for MonotonicTime {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Seconds elapsed since the source was created, read from the TSC.
#[cfg(feature = "quanta")]
pub struct MonotonicTime {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl MonotonicTime {
    pub fn new() -> MonotonicTime {
        let clock = quanta::Clock::new();
        let origin = clock.now();
        MonotonicTime { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl TimeSource for MonotonicTime {
    fn now(&self) -> f64 {
        self.clock.now().duration_since(self.origin).as_secs_f64()
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        MonotonicTime::new()
    }
}

/// A time source that only moves when told to. Used for offline rendering and tests.
#[derive(Clone, Default)]
pub struct ManualTime {
    now: Arc<Mutex<f64>>,
}

impl ManualTime {
    pub fn new(start: f64) -> ManualTime {
        ManualTime {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, delta: f64) {
        *self.now.lock() += delta;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
