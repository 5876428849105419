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

//! Drives a session at buffer cadence when there's no audio device callback to do it.

use std::time::{Duration, Instant};

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

use crate::session::{Session, TickOutput};

/// Default priority for the tick thread when DECKHAND_THREAD_PRIORITY is unset.
const DEFAULT_TICK_THREAD_PRIORITY: u8 = 70;

/// Reads DECKHAND_THREAD_PRIORITY (0-99), falling back to the default.
pub fn tick_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var("DECKHAND_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .and_then(priority_value)
        .or_else(|| priority_value(DEFAULT_TICK_THREAD_PRIORITY))
}

fn priority_value(n: u8) -> Option<ThreadPriorityValue> {
    if n >= 100 {
        return None;
    }
    ThreadPriorityValue::try_from(n).ok()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Whether to attempt RT (SCHED_FIFO) scheduling for the tick thread. Opt out with
/// DECKHAND_DISABLE_RT=1.
pub fn rt_enabled() -> bool {
    !env_flag("DECKHAND_DISABLE_RT")
}

/// Raises the priority of the current thread. Failures are logged, never fatal.
pub fn configure_thread_priority(priority: ThreadPriorityValue, rt: bool) {
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise tick thread priority");
    }

    #[cfg(unix)]
    if rt {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for tick thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for tick thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt;
}

/// Calls [Session::tick] once per buffer period.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
}

impl Ticker {
    pub fn new(period: Duration) -> Ticker {
        Ticker { period }
    }

    /// A ticker running at the session clock's buffer rate.
    pub fn for_buffer(buffer_seconds: f64) -> Ticker {
        Ticker::new(Duration::from_secs_f64(buffer_seconds.max(0.0)))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks until the callback returns false. If a tick overruns by more than a whole period
    /// the schedule is reset rather than bursting to catch up, and the session is resynced.
    pub fn run<F>(&self, session: &mut Session, mut on_tick: F)
    where
        F: FnMut(TickOutput) -> bool,
    {
        session.resync();
        let mut next = Instant::now();
        loop {
            if !on_tick(session.tick()) {
                return;
            }

            next += self.period;
            let now = Instant::now();
            if next > now {
                spin_sleep::sleep(next - now);
            } else if now - next > self.period {
                warn!(behind = ?(now - next), "Tick thread fell behind");
                next = now;
                session.resync();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use super::*;
    use crate::clock::MasterClock;
    use crate::deck::Deck;
    use crate::dsp::MetadataStage;
    use crate::samples::{ManualTime, MemorySoundRepository, Sampler, SamplerSettings};
    use crate::session::SessionSettings;

    #[test]
    fn test_runs_at_cadence() {
        let clock = MasterClock::new(1000, 10).shared();
        let dsp = Arc::new(MetadataStage);
        let sampler = Sampler::new(
            Arc::new(MemorySoundRepository::new()),
            Arc::new(ManualTime::new(0.0)),
            SamplerSettings {
                sample_rate: 1000,
                ..Default::default()
            },
        );
        let mut session = Session::new(
            clock.clone(),
            Deck::new("A", clock.clone(), dsp.clone()),
            Deck::new("B", clock.clone(), dsp),
            sampler,
            SessionSettings {
                pads: BTreeMap::new(),
                ..Default::default()
            },
        );

        let ticker = Ticker::for_buffer(clock.read().buffer_seconds());
        assert_eq!(ticker.period(), Duration::from_millis(10));

        let start = Instant::now();
        let mut frames = Vec::new();
        ticker.run(&mut session, |output| {
            frames.push(output.frame);
            frames.len() < 5
        });

        assert_eq!(frames, vec![0, 10, 20, 30, 40]);
        assert_eq!(clock.read().frame_counter(), 50);
        // Four sleeps happen between five ticks.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_run_starts_sampler_at_now() {
        let clock = MasterClock::new(1000, 10).shared();
        let dsp = Arc::new(MetadataStage);
        let time = ManualTime::new(0.0);
        let mut session = Session::new(
            clock.clone(),
            Deck::new("A", clock.clone(), dsp.clone()),
            Deck::new("B", clock, dsp),
            Sampler::new(
                Arc::new(MemorySoundRepository::new()),
                Arc::new(time.clone()),
                SamplerSettings {
                    sample_rate: 1000,
                    ..Default::default()
                },
            ),
            SessionSettings::default(),
        );

        time.set(3.0);
        Ticker::new(Duration::from_millis(1)).run(&mut session, |_| false);
        assert!((session.sampler().last_render_time() - 3.01).abs() < 1e-9);
    }

    #[test]
    fn test_priority_value() {
        assert!(priority_value(99).is_some());
        assert!(priority_value(100).is_none());
    }
}
