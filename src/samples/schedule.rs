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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::repository::SoundId;

/// A sound waiting to start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTrigger {
    pub sound_id: SoundId,
    /// Absolute time in seconds.
    pub start_time: f64,
}

/// Heap entry. Ordered so that the max-heap yields the earliest start time first, and the
/// earliest insertion among equal start times.
struct Entry {
    trigger: ScheduledTrigger,
    sequence: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .trigger
            .start_time
            .total_cmp(&self.trigger.start_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// Pending triggers ordered by start time, stable on ties.
#[derive(Default)]
pub struct TriggerQueue {
    heap: BinaryHeap<Entry>,
    next_sequence: u64,
}

impl TriggerQueue {
    pub fn new() -> TriggerQueue {
        TriggerQueue::default()
    }

    pub fn push(&mut self, sound_id: SoundId, start_time: f64) {
        self.heap.push(Entry {
            trigger: ScheduledTrigger {
                sound_id,
                start_time,
            },
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
    }

    /// Removes and returns the earliest trigger if it starts at or before `up_to`.
    pub fn pop_due(&mut self, up_to: f64) -> Option<ScheduledTrigger> {
        if self.heap.peek()?.trigger.start_time <= up_to {
            self.heap.pop().map(|entry| entry.trigger)
        } else {
            None
        }
    }

    pub fn peek(&self) -> Option<&ScheduledTrigger> {
        self.heap.peek().map(|entry| &entry.trigger)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// The pending triggers in the order they will be promoted.
    pub fn pending(&self) -> Vec<ScheduledTrigger> {
        let mut entries: Vec<&Entry> = self.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|entry| entry.trigger).collect()
    }
}
