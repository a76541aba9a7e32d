//! Timer queue — all deferred work flows through one scheduler.
//!
//! The queue holds explicit task descriptors (due time, payload, cancel
//! handle) and is driven entirely by the host clock: callers pass `now_ms`
//! into `pop_due` and dispatch whatever comes back. Nothing in here reads a
//! wall clock, so tests drive playback over "minutes" instantly.
//!
//! Cancellation is synchronous for *future* firings, but a task popped in
//! the same batch that cancelled it still reaches its consumer — consumers
//! must re-check liveness (voice generation, layer epoch) at fire time
//! rather than trust the queue.

use crate::dsp::percussion::BackingSlot;
use crate::keys::Key;
use crate::looper::LayerId;

/// Opaque handle to a scheduled task; cancels all its future firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Payloads the session dispatcher understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Repeating per-layer cycle tick; reschedules the layer's notes.
    LoopTick { layer: LayerId, epoch: u64 },
    /// One note fire inside a layer's cycle.
    LoopNote { layer: LayerId, epoch: u64, key: Key },
    /// Auto-stop deadline for an in-progress loop capture.
    CaptureDeadline { token: u64 },
    /// One note fire during flat-recording playback.
    PlaybackNote { key: Key },
    /// Deferred voice deregistration once a release fade has run out.
    VoiceFade { key: Key, voice: u64 },
    /// Backing-beat pulse (kick / hi-hat / bass).
    BackingPulse { slot: BackingSlot },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repeat {
    Once,
    Every(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    id: u64,
    due_ms: u64,
    repeat: Repeat,
    task: Task,
}

/// A popped task, with the instant it was due (not the instant it was
/// popped); repeat offsets are computed from `due_ms` so late host ticks
/// do not accumulate drift.
#[derive(Debug, Clone)]
pub struct Due {
    pub id: TimerId,
    pub due_ms: u64,
    pub task: Task,
}

/// Ordered task queue. Entries pop in (due time, schedule order).
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: Vec<Entry>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule a one-shot task at an absolute time.
    pub fn schedule_at(&mut self, due_ms: u64, task: Task) -> TimerId {
        self.push(due_ms, Repeat::Once, task)
    }

    /// Schedule a repeating task: first firing at `first_due_ms`, then every
    /// `period_ms` after, measured from each due time.
    pub fn schedule_every(&mut self, first_due_ms: u64, period_ms: u64, task: Task) -> TimerId {
        self.push(first_due_ms, Repeat::Every(period_ms.max(1)), task)
    }

    /// Cancel a task. Unknown or already-fired ids are a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        self.queue.retain(|e| e.id != id.0);
    }

    /// Is this id still queued (including re-armed repeating tasks)?
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.queue.iter().any(|e| e.id == id.0)
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove and return every task due at or before `now_ms`, in order.
    ///
    /// Repeating tasks re-arm at `due + period` with the same id; if the
    /// host ticked late by more than a period the task catches up, firing
    /// once per missed period within this call.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<Due> {
        let mut fired = Vec::new();
        while let Some(front) = self.queue.first() {
            if front.due_ms > now_ms {
                break;
            }
            let entry = self.queue.remove(0);
            fired.push(Due {
                id: TimerId(entry.id),
                due_ms: entry.due_ms,
                task: entry.task.clone(),
            });
            if let Repeat::Every(period) = entry.repeat {
                self.insert(Entry {
                    due_ms: entry.due_ms + period,
                    ..entry
                });
            }
        }
        fired
    }

    fn push(&mut self, due_ms: u64, repeat: Repeat, task: Task) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.insert(Entry {
            id,
            due_ms,
            repeat,
            task,
        });
        TimerId(id)
    }

    fn insert(&mut self, entry: Entry) {
        // Stable position: after every entry with an earlier-or-equal due
        // time, so same-instant tasks fire in schedule order.
        let pos = self
            .queue
            .partition_point(|e| (e.due_ms, e.id) <= (entry.due_ms, entry.id));
        self.queue.insert(pos, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: Key) -> Task {
        Task::PlaybackNote { key }
    }

    #[test]
    fn pops_in_due_order() {
        let mut sched = Scheduler::new();
        sched.schedule_at(300, note(Key::E));
        sched.schedule_at(100, note(Key::Q));
        sched.schedule_at(200, note(Key::W));

        let fired = sched.pop_due(1000);
        let keys: Vec<Key> = fired
            .iter()
            .map(|d| match d.task {
                Task::PlaybackNote { key } => key,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![Key::Q, Key::W, Key::E]);
    }

    #[test]
    fn same_instant_fires_in_schedule_order() {
        let mut sched = Scheduler::new();
        sched.schedule_at(100, note(Key::W));
        sched.schedule_at(100, note(Key::Q));
        let fired = sched.pop_due(100);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].task, note(Key::W));
        assert_eq!(fired[1].task, note(Key::Q));
    }

    #[test]
    fn leaves_future_tasks_queued() {
        let mut sched = Scheduler::new();
        sched.schedule_at(100, note(Key::Q));
        sched.schedule_at(500, note(Key::W));

        assert_eq!(sched.pop_due(100).len(), 1);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.pop_due(499).len(), 0);
        assert_eq!(sched.pop_due(500).len(), 1);
        assert!(sched.is_empty());
    }

    #[test]
    fn cancel_removes_future_firing() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_at(100, note(Key::Q));
        sched.cancel(id);
        assert!(sched.pop_due(1000).is_empty());
    }

    #[test]
    fn repeating_task_rearms_with_same_id() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_every(100, 100, note(Key::Q));

        let first = sched.pop_due(100);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);
        assert!(sched.is_scheduled(id), "repeating task should re-arm");

        let second = sched.pop_due(200);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].due_ms, 200);

        sched.cancel(id);
        assert!(sched.pop_due(10_000).is_empty());
    }

    #[test]
    fn late_tick_catches_up_without_drift() {
        let mut sched = Scheduler::new();
        sched.schedule_every(100, 100, note(Key::Q));

        // Host wakes up late at t=350: firings for 100, 200, 300 are due.
        let fired = sched.pop_due(350);
        let dues: Vec<u64> = fired.iter().map(|d| d.due_ms).collect();
        assert_eq!(dues, vec![100, 200, 300]);
    }
}
