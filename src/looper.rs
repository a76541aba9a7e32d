//! Loop layer engine — records phrases into layers and replays each active
//! layer on the shared 4-second cycle.
//!
//! Layers live in an id-keyed map; ids are allocated highest-ever-plus-one
//! and retired permanently on delete, so a stale playback handle can never
//! resurrect a different layer's audio. Every (re)activation of a layer
//! gets a fresh playback epoch, and the scheduled cycle ticks and note
//! fires all carry it: a task whose epoch no longer matches the layer's
//! current playback is dropped at fire time. That check — not timer
//! cancellation — is what guarantees silence after a mid-cycle toggle-off,
//! even for notes whose tick was already dispatched.

use std::collections::{BTreeMap, HashMap};

use crate::keys::Key;
use crate::recorder::{NoteEvent, PhraseRecorder};
use crate::scheduler::{Scheduler, Task, TimerId};

/// Stable layer identifier. Never reused, even after delete or clear.
pub type LayerId = u32;

/// The repeat period shared by every layer.
pub const LOOP_CYCLE_MS: u64 = 4000;

/// A recorded, independently toggleable, repeating phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub notes: Vec<NoteEvent>,
    pub active: bool,
}

/// Live playback state for one active layer: its repeating cycle timer and
/// the epoch its scheduled tasks must match.
#[derive(Debug)]
struct Playback {
    epoch: u64,
    tick: TimerId,
}

/// An in-progress loop capture and its auto-stop deadline.
#[derive(Debug)]
struct Capture {
    recorder: PhraseRecorder,
    token: u64,
    deadline: TimerId,
}

pub struct LoopEngine {
    layers: BTreeMap<LayerId, Layer>,
    playback: HashMap<LayerId, Playback>,
    next_id: LayerId,
    capture: Option<Capture>,
    capture_tokens: u64,
    epochs: u64,
    cycle_ms: u64,
}

impl Default for LoopEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopEngine {
    pub fn new() -> Self {
        LoopEngine {
            layers: BTreeMap::new(),
            playback: HashMap::new(),
            next_id: 0,
            capture: None,
            capture_tokens: 0,
            epochs: 0,
            cycle_ms: LOOP_CYCLE_MS,
        }
    }

    pub fn cycle_ms(&self) -> u64 {
        self.cycle_ms
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    /// Layers in id order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Open a capture buffer and arm the auto-stop deadline one cycle out.
    /// Returns false (and does nothing) if a capture is already open.
    pub fn begin_recording(&mut self, sched: &mut Scheduler, now_ms: u64) -> bool {
        if self.capture.is_some() {
            return false;
        }
        self.capture_tokens += 1;
        let token = self.capture_tokens;
        let deadline = sched.schedule_at(now_ms + self.cycle_ms, Task::CaptureDeadline { token });
        self.capture = Some(Capture {
            recorder: PhraseRecorder::start(now_ms),
            token,
            deadline,
        });
        true
    }

    /// Append a press to the open capture, if any.
    pub fn capture_press(&mut self, key: Key, now_ms: u64) {
        if let Some(capture) = &mut self.capture {
            capture.recorder.capture(key, now_ms);
        }
    }

    /// Close the capture. An empty capture is discarded; otherwise the
    /// events become a new layer which starts playing immediately.
    /// Idempotent: with no capture open this is a no-op.
    pub fn end_recording(&mut self, sched: &mut Scheduler, now_ms: u64) -> Option<LayerId> {
        let capture = self.capture.take()?;
        sched.cancel(capture.deadline);

        let notes = capture.recorder.stop();
        if notes.is_empty() {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.layers.insert(
            id,
            Layer {
                id,
                notes,
                active: true,
            },
        );
        self.start_playback(id, sched, now_ms);
        Some(id)
    }

    /// Auto-stop path for the capture deadline timer. The token match makes
    /// the deadline racing a manual stop (or a later capture) a no-op.
    pub fn handle_capture_deadline(
        &mut self,
        token: u64,
        sched: &mut Scheduler,
        now_ms: u64,
    ) -> Option<LayerId> {
        if self.capture.as_ref().is_some_and(|c| c.token == token) {
            self.end_recording(sched, now_ms)
        } else {
            None
        }
    }

    /// Begin repeating playback for a layer: every note fires once at its
    /// offset from now, and a cycle tick re-fires the set each period.
    /// No-op if the layer is missing or already has a live playback.
    pub fn start_playback(&mut self, id: LayerId, sched: &mut Scheduler, now_ms: u64) -> bool {
        if self.playback.contains_key(&id) {
            return false;
        }
        let Some(layer) = self.layers.get_mut(&id) else {
            return false;
        };
        layer.active = true;

        self.epochs += 1;
        let epoch = self.epochs;
        for note in &layer.notes {
            sched.schedule_at(
                now_ms + note.offset_ms,
                Task::LoopNote {
                    layer: id,
                    epoch,
                    key: note.key,
                },
            );
        }
        let tick = sched.schedule_every(
            now_ms + self.cycle_ms,
            self.cycle_ms,
            Task::LoopTick { layer: id, epoch },
        );
        self.playback.insert(id, Playback { epoch, tick });
        true
    }

    /// Cycle tick: schedule the layer's notes for the cycle that starts at
    /// `tick_due_ms`. Stale ticks (layer gone, inactive, or re-activated
    /// under a newer epoch) do nothing.
    pub fn handle_tick(
        &mut self,
        id: LayerId,
        epoch: u64,
        tick_due_ms: u64,
        sched: &mut Scheduler,
    ) {
        if !self.playback_matches(id, epoch) {
            return;
        }
        let Some(layer) = self.layers.get(&id) else {
            return;
        };
        for note in &layer.notes {
            sched.schedule_at(
                tick_due_ms + note.offset_ms,
                Task::LoopNote {
                    layer: id,
                    epoch,
                    key: note.key,
                },
            );
        }
    }

    /// Leaf liveness check for a scheduled note fire.
    pub fn note_is_live(&self, id: LayerId, epoch: u64) -> bool {
        self.playback_matches(id, epoch)
    }

    /// Stop a layer's playback and mark it inactive. The cycle timer is
    /// cancelled synchronously; already-scheduled note fires die on the
    /// epoch check. Recorded notes are kept.
    pub fn deactivate(&mut self, id: LayerId, sched: &mut Scheduler) {
        if let Some(playback) = self.playback.remove(&id) {
            sched.cancel(playback.tick);
        }
        if let Some(layer) = self.layers.get_mut(&id) {
            layer.active = false;
        }
    }

    /// Flip a layer between playing and silent. Returns the new active
    /// state, or None for an unknown id.
    pub fn toggle(&mut self, id: LayerId, sched: &mut Scheduler, now_ms: u64) -> Option<bool> {
        if !self.layers.contains_key(&id) {
            return None;
        }
        if self.playback.contains_key(&id) {
            self.deactivate(id, sched);
            Some(false)
        } else {
            self.start_playback(id, sched, now_ms);
            Some(true)
        }
    }

    /// Stop and remove a layer. Its id is retired permanently.
    pub fn delete(&mut self, id: LayerId, sched: &mut Scheduler) -> bool {
        self.deactivate(id, sched);
        self.layers.remove(&id).is_some()
    }

    /// Stop and remove every layer.
    pub fn clear_all(&mut self, sched: &mut Scheduler) {
        for (_, playback) in self.playback.drain() {
            sched.cancel(playback.tick);
        }
        self.layers.clear();
    }

    /// Rebuild the layer set from decoded share state, keeping the original
    /// ids and active flags, and start playback for each active layer.
    /// Ids are never renumbered; the allocator resumes past the highest.
    pub fn restore(&mut self, snapshots: Vec<Layer>, sched: &mut Scheduler, now_ms: u64) {
        self.clear_all(sched);
        let mut to_start = Vec::new();
        for snapshot in snapshots {
            if snapshot.notes.is_empty() || self.layers.contains_key(&snapshot.id) {
                continue;
            }
            self.next_id = self.next_id.max(snapshot.id + 1);
            if snapshot.active {
                to_start.push(snapshot.id);
            }
            self.layers.insert(
                snapshot.id,
                Layer {
                    active: false,
                    ..snapshot
                },
            );
        }
        for id in to_start {
            self.start_playback(id, sched, now_ms);
        }
    }

    fn playback_matches(&self, id: LayerId, epoch: u64) -> bool {
        let active = self.layers.get(&id).is_some_and(|l| l.active);
        active && self.playback.get(&id).is_some_and(|p| p.epoch == epoch)
    }
}
