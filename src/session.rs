//! Session — the one process-scoped context everything hangs off.
//!
//! Owns the scheduler, tone engine, voice registry, recorders, loop engine
//! and staff layout, and dispatches every scheduled task with its liveness
//! check. The host drives it with three calls: input methods when the user
//! acts, `tick(now)` to fire due work, and `process` to pull audio.
//!
//! UI side effects come out as a drained [`UiEvent`] queue rather than
//! callbacks; the host adapter applies them to the real DOM.

use std::collections::HashMap;

use serde::Serialize;

use crate::dsp::engine::{ToneEngine, VoiceId};
use crate::dsp::percussion::{BASS_PATTERN, BackingSlot};
use crate::error::{DecodeError, ShareError};
use crate::keys::Key;
use crate::looper::{Layer, LayerId, LoopEngine};
use crate::recorder::{NoteEvent, PhraseRecorder};
use crate::scheduler::{Due, Scheduler, Task, TimerId};
use crate::share::{self, LayerSnapshot};
use crate::staff::StaffLayout;

/// Release fade (300 ms) plus margin before a voice registration is reaped.
const FADE_REAP_MS: u64 = 350;

/// Backing-beat periods in milliseconds.
const KICK_PERIOD_MS: u64 = 500;
const HIHAT_PERIOD_MS: u64 = 250;
const BASS_PERIOD_MS: u64 = 2000;

/// Presentation notifications, drained by the host adapter each tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    /// Transient color pulse for a triggered note.
    Pulse { key: Key },
    /// A note dot appended to the staff at an absolute column.
    StaffNote { key: Key, column: usize },
    /// Layers were added, toggled, deleted or restored.
    LayerListChanged,
}

pub struct Session {
    scheduler: Scheduler,
    synth: ToneEngine,
    /// At most one sustained voice registration per key.
    voices: HashMap<Key, VoiceId>,
    /// Open flat recording, if any.
    recorder: Option<PhraseRecorder>,
    /// The last completed flat recording.
    recorded: Vec<NoteEvent>,
    looper: LoopEngine,
    staff: StaffLayout,
    ui: Vec<UiEvent>,
    backing: Option<[TimerId; 3]>,
    bass_index: usize,
}

impl Session {
    pub fn new(sample_rate: f64) -> Self {
        Session {
            scheduler: Scheduler::new(),
            synth: ToneEngine::new(sample_rate),
            voices: HashMap::new(),
            recorder: None,
            recorded: Vec::new(),
            looper: LoopEngine::new(),
            staff: StaffLayout::new(),
            ui: Vec::new(),
            backing: None,
            bass_index: 0,
        }
    }

    // ── Live input ──────────────────────────────────────────

    /// Key down: start (or restart) the sustained voice for this key and
    /// feed whichever recordings are open.
    pub fn press_key(&mut self, key: Key, now_ms: u64) {
        if let Some(&old) = self.voices.get(&key) {
            // rapid re-trigger: silence the previous voice outside any fade
            self.synth.kill(old);
        }
        let voice = self.synth.start_sustained(key.frequency());
        self.voices.insert(key, voice);

        self.note_visuals(key, now_ms);

        if let Some(recorder) = &mut self.recorder {
            recorder.capture(key, now_ms);
        }
        self.looper.capture_press(key, now_ms);
    }

    /// Key up: fade the key's voice and schedule its deregistration. The
    /// reap task checks the voice id so a re-trigger during the fade is
    /// never clobbered by this stale callback.
    pub fn release_key(&mut self, key: Key, now_ms: u64) {
        if let Some(&voice) = self.voices.get(&key) {
            self.synth.release(voice);
            self.scheduler
                .schedule_at(now_ms + FADE_REAP_MS, Task::VoiceFade { key, voice });
        }
    }

    /// The sustained voice currently registered for a key, if any. The UI
    /// uses this to decide whether a key stays lit.
    pub fn active_voice(&self, key: Key) -> Option<VoiceId> {
        self.voices.get(&key).copied()
    }

    // ── Flat recording ──────────────────────────────────────

    /// Begin a flat recording. Returns false if one is already open.
    pub fn start_recording(&mut self, now_ms: u64) -> bool {
        if self.recorder.is_some() {
            return false;
        }
        self.recorder = Some(PhraseRecorder::start(now_ms));
        true
    }

    /// Stop the flat recording (if open) and return how many notes the
    /// take holds.
    pub fn stop_recording(&mut self) -> usize {
        if let Some(recorder) = self.recorder.take() {
            self.recorded = recorder.stop();
        }
        self.recorded.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn recorded_notes(&self) -> &[NoteEvent] {
        &self.recorded
    }

    /// Schedule playback of the flat recording through the one-shot path.
    /// Returns false when there is nothing to play.
    pub fn play_recording(&mut self, now_ms: u64) -> bool {
        if self.recorded.is_empty() {
            return false;
        }
        for note in &self.recorded {
            self.scheduler
                .schedule_at(now_ms + note.offset_ms, Task::PlaybackNote { key: note.key });
        }
        true
    }

    // ── Loop layers ─────────────────────────────────────────

    /// Start a loop capture; it auto-commits after one cycle.
    pub fn begin_loop_recording(&mut self, now_ms: u64) -> bool {
        self.looper.begin_recording(&mut self.scheduler, now_ms)
    }

    /// Commit the loop capture now instead of waiting for the deadline.
    pub fn stop_loop_recording(&mut self, now_ms: u64) -> Option<LayerId> {
        let committed = self.looper.end_recording(&mut self.scheduler, now_ms);
        if committed.is_some() {
            self.ui.push(UiEvent::LayerListChanged);
        }
        committed
    }

    pub fn is_loop_recording(&self) -> bool {
        self.looper.is_recording()
    }

    pub fn toggle_layer(&mut self, id: LayerId, now_ms: u64) -> Option<bool> {
        let toggled = self.looper.toggle(id, &mut self.scheduler, now_ms);
        if toggled.is_some() {
            self.ui.push(UiEvent::LayerListChanged);
        }
        toggled
    }

    pub fn delete_layer(&mut self, id: LayerId) -> bool {
        let deleted = self.looper.delete(id, &mut self.scheduler);
        if deleted {
            self.ui.push(UiEvent::LayerListChanged);
        }
        deleted
    }

    pub fn clear_layers(&mut self) {
        self.looper.clear_all(&mut self.scheduler);
        self.ui.push(UiEvent::LayerListChanged);
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.looper.layers()
    }

    // ── Backing beat ────────────────────────────────────────

    /// Start the kick / hi-hat / bass timers. No-op while already running.
    pub fn start_backing(&mut self, now_ms: u64) {
        if self.backing.is_some() {
            return;
        }
        let kick = self.scheduler.schedule_every(
            now_ms + KICK_PERIOD_MS,
            KICK_PERIOD_MS,
            Task::BackingPulse {
                slot: BackingSlot::Kick,
            },
        );
        let hihat = self.scheduler.schedule_every(
            now_ms + HIHAT_PERIOD_MS,
            HIHAT_PERIOD_MS,
            Task::BackingPulse {
                slot: BackingSlot::Hihat,
            },
        );
        let bass = self.scheduler.schedule_every(
            now_ms + BASS_PERIOD_MS,
            BASS_PERIOD_MS,
            Task::BackingPulse {
                slot: BackingSlot::Bass,
            },
        );
        self.backing = Some([kick, hihat, bass]);
    }

    /// Cancel all three backing timers.
    pub fn stop_backing(&mut self) {
        if let Some(timers) = self.backing.take() {
            for timer in timers {
                self.scheduler.cancel(timer);
            }
        }
    }

    pub fn is_backing(&self) -> bool {
        self.backing.is_some()
    }

    // ── Sharing ─────────────────────────────────────────────

    /// Encode the current state as a URL-safe token. `created_at_ms` is the
    /// host's wall clock (the core never reads one).
    pub fn share_token(&self, created_at_ms: u64) -> Result<String, ShareError> {
        let snapshots: Vec<LayerSnapshot> = self.looper.layers().map(LayerSnapshot::from).collect();
        share::encode(
            &self.recorded,
            &snapshots,
            created_at_ms,
            self.looper.cycle_ms(),
        )
    }

    /// Replace the current state with a decoded share payload. On any
    /// decode failure the existing state is left untouched.
    pub fn load_share_token(&mut self, token: &str, now_ms: u64) -> Result<(), DecodeError> {
        let payload = share::decode(token)?;

        self.recorded = payload.recorded_notes;
        self.looper.restore(
            payload.loop_layers.into_iter().map(Layer::from).collect(),
            &mut self.scheduler,
            now_ms,
        );

        // staff preview of the restored recording, grouped like live play
        self.staff.clear();
        for note in self.recorded.clone() {
            let column = self.staff.press(note.key, note.offset_ms);
            self.ui.push(UiEvent::StaffNote {
                key: note.key,
                column,
            });
        }
        self.ui.push(UiEvent::LayerListChanged);
        Ok(())
    }

    // ── Staff ───────────────────────────────────────────────

    pub fn staff(&self) -> &StaffLayout {
        &self.staff
    }

    pub fn clear_staff(&mut self) {
        self.staff.clear();
    }

    // ── Driving ─────────────────────────────────────────────

    /// Fire everything due at `now_ms`. Cascades that land at the same
    /// instant (a cycle tick scheduling a zero-offset note) fire within
    /// this same call.
    pub fn tick(&mut self, now_ms: u64) {
        loop {
            let batch = self.scheduler.pop_due(now_ms);
            if batch.is_empty() {
                break;
            }
            for due in batch {
                self.dispatch(due);
            }
        }
    }

    /// Render the next audio block.
    pub fn process(&mut self, out: &mut [f32]) {
        self.synth.process(out);
    }

    /// Take the pending UI notifications.
    pub fn drain_ui_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.ui)
    }

    pub fn synth(&self) -> &ToneEngine {
        &self.synth
    }

    fn dispatch(&mut self, due: Due) {
        match due.task {
            Task::LoopTick { layer, epoch } => {
                self.looper
                    .handle_tick(layer, epoch, due.due_ms, &mut self.scheduler);
            }
            Task::LoopNote { layer, epoch, key } => {
                // leaf liveness check: deactivation after this was scheduled
                // must keep it silent
                if self.looper.note_is_live(layer, epoch) {
                    self.fire_one_shot(key, due.due_ms);
                }
            }
            Task::CaptureDeadline { token } => {
                if self
                    .looper
                    .handle_capture_deadline(token, &mut self.scheduler, due.due_ms)
                    .is_some()
                {
                    self.ui.push(UiEvent::LayerListChanged);
                }
            }
            Task::PlaybackNote { key } => {
                self.fire_one_shot(key, due.due_ms);
            }
            Task::VoiceFade { key, voice } => {
                // only reap if the registration still belongs to this fade
                if self.voices.get(&key) == Some(&voice) {
                    self.voices.remove(&key);
                }
            }
            Task::BackingPulse { slot } => match slot {
                BackingSlot::Kick => self.synth.trigger_kick(),
                BackingSlot::Hihat => self.synth.trigger_hihat(),
                BackingSlot::Bass => {
                    let frequency = BASS_PATTERN[self.bass_index % BASS_PATTERN.len()];
                    self.bass_index += 1;
                    self.synth.trigger_bass(frequency);
                }
            },
        }
    }

    /// Every non-live trigger route (loop, playback) lands here: same
    /// one-shot render, same visuals as a live press, no recording capture.
    fn fire_one_shot(&mut self, key: Key, now_ms: u64) {
        self.synth.trigger_one_shot(key.frequency());
        self.note_visuals(key, now_ms);
    }

    fn note_visuals(&mut self, key: Key, now_ms: u64) {
        let column = self.staff.press(key, now_ms);
        self.ui.push(UiEvent::StaffNote { key, column });
        self.ui.push(UiEvent::Pulse { key });
    }
}
