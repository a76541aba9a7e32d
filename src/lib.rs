pub mod dsp;
pub mod error;
pub mod export;
pub mod keys;
pub mod looper;
pub mod recorder;
pub mod scheduler;
pub mod session;
pub mod share;
pub mod staff;

use wasm_bindgen::prelude::*;

use crate::dsp::engine::ToneEngine;
use crate::export::{AudioFormat, export_audio};
use crate::keys::Key;
use crate::looper::{Layer, LayerId};
use crate::session::Session;
use crate::share::LayerSnapshot;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the beepmaker-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: decode a share token into its payload (for inspection or
/// validation before loading it into a machine).
#[wasm_bindgen]
pub fn decode_share_token(token: &str) -> Result<JsValue, JsValue> {
    let payload = share::decode(token).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&payload).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render one one-shot beep for a key to mono f32 samples.
/// Returns the raw audio buffer for AudioWorklet priming.
#[wasm_bindgen]
pub fn render_beep_samples(key: char, sample_rate: f32) -> Result<Vec<f32>, JsValue> {
    let key = Key::from_char(key).ok_or_else(|| JsValue::from_str("unknown key"))?;
    Ok(ToneEngine::render_one_shot(key.frequency(), sample_rate as f64))
}

/// The whole beep machine behind one JS handle: live keys, recording, loop
/// layers, backing beat, sharing and export.
///
/// The page drives it with `performance.now()` timestamps: input methods
/// when the user acts, `tick` from a rAF/interval loop to fire scheduled
/// playback, `process` from the audio worklet to pull samples, and
/// `drain_ui_events` to apply presentation changes.
#[wasm_bindgen]
pub struct BeepMachine {
    session: Session,
    sample_rate: f64,
}

#[wasm_bindgen]
impl BeepMachine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32) -> BeepMachine {
        BeepMachine {
            session: Session::new(sample_rate as f64),
            sample_rate: sample_rate as f64,
        }
    }

    // ── Live input ──────────────────────────────────────────

    /// Key down. Unknown characters are ignored (returns false).
    pub fn press_key(&mut self, key: char, now_ms: f64) -> bool {
        match Key::from_char(key) {
            Some(key) => {
                self.session.press_key(key, now_ms as u64);
                true
            }
            None => false,
        }
    }

    /// Key up.
    pub fn release_key(&mut self, key: char, now_ms: f64) {
        if let Some(key) = Key::from_char(key) {
            self.session.release_key(key, now_ms as u64);
        }
    }

    /// Is a sustained voice still registered for this key? Drives the
    /// pressed-key highlight.
    pub fn is_key_held(&self, key: char) -> bool {
        Key::from_char(key).is_some_and(|k| self.session.active_voice(k).is_some())
    }

    // ── Driving ─────────────────────────────────────────────

    /// Fire everything due at `now_ms`.
    pub fn tick(&mut self, now_ms: f64) {
        self.session.tick(now_ms as u64);
    }

    /// Fill `out` with the next mono audio block.
    pub fn process(&mut self, out: &mut [f32]) {
        self.session.process(out);
    }

    /// Take pending UI notifications as an array of tagged objects.
    pub fn drain_ui_events(&mut self) -> Result<JsValue, JsValue> {
        let events = self.session.drain_ui_events();
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    // ── Flat recording ──────────────────────────────────────

    pub fn start_recording(&mut self, now_ms: f64) -> bool {
        self.session.start_recording(now_ms as u64)
    }

    /// Stop recording; returns the number of captured notes.
    pub fn stop_recording(&mut self) -> u32 {
        self.session.stop_recording() as u32
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    pub fn play_recording(&mut self, now_ms: f64) -> bool {
        self.session.play_recording(now_ms as u64)
    }

    // ── Loop layers ─────────────────────────────────────────

    pub fn begin_loop_recording(&mut self, now_ms: f64) -> bool {
        self.session.begin_loop_recording(now_ms as u64)
    }

    pub fn stop_loop_recording(&mut self, now_ms: f64) -> Option<LayerId> {
        self.session.stop_loop_recording(now_ms as u64)
    }

    pub fn is_loop_recording(&self) -> bool {
        self.session.is_loop_recording()
    }

    pub fn toggle_layer(&mut self, id: LayerId, now_ms: f64) -> Option<bool> {
        self.session.toggle_layer(id, now_ms as u64)
    }

    pub fn delete_layer(&mut self, id: LayerId) -> bool {
        self.session.delete_layer(id)
    }

    pub fn clear_layers(&mut self) {
        self.session.clear_layers();
    }

    /// The current layer list as `[{id, notes, active}]`.
    pub fn layers(&self) -> Result<JsValue, JsValue> {
        let snapshots: Vec<LayerSnapshot> =
            self.session.layers().map(LayerSnapshot::from).collect();
        serde_wasm_bindgen::to_value(&snapshots).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    // ── Backing beat ────────────────────────────────────────

    pub fn start_backing(&mut self, now_ms: f64) {
        self.session.start_backing(now_ms as u64);
    }

    pub fn stop_backing(&mut self) {
        self.session.stop_backing();
    }

    pub fn is_backing(&self) -> bool {
        self.session.is_backing()
    }

    // ── Staff ───────────────────────────────────────────────

    pub fn clear_staff(&mut self) {
        self.session.clear_staff();
    }

    // ── Sharing & export ────────────────────────────────────

    /// Encode the current state as a URL-safe token. `created_at_ms` is
    /// `Date.now()` on the page.
    pub fn share_token(&self, created_at_ms: f64) -> Result<String, JsValue> {
        self.session
            .share_token(created_at_ms as u64)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Replace the current state from a share token. Existing state
    /// survives a failed decode.
    pub fn load_share_token(&mut self, token: &str, now_ms: f64) -> Result<(), JsValue> {
        self.session
            .load_share_token(token, now_ms as u64)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Bounce the recording plus `cycles` repeats of the active layers and
    /// return WAV file bytes.
    pub fn export_wav(&self, cycles: u32) -> Result<Vec<u8>, JsValue> {
        let layers: Vec<Layer> = self.session.layers().cloned().collect();
        let samples = export::bounce_mix(
            self.session.recorded_notes(),
            &layers,
            cycles,
            looper::LOOP_CYCLE_MS,
            self.sample_rate,
        );
        let export = export_audio(&samples, self.sample_rate as u32, &[AudioFormat::Wav])
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(export.bytes)
    }
}
