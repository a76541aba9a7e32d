//! Tone engine — owns every live voice and the shared output bus.
//!
//! The host pulls mono f32 blocks with [`ToneEngine::process`]; voices are
//! retired as their envelopes finish. Sustained beeps also feed the shared
//! delay send, which echoes on the bus after they stop. Voice ids are
//! monotonically increasing and double as the generation tokens the voice
//! registry uses for its stale-fade guard.

use super::delay::DelaySend;
use super::percussion::{BassVoice, HihatVoice, KickVoice};
use super::voice::{BeepVoice, ONE_SHOT_S};

/// Handle to a live (or once-live) voice. Never reused.
pub type VoiceId = u64;

/// Shared delay send: 125 ms, 0.3 wet, 0.4 feedback.
const DELAY_S: f64 = 0.125;
const DELAY_WET: f64 = 0.3;
const DELAY_FEEDBACK: f64 = 0.4;

enum ActiveVoice {
    Beep(BeepVoice),
    Kick(KickVoice),
    Hihat(HihatVoice),
    Bass(BassVoice),
}

impl ActiveVoice {
    fn next_sample(&mut self) -> f64 {
        match self {
            ActiveVoice::Beep(v) => v.next_sample(),
            ActiveVoice::Kick(v) => v.next_sample(),
            ActiveVoice::Hihat(v) => v.next_sample(),
            ActiveVoice::Bass(v) => v.next_sample(),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            ActiveVoice::Beep(v) => v.is_finished(),
            ActiveVoice::Kick(v) => v.is_finished(),
            ActiveVoice::Hihat(v) => v.is_finished(),
            ActiveVoice::Bass(v) => v.is_finished(),
        }
    }
}

struct VoiceSlot {
    id: VoiceId,
    voice: ActiveVoice,
    /// Only sustained beeps feed the delay send.
    sends_delay: bool,
}

/// The audio bus: voice pool, delay send, master gain, soft-clipped output.
pub struct ToneEngine {
    sample_rate: f64,
    voices: Vec<VoiceSlot>,
    next_voice_id: VoiceId,
    delay: DelaySend,
    master_gain: f64,
    noise_seed: u32,
}

impl ToneEngine {
    pub fn new(sample_rate: f64) -> Self {
        ToneEngine {
            sample_rate,
            voices: Vec::new(),
            next_voice_id: 1,
            delay: DelaySend::new(sample_rate, DELAY_S, DELAY_WET, DELAY_FEEDBACK),
            master_gain: 1.0,
            noise_seed: 0x1234_5678,
        }
    }

    /// Start a sustained beep; the returned id is released or killed later.
    pub fn start_sustained(&mut self, frequency: f64) -> VoiceId {
        let id = self.alloc_id();
        let seed = self.next_noise_seed();
        self.voices.push(VoiceSlot {
            id,
            voice: ActiveVoice::Beep(BeepVoice::sustained(frequency, self.sample_rate, seed)),
            sends_delay: true,
        });
        id
    }

    /// Fire a self-terminating beep. No handle is retained.
    pub fn trigger_one_shot(&mut self, frequency: f64) {
        let id = self.alloc_id();
        self.voices.push(VoiceSlot {
            id,
            voice: ActiveVoice::Beep(BeepVoice::one_shot(frequency, self.sample_rate)),
            sends_delay: false,
        });
    }

    pub fn trigger_kick(&mut self) {
        let id = self.alloc_id();
        self.voices.push(VoiceSlot {
            id,
            voice: ActiveVoice::Kick(KickVoice::new(self.sample_rate)),
            sends_delay: false,
        });
    }

    pub fn trigger_hihat(&mut self) {
        let id = self.alloc_id();
        let seed = self.next_noise_seed();
        self.voices.push(VoiceSlot {
            id,
            voice: ActiveVoice::Hihat(HihatVoice::new(self.sample_rate, seed)),
            sends_delay: false,
        });
    }

    pub fn trigger_bass(&mut self, frequency: f64) {
        let id = self.alloc_id();
        self.voices.push(VoiceSlot {
            id,
            voice: ActiveVoice::Bass(BassVoice::new(frequency, self.sample_rate)),
            sends_delay: false,
        });
    }

    /// Begin the release fade for a voice. Unknown or already-fading ids
    /// are a no-op, so double releases and releases of superseded voices
    /// are safe.
    pub fn release(&mut self, id: VoiceId) {
        if let Some(slot) = self.voices.iter_mut().find(|s| s.id == id)
            && let ActiveVoice::Beep(voice) = &mut slot.voice
        {
            voice.release();
        }
    }

    /// Stop a voice immediately, outside any fade. Unknown ids are a no-op.
    pub fn kill(&mut self, id: VoiceId) {
        self.voices.retain(|s| s.id != id);
    }

    /// Is this voice still in the pool (sounding or fading)?
    pub fn is_live(&self, id: VoiceId) -> bool {
        self.voices.iter().any(|s| s.id == id)
    }

    /// Number of live voices.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Render the next block of mono samples into `out`, overwriting it.
    pub fn process(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            let mut dry = 0.0;
            let mut send = 0.0;
            for slot in &mut self.voices {
                let s = slot.voice.next_sample();
                dry += s;
                if slot.sends_delay {
                    send += s;
                }
            }
            let wet = self.delay.process(send);
            *sample = soft_clip((dry + wet) * self.master_gain) as f32;
        }
        self.voices.retain(|s| !s.voice.is_finished());
    }

    /// No voices and nothing left in the delay line?
    pub fn is_quiet(&self) -> bool {
        self.voices.is_empty() && self.delay.is_quiet()
    }

    /// Render a single one-shot beep offline (0.45 s: the 0.4 s beep plus
    /// its envelope floor tail). Used for AudioWorklet priming and export.
    pub fn render_one_shot(frequency: f64, sample_rate: f64) -> Vec<f32> {
        let mut engine = ToneEngine::new(sample_rate);
        engine.trigger_one_shot(frequency);
        let mut out = vec![0.0_f32; ((ONE_SHOT_S + 0.05) * sample_rate) as usize];
        engine.process(&mut out);
        out
    }

    fn alloc_id(&mut self) -> VoiceId {
        let id = self.next_voice_id;
        self.next_voice_id += 1;
        id
    }

    fn next_noise_seed(&mut self) -> u32 {
        self.noise_seed = self.noise_seed.wrapping_mul(747_796_405).wrapping_add(1);
        self.noise_seed
    }
}

/// tanh soft clipper, keeps stacked voices from hard-clipping the bus.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44_100.0;

    fn render(engine: &mut ToneEngine, seconds: f64) -> Vec<f32> {
        let mut out = vec![0.0_f32; (seconds * SR) as usize];
        engine.process(&mut out);
        out
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()))
    }

    #[test]
    fn voice_ids_are_monotonic_and_never_reused() {
        let mut engine = ToneEngine::new(SR);
        let a = engine.start_sustained(440.0);
        let b = engine.start_sustained(523.25);
        engine.kill(a);
        let c = engine.start_sustained(659.25);
        assert!(a < b && b < c, "ids must increase: {a} {b} {c}");
    }

    #[test]
    fn sustained_voice_sounds_until_released() {
        let mut engine = ToneEngine::new(SR);
        let id = engine.start_sustained(523.25);

        let early = render(&mut engine, 0.3);
        assert!(peak(&early) > 0.05, "sustained voice should be audible");
        assert!(engine.is_live(id));

        engine.release(id);
        render(&mut engine, 0.4);
        assert!(!engine.is_live(id), "voice should retire after its fade");
    }

    #[test]
    fn one_shot_retires_itself() {
        let mut engine = ToneEngine::new(SR);
        engine.trigger_one_shot(659.25);
        assert_eq!(engine.voice_count(), 1);
        render(&mut engine, 0.5);
        assert_eq!(engine.voice_count(), 0, "one-shot should have retired");
    }

    #[test]
    fn kill_is_immediate_and_idempotent() {
        let mut engine = ToneEngine::new(SR);
        let id = engine.start_sustained(440.0);
        engine.kill(id);
        assert!(!engine.is_live(id));
        engine.kill(id);
        engine.release(id); // both safe on a dead id
    }

    #[test]
    fn output_is_bounded_with_many_voices() {
        let mut engine = ToneEngine::new(SR);
        for _ in 0..8 {
            engine.start_sustained(523.25);
            engine.trigger_one_shot(659.25);
        }
        engine.trigger_kick();
        engine.trigger_hihat();
        engine.trigger_bass(80.0);
        let out = render(&mut engine, 0.2);
        assert!(peak(&out) <= 1.0, "soft clip must bound the bus, got {}", peak(&out));
    }

    #[test]
    fn offline_one_shot_render_is_nonsilent_and_sized() {
        let samples = ToneEngine::render_one_shot(523.25, SR);
        assert_eq!(samples.len(), (0.45 * SR) as usize);
        assert!(peak(&samples) > 0.02, "offline beep should be audible");
    }

    #[test]
    fn delay_tail_rings_after_release() {
        let mut engine = ToneEngine::new(SR);
        let id = engine.start_sustained(523.25);
        render(&mut engine, 0.3);
        engine.release(id);
        render(&mut engine, 0.4);
        // voice is gone but the send line still carries its echo
        assert_eq!(engine.voice_count(), 0);
        assert!(!engine.is_quiet(), "delay line should still ring");
    }
}
