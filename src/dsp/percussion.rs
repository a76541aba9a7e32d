//! Backing-beat percussion: kick, hi-hat, and a rotating bass line.
//!
//! All three are fire-and-forget one-shots, like the loop beeps.

use serde::{Deserialize, Serialize};

use super::envelope::GainEnvelope;
use super::filter::{BiquadFilter, FilterType, ParamSweep};
use super::oscillator::{NoiseSource, Oscillator, Waveform};

/// The bass line cycles through these frequencies, one per pulse.
pub const BASS_PATTERN: [f64; 4] = [80.0, 80.0, 100.0, 120.0];

/// Which backing-beat lane a pulse belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingSlot {
    /// Four-on-the-floor kick, every 500 ms.
    Kick,
    /// Offbeat hi-hat, every 250 ms.
    Hihat,
    /// Bass note from [`BASS_PATTERN`], every 2000 ms.
    Bass,
}

/// A kick drum: sine pitched down from 150 Hz to sub-audible over 0.5 s.
pub struct KickVoice {
    osc: Oscillator,
    pitch: ParamSweep,
    env: GainEnvelope,
}

impl KickVoice {
    pub fn new(sample_rate: f64) -> Self {
        KickVoice {
            osc: Oscillator::new(Waveform::Sine, 150.0, sample_rate),
            pitch: ParamSweep::new(sample_rate, 150.0).ramp_to(0.01, 0.5),
            env: GainEnvelope::burst(sample_rate, 1.0, 0.5),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        self.osc.frequency = self.pitch.next_value();
        self.osc.next_sample() * self.env.next_sample()
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_finished()
    }
}

/// A closed hi-hat: 100 ms of high-passed noise.
pub struct HihatVoice {
    noise: NoiseSource,
    filter: BiquadFilter,
    env: GainEnvelope,
}

impl HihatVoice {
    pub fn new(sample_rate: f64, seed: u32) -> Self {
        HihatVoice {
            noise: NoiseSource::new(seed),
            filter: BiquadFilter::new(FilterType::Highpass, 7000.0, 0.707, sample_rate),
            env: GainEnvelope::burst(sample_rate, 0.05, 0.1),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let s = self.filter.process(self.noise.next_sample());
        s * self.env.next_sample()
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_finished()
    }
}

/// A bass pluck: sawtooth through a 300 Hz lowpass, 0.4 s decay.
pub struct BassVoice {
    osc: Oscillator,
    filter: BiquadFilter,
    env: GainEnvelope,
}

impl BassVoice {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        BassVoice {
            osc: Oscillator::new(Waveform::Sawtooth, frequency, sample_rate),
            filter: BiquadFilter::new(FilterType::Lowpass, 300.0, 1.0, sample_rate),
            env: GainEnvelope::burst(sample_rate, 0.15, 0.4),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        self.filter.process(self.osc.next_sample()) * self.env.next_sample()
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44_100.0;

    #[test]
    fn kick_thumps_then_dies() {
        let mut kick = KickVoice::new(SR);
        let mut early_peak = 0.0_f64;
        for _ in 0..(0.1 * SR) as usize {
            early_peak = early_peak.max(kick.next_sample().abs());
        }
        assert!(early_peak > 0.3, "kick should thump, got {early_peak}");
        for _ in 0..(0.5 * SR) as usize {
            kick.next_sample();
        }
        assert!(kick.is_finished(), "kick should end after its 0.5s decay");
    }

    #[test]
    fn hihat_is_short() {
        let mut hat = HihatVoice::new(SR, 0xbeef);
        for _ in 0..(0.15 * SR) as usize {
            let s = hat.next_sample();
            assert!(s.abs() < 0.2, "hi-hat stays quiet, got {s}");
        }
        assert!(hat.is_finished(), "hi-hat should end after 100ms");
    }

    #[test]
    fn bass_decays_within_half_a_second() {
        let mut bass = BassVoice::new(BASS_PATTERN[0], SR);
        let mut audible = false;
        for _ in 0..(0.5 * SR) as usize {
            if bass.next_sample().abs() > 0.01 {
                audible = true;
            }
        }
        assert!(audible, "bass should produce sound");
        assert!(bass.is_finished(), "bass should end after its decay");
    }
}
