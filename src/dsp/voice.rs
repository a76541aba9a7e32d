//! Beep voices — the layered synth tone behind every key press.
//!
//! A sustained voice stacks five layers: a detuned sawtooth pair through a
//! swept resonant lowpass, a square an octave up through a bandpass, a sub
//! sine an octave down, and a short filtered noise burst for attack punch.
//! The one-shot variant (loop and recording playback) keeps only the first
//! sawtooth and the sub sine and decays by itself over 0.4 s.

use super::envelope::GainEnvelope;
use super::filter::{BiquadFilter, FilterType, ParamSweep};
use super::oscillator::{NoiseSource, Oscillator, Waveform};

/// Release fade applied when a sustained voice is let go.
pub const RELEASE_FADE_S: f64 = 0.3;
/// Fixed length of a one-shot beep.
pub const ONE_SHOT_S: f64 = 0.4;

enum Source {
    Osc(Oscillator),
    Noise(NoiseSource),
}

/// One oscillator-filter-gain strand of a voice.
struct ToneLayer {
    source: Source,
    filter: Option<BiquadFilter>,
    sweep: Option<ParamSweep>,
    env: GainEnvelope,
}

impl ToneLayer {
    fn next_sample(&mut self) -> f64 {
        if self.env.is_finished() {
            return 0.0;
        }
        let raw = match &mut self.source {
            Source::Osc(osc) => osc.next_sample(),
            Source::Noise(noise) => noise.next_sample(),
        };
        let filtered = match &mut self.filter {
            Some(filter) => {
                if let Some(sweep) = &mut self.sweep {
                    filter.set_frequency(sweep.next_value());
                }
                filter.process(raw)
            }
            None => raw,
        };
        filtered * self.env.next_sample()
    }
}

/// A playing beep, sustained or one-shot.
pub struct BeepVoice {
    layers: Vec<ToneLayer>,
}

impl BeepVoice {
    /// Full five-layer stack that holds until `release` is called.
    pub fn sustained(frequency: f64, sample_rate: f64, noise_seed: u32) -> Self {
        let swept_lowpass = || {
            (
                BiquadFilter::new(FilterType::Lowpass, 300.0, 8.0, sample_rate),
                ParamSweep::new(sample_rate, 300.0)
                    .ramp_to(3000.0, 0.1)
                    .step_to(1500.0, 0.2),
            )
        };

        let (saw_up_filter, saw_up_sweep) = swept_lowpass();
        let (saw_down_filter, saw_down_sweep) = swept_lowpass();

        let layers = vec![
            ToneLayer {
                source: Source::Osc(
                    Oscillator::new(Waveform::Sawtooth, frequency, sample_rate).detuned(5.0),
                ),
                filter: Some(saw_up_filter),
                sweep: Some(saw_up_sweep),
                env: GainEnvelope::attack_sustain(sample_rate, 0.15, 0.10, 0.01, 0.15),
            },
            ToneLayer {
                source: Source::Osc(
                    Oscillator::new(Waveform::Sawtooth, frequency, sample_rate).detuned(-5.0),
                ),
                filter: Some(saw_down_filter),
                sweep: Some(saw_down_sweep),
                env: GainEnvelope::attack_sustain(sample_rate, 0.15, 0.10, 0.01, 0.15),
            },
            ToneLayer {
                source: Source::Osc(Oscillator::new(
                    Waveform::Square,
                    frequency * 2.0,
                    sample_rate,
                )),
                filter: Some(BiquadFilter::new(FilterType::Bandpass, 2000.0, 2.0, sample_rate)),
                sweep: None,
                env: GainEnvelope::attack_sustain(sample_rate, 0.08, 0.05, 0.01, 0.10),
            },
            ToneLayer {
                source: Source::Osc(Oscillator::new(
                    Waveform::Sine,
                    frequency * 0.5,
                    sample_rate,
                )),
                filter: None,
                sweep: None,
                env: GainEnvelope::attack_sustain(sample_rate, 0.20, 0.12, 0.01, 0.15),
            },
            // attack transient: 50ms of noise around the 4th harmonic
            ToneLayer {
                source: Source::Noise(NoiseSource::new(noise_seed)),
                filter: Some(BiquadFilter::new(
                    FilterType::Bandpass,
                    frequency * 4.0,
                    5.0,
                    sample_rate,
                )),
                sweep: None,
                env: GainEnvelope::burst(sample_rate, 0.15, 0.05),
            },
        ];

        BeepVoice { layers }
    }

    /// Two-layer fire-and-forget beep with a fixed 0.4 s decay.
    pub fn one_shot(frequency: f64, sample_rate: f64) -> Self {
        let layers = vec![
            ToneLayer {
                source: Source::Osc(
                    Oscillator::new(Waveform::Sawtooth, frequency, sample_rate).detuned(5.0),
                ),
                filter: Some(BiquadFilter::new(FilterType::Lowpass, 300.0, 8.0, sample_rate)),
                sweep: Some(
                    ParamSweep::new(sample_rate, 300.0)
                        .ramp_to(2500.0, 0.1)
                        .ramp_to(800.0, ONE_SHOT_S),
                ),
                env: GainEnvelope::attack_decay(sample_rate, 0.12, 0.01, ONE_SHOT_S),
            },
            ToneLayer {
                source: Source::Osc(Oscillator::new(
                    Waveform::Sine,
                    frequency * 0.5,
                    sample_rate,
                )),
                filter: None,
                sweep: None,
                env: GainEnvelope::attack_decay(sample_rate, 0.15, 0.01, ONE_SHOT_S),
            },
        ];
        BeepVoice { layers }
    }

    /// Sum of all live layers for the next sample.
    pub fn next_sample(&mut self) -> f64 {
        self.layers.iter_mut().map(ToneLayer::next_sample).sum()
    }

    /// Start the release fade on every layer. Idempotent; a no-op on a
    /// one-shot whose layers are already decaying.
    pub fn release(&mut self) {
        for layer in &mut self.layers {
            layer.env.release(RELEASE_FADE_S);
        }
    }

    /// All layers faded out?
    pub fn is_finished(&self) -> bool {
        self.layers.iter().all(|l| l.env.is_finished())
    }
}
