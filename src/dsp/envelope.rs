//! Gain envelopes shaped like WebAudio gain automation.
//!
//! The beep voices drive their layer gains with three shapes: linear attack
//! into a held peak that steps down to a sustain level, a one-shot attack
//! plus exponential decay, and an immediate burst decay for the noise
//! transient. Exponential segments bottom out at an audibility floor and
//! the envelope reports finished, so voices can be retired.

/// Level below which an exponential segment counts as silent.
const FLOOR: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    /// Linear ramp from 0 to the peak.
    Attack,
    /// Holding the peak until the settle instant.
    Hold,
    /// Holding the sustain level until released.
    Sustain,
    /// Exponential slide toward the floor (decay or release fade).
    Fade { multiplier: f64 },
    Finished,
}

/// A single gain automation lane.
#[derive(Debug, Clone)]
pub struct GainEnvelope {
    stage: Stage,
    level: f64,
    peak: f64,
    sustain: f64,
    sample_rate: f64,
    attack_samples: usize,
    hold_samples: usize,
    /// Decay to start once the attack completes (one-shot shape only).
    decay_after_attack_s: f64,
    position: usize,
}

impl GainEnvelope {
    /// Sustained shape: ramp to `peak` over `attack_s`, hold, step down to
    /// `sustain` at `settle_s` after the start, hold until released.
    pub fn attack_sustain(
        sample_rate: f64,
        peak: f64,
        sustain: f64,
        attack_s: f64,
        settle_s: f64,
    ) -> Self {
        let attack_samples = (attack_s * sample_rate) as usize;
        let settle_samples = (settle_s * sample_rate) as usize;
        GainEnvelope {
            stage: Stage::Attack,
            level: 0.0,
            peak,
            sustain,
            sample_rate,
            attack_samples,
            hold_samples: settle_samples.saturating_sub(attack_samples),
            decay_after_attack_s: 0.0,
            position: 0,
        }
    }

    /// One-shot shape: ramp to `peak` over `attack_s`, then exponential
    /// decay reaching the floor at `total_s` after the start.
    pub fn attack_decay(sample_rate: f64, peak: f64, attack_s: f64, total_s: f64) -> Self {
        GainEnvelope {
            stage: Stage::Attack,
            level: 0.0,
            peak,
            sustain: 0.0,
            sample_rate,
            attack_samples: (attack_s * sample_rate) as usize,
            hold_samples: 0,
            decay_after_attack_s: (total_s - attack_s).max(0.001),
            position: 0,
        }
    }

    /// Burst shape: start at `peak` immediately and decay to the floor over
    /// `decay_s`. Used for the noise transient.
    pub fn burst(sample_rate: f64, peak: f64, decay_s: f64) -> Self {
        let mut env = GainEnvelope {
            stage: Stage::Sustain,
            level: peak,
            peak,
            sustain: peak,
            sample_rate,
            attack_samples: 0,
            hold_samples: 0,
            decay_after_attack_s: 0.0,
            position: 0,
        };
        env.begin_fade(decay_s);
        env
    }

    /// Begin a release fade from the current level over `fade_s`.
    ///
    /// Idempotent: releasing an already-fading or finished envelope keeps
    /// the earlier fade.
    pub fn release(&mut self, fade_s: f64) {
        match self.stage {
            Stage::Fade { .. } | Stage::Finished => {}
            _ => self.begin_fade(fade_s),
        }
    }

    /// Next gain value in [0, peak].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Attack => {
                if self.attack_samples == 0 {
                    self.level = self.peak;
                } else {
                    let t = self.position as f64 / self.attack_samples as f64;
                    self.level = self.peak * t;
                }
                self.position += 1;
                if self.position >= self.attack_samples {
                    self.level = self.peak;
                    self.position = 0;
                    if self.decay_after_attack_s > 0.0 {
                        let decay = self.decay_after_attack_s;
                        self.decay_after_attack_s = 0.0;
                        self.begin_fade(decay);
                    } else if self.hold_samples > 0 {
                        self.stage = Stage::Hold;
                    } else {
                        self.level = self.sustain;
                        self.stage = Stage::Sustain;
                    }
                }
            }
            Stage::Hold => {
                self.level = self.peak;
                self.position += 1;
                if self.position >= self.hold_samples {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
            Stage::Fade { multiplier } => {
                self.level *= multiplier;
                if self.level <= FLOOR {
                    self.level = 0.0;
                    self.stage = Stage::Finished;
                }
            }
            Stage::Finished => {
                self.level = 0.0;
            }
        }
        self.level
    }

    /// Has the envelope faded out completely?
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    fn begin_fade(&mut self, fade_s: f64) {
        if self.level <= FLOOR {
            self.level = 0.0;
            self.stage = Stage::Finished;
            return;
        }
        let samples = (fade_s * self.sample_rate).max(1.0);
        // Exponential ramp: level * multiplier^samples == FLOOR.
        let multiplier = (FLOOR / self.level).powf(1.0 / samples);
        self.stage = Stage::Fade { multiplier };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44_100.0;

    fn run(env: &mut GainEnvelope, n: usize) -> f64 {
        let mut last = 0.0;
        for _ in 0..n {
            last = env.next_sample();
        }
        last
    }

    #[test]
    fn attack_reaches_peak_then_settles_to_sustain() {
        let mut env = GainEnvelope::attack_sustain(SR, 0.15, 0.10, 0.01, 0.15);

        let at_peak = run(&mut env, (0.012 * SR) as usize);
        assert!(
            (at_peak - 0.15).abs() < 0.01,
            "should be at peak after attack, got {at_peak}"
        );

        let settled = run(&mut env, (0.2 * SR) as usize);
        assert!(
            (settled - 0.10).abs() < 1e-9,
            "should hold sustain level, got {settled}"
        );
        assert!(!env.is_finished());
    }

    #[test]
    fn release_fades_to_silence() {
        let mut env = GainEnvelope::attack_sustain(SR, 0.15, 0.10, 0.01, 0.15);
        run(&mut env, (0.2 * SR) as usize);

        env.release(0.3);
        run(&mut env, (0.35 * SR) as usize);
        assert!(env.is_finished(), "0.3s fade should finish within 0.35s");
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn release_is_idempotent() {
        let mut env = GainEnvelope::attack_sustain(SR, 0.15, 0.10, 0.01, 0.15);
        run(&mut env, (0.2 * SR) as usize);
        env.release(0.3);
        let mid = run(&mut env, (0.1 * SR) as usize);
        env.release(0.3); // second release must not restart the fade
        let later = run(&mut env, 1);
        assert!(later < mid, "fade should keep descending, {later} vs {mid}");
    }

    #[test]
    fn release_during_attack_still_fades_out() {
        let mut env = GainEnvelope::attack_sustain(SR, 0.15, 0.10, 0.01, 0.15);
        run(&mut env, 100); // partway through the attack
        env.release(0.3);
        run(&mut env, (0.35 * SR) as usize);
        assert!(env.is_finished());
    }

    #[test]
    fn one_shot_self_terminates() {
        let mut env = GainEnvelope::attack_decay(SR, 0.12, 0.01, 0.4);
        run(&mut env, (0.45 * SR) as usize);
        assert!(env.is_finished(), "one-shot should finish after its decay");
    }

    #[test]
    fn burst_starts_loud_and_dies_fast() {
        let mut env = GainEnvelope::burst(SR, 0.15, 0.05);
        let first = env.next_sample();
        assert!(first > 0.1, "burst should start near peak, got {first}");
        run(&mut env, (0.06 * SR) as usize);
        assert!(env.is_finished(), "burst should finish after 50ms");
    }

    #[test]
    fn envelope_never_negative() {
        let mut env = GainEnvelope::attack_sustain(SR, 0.2, 0.12, 0.01, 0.15);
        for _ in 0..1000 {
            assert!(env.next_sample() >= 0.0);
        }
        env.release(0.3);
        for _ in 0..44_100 {
            assert!(env.next_sample() >= 0.0);
        }
    }
}
