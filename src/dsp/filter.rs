//! Biquad filter with WebAudio BiquadFilterNode coefficients, plus the
//! cutoff automation the beep voices sweep it with.

use std::f64::consts::PI;

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
}

/// A 2nd-order IIR filter (Direct Form II Transposed).
///
/// Coefficient formulas from the Audio EQ Cookbook, matching what a
/// BiquadFilterNode computes for the same parameters.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute coefficients from the current parameters.
    pub fn update_coefficients(&mut self) {
        let freq = self.frequency.clamp(10.0, self.sample_rate * 0.45);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Bandpass => {
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process one sample.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Set the cutoff/center frequency; coefficients refresh on next use.
    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }
}

/// Piecewise parameter automation: exponential ramps and stepped holds,
/// the two moves the beep voices make on their filter cutoffs (and the
/// kick on its pitch).
///
/// Breakpoints are absolute times from the voice start. Reading past the
/// last breakpoint holds the final value.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    sample_rate: f64,
    initial: f64,
    /// (end_sample, target_value, exponential?)
    points: Vec<(usize, f64, bool)>,
    position: usize,
}

impl ParamSweep {
    pub fn new(sample_rate: f64, initial: f64) -> Self {
        ParamSweep {
            sample_rate,
            initial,
            points: Vec::new(),
            position: 0,
        }
    }

    /// Exponential ramp to `value`, ending `at_s` after the voice start.
    pub fn ramp_to(mut self, value: f64, at_s: f64) -> Self {
        self.points.push(((at_s * self.sample_rate) as usize, value, true));
        self
    }

    /// Hold the previous value, then jump to `value` at `at_s`.
    pub fn step_to(mut self, value: f64, at_s: f64) -> Self {
        self.points.push(((at_s * self.sample_rate) as usize, value, false));
        self
    }

    /// Value at the current position, then advance one sample.
    pub fn next_value(&mut self) -> f64 {
        let v = self.value_at(self.position);
        self.position += 1;
        v
    }

    fn value_at(&self, pos: usize) -> f64 {
        let mut prev_sample = 0usize;
        let mut prev_value = self.initial;
        for &(end_sample, value, exponential) in &self.points {
            if pos < end_sample {
                if exponential && end_sample > prev_sample {
                    let t = (pos - prev_sample) as f64 / (end_sample - prev_sample) as f64;
                    return prev_value * (value / prev_value).powf(t);
                }
                return prev_value;
            }
            prev_sample = end_sample;
            prev_value = value;
        }
        prev_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 5000.0, 0.707, 44_100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "lowpass should pass DC, got {output}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(FilterType::Highpass, 1000.0, 0.707, 44_100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "highpass should block DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_frequencies() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 200.0, 0.707, 44_100.0);
        let freq = 10_000.0;
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44_100.0;
            let out = f.process((2.0 * PI * freq * t).sin());
            if i > 1000 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(max_out < 0.01, "lowpass@200Hz should kill 10kHz, got {max_out}");
    }

    #[test]
    fn output_stays_finite_under_impulses() {
        let mut f = BiquadFilter::new(FilterType::Bandpass, 2000.0, 8.0, 44_100.0);
        for i in 0..10_000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            assert!(f.process(input).is_finite(), "non-finite output at {i}");
        }
    }

    #[test]
    fn sweep_follows_ramp_then_step() {
        // The sustained-voice sweep: 300 → 3000 over 0.1s, settle 1500 at 0.2s.
        let mut sweep = ParamSweep::new(1000.0, 300.0)
            .ramp_to(3000.0, 0.1)
            .step_to(1500.0, 0.2);

        let start = sweep.next_value();
        assert!((start - 300.0).abs() < 1.0, "starts at 300, got {start}");

        // halfway through an exponential 300→3000 ramp: 300 * 10^0.5 ≈ 948.7
        let mut mid = 0.0;
        for _ in 0..50 {
            mid = sweep.next_value();
        }
        assert!((mid - 948.7).abs() < 20.0, "exp midpoint ≈ 948.7, got {mid}");

        // between 0.1s and 0.2s it holds the ramp target of 3000
        let mut end = 0.0;
        for _ in 0..51 {
            end = sweep.next_value();
        }
        assert_eq!(end, 3000.0, "holds ramp target after 0.1s");

        // after 0.2s it steps to 1500
        for _ in 0..98 {
            end = sweep.next_value();
        }
        assert_eq!(end, 3000.0, "still holding just before the step");
        for _ in 0..10 {
            end = sweep.next_value();
        }
        assert_eq!(end, 1500.0, "steps to sustain cutoff");
    }
}
