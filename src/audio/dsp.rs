//! Small DSP building blocks for the synth graph.
//!
//! Contents
//! - `Osc`        : phase-accumulator oscillator (sine / triangle / saw / square)
//! - `LowPass`    : TPT state-variable low-pass with resonance
//! - `OnePoleLp`  : RC-style one-pole low-pass (noise shaping)
//! - `Smoother`   : one-pole parameter smoother
//! - `ParamCurve` : sample-accurate parameter automation timeline
//! - `Reverb`     : Schroeder-style diffuser/comb reverb
//!
//! Times are in seconds (f64 for absolute clock positions), frequencies in Hz.

use std::f32::consts::PI;

pub const TAU: f32 = 2.0 * PI;

/// Values below this magnitude are flushed to zero.
const DENORMAL_FLOOR: f32 = 1.0e-20;

#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < DENORMAL_FLOOR {
        0.0
    } else {
        x
    }
}

/// Frequency ratio of a detune in cents.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    2f32.powf(cents / 1200.0)
}

/// Tanh soft limiter approaching `±ceiling`.
#[inline]
pub fn soft_limit(x: f32, ceiling: f32) -> f32 {
    let ceiling = ceiling.max(1.0e-3);
    ceiling * (x / ceiling).tanh()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Saw,
    Square,
}

/// Phase-accumulator oscillator. Phase is kept in [0, 1).
#[derive(Debug, Clone, Copy)]
pub struct Osc {
    pub wave: Waveform,
    phase: f32,
}

impl Osc {
    pub fn new(wave: Waveform) -> Self {
        Self { wave, phase: 0.0 }
    }

    /// Emit one sample at `freq_hz` and advance the phase.
    #[inline]
    pub fn next(&mut self, freq_hz: f32, sample_rate: f32) -> f32 {
        let p = self.phase;
        let y = match self.wave {
            Waveform::Sine => (TAU * p).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Saw => 2.0 * p - 1.0,
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        };

        self.phase += freq_hz / sample_rate.max(1.0);
        self.phase -= self.phase.floor();
        y
    }
}

/// TPT state-variable low-pass: `g = tan(π fc / sr)`, `R = 1 / (2Q)`.
#[derive(Debug, Clone, Copy)]
pub struct LowPass {
    sample_rate: f32,
    cutoff: f32,
    q: f32,
    g: f32,
    r: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl LowPass {
    pub fn new(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            sample_rate: sample_rate.max(1.0),
            cutoff: 0.0,
            q: q.max(1.0e-4),
            g: 0.0,
            r: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        filter.set_cutoff(cutoff_hz);
        filter
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Retune. Changes smaller than a tenth of a hertz are ignored.
    #[inline]
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        let nyquist_guard = 0.49 * self.sample_rate;
        let cutoff = cutoff_hz.clamp(10.0, nyquist_guard);
        if (cutoff - self.cutoff).abs() < 0.1 {
            return;
        }
        self.cutoff = cutoff;
        self.g = (PI * cutoff / self.sample_rate).tan();
        self.r = 1.0 / (2.0 * self.q);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let v0 = x - self.r * self.ic1eq - self.ic2eq;
        let v1 = self.g * v0 + self.ic1eq;
        let v2 = self.g * v1 + self.ic2eq;
        self.ic1eq = kill_denormals(self.g * v0 + v1);
        self.ic2eq = kill_denormals(self.g * v1 + v2);
        v2
    }
}

/// One-pole low-pass `y += a (x - y)` with `a = 1 - exp(-2π fc / sr)`.
#[derive(Debug, Clone, Copy)]
pub struct OnePoleLp {
    a: f32,
    y: f32,
}

impl OnePoleLp {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        let fc = cutoff_hz.clamp(0.0, 0.499 * sample_rate.max(1.0));
        Self {
            a: 1.0 - (-TAU * fc / sample_rate.max(1.0)).exp(),
            y: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.a * (x - self.y);
        self.y = kill_denormals(self.y);
        self.y
    }
}

/// One-pole smoother toward a moving target with time constant `tau`.
#[derive(Debug, Clone, Copy)]
pub struct Smoother {
    coeff: f32,
    value: f32,
}

impl Smoother {
    pub fn new(initial: f32, tau_s: f32, sample_rate: f32) -> Self {
        let coeff = if tau_s <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / (tau_s * sample_rate.max(1.0))).exp()
        };
        Self {
            coeff,
            value: initial,
        }
    }

    #[inline]
    pub fn next(&mut self, target: f32) -> f32 {
        self.value += self.coeff * (target - self.value);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    Set { time: f64, value: f32 },
    Linear { time: f64, value: f32 },
    Exponential { time: f64, value: f32 },
    Target { time: f64, target: f32, tau: f32 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::Set { time, .. }
            | Automation::Linear { time, .. }
            | Automation::Exponential { time, .. }
            | Automation::Target { time, .. } => time,
        }
    }
}

/// Parameter automation timeline evaluated at absolute clock times.
///
/// Ramps run from the time and value of the preceding event to their own end
/// time. A set-target approach runs until the next event begins. Exponential
/// ramps between values of different sign (or touching zero) fall back to a
/// linear ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamCurve {
    initial: f32,
    origin: f64,
    events: Vec<Automation>,
}

impl ParamCurve {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            origin: 0.0,
            events: Vec::new(),
        }
    }

    pub fn set_value_at(&mut self, value: f32, time: f64) -> &mut Self {
        self.push(Automation::Set { time, value })
    }

    pub fn linear_ramp_to(&mut self, value: f32, end_time: f64) -> &mut Self {
        self.push(Automation::Linear {
            time: end_time,
            value,
        })
    }

    pub fn exponential_ramp_to(&mut self, value: f32, end_time: f64) -> &mut Self {
        self.push(Automation::Exponential {
            time: end_time,
            value,
        })
    }

    /// Approach `target` exponentially from `start` with time constant `tau_s`.
    ///
    /// Events already finished by `start` are folded into the curve's base value
    /// first, so repeated retargeting keeps the timeline bounded.
    pub fn set_target_at(&mut self, target: f32, start: f64, tau_s: f32) -> &mut Self {
        self.collapse_before(start);
        self.push(Automation::Target {
            time: start,
            target,
            tau: tau_s.max(1.0e-4),
        })
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut prev_time = self.origin;
        let mut prev_value = self.initial;
        let mut approach: Option<(f64, f32, f32)> = None;

        for event in &self.events {
            let time = event.time();

            if let Some((start, target, tau)) = approach.take() {
                if t < time {
                    return settle(prev_value, target, tau, t - start);
                }
                prev_value = settle(prev_value, target, tau, time - start);
                prev_time = time;
            }

            match *event {
                Automation::Set { time, value } => {
                    if t < time {
                        return prev_value;
                    }
                    prev_value = value;
                    prev_time = time;
                }
                Automation::Linear { time, value } => {
                    if t < time {
                        return lerp_segment(prev_time, prev_value, time, value, t);
                    }
                    prev_value = value;
                    prev_time = time;
                }
                Automation::Exponential { time, value } => {
                    if t < time {
                        return exp_segment(prev_time, prev_value, time, value, t);
                    }
                    prev_value = value;
                    prev_time = time;
                }
                Automation::Target { time, target, tau } => {
                    if t < time {
                        return prev_value;
                    }
                    approach = Some((time, target, tau));
                    prev_time = time;
                }
            }
        }

        match approach {
            Some((start, target, tau)) => settle(prev_value, target, tau, t - start),
            None => prev_value,
        }
    }

    fn push(&mut self, event: Automation) -> &mut Self {
        // Keep events ordered by time; equal times keep insertion order.
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
        self
    }

    fn collapse_before(&mut self, now: f64) {
        if self.events.iter().any(|e| e.time() > now) {
            return;
        }
        let value = self.value_at(now);
        let active = match self.events.last() {
            Some(&Automation::Target { target, tau, .. }) => Some((target, tau)),
            _ => None,
        };
        self.events.clear();
        self.initial = value;
        self.origin = now;
        if let Some((target, tau)) = active {
            // Exponential approach is memoryless, so restarting it at `now` is exact.
            self.events.push(Automation::Target {
                time: now,
                target,
                tau,
            });
        }
    }
}

#[inline]
fn settle(from: f32, target: f32, tau: f32, dt: f64) -> f32 {
    let dt = dt.max(0.0) as f32;
    target + (from - target) * (-dt / tau).exp()
}

#[inline]
fn lerp_segment(t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    let span = t1 - t0;
    if span <= 0.0 {
        return v1;
    }
    let frac = ((t - t0) / span).clamp(0.0, 1.0) as f32;
    v0 + (v1 - v0) * frac
}

#[inline]
fn exp_segment(t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    if v0 * v1 <= 0.0 {
        return lerp_segment(t0, v0, t1, v1, t);
    }
    let span = t1 - t0;
    if span <= 0.0 {
        return v1;
    }
    let frac = ((t - t0) / span).clamp(0.0, 1.0) as f32;
    v0 * (v1 / v0).powf(frac)
}

struct DelayLine {
    buf: Vec<f32>,
    index: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn read(&self) -> f32 {
        self.buf[self.index]
    }

    #[inline]
    fn write_advance(&mut self, x: f32) {
        self.buf[self.index] = x;
        self.index += 1;
        if self.index >= self.buf.len() {
            self.index = 0;
        }
    }
}

struct Allpass {
    line: DelayLine,
    g: f32,
}

impl Allpass {
    fn new(len: usize, g: f32) -> Self {
        Self {
            line: DelayLine::new(len),
            g,
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let z = self.line.read();
        let y = z - self.g * x;
        self.line.write_advance(x + self.g * y);
        kill_denormals(y)
    }
}

struct DampedComb {
    line: DelayLine,
    feedback: f32,
    damp: OnePoleLp,
}

impl DampedComb {
    fn new(len: usize, feedback: f32, damp_hz: f32, sample_rate: f32) -> Self {
        Self {
            line: DelayLine::new(len),
            feedback,
            damp: OnePoleLp::new(damp_hz, sample_rate),
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let z = self.line.read();
        let damped = self.damp.process(z);
        self.line.write_advance(x + self.feedback * damped);
        kill_denormals(z)
    }
}

/// Mono reverb: two diffusing all-passes, four damped combs, two all-passes.
pub struct Reverb {
    pre: [Allpass; 2],
    combs: [DampedComb; 4],
    post: [Allpass; 2],
    mix: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32, mix: f32) -> Self {
        let scale = sample_rate.max(1.0) / 48_000.0;
        let len = |samples: f32| (samples * scale) as usize;
        let feedback = 0.82;
        let damp_hz = 6000.0;

        Self {
            pre: [Allpass::new(len(641.0), 0.72), Allpass::new(len(997.0), 0.70)],
            combs: [
                DampedComb::new(len(7789.0), feedback, damp_hz, sample_rate),
                DampedComb::new(len(8513.0), feedback, damp_hz, sample_rate),
                DampedComb::new(len(9449.0), feedback, damp_hz, sample_rate),
                DampedComb::new(len(10867.0), feedback, damp_hz, sample_rate),
            ],
            post: [Allpass::new(len(579.0), 0.65), Allpass::new(len(773.0), 0.61)],
            mix: mix.clamp(0.0, 1.0),
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let mut diffused = x;
        for ap in &mut self.pre {
            diffused = ap.process(diffused);
        }
        let mut tank = 0.0;
        for comb in &mut self.combs {
            tank += comb.process(diffused);
        }
        let mut wet = 0.25 * tank;
        for ap in &mut self.post {
            wet = ap.process(wet);
        }
        kill_denormals((1.0 - self.mix) * x + self.mix * wet)
    }
}
