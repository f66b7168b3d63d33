//! Device-independent synthesis graph.
//!
//! ```text
//!  voices(A) + texture bed ─▶ gain A ─▶ reverb ─┐
//!                                               ├─▶ master ─▶ limiter ─▶ out
//!  voices(B) ─────────────▶ gain B ─▶ gate ─────┘
//! ```
//!
//! The graph owns its clock (seconds = rendered samples / sample rate). Bus
//! gains are automation curves on that clock; voices only read which bus they
//! belong to and never touch the gains.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dsp::{soft_limit, OnePoleLp, ParamCurve, Reverb, Smoother};
use super::voices::Voice;
use crate::params::AudioConfig;

/// White-noise amplitude before the texture low-pass.
const TEXTURE_NOISE_AMPLITUDE: f32 = 0.05;

/// Gate edge smoothing (seconds).
const GATE_SMOOTHING_S: f32 = 0.004;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusId {
    /// Soft, reverberant style.
    A,
    /// Dense, gated style.
    B,
}

struct TextureBed {
    rng: StdRng,
    low_pass: OnePoleLp,
    level: f32,
}

impl TextureBed {
    #[inline]
    fn next(&mut self) -> f32 {
        let white: f32 = self.rng.gen_range(-1.0..1.0);
        self.low_pass.process(white * TEXTURE_NOISE_AMPLITUDE) * self.level
    }
}

struct TranceGate {
    depth: f32,
    rate_hz: f32,
    phase: f32,
    smoother: Smoother,
}

impl TranceGate {
    #[inline]
    fn next(&mut self, sample_rate: f32) -> f32 {
        let closed = if self.phase >= 0.5 { self.depth } else { 0.0 };
        self.phase += self.rate_hz / sample_rate;
        self.phase -= self.phase.floor();
        self.smoother.next(1.0 - closed)
    }
}

pub struct SynthGraph {
    sample_rate: f32,
    rendered: u64,
    bus_time_constant: f32,
    voices_a: Vec<Voice>,
    voices_b: Vec<Voice>,
    gain_a: ParamCurve,
    gain_b: ParamCurve,
    reverb: Reverb,
    gate: TranceGate,
    texture: TextureBed,
    master_gain: f32,
    limiter_ceiling: f32,
}

impl SynthGraph {
    pub fn new(config: &AudioConfig, sample_rate: u32, seed: u64) -> Self {
        let sr = sample_rate.max(1) as f32;
        let (gain_a, gain_b) = config.initial_bus_gains;

        Self {
            sample_rate: sr,
            rendered: 0,
            bus_time_constant: config.bus_time_constant_s,
            voices_a: Vec::new(),
            voices_b: Vec::new(),
            gain_a: ParamCurve::new(gain_a),
            gain_b: ParamCurve::new(gain_b),
            reverb: Reverb::new(sr, 0.5),
            gate: TranceGate {
                depth: 0.0,
                rate_hz: 70.0 / 15.0,
                phase: 0.0,
                smoother: Smoother::new(1.0, GATE_SMOOTHING_S, sr),
            },
            texture: TextureBed {
                rng: StdRng::seed_from_u64(seed ^ 0x7e57_u64),
                low_pass: OnePoleLp::new(config.texture_cutoff_hz, sr),
                level: config.texture_level,
            },
            master_gain: config.master_gain,
            limiter_ceiling: config.limiter_ceiling,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Current clock position (seconds).
    pub fn now(&self) -> f64 {
        self.rendered as f64 / self.sample_rate as f64
    }

    pub fn add_voice(&mut self, bus: BusId, mut voice: Voice) {
        voice.prepare(self.sample_rate);
        match bus {
            BusId::A => self.voices_a.push(voice),
            BusId::B => self.voices_b.push(voice),
        }
    }

    pub fn voices(&self, bus: BusId) -> &[Voice] {
        match bus {
            BusId::A => &self.voices_a,
            BusId::B => &self.voices_b,
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices_a.len() + self.voices_b.len()
    }

    /// Glide a bus gain toward `target` starting now (smoothed, never a jump).
    pub fn set_bus_target(&mut self, bus: BusId, target: f32) {
        let now = self.now();
        let tau = self.bus_time_constant;
        let curve = match bus {
            BusId::A => &mut self.gain_a,
            BusId::B => &mut self.gain_b,
        };
        curve.set_target_at(target.clamp(0.0, 1.0), now, tau);
    }

    /// Bus gain at the current clock position.
    pub fn bus_gain(&self, bus: BusId) -> f32 {
        self.bus_gain_at(bus, self.now())
    }

    pub fn bus_gain_at(&self, bus: BusId, t: f64) -> f32 {
        match bus {
            BusId::A => self.gain_a.value_at(t),
            BusId::B => self.gain_b.value_at(t),
        }
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        self.reverb.set_mix(mix);
    }

    /// Trance-gate depth in [0,1] (0 leaves bus B open).
    pub fn set_gate_depth(&mut self, depth: f32) {
        self.gate.depth = depth.clamp(0.0, 1.0);
    }

    pub fn set_gate_rate(&mut self, rate_hz: f32) {
        if rate_hz.is_finite() && rate_hz > 0.0 {
            self.gate.rate_hz = rate_hz;
        }
    }

    pub fn gate_rate(&self) -> f32 {
        self.gate.rate_hz
    }

    /// Render one mono sample and advance the clock.
    pub fn next_sample(&mut self) -> f32 {
        let t = self.now();
        let sr = self.sample_rate;

        let mut bus_a = self.texture.next();
        for voice in &mut self.voices_a {
            bus_a += voice.render(t, sr);
        }
        let mut bus_b = 0.0;
        for voice in &mut self.voices_b {
            bus_b += voice.render(t, sr);
        }

        let a = self.reverb.process(bus_a * self.gain_a.value_at(t));
        let b = bus_b * self.gain_b.value_at(t) * self.gate.next(sr);

        self.rendered += 1;
        soft_limit((a + b) * self.master_gain, self.limiter_ceiling)
    }

    /// Fill an interleaved buffer, duplicating the mono signal to every channel.
    ///
    /// Finished voices are released at the end of the block.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let y = self.next_sample();
            for sample in frame.iter_mut() {
                *sample = y;
            }
        }
        self.release_finished();
    }

    fn release_finished(&mut self) {
        let now = self.now();
        self.voices_a.retain(|v| !v.is_finished(now));
        self.voices_b.retain(|v| !v.is_finished(now));
    }
}
