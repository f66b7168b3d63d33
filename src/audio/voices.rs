//! Note voice recipes.
//!
//! Each recipe builds a self-contained `Voice`: oscillators, an optional
//! low-pass with its cutoff automation, and an amplitude envelope, all
//! scheduled on the graph clock. A voice renders silence outside
//! `[start, stop)` and the graph drops it once the clock passes `stop`.

use super::dsp::{cents_to_ratio, LowPass, Osc, ParamCurve, Waveform};
use crate::params::SoundParameters;

/// Amplitude floor that exponential releases decay toward.
pub const SILENCE: f32 = 0.0001;

/// Extra time after the release before oscillators stop.
pub const STOP_PAD_S: f64 = 0.1;

/// Detune spread of the stacked style-B voice (cents).
pub const STACK_DETUNE_CENTS: [f32; 7] = [-30.0, -20.0, -10.0, 0.0, 10.0, 20.0, 30.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    StyleA,
    /// Quieter, more resonant style-A echo.
    StyleATexture,
    StyleB,
    /// Shorter style-B note used by arpeggio echoes.
    StyleBArp,
    Kick,
    Pad,
}

/// Attack-decay-sustain-release shape with absolute levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub peak: f32,
}

impl Envelope {
    /// Seconds from start until the release reaches the silence floor.
    pub fn lifetime(&self) -> f64 {
        (self.attack + self.decay + self.release) as f64
    }

    /// `0 → peak` linear, `→ sustain` exponential, `→ SILENCE` exponential.
    fn schedule(&self, start: f64) -> ParamCurve {
        let attack_end = start + self.attack as f64;
        let decay_end = attack_end + self.decay as f64;
        let mut curve = ParamCurve::new(0.0);
        curve
            .set_value_at(0.0, start)
            .linear_ramp_to(self.peak, attack_end)
            .exponential_ramp_to(self.sustain.min(self.peak), decay_end)
            .exponential_ramp_to(SILENCE, decay_end + self.release as f64);
        curve
    }
}

struct Partial {
    osc: Osc,
    freq: ParamCurve,
    gain: f32,
}

struct Filter {
    low_pass: LowPass,
    cutoff: ParamCurve,
}

/// One scheduled note.
pub struct Voice {
    kind: VoiceKind,
    frequency: f32,
    partials: Vec<Partial>,
    filter: Option<Filter>,
    amp: ParamCurve,
    peak: f32,
    start: f64,
    stop: f64,
}

impl Voice {
    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    /// Fundamental the voice was triggered with (Hz).
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn start_time(&self) -> f64 {
        self.start
    }

    pub fn stop_time(&self) -> f64 {
        self.stop
    }

    /// Largest value the amplitude envelope reaches.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Amplitude envelope value at clock time `t` (0 outside the voice's life).
    pub fn envelope_at(&self, t: f64) -> f32 {
        if t < self.start || t >= self.stop {
            0.0
        } else {
            self.amp.value_at(t)
        }
    }

    pub fn is_finished(&self, t: f64) -> bool {
        t >= self.stop
    }

    /// Re-derive filter coefficients for the graph's actual sample rate.
    pub(crate) fn prepare(&mut self, sample_rate: f32) {
        if let Some(filter) = &mut self.filter {
            let cutoff = filter.cutoff.value_at(self.start);
            let q = filter.low_pass.q();
            filter.low_pass = LowPass::new(cutoff, q, sample_rate);
        }
    }

    /// Render one sample at clock time `t`.
    pub fn render(&mut self, t: f64, sample_rate: f32) -> f32 {
        if t < self.start || t >= self.stop {
            return 0.0;
        }

        let mut sum = 0.0;
        for partial in &mut self.partials {
            let f = partial.freq.value_at(t);
            sum += partial.osc.next(f, sample_rate) * partial.gain;
        }

        if let Some(filter) = &mut self.filter {
            filter.low_pass.set_cutoff(filter.cutoff.value_at(t));
            sum = filter.low_pass.process(sum);
        }

        sum * self.amp.value_at(t)
    }
}

fn steady(freq: f32, start: f64) -> ParamCurve {
    let mut curve = ParamCurve::new(freq);
    curve.set_value_at(freq, start);
    curve
}

fn partial(wave: Waveform, freq: ParamCurve, gain: f32) -> Partial {
    Partial {
        osc: Osc::new(wave),
        freq,
        gain,
    }
}

pub fn style_a_envelope(sound: &SoundParameters, texture: bool) -> Envelope {
    Envelope {
        attack: if texture { 0.02 } else { 0.01 },
        decay: 0.3,
        sustain: if texture { 0.02 } else { 0.05 },
        release: sound.release(),
        peak: if texture { 0.03 } else { 0.08 },
    }
}

pub fn style_b_envelope(arp: bool) -> Envelope {
    Envelope {
        attack: if arp { 0.01 } else { 0.02 },
        decay: 0.1,
        sustain: if arp { 0.1 } else { 0.3 },
        release: if arp { 0.3 } else { 1.5 },
        peak: if arp { 0.15 } else { 0.25 },
    }
}

pub fn pad_envelope(sound: &SoundParameters, level: f32) -> Envelope {
    Envelope {
        attack: sound.pad_attack(),
        decay: 0.0,
        sustain: 0.04 * level,
        release: 8.0,
        peak: 0.04 * level,
    }
}

/// Soft sine + triangle pair through a closing low-pass.
pub fn style_a(freq: f32, start: f64, sound: &SoundParameters, texture: bool) -> Voice {
    let env = style_a_envelope(sound, texture);
    let q = if texture { 8.0 } else { 1.5 };
    let cutoff_hz = sound.style_a_cutoff();

    let mut cutoff = steady(cutoff_hz, start);
    cutoff.exponential_ramp_to(100.0, start + sound.filter_decay() as f64);

    Voice {
        kind: if texture {
            VoiceKind::StyleATexture
        } else {
            VoiceKind::StyleA
        },
        frequency: freq,
        partials: vec![
            partial(Waveform::Sine, steady(freq, start), 1.0),
            partial(Waveform::Triangle, steady(freq * 1.002, start), 1.0),
        ],
        filter: Some(Filter {
            low_pass: LowPass::new(cutoff_hz, q, 44_100.0),
            cutoff,
        }),
        amp: env.schedule(start),
        peak: env.peak,
        start,
        stop: start + env.lifetime() + STOP_PAD_S,
    }
}

/// Seven detuned saws summed into a bright low-pass.
pub fn style_b(freq: f32, start: f64, sound: &SoundParameters, arp: bool) -> Voice {
    let env = style_b_envelope(arp);
    let cutoff_hz = sound.style_b_cutoff();

    let partials = STACK_DETUNE_CENTS
        .iter()
        .map(|&cents| partial(Waveform::Saw, steady(freq * cents_to_ratio(cents), start), 0.15))
        .collect();

    Voice {
        kind: if arp {
            VoiceKind::StyleBArp
        } else {
            VoiceKind::StyleB
        },
        frequency: freq,
        partials,
        filter: Some(Filter {
            low_pass: LowPass::new(cutoff_hz, 2.0, 44_100.0),
            cutoff: steady(cutoff_hz, start),
        }),
        amp: env.schedule(start),
        peak: env.peak,
        start,
        stop: start + env.lifetime() + STOP_PAD_S,
    }
}

/// Sine with a 150 → 40 Hz pitch drop.
pub fn kick(start: f64) -> Voice {
    let mut freq = steady(150.0, start);
    freq.exponential_ramp_to(40.0, start + 0.1);

    let mut amp = ParamCurve::new(0.0);
    amp.set_value_at(0.5, start)
        .exponential_ramp_to(SILENCE, start + 0.3);

    Voice {
        kind: VoiceKind::Kick,
        frequency: 150.0,
        partials: vec![partial(Waveform::Sine, freq, 1.0)],
        filter: None,
        amp,
        peak: 0.5,
        start,
        stop: start + 0.35,
    }
}

/// Saw + slightly sharp triangle + octave sine under a slow downward sweep.
///
/// `level` in (0, 1] scales the envelope (used for ducking).
pub fn pad(freq: f32, start: f64, sound: &SoundParameters, level: f32) -> Voice {
    let env = pad_envelope(sound, level.clamp(0.05, 1.0));

    let mut cutoff = steady(800.0, start);
    cutoff.linear_ramp_to(400.0, start + 5.0);

    Voice {
        kind: VoiceKind::Pad,
        frequency: freq,
        partials: vec![
            partial(Waveform::Saw, steady(freq, start), 1.0),
            partial(Waveform::Triangle, steady(freq * 1.005, start), 1.0),
            partial(Waveform::Sine, steady(freq * 2.0, start), 1.0),
        ],
        filter: Some(Filter {
            low_pass: LowPass::new(800.0, 2.0, 44_100.0),
            cutoff,
        }),
        amp: env.schedule(start),
        peak: env.peak,
        start,
        stop: start + env.lifetime() + STOP_PAD_S,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope(voice: &Voice, step: f64) -> Vec<(f64, f32)> {
        let mut out = Vec::new();
        let mut t = voice.start_time();
        while t < voice.stop_time() + 0.5 {
            out.push((t, voice.envelope_at(t)));
            t += step;
        }
        out
    }

    fn assert_envelope_contract(voice: &Voice, env: &Envelope) {
        let points = sample_envelope(voice, 0.001);
        for &(t, a) in &points {
            assert!(a <= voice.peak() + 1e-6, "{:?} exceeded peak at {}", voice.kind(), t);
            assert!(a >= 0.0);
        }
        let end = voice.start_time() + env.lifetime();
        let tail = voice.envelope_at(end);
        assert!(tail <= SILENCE * 1.01, "{:?} tail {}", voice.kind(), tail);
        assert_eq!(voice.envelope_at(voice.stop_time()), 0.0);
    }

    #[test]
    fn test_style_a_envelope_returns_to_silence() {
        let sound = SoundParameters::default();
        for &freq in &[110.0, 220.0, 440.0, 880.0] {
            let voice = style_a(freq, 1.0, &sound, false);
            assert_envelope_contract(&voice, &style_a_envelope(&sound, false));
            let texture = style_a(freq * 1.5, 1.05, &sound, true);
            assert_envelope_contract(&texture, &style_a_envelope(&sound, true));
            assert!(texture.peak() < voice.peak());
        }
    }

    #[test]
    fn test_style_b_envelope_returns_to_silence() {
        let sound = SoundParameters::default();
        for &freq in &[110.0, 220.0, 440.0, 880.0] {
            let voice = style_b(freq, 0.0, &sound, false);
            assert_envelope_contract(&voice, &style_b_envelope(false));
            let arp = style_b(freq, 0.0, &sound, true);
            assert_envelope_contract(&arp, &style_b_envelope(true));
            assert!(arp.stop_time() < voice.stop_time());
        }
    }

    #[test]
    fn test_style_b_stack_has_seven_partials() {
        let voice = style_b(220.0, 0.0, &SoundParameters::default(), false);
        assert_eq!(voice.partials.len(), STACK_DETUNE_CENTS.len());
    }

    #[test]
    fn test_kick_pitch_drop() {
        let voice = kick(2.0);
        let f = &voice.partials[0].freq;
        assert!((f.value_at(2.0) - 150.0).abs() < 1e-3);
        assert!((f.value_at(2.1) - 40.0).abs() < 1e-3);
        assert!((voice.stop_time() - 2.35).abs() < 1e-9);
    }

    #[test]
    fn test_pad_ducking_scales_peak() {
        let sound = SoundParameters::default();
        let full = pad(220.0, 0.0, &sound, 1.0);
        let ducked = pad(220.0, 0.0, &sound, 0.5);
        assert!((full.peak() - 0.04).abs() < 1e-6);
        assert!((ducked.peak() - 0.02).abs() < 1e-6);
        assert_envelope_contract(&full, &pad_envelope(&sound, 1.0));
        // Long attack: still rising at one second
        assert!(full.envelope_at(1.0) < full.envelope_at(1.9));
    }

    #[test]
    fn test_render_is_silent_outside_lifetime() {
        let sound = SoundParameters::default();
        let mut voice = style_b(440.0, 1.0, &sound, true);
        assert_eq!(voice.render(0.5, 44_100.0), 0.0);
        assert_eq!(voice.render(voice.stop_time(), 44_100.0), 0.0);
        assert!(voice.is_finished(voice.stop_time()));
    }

    #[test]
    fn test_prepare_keeps_filter_cutoff_and_q() {
        let sound = SoundParameters::default();
        let mut voice = style_a(330.0, 0.0, &sound, true);
        let q_before = voice.filter.as_ref().map(|f| f.low_pass.q());
        voice.prepare(48_000.0);

        let filter = voice.filter.as_ref().unwrap();
        assert_eq!(Some(filter.low_pass.q()), q_before);
        assert!((filter.cutoff.value_at(0.0) - sound.style_a_cutoff()).abs() < 1e-3);

        let rendered: Vec<f32> = (0..4_800).map(|i| voice.render(i as f64 / 48_000.0, 48_000.0)).collect();
        assert!(rendered.iter().all(|s| s.is_finite()));
        assert!(rendered.iter().any(|s| s.abs() > 0.0));
    }
}
