//! Dual-bus generative sequencer.
//!
//! Two loops run per configuration:
//! - the interpolation loop (one tick per rendered frame) glides the current
//!   style ratio and tempo toward their targets and retargets the bus gains
//! - the event loop (one tick per sixteenth note at the tempo current when
//!   `configure` ran) triggers voices from the current ratio
//!
//! The event period is fixed when `configure` runs. Tempo glides between
//! configurations only take effect on the next `configure`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::analyzer::AudioBands;
use super::graph::{BusId, SynthGraph};
use super::voices::{self, Voice};
use crate::params::{AudioConfig, SoundParameters};
use crate::scheduler::{lock_or_recover, TickFlow, TickSource};

/// Fraction of the remaining ratio distance covered per interpolation tick.
pub const RATIO_STEP: f32 = 0.05;
/// Ratio distance below which the current ratio settles on the target.
pub const RATIO_DEADBAND: f32 = 0.01;
/// Fraction of the remaining tempo distance covered per interpolation tick.
pub const BPM_STEP: f32 = 0.02;
/// Tempo distance (BPM) below which the current tempo settles on the target.
pub const BPM_DEADBAND: f32 = 0.5;

/// Interpolation ticks are nominally one display frame apart.
pub const FRAME_PERIOD: Duration = Duration::from_micros(16_667);

const ARPEGGIO: [f32; 4] = [1.0, 1.25, 1.5, 2.0];
const ARPEGGIO_STEP_S: f64 = 0.1;
const ECHO_DELAY_S: f64 = 0.05;

/// Mutable state shared by the sequencer loops.
#[derive(Debug, Clone)]
pub struct EngineRuntimeState {
    pub current_ratio: f32,
    pub target_ratio: f32,
    pub current_bpm: f32,
    pub target_bpm: f32,
    /// Active sound snapshot; `None` before the first `configure`.
    pub sound: Option<SoundParameters>,
    /// True while an event loop is installed.
    pub scheduling_active: bool,
    /// Latest band sample published by the engine.
    pub bands: AudioBands,
    pub note_index: u64,
    pub last_pad_time: f64,
    /// Period of the installed event loop.
    pub event_period: Option<Duration>,
    /// Event ticks run since construction.
    pub ticks: u64,
}

impl Default for EngineRuntimeState {
    fn default() -> Self {
        Self {
            current_ratio: 0.3,
            target_ratio: 0.3,
            current_bpm: 70.0,
            target_bpm: 70.0,
            sound: None,
            scheduling_active: false,
            bands: AudioBands::SILENT,
            note_index: 0,
            last_pad_time: 0.0,
            event_period: None,
            ticks: 0,
        }
    }
}

impl EngineRuntimeState {
    /// Advance ratio and tempo one interpolation step. Returns true when the
    /// ratio changed.
    ///
    /// Each step covers a fixed fraction of the remaining distance, so the
    /// value approaches the target monotonically and never crosses it.
    pub fn interpolate_step(&mut self) -> bool {
        let ratio_before = self.current_ratio;

        let ratio_diff = self.target_ratio - self.current_ratio;
        if ratio_diff.abs() > RATIO_DEADBAND {
            self.current_ratio += ratio_diff * RATIO_STEP;
        } else {
            self.current_ratio = self.target_ratio;
        }
        self.current_ratio = self.current_ratio.clamp(0.0, 1.0);

        let bpm_diff = self.target_bpm - self.current_bpm;
        if bpm_diff.abs() > BPM_DEADBAND {
            self.current_bpm += bpm_diff * BPM_STEP;
        } else {
            self.current_bpm = self.target_bpm;
        }

        self.current_ratio != ratio_before
    }
}

/// Sixteenth-note period at `bpm`.
pub fn event_period(bpm: f32) -> Duration {
    let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 70.0 };
    Duration::from_secs_f64(15.0 / bpm as f64)
}

/// Trance-gate rate (sixteenth notes) at `bpm`.
pub fn gate_rate_hz(bpm: f32) -> f32 {
    bpm / 15.0
}

pub struct AudioSequencer {
    state: Arc<Mutex<EngineRuntimeState>>,
    graph: Arc<Mutex<SynthGraph>>,
    rng: Arc<Mutex<StdRng>>,
    pad_interval_s: f64,
    event_ticker: Box<dyn TickSource>,
    frame_ticker: Box<dyn TickSource>,
}

impl AudioSequencer {
    pub fn new(
        graph: Arc<Mutex<SynthGraph>>,
        config: &AudioConfig,
        seed: u64,
        event_ticker: Box<dyn TickSource>,
        frame_ticker: Box<dyn TickSource>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineRuntimeState::default())),
            graph,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            pad_interval_s: config.pad_interval_s,
            event_ticker,
            frame_ticker,
        }
    }

    /// Replace the active sound snapshot and restart both loops.
    ///
    /// Any previously installed loop is cancelled first, so rapid repeated
    /// calls never leave overlapping schedules.
    pub fn configure(&mut self, sound: SoundParameters) {
        self.cancel_loops();

        let period = {
            let mut state = lock_or_recover(&self.state);
            state.target_ratio = sound.style_ratio();
            state.target_bpm = sound.target_bpm();
            state.note_index = 0;
            state.last_pad_time = 0.0;
            state.scheduling_active = true;

            let period = event_period(state.current_bpm);
            state.event_period = Some(period);

            {
                let mut graph = lock_or_recover(&self.graph);
                graph.set_reverb_mix(sound.reverb_wetness());
                graph.set_gate_depth(sound.gate_intensity());
                graph.set_gate_rate(gate_rate_hz(state.current_bpm));
            }

            log::info!(
                "Sequencer configured: target ratio {:.2}, target BPM {:.1}, event period {:.0} ms",
                state.target_ratio,
                state.target_bpm,
                period.as_secs_f64() * 1000.0
            );

            state.sound = Some(sound);
            period
        };

        let state = Arc::clone(&self.state);
        let graph = Arc::clone(&self.graph);
        self.frame_ticker.on_tick(
            FRAME_PERIOD,
            Box::new(move || interpolation_tick(&state, &graph)),
        );

        // First event fires immediately, the rest on the timer.
        sequence_tick(&self.state, &self.graph, &self.rng, self.pad_interval_s);

        let state = Arc::clone(&self.state);
        let graph = Arc::clone(&self.graph);
        let rng = Arc::clone(&self.rng);
        let pad_interval_s = self.pad_interval_s;
        self.event_ticker.on_tick(
            period,
            Box::new(move || {
                if !lock_or_recover(&state).scheduling_active {
                    return TickFlow::Stop;
                }
                sequence_tick(&state, &graph, &rng, pad_interval_s);
                TickFlow::Continue
            }),
        );
    }

    /// Cancel the event loop. Stopping an idle sequencer is a no-op.
    pub fn stop(&mut self) {
        let was_active = {
            let mut state = lock_or_recover(&self.state);
            let was_active = state.scheduling_active;
            state.scheduling_active = false;
            state.event_period = None;
            was_active
        };
        self.cancel_loops();
        if was_active {
            log::info!("Sequencer stopped");
        }
    }

    /// Run one interpolation step by hand (used when the frame ticker is
    /// driven externally and a caller wants an immediate update).
    pub fn step_interpolation(&self) -> TickFlow {
        interpolation_tick(&self.state, &self.graph)
    }

    pub fn publish_bands(&self, bands: AudioBands) {
        lock_or_recover(&self.state).bands = bands;
    }

    pub fn is_scheduling(&self) -> bool {
        lock_or_recover(&self.state).scheduling_active && self.event_ticker.is_active()
    }

    /// Copy of the runtime state.
    pub fn state(&self) -> EngineRuntimeState {
        lock_or_recover(&self.state).clone()
    }

    pub fn graph(&self) -> &Arc<Mutex<SynthGraph>> {
        &self.graph
    }

    fn cancel_loops(&mut self) {
        self.event_ticker.cancel();
        self.frame_ticker.cancel();
    }
}

impl Drop for AudioSequencer {
    fn drop(&mut self) {
        self.cancel_loops();
    }
}

fn interpolation_tick(state: &Mutex<EngineRuntimeState>, graph: &Mutex<SynthGraph>) -> TickFlow {
    let mut state = lock_or_recover(state);
    if !state.scheduling_active {
        return TickFlow::Stop;
    }

    let bpm_before = state.current_bpm;
    let ratio_changed = state.interpolate_step();
    let bpm_changed = state.current_bpm != bpm_before;
    if !ratio_changed && !bpm_changed {
        return TickFlow::Continue;
    }

    let mut graph = lock_or_recover(graph);
    if ratio_changed {
        let ratio = state.current_ratio;
        graph.set_bus_target(BusId::A, 1.0 - ratio);
        graph.set_bus_target(BusId::B, ratio);
    }
    if bpm_changed {
        graph.set_gate_rate(gate_rate_hz(state.current_bpm));
    }
    TickFlow::Continue
}

fn sequence_tick(
    state: &Mutex<EngineRuntimeState>,
    graph: &Mutex<SynthGraph>,
    rng: &Mutex<StdRng>,
    pad_interval_s: f64,
) {
    let mut state = lock_or_recover(state);
    let Some(sound) = state.sound.clone() else {
        return;
    };
    let mut rng = lock_or_recover(rng);
    let mut graph = lock_or_recover(graph);

    let now = graph.now();
    let scale = sound.scale();
    let ratio = state.current_ratio;
    let mut events: Vec<(BusId, Voice)> = Vec::new();

    // Style A
    if ratio < 0.7 && rng.gen::<f32>() > 0.3 {
        let idx = if rng.gen::<f32>() > 0.7 {
            rng.gen_range(0..scale.len())
        } else {
            (state.note_index % scale.len() as u64) as usize
        };
        let freq = scale[idx];
        state.note_index += 1;

        events.push((BusId::A, voices::style_a(freq, now, &sound, false)));

        if rng.gen::<f32>() > 0.75 {
            let interval = if rng.gen::<f32>() > 0.5 { 1.5 } else { 1.25 };
            events.push((
                BusId::A,
                voices::style_a(freq * interval, now + ECHO_DELAY_S, &sound, true),
            ));
        }
    }

    // Style B
    if ratio > 0.3 {
        let intensity = (ratio - 0.3) / 0.7;

        if rng.gen::<f32>() < intensity * 0.8 {
            let freq = scale[(state.note_index % scale.len() as u64) as usize];
            state.note_index += 1;

            events.push((BusId::B, voices::style_b(freq, now, &sound, false)));

            if rng.gen::<f32>() > 0.5 {
                for (i, step) in ARPEGGIO.iter().enumerate() {
                    let start = now + i as f64 * ARPEGGIO_STEP_S;
                    events.push((BusId::B, voices::style_b(freq * step, start, &sound, true)));
                }
            }
        }

        if ratio > 0.7 && state.note_index % 4 == 0 {
            events.push((BusId::B, voices::kick(now)));
        }
    }

    // Pad, routed to whichever bus dominates
    if now - state.last_pad_time > pad_interval_s && rng.gen::<f32>() > 0.85 {
        state.last_pad_time = now;
        let freq = scale[rng.gen_range(0..scale.len())];
        let level = 1.0 - 0.5 * state.bands.low.clamp(0.0, 1.0);
        let bus = if ratio < 0.5 { BusId::A } else { BusId::B };
        events.push((bus, voices::pad(freq, now, &sound, level)));
    }

    state.ticks += 1;
    log::trace!(
        "tick {} at {:.3}s ratio {:.3}: {} voices",
        state.ticks,
        now,
        ratio,
        events.len()
    );

    for (bus, voice) in events {
        graph.add_voice(bus, voice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voices::VoiceKind;
    use crate::scheduler::ManualTicker;

    struct Rig {
        sequencer: AudioSequencer,
        events: ManualTicker,
        frames: ManualTicker,
    }

    fn rig(seed: u64) -> Rig {
        let config = AudioConfig::default();
        let graph = Arc::new(Mutex::new(SynthGraph::new(&config, 44_100, seed)));
        let events = ManualTicker::new();
        let frames = ManualTicker::new();
        let sequencer = AudioSequencer::new(
            graph,
            &config,
            seed,
            Box::new(events.clone()),
            Box::new(frames.clone()),
        );
        Rig {
            sequencer,
            events,
            frames,
        }
    }

    fn sound(ratio: f32, bpm: f32) -> SoundParameters {
        SoundParameters {
            style_ratio: Some(ratio),
            bpm: Some(bpm),
            musical_scale: vec![220.0, 246.94, 277.18, 329.63, 369.99],
            ..Default::default()
        }
    }

    #[test]
    fn test_interpolation_converges_monotonically() {
        for target in [0.0f32, 0.1, 0.5, 0.73, 1.0] {
            let mut state = EngineRuntimeState {
                target_ratio: target,
                ..Default::default()
            };
            let mut previous_gap = (state.target_ratio - state.current_ratio).abs();
            let mut steps = 0;
            while state.current_ratio != target {
                state.interpolate_step();
                let gap = (target - state.current_ratio).abs();
                assert!(gap <= previous_gap);
                assert!((0.0..=1.0).contains(&state.current_ratio));
                previous_gap = gap;
                steps += 1;
                assert!(steps < 500, "did not converge to {}", target);
            }
        }
    }

    #[test]
    fn test_tempo_converges_without_overshoot() {
        let mut state = EngineRuntimeState {
            target_bpm: 140.0,
            ..Default::default()
        };
        let mut steps = 0;
        while state.current_bpm != 140.0 {
            state.interpolate_step();
            assert!(state.current_bpm <= 140.0);
            steps += 1;
            assert!(steps < 1000);
        }
        assert!(steps > 10, "tempo jumped in {} steps", steps);
    }

    #[test]
    fn test_configure_sets_targets_and_fires_first_tick() {
        let mut rig = rig(1);
        rig.sequencer.configure(sound(0.9, 120.0));

        let state = rig.sequencer.state();
        assert_eq!(state.target_ratio, 0.9);
        assert_eq!(state.target_bpm, 120.0);
        assert_eq!(state.current_ratio, 0.3);
        assert_eq!(state.ticks, 1);
        assert!(state.scheduling_active);
        assert!(rig.events.is_active());
        assert!(rig.frames.is_active());
    }

    #[test]
    fn test_event_period_uses_current_tempo() {
        let mut rig = rig(2);
        rig.sequencer.configure(sound(0.5, 140.0));
        // Current tempo is still 70 when the loop is installed
        assert_eq!(rig.events.period(), Some(event_period(70.0)));

        for _ in 0..2000 {
            rig.frames.fire();
        }
        // Gliding the tempo does not reschedule the running loop
        assert_eq!(rig.events.period(), Some(event_period(70.0)));

        rig.sequencer.configure(sound(0.5, 140.0));
        assert_eq!(rig.events.period(), Some(event_period(140.0)));
    }

    #[test]
    fn test_stop_is_idempotent_and_halts_events() {
        let mut rig = rig(3);
        rig.sequencer.configure(sound(0.5, 100.0));
        rig.sequencer.stop();
        rig.sequencer.stop();

        let ticks = rig.sequencer.state().ticks;
        assert!(!rig.events.fire());
        assert!(!rig.frames.fire());
        assert_eq!(rig.sequencer.state().ticks, ticks);
        assert!(!rig.sequencer.is_scheduling());
    }

    #[test]
    fn test_reconfigure_supersedes_previous_loop() {
        let mut rig = rig(4);
        rig.sequencer.configure(sound(0.0, 70.0));
        rig.sequencer.configure(sound(1.0, 140.0));

        let before = rig.sequencer.state().ticks;
        rig.events.fire();
        assert_eq!(rig.sequencer.state().ticks, before + 1);
    }

    #[test]
    fn test_pure_style_a_never_triggers_style_b() {
        let mut rig = rig(5);
        let mut params = sound(0.0, 90.0);
        params.style_ratio = Some(0.0);
        rig.sequencer.configure(params);
        for _ in 0..200 {
            rig.frames.fire();
        }
        for _ in 0..200 {
            rig.events.fire();
        }

        let graph = lock_or_recover(rig.sequencer.graph());
        for voice in graph.voices(BusId::B) {
            assert_eq!(voice.kind(), VoiceKind::Pad);
        }
        assert!(!graph.voices(BusId::A).is_empty());
    }

    #[test]
    fn test_pure_style_b_triggers_kicks() {
        let mut rig = rig(6);
        rig.sequencer.configure(sound(1.0, 128.0));
        for _ in 0..400 {
            rig.frames.fire();
        }
        assert_eq!(rig.sequencer.state().current_ratio, 1.0);

        let style_a_count = |graph: &SynthGraph| {
            graph
                .voices(BusId::A)
                .iter()
                .filter(|v| v.kind() == VoiceKind::StyleA)
                .count()
        };
        // The immediate first tick ran at the initial ratio
        let initial_style_a = style_a_count(&lock_or_recover(rig.sequencer.graph()));

        let mut saw_kick = false;
        for _ in 0..200 {
            rig.events.fire();
            let graph = lock_or_recover(rig.sequencer.graph());
            saw_kick |= graph.voices(BusId::B).iter().any(|v| v.kind() == VoiceKind::Kick);
            assert_eq!(style_a_count(&graph), initial_style_a);
        }
        assert!(saw_kick);
    }

    #[test]
    fn test_same_seed_same_score() {
        let score = |seed| {
            let mut rig = rig(seed);
            rig.sequencer.configure(sound(0.5, 100.0));
            for _ in 0..50 {
                rig.events.fire();
            }
            let graph = lock_or_recover(rig.sequencer.graph());
            let mut freqs: Vec<f32> = graph.voices(BusId::A).iter().map(|v| v.frequency()).collect();
            freqs.extend(graph.voices(BusId::B).iter().map(|v| v.frequency()));
            freqs
        };
        assert_eq!(score(42), score(42));
    }
}
