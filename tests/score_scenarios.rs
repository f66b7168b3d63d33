//! Engine-level scenarios driven through the public audio API with manual tickers.

use std::sync::{Arc, Mutex};

use fusionscape::audio::sequencer::gate_rate_hz;
use fusionscape::audio::{render_offline, render_score, AudioSequencer, BusId, SynthGraph};
use fusionscape::params::{AudioConfig, SoundParameters};
use fusionscape::scheduler::{ManualTicker, TickFlow};

struct Rig {
    sequencer: AudioSequencer,
    graph: Arc<Mutex<SynthGraph>>,
    events: ManualTicker,
    frames: ManualTicker,
    frame_len: usize,
}

fn rig(seed: u64) -> Rig {
    let config = AudioConfig::default();
    let graph = Arc::new(Mutex::new(SynthGraph::new(&config, config.sample_rate_hz, seed)));
    let events = ManualTicker::new();
    let frames = ManualTicker::new();
    let sequencer = AudioSequencer::new(
        Arc::clone(&graph),
        &config,
        seed,
        Box::new(events.clone()),
        Box::new(frames.clone()),
    );
    Rig {
        sequencer,
        graph,
        events,
        frames,
        frame_len: (config.sample_rate_hz / 60) as usize,
    }
}

impl Rig {
    /// One display frame: interpolation tick, then a frame of audio.
    fn frame(&self) {
        self.frames.fire();
        let mut block = vec![0.0; self.frame_len];
        self.graph.lock().unwrap().render(&mut block, 1);
    }
}

fn sound(ratio: f32, bpm: f32) -> SoundParameters {
    SoundParameters {
        style_ratio: Some(ratio),
        bpm: Some(bpm),
        musical_scale: vec![261.63, 293.66, 329.63, 392.0, 440.0],
        ..Default::default()
    }
}

#[test]
fn test_reconfigure_glides_instead_of_jumping() {
    let mut rig = rig(11);
    rig.sequencer.configure(sound(0.0, 70.0));
    rig.sequencer.configure(sound(1.0, 140.0));

    let start = rig.sequencer.state();
    assert_eq!(start.target_ratio, 1.0);
    assert_eq!(start.target_bpm, 140.0);

    rig.frame();
    let after_one = rig.sequencer.state();
    assert!(after_one.current_ratio > start.current_ratio);
    assert!(after_one.current_ratio < 1.0, "ratio jumped to target");
    assert!(after_one.current_bpm > start.current_bpm);
    assert!(after_one.current_bpm < 140.0, "tempo jumped to target");

    let mut ratios = vec![after_one.current_ratio];
    for _ in 0..600 {
        rig.frame();
        ratios.push(rig.sequencer.state().current_ratio);
    }
    assert!(ratios.windows(2).all(|w| w[1] >= w[0]));

    let end = rig.sequencer.state();
    assert_eq!(end.current_ratio, 1.0);
    assert_eq!(end.current_bpm, 140.0);

    let graph = rig.graph.lock().unwrap();
    assert!(graph.bus_gain(BusId::A) < 0.05, "bus A at {}", graph.bus_gain(BusId::A));
    assert!(graph.bus_gain(BusId::B) > 0.95, "bus B at {}", graph.bus_gain(BusId::B));
    assert!((graph.gate_rate() - gate_rate_hz(140.0)).abs() < 1e-3);
}

#[test]
fn test_bus_gains_move_gradually() {
    let mut rig = rig(12);
    rig.sequencer.configure(sound(1.0, 120.0));

    let (a0, b0) = {
        let graph = rig.graph.lock().unwrap();
        (graph.bus_gain(BusId::A), graph.bus_gain(BusId::B))
    };

    let mut gains = Vec::new();
    for _ in 0..30 {
        rig.frame();
        let graph = rig.graph.lock().unwrap();
        gains.push((graph.bus_gain(BusId::A), graph.bus_gain(BusId::B)));
    }

    let (a1, b1) = gains[0];
    assert!(a1 <= a0 && b1 >= b0);
    assert!(b1 - b0 < 0.5, "bus B stepped from {} to {}", b0, b1);
    for pair in gains.windows(2) {
        assert!(pair[1].0 <= pair[0].0 + 1e-6);
        assert!(pair[1].1 + 1e-6 >= pair[0].1);
    }
}

#[test]
fn test_stop_twice_fires_nothing_more() {
    let mut rig = rig(13);
    rig.sequencer.configure(sound(0.5, 100.0));
    for _ in 0..5 {
        rig.events.fire();
    }

    rig.sequencer.stop();
    let ticks = rig.sequencer.state().ticks;
    let voices = rig.graph.lock().unwrap().active_voice_count();
    rig.sequencer.stop();

    for _ in 0..10 {
        assert!(!rig.events.fire());
        assert!(!rig.frames.fire());
    }
    assert_eq!(rig.sequencer.state().ticks, ticks);
    assert!(rig.graph.lock().unwrap().active_voice_count() <= voices);
    assert!(!rig.sequencer.is_scheduling());
    assert_eq!(rig.sequencer.step_interpolation(), TickFlow::Stop);
}

#[test]
fn test_offline_score_is_bounded_and_deterministic() {
    let config = AudioConfig::default();
    let first = render_score(&config, sound(0.6, 110.0), 2.0, 5).unwrap();
    let second = render_score(&config, sound(0.6, 110.0), 2.0, 5).unwrap();

    assert_eq!(first.samples.len(), 2 * config.sample_rate_hz as usize);
    assert_eq!(first.samples, second.samples);
    assert!(first.samples.iter().all(|s| s.is_finite()));
    assert!(first.peak() <= config.limiter_ceiling + 1e-6);
    assert!(first.peak() > 0.0);
    assert!(first.final_state.ticks > 1);
    assert!(!first.final_state.scheduling_active);
}

#[test]
fn test_offline_render_writes_stereo_wav() {
    let config = AudioConfig::default();
    let path = std::env::temp_dir().join(format!("fusionscape-score-{}.wav", std::process::id()));

    let score = render_offline(&config, sound(0.2, 90.0), 1.0, 9, &path).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, config.sample_rate_hz);
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), score.samples.len() * 2);
    assert_eq!(samples[0], samples[1]);

    std::fs::remove_file(&path).ok();
}
