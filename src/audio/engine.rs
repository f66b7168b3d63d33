//! Audio engine lifecycle over a cpal output stream.
//!
//! `init → configure* → stop → dispose`. Audio is best-effort: `init` returns
//! an error instead of panicking and every other call degrades to a no-op
//! (bands read as silence) when no device was acquired.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::analyzer::{AudioBands, SignalAnalyzer};
use super::graph::SynthGraph;
use super::sequencer::{AudioSequencer, EngineRuntimeState};
use crate::params::{AudioConfig, SoundParameters};
use crate::scheduler::{lock_or_recover, ManualTicker, ThreadTicker};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid audio config: {0}")]
    InvalidConfig(String),

    #[error("no audio output device found")]
    NoDevice,

    #[error("failed to query output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),
}

struct LiveOutput {
    /// Output stream (kept alive)
    _stream: cpal::Stream,
    sequencer: AudioSequencer,
    analyzer: Arc<Mutex<SignalAnalyzer>>,
    frame_ticker: ManualTicker,
    sample_rate: u32,
}

/// Explicit engine instance; create as many as needed.
pub struct AudioEngine {
    config: AudioConfig,
    seed: u64,
    live: Option<LiveOutput>,
    bands: AudioBands,
}

impl AudioEngine {
    pub fn new(config: AudioConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            live: None,
            bands: AudioBands::SILENT,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    /// Acquire the default output device and start the graph.
    ///
    /// Calling `init` on an initialized engine does nothing.
    pub fn init(&mut self) -> Result<(), AudioError> {
        if self.live.is_some() {
            return Ok(());
        }
        self.config.validate().map_err(AudioError::InvalidConfig)?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let supported = device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(supported.sample_format()));
        }

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        log::info!(
            "Audio: {} @ {}Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        let graph = Arc::new(Mutex::new(SynthGraph::new(
            &self.config,
            sample_rate,
            self.seed,
        )));
        let analyzer = Arc::new(Mutex::new(SignalAnalyzer::new(&self.config)));

        let graph_cb = Arc::clone(&graph);
        let analyzer_cb = Arc::clone(&analyzer);
        let stream = device.build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                lock_or_recover(&graph_cb).render(data, channels);
                // Skip the tap rather than block the device thread.
                if let Ok(mut analyzer) = analyzer_cb.try_lock() {
                    analyzer.push_interleaved(data, channels);
                }
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        let frame_ticker = ManualTicker::new();
        let sequencer = AudioSequencer::new(
            graph,
            &self.config,
            self.seed,
            Box::new(ThreadTicker::new("sequencer-events")),
            Box::new(frame_ticker.clone()),
        );

        self.live = Some(LiveOutput {
            _stream: stream,
            sequencer,
            analyzer,
            frame_ticker,
            sample_rate,
        });
        Ok(())
    }

    /// Apply a new sound snapshot. Returns false (and does nothing) when the
    /// engine has no output device.
    pub fn configure(&mut self, sound: SoundParameters) -> bool {
        match &mut self.live {
            Some(live) => {
                live.sequencer.configure(sound);
                true
            }
            None => {
                log::debug!("configure ignored: audio not initialized");
                false
            }
        }
    }

    /// Per-frame hook: advance interpolation and refresh the band sample.
    pub fn frame_tick(&mut self) -> AudioBands {
        if let Some(live) = &self.live {
            live.frame_ticker.fire();
            let bands = lock_or_recover(&live.analyzer).bands();
            live.sequencer.publish_bands(bands);
            self.bands = bands;
        }
        self.bands
    }

    /// Latest band sample (all zero without audio).
    pub fn get_bands(&self) -> AudioBands {
        self.bands
    }

    /// Raw byte spectrum from the analyzer, if one is running and primed.
    pub fn spectrum(&self) -> Option<Vec<u8>> {
        self.live
            .as_ref()
            .and_then(|live| lock_or_recover(&live.analyzer).sample())
    }

    /// Runtime state of the sequencer, if initialized.
    pub fn state(&self) -> Option<EngineRuntimeState> {
        self.live.as_ref().map(|live| live.sequencer.state())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.live.as_ref().map(|live| live.sample_rate)
    }

    /// Cancel scheduling. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(live) = &mut self.live {
            live.sequencer.stop();
        }
    }

    /// Stop and release the output device.
    pub fn dispose(&mut self) {
        self.stop();
        if self.live.take().is_some() {
            log::info!("Audio engine disposed");
        }
        self.bands = AudioBands::SILENT;
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Deterministic render of the generative score without a device.
pub struct OfflineScore {
    pub sample_rate: u32,
    /// Mono samples.
    pub samples: Vec<f32>,
    /// Band sample taken at every rendered frame.
    pub bands: Vec<AudioBands>,
    pub final_state: EngineRuntimeState,
}

impl OfflineScore {
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

/// Render `seconds` of the score for `sound`, driving both loops from audio time.
pub fn render_score(
    config: &AudioConfig,
    sound: SoundParameters,
    seconds: f32,
    seed: u64,
) -> Result<OfflineScore, AudioError> {
    config.validate().map_err(AudioError::InvalidConfig)?;

    let sample_rate = config.sample_rate_hz;
    let graph = Arc::new(Mutex::new(SynthGraph::new(config, sample_rate, seed)));
    let events = ManualTicker::new();
    let frames = ManualTicker::new();
    let mut sequencer = AudioSequencer::new(
        Arc::clone(&graph),
        config,
        seed,
        Box::new(events.clone()),
        Box::new(frames.clone()),
    );
    let mut analyzer = SignalAnalyzer::new(config);

    sequencer.configure(sound);

    let frame_len = (sample_rate / 60).max(1) as usize;
    let frame_duration = Duration::from_secs_f64(frame_len as f64 / sample_rate as f64);
    let total = (seconds.max(0.0) as f64 * sample_rate as f64) as usize;

    let mut samples = Vec::with_capacity(total);
    let mut bands = Vec::with_capacity(total / frame_len + 1);
    let mut block = vec![0.0; frame_len];

    while samples.len() < total {
        frames.fire();

        let n = frame_len.min(total - samples.len());
        lock_or_recover(&graph).render(&mut block[..n], 1);
        analyzer.push(&block[..n]);
        samples.extend_from_slice(&block[..n]);

        let frame_bands = analyzer.bands();
        sequencer.publish_bands(frame_bands);
        bands.push(frame_bands);

        events.advance(frame_duration);
    }

    sequencer.stop();
    let final_state = sequencer.state();
    log::info!(
        "Rendered {:.1}s offline ({} event ticks)",
        seconds,
        final_state.ticks
    );

    Ok(OfflineScore {
        sample_rate,
        samples,
        bands,
        final_state,
    })
}

/// Render the score to a stereo 32-bit float WAV file.
pub fn render_offline(
    config: &AudioConfig,
    sound: SoundParameters,
    seconds: f32,
    seed: u64,
    path: &Path,
) -> Result<OfflineScore, AudioError> {
    let score = render_score(config, sound, seconds, seed)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: score.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in &score.samples {
        writer.write_sample(s)?;
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    log::info!("Wrote {}", path.display());
    Ok(score)
}
