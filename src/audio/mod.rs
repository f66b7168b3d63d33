//! Generative audio: dual-bus sequencer, voices, synthesis graph and analysis.
//!
//! The sequencer crossfades two timbral styles on separate buses while the
//! analyzer taps the master output to feed band energy back to the visuals.

pub mod analyzer;
pub mod dsp;
pub mod engine;
pub mod graph;
pub mod sequencer;
pub mod voices;

// Re-export public types
pub use analyzer::{AudioBands, SignalAnalyzer};
pub use engine::{render_offline, render_score, AudioEngine, AudioError, OfflineScore};
pub use graph::{BusId, SynthGraph};
pub use sequencer::{AudioSequencer, EngineRuntimeState};
pub use voices::{Voice, VoiceKind};
