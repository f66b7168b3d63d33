//! Fusionscape library - audio-reactive fusion sculpture with a generative score

pub mod audio;
pub mod cli;
pub mod params;
pub mod rendering;
pub mod sanitize;
pub mod scheduler;
pub mod visual;
