//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::visual::RenderMode;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Fusionscape")]
#[command(about = "Audio-reactive fusion sculpture with a generative score", long_about = None)]
pub struct Args {
    /// Generation bundle (JSON with simulation and sound parameters)
    #[arg(long, value_name = "FILE")]
    pub bundle: Option<PathBuf>,

    /// Seed for every random choice (shape variant, material jitter, notes)
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Equirectangular theme image for the backdrop and refraction shader
    #[arg(long, value_name = "FILE")]
    pub theme_image: Option<PathBuf>,

    /// Shading strategy: physical (default) or refraction
    #[arg(long, value_name = "MODE", default_value = "physical")]
    pub render_mode: String,

    /// Render the score offline to a WAV file instead of opening a window
    #[arg(long, value_name = "FILE")]
    pub render_wav: Option<PathBuf>,

    /// Length of the offline render
    #[arg(long, value_name = "SECONDS", default_value = "30")]
    pub seconds: f32,

    /// Run visual-only, without opening an audio device
    #[arg(long)]
    pub no_audio: bool,
}

impl Args {
    /// Parse the shading strategy from command-line arguments
    pub fn parse_render_mode(&self) -> RenderMode {
        match self.render_mode.to_lowercase().as_str() {
            "physical" | "pbr" => RenderMode::Physical,
            "refraction" | "glass" => RenderMode::Refraction,
            other => {
                log::warn!("Unknown render mode '{}', using physical", other);
                RenderMode::Physical
            }
        }
    }

    /// Offline render length, sanitized to a finite non-negative value.
    pub fn render_seconds(&self) -> f32 {
        if self.seconds.is_finite() {
            self.seconds.max(0.0)
        } else {
            30.0
        }
    }
}
