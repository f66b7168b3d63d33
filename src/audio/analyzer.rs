//! Frequency-domain analysis tap on the master output.

use std::f32::consts::PI;
use std::ops::Range;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::params::AudioConfig;

/// Normalized low/mid/high band energy, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioBands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl AudioBands {
    pub const SILENT: AudioBands = AudioBands {
        low: 0.0,
        mid: 0.0,
        high: 0.0,
    };

    /// Average each bin range of a byte spectrum, normalized by 255.
    ///
    /// Ranges reaching past the spectrum read as silent.
    pub fn from_bins(spectrum: &[u8], low: Range<usize>, mid: Range<usize>, high: Range<usize>) -> Self {
        let band = |range: Range<usize>| spectrum.get(range).map_or(0.0, mean_normalized);
        Self {
            low: band(low),
            mid: band(mid),
            high: band(high),
        }
    }
}

fn mean_normalized(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    (sum as f32 / bins.len() as f32 / 255.0).clamp(0.0, 1.0)
}

/// Hann window function for FFT analysis
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

/// Pull-based analyzer over the most recent `fft_size` output samples.
pub struct SignalAnalyzer {
    config: AudioConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_index: usize,
    filled: usize,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SignalAnalyzer {
    pub fn new(config: &AudioConfig) -> Self {
        let size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            config: config.clone(),
            fft,
            window: (0..size).map(|i| hann_window(i, size)).collect(),
            history: vec![0.0; size],
            write_index: 0,
            filled: 0,
            scratch: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; config.bin_count()],
        }
    }

    /// Feed mono output samples.
    pub fn push(&mut self, samples: &[f32]) {
        let size = self.history.len();
        for &s in samples {
            self.history[self.write_index] = if s.is_finite() { s } else { 0.0 };
            self.write_index = (self.write_index + 1) % size;
        }
        self.filled = (self.filled + samples.len()).min(size);
    }

    /// Feed an interleaved buffer, analysing the first channel only.
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let size = self.history.len();
        let channels = channels.max(1);
        let mut count = 0;
        for frame in data.chunks(channels) {
            let s = frame[0];
            self.history[self.write_index] = if s.is_finite() { s } else { 0.0 };
            self.write_index = (self.write_index + 1) % size;
            count += 1;
        }
        self.filled = (self.filled + count).min(size);
    }

    /// Latest byte-resolution magnitude spectrum (`fft_size / 2` bins), or
    /// `None` until a full analysis window has been captured.
    pub fn sample(&mut self) -> Option<Vec<u8>> {
        let size = self.history.len();
        if self.filled < size {
            return None;
        }

        // Oldest sample first
        for i in 0..size {
            let s = self.history[(self.write_index + i) % size];
            self.scratch[i] = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.config.smoothing.clamp(0.0, 0.99);
        let range = self.config.max_decibels - self.config.min_decibels;
        let spectrum = self
            .smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(smooth, bin)| {
                let magnitude = bin.norm() / size as f32;
                *smooth = tau * *smooth + (1.0 - tau) * magnitude;
                let db = if *smooth > 0.0 {
                    20.0 * smooth.log10()
                } else {
                    self.config.min_decibels
                };
                let scaled = 255.0 * (db - self.config.min_decibels) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect();

        Some(spectrum)
    }

    /// Band split of `sample()`; all zero before the first full window.
    pub fn bands(&mut self) -> AudioBands {
        match self.sample() {
            Some(spectrum) => AudioBands::from_bins(
                &spectrum,
                self.config.low_bins(),
                self.config.mid_bins(),
                self.config.high_bins(),
            ),
            None => AudioBands::SILENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window() {
        let size = 512;
        assert!((hann_window(0, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size - 1, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_band_split_follows_config_ranges() {
        let config = AudioConfig::default();
        let mut spectrum = vec![0u8; config.bin_count()];
        for b in &mut spectrum[config.low_bins()] {
            *b = 255;
        }
        for b in &mut spectrum[config.mid_bins()] {
            *b = 51;
        }
        let bands = AudioBands::from_bins(&spectrum, config.low_bins(), config.mid_bins(), config.high_bins());
        assert_eq!(bands.low, 1.0);
        assert!((bands.mid - 0.2).abs() < 1e-6);
        assert_eq!(bands.high, 0.0);
    }

    #[test]
    fn test_band_split_short_spectrum_is_silent() {
        let config = AudioConfig::default();
        let bands = AudioBands::from_bins(&[], config.low_bins(), config.mid_bins(), config.high_bins());
        assert_eq!(bands, AudioBands::SILENT);
    }

    #[test]
    fn test_sample_none_until_window_filled() {
        let config = AudioConfig::default();
        let mut analyzer = SignalAnalyzer::new(&config);
        assert!(analyzer.sample().is_none());
        analyzer.push(&vec![0.0; config.fft_size - 1]);
        assert!(analyzer.sample().is_none());
        analyzer.push(&[0.0]);
        let spectrum = analyzer.sample().unwrap();
        assert_eq!(spectrum.len(), config.bin_count());
        assert!(spectrum.iter().all(|&b| b == 0));
        assert_eq!(analyzer.bands(), AudioBands::SILENT);
    }

    #[test]
    fn test_low_tone_lands_in_low_band() {
        let config = AudioConfig {
            smoothing: 0.0,
            ..Default::default()
        };
        let mut analyzer = SignalAnalyzer::new(&config);
        let sr = config.sample_rate_hz as f32;
        let tone: Vec<f32> = (0..config.fft_size)
            .map(|i| 0.5 * (2.0 * PI * 430.0 * i as f32 / sr).sin())
            .collect();
        analyzer.push(&tone);

        let bands = analyzer.bands();
        assert!(bands.low > bands.mid, "{:?}", bands);
        assert!(bands.low > bands.high, "{:?}", bands);
        assert!(bands.low <= 1.0);
    }
}
