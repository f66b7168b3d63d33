//! Audio graph and analysis configuration.

use std::ops::Range;

/// Audio graph and analyzer configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Synthesis sample rate (Hz). The device stream uses its own rate when it differs.
    pub sample_rate_hz: u32,

    /// Analyzer FFT window size (must be power of 2)
    pub fft_size: usize,

    /// Low band upper edge as a fraction of the bin count
    pub low_split: f32,

    /// Mid band upper edge as a fraction of the bin count
    pub mid_split: f32,

    /// Analyzer magnitude floor (dBFS) mapped to byte 0
    pub min_decibels: f32,

    /// Analyzer magnitude ceiling (dBFS) mapped to byte 255
    pub max_decibels: f32,

    /// Spectrum smoothing between analyzer frames (0 = none)
    pub smoothing: f32,

    /// Initial bus gains before the first interpolation tick (A, B)
    pub initial_bus_gains: (f32, f32),

    /// Time constant of the bus-gain crossfade (seconds)
    pub bus_time_constant_s: f32,

    /// Master output gain
    pub master_gain: f32,

    /// Soft-limiter ceiling (linear amplitude)
    pub limiter_ceiling: f32,

    /// Background texture-noise level
    pub texture_level: f32,

    /// Background texture-noise low-pass cutoff (Hz)
    pub texture_cutoff_hz: f32,

    /// Minimum seconds between pad events
    pub pad_interval_s: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44_100,
            fft_size: 512,
            low_split: 0.15,
            mid_split: 0.5,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
            initial_bus_gains: (0.7, 0.3),
            bus_time_constant_s: 0.1,
            master_gain: 0.2,
            limiter_ceiling: 0.95,
            texture_level: 0.03,
            texture_cutoff_hz: 300.0,
            pad_interval_s: 6.0,
        }
    }
}

impl AudioConfig {
    /// Number of frequency bins exposed by the analyzer
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn low_bins(&self) -> Range<usize> {
        0..self.split_index(self.low_split)
    }

    pub fn mid_bins(&self) -> Range<usize> {
        self.split_index(self.low_split)..self.split_index(self.mid_split)
    }

    pub fn high_bins(&self) -> Range<usize> {
        self.split_index(self.mid_split)..self.bin_count()
    }

    fn split_index(&self, fraction: f32) -> usize {
        ((self.bin_count() as f32 * fraction).floor() as usize).min(self.bin_count())
    }

    /// Validate configuration (FFT size must be power of 2, etc.)
    pub fn validate(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(format!(
                "FFT size must be a power of 2 >= 32, got {}",
                self.fft_size
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err("Sample rate must be > 0".to_string());
        }
        if !(0.0 < self.low_split && self.low_split < self.mid_split && self.mid_split < 1.0) {
            return Err(format!(
                "Band splits must satisfy 0 < low < mid < 1, got {} / {}",
                self.low_split, self.mid_split
            ));
        }
        if self.max_decibels <= self.min_decibels {
            return Err("max_decibels must exceed min_decibels".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_ranges_partition_bins() {
        let config = AudioConfig::default();
        assert_eq!(config.bin_count(), 256);
        assert_eq!(config.low_bins(), 0..38);
        assert_eq!(config.mid_bins(), 38..128);
        assert_eq!(config.high_bins(), 128..256);
    }

    #[test]
    fn test_validate_rejects_bad_fft_size() {
        let config = AudioConfig {
            fft_size: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(AudioConfig::default().validate().is_ok());
    }
}
