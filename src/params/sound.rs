//! Sound parameters as delivered by the generation collaborator.

use serde::{Deserialize, Serialize};

use crate::sanitize::{clamped_or, finite_or};

wire_enum! {
    #[derive(Default)]
    pub enum OscillatorType {
        #[default]
        Sine => "sine",
        Square => "square",
        Sawtooth => "sawtooth",
        Triangle => "triangle",
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum HarmonyType {
        Chord => "CHORD",
        Melody => "MELODY",
        #[default]
        Ambient => "AMBIENT",
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum MusicStyle {
        Sakamoto => "SAKAMOTO",
        Electronic => "ELECTRONIC",
        Glitch => "GLITCH",
        #[default]
        Ambient => "AMBIENT",
    }
}

/// Snapshot of the audio parameters for one generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SoundParameters {
    /// Hz; used as a one-note scale when `musical_scale` is empty.
    pub base_frequency: Option<f32>,
    pub oscillator_type: OscillatorType,
    /// Low-pass cutoff for the melodic voices (Hz).
    pub filter_frequency: Option<f32>,
    /// Bus A reverb wet mix in [0,1].
    pub reverb_wetness: Option<f32>,
    pub distortion_amount: Option<f32>,
    /// Pad attack (seconds).
    pub attack: Option<f32>,
    /// Style-A release (seconds).
    pub release: Option<f32>,
    /// 0..1; drives the tempo fallback when `bpm` is absent.
    pub rhythm_speed: Option<f32>,
    /// Scale tones in Hz, typically 4 to 8 entries.
    pub musical_scale: Vec<f32>,
    pub harmony_type: HarmonyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_style: Option<MusicStyle>,
    pub glitch_amount: Option<f32>,
    /// 0 = style A, 1 = style B.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_ratio: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f32>,
    /// Bus B trance-gate depth in [0,1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_intensity: Option<f32>,
}

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 200.0;

impl SoundParameters {
    /// Target style ratio (fallback 0.3).
    pub fn style_ratio(&self) -> f32 {
        clamped_or(self.style_ratio, 0.3, 0.0, 1.0)
    }

    /// Target tempo: explicit `bpm`, else `70 + rhythm_speed * 70`.
    pub fn target_bpm(&self) -> f32 {
        let rhythm = clamped_or(self.rhythm_speed, 0.0, 0.0, 2.0);
        clamped_or(self.bpm, 70.0 + rhythm * 70.0, MIN_BPM, MAX_BPM)
    }

    pub fn gate_intensity(&self) -> f32 {
        clamped_or(self.gate_intensity, 0.0, 0.0, 1.0)
    }

    pub fn reverb_wetness(&self) -> f32 {
        clamped_or(self.reverb_wetness, 0.5, 0.0, 1.0)
    }

    /// Style-A cutoff (fallback 800 Hz).
    pub fn style_a_cutoff(&self) -> f32 {
        clamped_or(self.filter_frequency, 800.0, 40.0, 18_000.0)
    }

    /// Style-B cutoff (fallback 2000 Hz).
    pub fn style_b_cutoff(&self) -> f32 {
        clamped_or(self.filter_frequency, 2000.0, 40.0, 18_000.0)
    }

    /// Style-A release (fallback 10 s).
    pub fn release(&self) -> f32 {
        clamped_or(self.release, 10.0, 0.05, 20.0)
    }

    /// Time over which the style-A filter closes (fallback 8 s).
    pub fn filter_decay(&self) -> f32 {
        clamped_or(self.release, 8.0, 0.05, 20.0)
    }

    /// Pad attack (fallback 2 s).
    pub fn pad_attack(&self) -> f32 {
        clamped_or(self.attack, 2.0, 0.5, 4.0)
    }

    /// Playable scale: finite positive tones, or the base frequency alone.
    pub fn scale(&self) -> Vec<f32> {
        let tones: Vec<f32> = self
            .musical_scale
            .iter()
            .copied()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| f.clamp(20.0, 8000.0))
            .collect();

        if tones.is_empty() {
            let base = finite_or(self.base_frequency, 220.0);
            let base = if base > 0.0 { base } else { 220.0 };
            vec![base.clamp(20.0, 8000.0)]
        } else {
            tones
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bpm_fallback_from_rhythm() {
        let mut params = SoundParameters::default();
        assert_eq!(params.target_bpm(), 70.0);

        params.rhythm_speed = Some(0.5);
        assert_eq!(params.target_bpm(), 105.0);

        params.bpm = Some(128.0);
        assert_eq!(params.target_bpm(), 128.0);

        params.bpm = Some(f32::INFINITY);
        assert_eq!(params.target_bpm(), 105.0);

        params.bpm = Some(1000.0);
        assert_eq!(params.target_bpm(), MAX_BPM);
    }

    #[test]
    fn test_scale_filters_bad_tones() {
        let params = SoundParameters {
            musical_scale: vec![220.0, f32::NAN, -5.0, 330.0],
            ..Default::default()
        };
        assert_eq!(params.scale(), vec![220.0, 330.0]);
    }

    #[test]
    fn test_scale_falls_back_to_base_frequency() {
        let mut params = SoundParameters::default();
        assert_eq!(params.scale(), vec![220.0]);

        params.base_frequency = Some(110.0);
        assert_eq!(params.scale(), vec![110.0]);

        params.base_frequency = Some(-1.0);
        assert_eq!(params.scale(), vec![220.0]);
    }

    #[test]
    fn test_style_ratio_default_and_clamp() {
        let mut params = SoundParameters::default();
        assert_eq!(params.style_ratio(), 0.3);
        params.style_ratio = Some(1.7);
        assert_eq!(params.style_ratio(), 1.0);
    }

    #[test]
    fn test_deserialize_wire_names() {
        let json = r#"{
            "baseFrequency": 196.0,
            "oscillatorType": "sawtooth",
            "musicalScale": [196.0, 220.0, 246.94],
            "harmonyType": "CHORD",
            "musicStyle": "SAKAMOTO",
            "styleRatio": 0.1,
            "gateIntensity": 0.4
        }"#;
        let params: SoundParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.oscillator_type, OscillatorType::Sawtooth);
        assert_eq!(params.harmony_type, HarmonyType::Chord);
        assert_eq!(params.music_style, Some(MusicStyle::Sakamoto));
        assert_eq!(params.scale().len(), 3);
        assert_eq!(params.gate_intensity(), 0.4);
    }
}
