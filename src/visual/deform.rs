//! Per-vertex displacement field for the fusion cluster.
//!
//! Displacement is always recomputed from the rest position, never
//! accumulated, so a frame's output depends only on `(rest, t, bands, params)`.

use glam::Vec3;

use super::noise::curl_noise;
use crate::audio::AudioBands;
use crate::params::SimulationParameters;

/// Mutation amplitude at which the flow field runs at full strength.
pub const REFERENCE_MUTATION: f32 = 5.0;

/// Global damping applied to the scalar displacement.
pub const DAMPING: f32 = 0.35;

/// Scale of the curl flow offset.
pub const FLOW_SCALE: f32 = 0.3;

/// Spatial frequency at which the curl field is sampled.
const CURL_SPACE_SCALE: f32 = 0.1;
const CURL_TIME_SCALE: f32 = 0.3;

/// Slow two-sine breathing scalar (~0.01–0.02 Hz components).
#[inline]
pub fn breathe(t: f32) -> f32 {
    (t * 0.15).sin() * 0.3 + (t * 0.08).sin() * 0.2
}

/// Time-dependent terms shared by every vertex of a frame.
#[derive(Debug, Clone, Copy)]
pub struct DeformFrame {
    pub t: f32,
    /// Viscosity-dilated time
    pub vt: f32,
    pub bands: AudioBands,
    pub mutation: f32,
    breathe_disp: f32,
    fusion: f32,
    flow: f32,
}

impl DeformFrame {
    pub fn new(t: f32, bands: AudioBands, params: &SimulationParameters) -> Self {
        let viscosity = params.viscosity();
        Self {
            t,
            vt: t * (1.2 - viscosity * 0.8),
            bands,
            mutation: params.mutation_scale(),
            breathe_disp: breathe(t) * (1.0 + bands.low * 2.0),
            fusion: 0.8 + bands.low * 0.5,
            flow: 0.8 + bands.mid * 1.5,
        }
    }

    /// Displaced position of a vertex whose rest position is `rest`.
    pub fn displace(&self, rest: Vec3) -> Vec3 {
        let d = rest.length();
        let vt = self.vt;

        let curl = curl_noise(rest * CURL_SPACE_SCALE, vt * CURL_TIME_SCALE);

        let w1 = (d * 0.25 - vt * 0.6).sin() * self.fusion * 0.4;
        let w2 = (rest.x * 0.4 + rest.y * 0.3 - vt).sin() * (rest.z * 0.35 + vt * 0.5).cos() * 0.3;
        let w3 = (d * 0.12 + vt * 0.2).sin() * 0.25;
        let tremor = self.bands.high * (self.t * 20.0 + d * 2.0).sin() * 0.05;

        let total = (w1 + w2 + w3) * self.mutation * DAMPING
            + self.breathe_disp * REFERENCE_MUTATION * DAMPING
            + tremor;

        let normal = rest.try_normalize().unwrap_or(Vec3::Y);
        let flow = curl * self.flow * FLOW_SCALE * (self.mutation / REFERENCE_MUTATION);

        rest + normal * total + flow
    }

    /// Displace every rest position into `out`.
    ///
    /// Non-finite results are replaced by the rest position; the number of
    /// replaced vertices is returned.
    pub fn displace_all(&self, rest: &[Vec3], out: &mut [Vec3]) -> usize {
        let mut replaced = 0;
        for (dst, &src) in out.iter_mut().zip(rest) {
            let p = self.displace(src);
            if p.is_finite() {
                *dst = p;
            } else {
                *dst = src;
                replaced += 1;
            }
        }
        replaced
    }
}
