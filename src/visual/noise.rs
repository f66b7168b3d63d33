//! Noise sources for deformation and camera motion.
//!
//! The deformation field uses a closed-form trigonometric pseudo-noise so the
//! CPU path is cheap and fully deterministic. Camera jitter uses OpenSimplex.

use glam::Vec3;
use noise::{NoiseFn, OpenSimplex};

/// Finite-difference step for the curl field.
pub const CURL_EPSILON: f32 = 0.01;

/// Magnitude below which the curl vector is replaced by `CURL_FALLBACK`.
pub const CURL_MIN_LENGTH: f32 = 1.0e-4;

pub const CURL_FALLBACK: Vec3 = Vec3::Y;

/// Smooth scalar field in roughly [-1.5, 1.5].
#[inline]
pub fn flow_noise(p: Vec3, t: f32) -> f32 {
    (p.x * 1.5 + t * 0.3).sin() * (p.y * 1.2 + t * 0.2).cos() * (p.z * 1.1 + t * 0.4).sin()
        + (p.x * 0.7 - t * 0.5).sin() * (p.z * 0.9 + t * 0.3).cos() * 0.5
}

/// Unit-length curl of the field `flow_noise(p) * (1, 1, 1)`, from central
/// differences at six points around `p`.
///
/// Degenerate (near-zero or non-finite) results return `CURL_FALLBACK`.
pub fn curl_noise(p: Vec3, t: f32) -> Vec3 {
    let e = CURL_EPSILON;
    let dx = flow_noise(p + Vec3::X * e, t) - flow_noise(p - Vec3::X * e, t);
    let dy = flow_noise(p + Vec3::Y * e, t) - flow_noise(p - Vec3::Y * e, t);
    let dz = flow_noise(p + Vec3::Z * e, t) - flow_noise(p - Vec3::Z * e, t);

    let curl = Vec3::new(dy - dz, dz - dx, dx - dy) / (2.0 * e);
    let length = curl.length();
    if !length.is_finite() || length < CURL_MIN_LENGTH {
        CURL_FALLBACK
    } else {
        curl / length
    }
}

/// OpenSimplex source for organic camera shake.
pub struct JitterNoise {
    simplex: OpenSimplex,
}

impl JitterNoise {
    pub fn new(seed: u32) -> Self {
        Self {
            simplex: OpenSimplex::new(seed),
        }
    }

    /// Three decorrelated channels in [-1, 1] at time `t` (seconds).
    pub fn sample(&self, t: f32, frequency: f32) -> Vec3 {
        let u = (t * frequency) as f64;
        Vec3::new(
            self.simplex.get([u, 0.0, 0.0]) as f32,
            self.simplex.get([0.0, u, 17.0]) as f32,
            self.simplex.get([31.0, 0.0, u]) as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curl_is_unit_length() {
        for i in 0..50 {
            let p = Vec3::new(i as f32 * 0.37, (i as f32 * 0.11).sin() * 4.0, -(i as f32) * 0.23);
            let c = curl_noise(p, i as f32 * 0.1);
            assert!((c.length() - 1.0).abs() < 1e-3, "{:?}", c);
        }
    }

    #[test]
    fn test_curl_degenerate_fallback() {
        let c = curl_noise(Vec3::splat(f32::NAN), 0.0);
        assert_eq!(c, CURL_FALLBACK);
    }

    #[test]
    fn test_flow_noise_bounded() {
        for i in 0..200 {
            let p = Vec3::new(i as f32 * 0.7, i as f32 * -0.3, i as f32 * 1.3);
            assert!(flow_noise(p, i as f32).abs() <= 1.5 + 1e-5);
        }
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        let a = JitterNoise::new(3);
        let b = JitterNoise::new(3);
        for i in 0..20 {
            let t = i as f32 * 0.13;
            let s = a.sample(t, 0.7);
            assert_eq!(s, b.sample(t, 0.7));
            assert!(s.abs().max_element() <= 1.0);
        }
    }
}
