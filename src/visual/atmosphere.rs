//! Scene layers around the cluster: a drifting particle shell and three
//! slowly spinning boundary rings.
//!
//! The particle shell is regenerated with each cluster from the same seeded
//! RNG; its transform is a pure function of time. The rings are fixed
//! geometry whose orientation advances a little every frame.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::Rng;

use super::deform::breathe;
use super::geometry::{self, Mesh};

pub const PARTICLE_COUNT: usize = 2000;

/// Shell radii of the particle field.
pub const PARTICLE_RADIUS_MIN: f32 = 30.0;
pub const PARTICLE_RADIUS_MAX: f32 = 100.0;

/// Billboard edge length in world units.
pub const PARTICLE_SIZE: f32 = 0.35;
pub const PARTICLE_OPACITY: f32 = 0.5;

pub const RING_COUNT: usize = 3;

/// One point of the shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub color: Vec3,
}

/// Pale blue-violet dust filling the space around the cluster.
pub struct ParticleField {
    particles: Vec<Particle>,
}

impl ParticleField {
    pub fn generate(rng: &mut StdRng) -> Self {
        let particles = (0..PARTICLE_COUNT)
            .map(|_| {
                let radius = PARTICLE_RADIUS_MIN + rng.gen::<f32>() * (PARTICLE_RADIUS_MAX - PARTICLE_RADIUS_MIN);
                let theta = rng.gen::<f32>() * TAU;
                let phi = (rng.gen::<f32>() * 2.0 - 1.0).acos();
                let position = Vec3::new(
                    radius * phi.sin() * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                    radius * phi.cos(),
                );
                let hue = 0.55 + rng.gen::<f32>() * 0.15;
                let lightness = 0.7 + rng.gen::<f32>() * 0.2;
                Particle {
                    position,
                    color: hsl_to_rgb(hue, 0.3, lightness),
                }
            })
            .collect();
        Self { particles }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Uniform scale of the shell; follows the cluster's breathing.
    pub fn scale(t: f32) -> f32 {
        1.0 + breathe(t) * 0.1
    }

    /// `(x, y)` Euler rotation of the shell at time `t`.
    pub fn rotation(t: f32) -> (f32, f32) {
        ((t * 0.02).sin() * 0.08, t * 0.03)
    }

    pub fn model_matrix(t: f32) -> Mat4 {
        let (x, y) = Self::rotation(t);
        Mat4::from_scale_rotation_translation(
            Vec3::splat(Self::scale(t)),
            Quat::from_euler(EulerRot::XYZ, x, y, 0.0),
            Vec3::ZERO,
        )
    }
}

/// A thin torus marking the edge of the field.
pub struct FieldRing {
    pub mesh: Mesh,
    pub color: Vec3,
    pub opacity: f32,
    rotation_x: f32,
    rotation_z: f32,
    index: usize,
}

impl FieldRing {
    fn new(index: usize) -> Self {
        let i = index as f32;
        Self {
            mesh: geometry::torus(80.0 + i * 30.0, 0.3 - i * 0.05, 16, 128, TAU),
            color: hsl_to_rgb(0.6 + i * 0.1, 0.3, 0.2),
            opacity: 0.15 - i * 0.03,
            rotation_x: FRAC_PI_2 + i * 0.2,
            rotation_z: i * 0.3,
            index,
        }
    }

    /// Current `(x, z)` Euler angles.
    pub fn rotation(&self) -> (f32, f32) {
        (self.rotation_x, self.rotation_z)
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_quat(Quat::from_euler(EulerRot::XYZ, self.rotation_x, 0.0, self.rotation_z))
    }

    fn advance(&mut self) {
        let i = self.index as f32;
        self.rotation_z = (self.rotation_z + 0.001 * (i + 1.0)).rem_euclid(TAU);
        self.rotation_x = (self.rotation_x + 0.0005 * (RING_COUNT as f32 - i)).rem_euclid(TAU);
    }
}

pub struct FieldRings {
    rings: Vec<FieldRing>,
}

impl FieldRings {
    pub fn new() -> Self {
        Self {
            rings: (0..RING_COUNT).map(FieldRing::new).collect(),
        }
    }

    pub fn rings(&self) -> &[FieldRing] {
        &self.rings
    }

    /// One display frame of spin.
    pub fn advance(&mut self) {
        for ring in &mut self.rings {
            ring.advance();
        }
    }
}

impl Default for FieldRings {
    fn default() -> Self {
        Self::new()
    }
}

/// HSL to RGB, every component in 0..1.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Vec3 {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    if s == 0.0 {
        return Vec3::splat(l);
    }
    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f32| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * 6.0 * (2.0 / 3.0 - t)
        } else {
            p
        }
    };
    Vec3::new(channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}
