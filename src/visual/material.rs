//! Surface materials for the cluster objects.
//!
//! Two strategies selected once at construction: a physically based metal
//! with thin-film iridescence, and a custom refraction/reflection shader that
//! samples the theme image. Every input is sanitized here so the GPU never
//! receives a non-finite uniform.

use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use rand::Rng;

use crate::audio::AudioBands;
use crate::params::{RenderConfig, SimulationParameters};
use crate::sanitize::finite_scalar;

/// Which shading strategy the cluster uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Physical,
    Refraction,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Physical => "physical",
            RenderMode::Refraction => "refraction",
        }
    }
}

/// Animated surface terms shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceAnimation {
    pub roughness: f32,
    pub iridescence: f32,
}

impl SurfaceAnimation {
    pub const ROUGHNESS_RANGE: (f32, f32) = (0.05, 0.35);
    pub const IRIDESCENCE_RANGE: (f32, f32) = (0.3, 0.8);

    /// Roughness wobbles on a slow sine and roughens with `high`; thin-film
    /// strength follows the running phase plus `mid`.
    pub fn at(t: f32, bands: AudioBands, phase: f32) -> Self {
        let (rmin, rmax) = Self::ROUGHNESS_RANGE;
        let (imin, imax) = Self::IRIDESCENCE_RANGE;
        let roughness = 0.15 + (t * 0.5).sin() * 0.1 + bands.high * 0.15;
        let iridescence = 0.4 + phase.sin() * 0.3 + bands.mid * 0.2;
        Self {
            roughness: finite_scalar(roughness, 0.15).clamp(rmin, rmax),
            iridescence: finite_scalar(iridescence, 0.4).clamp(imin, imax),
        }
    }
}

/// Per-frame advance of the running thin-film phase.
#[inline]
pub fn phase_step(bands: AudioBands) -> f32 {
    finite_scalar(0.002 + bands.mid * 0.01, 0.002)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalMaterial {
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub transmission: f32,
    pub ior: f32,
    pub thickness: f32,
    pub env_intensity: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub iridescence: f32,
    pub iridescence_ior: f32,
    /// Thin-film thickness range in nanometres.
    pub iridescence_thickness: (f32, f32),
    pub sheen: f32,
    pub sheen_color: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefractionMaterial {
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub ior: f32,
    pub thickness: f32,
    pub fresnel_power: f32,
    pub opacity_range: (f32, f32),
    pub iridescence: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
}

/// Tagged material, decided once per cluster build.
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Physical(PhysicalMaterial),
    Refraction(RefractionMaterial),
}

impl Material {
    pub fn new<R: Rng>(
        mode: RenderMode,
        params: &SimulationParameters,
        render: &RenderConfig,
        has_theme: bool,
        rng: &mut R,
    ) -> Self {
        let iridescence = params.iridescence_intensity();
        let thickness = params.thickness();
        let roughness = (0.1 + rng.gen::<f32>() * 0.15).clamp(0.05, 0.35);

        match mode {
            RenderMode::Physical => {
                let env_base = if has_theme { 2.5 } else { 2.0 };
                Material::Physical(PhysicalMaterial {
                    color: params.primary_color() * 0.85,
                    metalness: (0.92 + rng.gen::<f32>() * 0.08).clamp(0.9, 1.0),
                    roughness,
                    transmission: 0.1,
                    ior: 2.0,
                    thickness,
                    env_intensity: (env_base + iridescence * 1.5).clamp(0.1, 5.0),
                    emissive: params.emissive_color(),
                    emissive_intensity: 0.02,
                    clearcoat: 0.9,
                    clearcoat_roughness: 0.05,
                    iridescence: (iridescence * 0.8).clamp(0.1, 0.8),
                    iridescence_ior: (1.3 + rng.gen::<f32>() * 0.3).clamp(1.1, 2.0),
                    iridescence_thickness: (100.0, (350.0 + iridescence * 300.0).clamp(200.0, 800.0)),
                    sheen: (iridescence * 0.25).clamp(0.01, 0.5),
                    sheen_color: params.accent_color(),
                })
            }
            RenderMode::Refraction => {
                let (lo, hi) = render.opacity_range;
                let lo = finite_scalar(lo, 0.35).clamp(0.0, 1.0);
                let hi = finite_scalar(hi, 0.95).clamp(lo, 1.0);
                Material::Refraction(RefractionMaterial {
                    color: params.primary_color(),
                    metalness: params.metalness(),
                    roughness,
                    ior: params.ior(),
                    thickness,
                    fresnel_power: finite_scalar(render.fresnel_power, 5.0).clamp(0.5, 10.0),
                    opacity_range: (lo, hi),
                    iridescence: (iridescence * 0.8).clamp(0.1, 0.8),
                    emissive: params.emissive_color(),
                    emissive_intensity: params.emissive_intensity(),
                })
            }
        }
    }

    pub fn mode(&self) -> RenderMode {
        match self {
            Material::Physical(_) => RenderMode::Physical,
            Material::Refraction(_) => RenderMode::Refraction,
        }
    }

    pub fn roughness(&self) -> f32 {
        match self {
            Material::Physical(m) => m.roughness,
            Material::Refraction(m) => m.roughness,
        }
    }

    pub fn iridescence(&self) -> f32 {
        match self {
            Material::Physical(m) => m.iridescence,
            Material::Refraction(m) => m.iridescence,
        }
    }

    /// Apply this frame's roughness and thin-film animation.
    pub fn animate(&mut self, animation: SurfaceAnimation) {
        let (roughness, iridescence) = match self {
            Material::Physical(m) => (&mut m.roughness, &mut m.iridescence),
            Material::Refraction(m) => (&mut m.roughness, &mut m.iridescence),
        };
        *roughness = animation.roughness;
        *iridescence = animation.iridescence;
    }

    /// Pack into the GPU layout for the current frame.
    pub fn uniforms(&self, t: f32, bands: AudioBands, phase: f32) -> MaterialUniforms {
        let frame = [
            finite_scalar(t, 0.0),
            finite_scalar(bands.low, 0.0),
            finite_scalar(bands.mid, 0.0),
            finite_scalar(bands.high, 0.0),
        ];
        let phase = finite_scalar(phase, 0.0) % TAU;

        let uniforms = match self {
            Material::Physical(m) => MaterialUniforms {
                color: rgba(m.color, 1.0),
                emissive: rgba(m.emissive, m.emissive_intensity),
                sheen: rgba(m.sheen_color, m.sheen),
                surface: [m.metalness, m.roughness, m.iridescence, m.ior],
                optics: [m.thickness, m.env_intensity, m.clearcoat, m.transmission],
                frame,
                extra: [phase, 0.0, m.iridescence_thickness.1, m.iridescence_ior],
            },
            Material::Refraction(m) => MaterialUniforms {
                color: rgba(m.color, 1.0),
                emissive: rgba(m.emissive, m.emissive_intensity),
                sheen: [0.0; 4],
                surface: [m.metalness, m.roughness, m.iridescence, m.ior],
                optics: [m.thickness, m.fresnel_power, m.opacity_range.0, m.opacity_range.1],
                frame,
                extra: [phase, 1.0, base_reflectance(m.metalness), 0.0],
            },
        };
        uniforms.sanitized()
    }
}

fn rgba(rgb: Vec3, a: f32) -> [f32; 4] {
    [rgb.x, rgb.y, rgb.z, a]
}

/// Material block shared by both pipelines (std140-compatible, vec4 aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct MaterialUniforms {
    /// Base color (rgb) and alpha
    pub color: [f32; 4],
    /// Emissive color (rgb) and intensity
    pub emissive: [f32; 4],
    /// Sheen color (rgb) and strength
    pub sheen: [f32; 4],
    /// metalness, roughness, iridescence, ior
    pub surface: [f32; 4],
    /// Physical: thickness, env intensity, clearcoat, transmission.
    /// Refraction: thickness, fresnel power, opacity min, opacity max.
    pub optics: [f32; 4],
    /// time, low, mid, high
    pub frame: [f32; 4],
    /// phase, mode (0 physical / 1 refraction), F0 or film max, film ior
    pub extra: [f32; 4],
}

impl MaterialUniforms {
    pub fn is_finite(&self) -> bool {
        bytemuck::cast_slice::<_, f32>(std::slice::from_ref(self))
            .iter()
            .all(|v| v.is_finite())
    }

    /// Zero any non-finite component.
    fn sanitized(mut self) -> Self {
        for v in bytemuck::cast_slice_mut::<_, f32>(std::slice::from_mut(&mut self)) {
            if !v.is_finite() {
                log::warn!("Non-finite material uniform replaced");
                *v = 0.0;
            }
        }
        self
    }
}

/// Schlick base reflectance for the refraction shader.
#[inline]
pub fn base_reflectance(metalness: f32) -> f32 {
    0.04 + 0.46 * metalness.clamp(0.0, 1.0)
}

/// Schlick Fresnel with a configurable exponent.
pub fn fresnel_schlick(cos_theta: f32, f0: f32, power: f32) -> f32 {
    let c = cos_theta.clamp(0.0, 1.0);
    f0 + (1.0 - f0) * (1.0 - c).powf(power)
}

/// Direction → equirectangular texture coordinate in [0,1]².
pub fn equirect_uv(dir: Vec3) -> Vec2 {
    let d = dir.try_normalize().unwrap_or(Vec3::Z);
    Vec2::new(
        0.5 + d.z.atan2(d.x) / TAU,
        0.5 - d.y.clamp(-1.0, 1.0).asin() / PI,
    )
}

/// Closed-form thin-film tint: a cosine palette whose phase depends on the
/// optical path through the film.
pub fn thin_film_color(cos_theta: f32, thickness: f32, phase: f32) -> Vec3 {
    let path = thickness * (1.0 - cos_theta.clamp(0.0, 1.0)) * 2.0 + phase / TAU;
    Vec3::new(
        0.5 + 0.5 * (TAU * path).cos(),
        0.5 + 0.5 * (TAU * (path + 0.33)).cos(),
        0.5 + 0.5 * (TAU * (path + 0.67)).cos(),
    )
}

/// Opaque at grazing angles, translucent face-on, always inside `range`.
pub fn opacity(cos_theta: f32, f0: f32, power: f32, range: (f32, f32)) -> f32 {
    let f = fresnel_schlick(cos_theta, f0, power);
    (range.0 + (range.1 - range.0) * f).clamp(range.0, range.1)
}
