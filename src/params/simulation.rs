//! Visual simulation parameters as delivered by the generation collaborator.
//!
//! Every numeric field is optional on the wire. Consumers read through the
//! accessor methods, which apply the sanitize-and-clamp policy (reject
//! non-finite, substitute fallback, clamp to a safe range).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sanitize::{clamped_or, color_or, finite_or};

wire_enum! {
    /// Base shape selector for every object in the cluster.
    ///
    /// An unrecognized selector renders as a dense icosphere.
    #[derive(Default)]
    pub enum ShapeType {
        #[default]
        Sphere => "SPHERE",
        Box => "BOX",
        Torus => "TORUS",
        Dodecahedron => "DODECAHEDRON",
        Particles => "PARTICLES",
        Slime => "SLIME",
        Ring => "RING",
        Complex => "COMPLEX",
        Levitrope => "LEVITROPE",
        Voxel => "VOXEL",
        PixelGrid => "PIXEL_GRID",
        ParticleField => "PARTICLE_FIELD",
        Environment => "ENVIRONMENT",
        Household => "HOUSEHOLD",
    }
}

wire_enum! {
    /// Camera choreography mode. Unrecognized modes use the orbit.
    #[derive(Default)]
    pub enum CameraMode {
        #[default]
        Orbit => "ORBIT",
        Drone => "DRONE",
        Macro => "MACRO",
        CinematicPan => "CINEMATIC_PAN",
        ZoomPulse => "ZOOM_PULSE",
        Interactive => "INTERACTIVE",
        StaticWide => "STATIC_WIDE",
        PushIn => "PUSH_IN",
        DollyZoom => "DOLLY_ZOOM",
        TrackingArc => "TRACKING_ARC",
        Handheld => "HANDHELD",
    }
}

/// Snapshot of the visual parameters for one generation.
///
/// Replaced wholesale on each new generation; never partially edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationParameters {
    pub shape_type: ShapeType,
    /// Hex colors; index 0 primary, 1 secondary, 2 accent.
    pub color_palette: Vec<String>,
    pub rotation_speed: Option<f32>,
    /// Deformation amplitude.
    pub mutation_scale: Option<f32>,
    pub complexity: Option<f32>,
    pub roughness: Option<f32>,
    pub metalness: Option<f32>,
    pub ior: Option<f32>,
    pub clearcoat: Option<f32>,
    pub transmission: Option<f32>,
    pub thickness: Option<f32>,
    /// Time dilation of the flow field (0 = fast, 1 = slow).
    pub viscosity: Option<f32>,
    pub reflectivity: Option<f32>,
    pub wireframe: Option<bool>,
    pub bloom_intensity: Option<f32>,
    pub environment_type: Option<String>,
    pub camera_mode: CameraMode,
    pub attenuation_color: Option<String>,
    pub attenuation_distance: Option<f32>,
    pub anisotropy: Option<f32>,
    pub anisotropy_rotation: Option<f32>,
    pub specular_intensity: Option<f32>,
    pub specular_color: Option<String>,
    pub emissive_color: Option<String>,
    pub emissive_intensity: Option<f32>,
    pub audio_reactivity: Option<f32>,
    pub levitation_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_keywords: Option<String>,
    pub particle_density: Option<f32>,
    pub voxel_scale: Option<f32>,
    pub shadow_intensity: Option<f32>,
    pub object_count: Option<f32>,
    /// How tightly the objects huddle (0 = spread, 1 = touching).
    pub fusion_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iridescence_intensity: Option<f32>,
}

pub const MIN_OBJECTS: usize = 2;
pub const MAX_OBJECTS: usize = 5;

const DEFAULT_PRIMARY: &str = "#ccccdd";
const DEFAULT_ACCENT: &str = "#8888cc";
const DEFAULT_EMISSIVE: &str = "#0a0a15";

impl SimulationParameters {
    /// Deformation amplitude (fallback 5, range [0, 20]).
    pub fn mutation_scale(&self) -> f32 {
        clamped_or(self.mutation_scale, 5.0, 0.0, 20.0)
    }

    pub fn viscosity(&self) -> f32 {
        clamped_or(self.viscosity, 0.8, 0.0, 1.0)
    }

    pub fn fusion_factor(&self) -> f32 {
        clamped_or(self.fusion_factor, 0.5, 0.0, 1.0)
    }

    /// Number of objects in the cluster, always in `[MIN_OBJECTS, MAX_OBJECTS]`.
    pub fn object_count(&self) -> usize {
        let raw = finite_or(self.object_count, 3.0).round();
        (raw.max(0.0) as usize).clamp(MIN_OBJECTS, MAX_OBJECTS)
    }

    pub fn ior(&self) -> f32 {
        clamped_or(self.ior, 2.0, 1.0, 2.333)
    }

    /// Thin-film thickness in scene units (fallback 2, range [0.1, 10]).
    pub fn thickness(&self) -> f32 {
        clamped_or(self.thickness, 2.0, 0.1, 10.0)
    }

    pub fn metalness(&self) -> f32 {
        clamped_or(self.metalness, 0.95, 0.0, 1.0)
    }

    /// Fallback 0.5, range [0.01, 1].
    pub fn iridescence_intensity(&self) -> f32 {
        clamped_or(self.iridescence_intensity, 0.5, 0.01, 1.0)
    }

    pub fn emissive_intensity(&self) -> f32 {
        clamped_or(self.emissive_intensity, 0.02, 0.0, 2.0)
    }

    pub fn audio_reactivity(&self) -> f32 {
        clamped_or(self.audio_reactivity, 1.0, 0.0, 3.0)
    }

    pub fn levitation_scale(&self) -> f32 {
        clamped_or(self.levitation_scale, 1.0, 0.0, 5.0)
    }

    /// Main light intensity (fallback 1.5).
    pub fn shadow_intensity(&self) -> f32 {
        clamped_or(self.shadow_intensity, 1.5, 0.0, 5.0)
    }

    /// Group rotation rate in radians per frame is `rotation_speed() * 0.008`.
    pub fn rotation_speed(&self) -> f32 {
        clamped_or(self.rotation_speed, 0.5, -5.0, 5.0)
    }

    pub fn primary_color(&self) -> Vec3 {
        color_or(self.color_palette.first().map(String::as_str), DEFAULT_PRIMARY)
    }

    pub fn secondary_color(&self) -> Vec3 {
        color_or(self.color_palette.get(1).map(String::as_str), DEFAULT_PRIMARY)
    }

    pub fn accent_color(&self) -> Vec3 {
        color_or(self.color_palette.get(2).map(String::as_str), DEFAULT_ACCENT)
    }

    pub fn emissive_color(&self) -> Vec3 {
        color_or(self.emissive_color.as_deref(), DEFAULT_EMISSIVE)
    }
}
