//! Time-driven camera choreography and the orbiting light rig.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, TAU};

use glam::{Mat4, Vec3};

use super::noise::JitterNoise;
use crate::audio::AudioBands;
use crate::params::{CameraDrift, CameraMode, LightRig, RenderConfig, SimulationParameters};
use crate::sanitize::finite_scalar;

/// Camera placement for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub eye: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
}

impl CameraPose {
    /// Create view-projection matrix for rendering
    pub fn view_proj(&self, render_config: &RenderConfig) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, Vec3::Y);
        let proj = Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            render_config.aspect_ratio(),
            render_config.near_plane,
            render_config.far_plane,
        );
        proj * view
    }
}

/// Autonomous camera for one generation.
pub struct CameraRig {
    mode: CameraMode,
    drift: CameraDrift,
    /// Seeded starting angle around the cluster
    angle_offset: f32,
    jitter: JitterNoise,
}

impl CameraRig {
    pub fn new(mode: CameraMode, drift: CameraDrift, seed: u64) -> Self {
        let angle_offset = (seed % 3600) as f32 / 3600.0 * TAU;
        Self {
            mode,
            drift,
            angle_offset,
            jitter: JitterNoise::new(seed as u32),
        }
    }

    pub fn mode(&self) -> &CameraMode {
        &self.mode
    }

    /// Base slow orbit: wandering speed, radius and height, plus a look-at
    /// point that trails the camera clock.
    fn orbit(&self, t: f32, bands: AudioBands, radius_scale: f32) -> (Vec3, Vec3) {
        let d = &self.drift;
        let speed = d.base_speed + (t * d.speed_wander_freq).sin() * d.speed_wander;
        let radius = (d.radius + (t * d.radius_wander_freq).sin() * d.radius_wander) * radius_scale;
        let angle = t * speed + (t * 0.02).sin() * 0.4 + (t * 0.05).sin() * 0.2 + self.angle_offset;

        let [(a1, f1), (a2, f2)] = d.height_wander;
        let y = d.height + (t * f1).sin() * a1 + (t * f2).sin() * a2 + bands.low * d.low_band_lift;

        let eye = Vec3::new(angle.sin() * radius, y, angle.cos() * radius);
        (eye, self.look_target(t))
    }

    fn look_target(&self, t: f32) -> Vec3 {
        let lagged = t - self.drift.look_lag_s;
        let x = (lagged * 0.05).sin() * 2.0;
        let y = (lagged * 0.07).sin() * 1.5;
        Vec3::new(x, y, x * 0.3)
    }

    /// Pose at time `t` (seconds) for the configured mode.
    ///
    /// Non-finite inputs collapse to the fixed wide shot.
    pub fn pose(&self, t: f32, bands: AudioBands, base_fov: f32) -> CameraPose {
        let t = finite_scalar(t, 0.0);
        let bands = AudioBands {
            low: finite_scalar(bands.low, 0.0),
            mid: finite_scalar(bands.mid, 0.0),
            high: finite_scalar(bands.high, 0.0),
        };
        let wide = Vec3::from_array(self.drift.wide_position);
        let mut fov = base_fov;

        let (eye, target) = match self.mode {
            CameraMode::Orbit | CameraMode::Unknown(_) => self.orbit(t, bands, 1.0),
            CameraMode::Drone => {
                let (eye, target) = self.orbit(t * 1.6, bands, 1.15);
                (eye + Vec3::Y * 12.0, target)
            }
            CameraMode::Macro => self.orbit(t * 0.6, bands, 0.45),
            CameraMode::CinematicPan => {
                let angle = (t * 0.05).sin() * 1.2 + self.angle_offset;
                let r = self.drift.radius;
                let eye = Vec3::new(angle.sin() * r, self.drift.height * 0.6, angle.cos() * r);
                (eye, self.look_target(t))
            }
            CameraMode::ZoomPulse => {
                let scale = 1.0 - 0.25 * (t * 0.5).sin() - bands.low * 0.1;
                self.orbit(t, bands, scale)
            }
            CameraMode::Interactive | CameraMode::StaticWide => (wide, Vec3::ZERO),
            CameraMode::PushIn => {
                // Slow in-and-out cycle between 60% and 100% of the orbit
                let scale = 0.6 + 0.4 * (0.5 + 0.5 * (t * 0.03).cos());
                self.orbit(t, bands, scale)
            }
            CameraMode::DollyZoom => {
                let scale = 1.0 + 0.3 * (t * 0.1).sin();
                // Keep the subject size constant while the distance changes
                let half = (base_fov.to_radians() * 0.5).tan() / scale;
                fov = (half.atan() * 2.0).to_degrees();
                self.orbit(t, bands, scale)
            }
            CameraMode::TrackingArc => {
                let angle = (t * 0.04).sin() * FRAC_PI_3 + self.angle_offset;
                let r = self.drift.radius * 0.8;
                let y = self.drift.height * 0.4 + bands.low * self.drift.low_band_lift;
                (Vec3::new(angle.sin() * r, y, angle.cos() * r), self.look_target(t))
            }
            CameraMode::Handheld => {
                let (eye, target) = self.orbit(t, bands, 0.85);
                let shake = self.jitter.sample(t, 0.7) * self.drift.handheld_jitter;
                let sway = self.jitter.sample(t + 100.0, 0.3) * self.drift.handheld_jitter * 0.5;
                (eye + shake, target + sway)
            }
        };

        if eye.is_finite() && target.is_finite() && fov.is_finite() {
            CameraPose { eye, target, fov_degrees: fov.clamp(5.0, 120.0) }
        } else {
            CameraPose { eye: wide, target: Vec3::ZERO, fov_degrees: base_fov }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels (from source toward the scene)
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Every light in the scene for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLights {
    pub ambient: Vec3,
    pub key: DirectionalLight,
    pub rim: DirectionalLight,
    pub points: [PointLight; 4],
}

/// Four coloured point lights circling the cluster, brightening with `mid`.
pub fn orbiting_lights(rig: &LightRig, t: f32, bands: AudioBands, reactivity: f32) -> [PointLight; 4] {
    let mid = finite_scalar(bands.mid, 0.0);
    let intensity = finite_scalar(rig.base_intensity + mid * rig.mid_gain * reactivity, rig.base_intensity);
    let y = rig.height + (t * 0.5).sin() * rig.height_wander;

    std::array::from_fn(|i| {
        let angle = t * rig.speed + i as f32 * FRAC_PI_2;
        PointLight {
            position: Vec3::new(angle.sin() * rig.radius, y, angle.cos() * rig.radius),
            color: Vec3::from_array(rig.colors[i]),
            intensity,
        }
    })
}

pub fn scene_lights(rig: &LightRig, params: &SimulationParameters, t: f32, bands: AudioBands) -> SceneLights {
    SceneLights {
        ambient: Vec3::new(0x30 as f32, 0x30 as f32, 0x50 as f32) / 255.0 * 0.3,
        key: DirectionalLight {
            direction: -Vec3::new(50.0, 100.0, 50.0).normalize(),
            color: Vec3::ONE,
            intensity: params.shadow_intensity(),
        },
        rim: DirectionalLight {
            direction: -Vec3::new(-30.0, 20.0, -40.0).normalize(),
            color: Vec3::new(0x66 as f32, 0x88 as f32, 0xff as f32) / 255.0,
            intensity: 0.8,
        },
        points: orbiting_lights(rig, t, bands, params.audio_reactivity()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [CameraMode; 12] = [
        CameraMode::Orbit,
        CameraMode::Drone,
        CameraMode::Macro,
        CameraMode::CinematicPan,
        CameraMode::ZoomPulse,
        CameraMode::Interactive,
        CameraMode::StaticWide,
        CameraMode::PushIn,
        CameraMode::DollyZoom,
        CameraMode::TrackingArc,
        CameraMode::Handheld,
        CameraMode::Unknown(String::new()),
    ];

    #[test]
    fn test_every_mode_produces_finite_pose() {
        for mode in ALL_MODES {
            let rig = CameraRig::new(mode.clone(), CameraDrift::default(), 7);
            for i in 0..200 {
                let t = i as f32 * 0.5;
                let bands = AudioBands { low: 1.0, mid: 0.5, high: 0.2 };
                let pose = rig.pose(t, bands, 45.0);
                assert!(pose.eye.is_finite() && pose.target.is_finite(), "{:?}", mode);
                assert!(pose.eye.distance(pose.target) > 1.0, "{:?}", mode);
                assert!(pose.view_proj(&RenderConfig::default()).is_finite());
            }
        }
    }

    #[test]
    fn test_static_wide_holds_still() {
        let rig = CameraRig::new(CameraMode::StaticWide, CameraDrift::default(), 1);
        let a = rig.pose(0.0, AudioBands::SILENT, 45.0);
        let b = rig.pose(90.0, AudioBands { low: 1.0, mid: 1.0, high: 1.0 }, 45.0);
        assert_eq!(a, b);
        assert_eq!(a.eye, Vec3::new(0.0, 14.0, 46.0));
    }

    #[test]
    fn test_low_band_lifts_orbit() {
        let rig = CameraRig::new(CameraMode::Orbit, CameraDrift::default(), 3);
        let quiet = rig.pose(10.0, AudioBands::SILENT, 45.0);
        let loud = rig.pose(10.0, AudioBands { low: 1.0, mid: 0.0, high: 0.0 }, 45.0);
        assert!((loud.eye.y - quiet.eye.y - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_orbit_radius_stays_in_wander_band() {
        let rig = CameraRig::new(CameraMode::Orbit, CameraDrift::default(), 5);
        for i in 0..500 {
            let eye = rig.pose(i as f32, AudioBands::SILENT, 45.0).eye;
            let r = Vec3::new(eye.x, 0.0, eye.z).length();
            assert!((30.0 - 1e-3..=46.0 + 1e-3).contains(&r));
        }
    }

    #[test]
    fn test_dolly_zoom_narrows_fov_when_pulling_back() {
        let rig = CameraRig::new(CameraMode::DollyZoom, CameraDrift::default(), 0);
        // sin(t * 0.1) = 1 at t = 5π
        let pose = rig.pose(5.0 * std::f32::consts::PI, AudioBands::SILENT, 45.0);
        assert!(pose.fov_degrees < 45.0);
    }

    #[test]
    fn test_lights_orbit_and_react_to_mid() {
        let rig = LightRig::default();
        let quiet = orbiting_lights(&rig, 2.0, AudioBands::SILENT, 1.0);
        let loud = orbiting_lights(&rig, 2.0, AudioBands { low: 0.0, mid: 1.0, high: 0.0 }, 1.0);
        for (q, l) in quiet.iter().zip(&loud) {
            assert_eq!(q.intensity, 50.0);
            assert_eq!(l.intensity, 200.0);
            let r = Vec3::new(q.position.x, 0.0, q.position.z).length();
            assert!((r - 30.0).abs() < 1e-3);
        }
        // Quarter-turn spacing
        let a = quiet[0].position;
        let b = quiet[1].position;
        assert!(Vec3::new(a.x, 0.0, a.z).dot(Vec3::new(b.x, 0.0, b.z)).abs() < 1e-2);
    }

    #[test]
    fn test_key_light_uses_shadow_intensity() {
        let params = SimulationParameters {
            shadow_intensity: Some(f32::NAN),
            ..Default::default()
        };
        let lights = scene_lights(&LightRig::default(), &params, 0.0, AudioBands::SILENT);
        assert_eq!(lights.key.intensity, 1.5);
    }
}
