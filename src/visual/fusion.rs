//! The fusion cluster: 2–5 deforming cores arranged around a shared centre.
//!
//! Built once per parameter change from a seeded RNG, animated every frame,
//! and disposed before the next build.

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::Rng;

use super::deform::DeformFrame;
use super::geometry::{self, Mesh};
use super::material::{phase_step, Material, RenderMode, SurfaceAnimation};
use crate::audio::AudioBands;
use crate::params::{RenderConfig, ShapeType, SimulationParameters};

/// Nominal ring radius on which the cores are placed.
pub const FUSION_RADIUS: f32 = 8.0;

/// Group rotation per frame for `rotation_speed() == 1`.
pub const ROTATION_PER_FRAME: f32 = 0.008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Rest positions snapshotted, not yet animated
    Constructed,
    Animating,
    /// Meshes and rest positions released
    Disposed,
}

/// One core of the cluster.
pub struct FusionObject {
    /// Deformed positions and normals for the current frame
    pub mesh: Mesh,
    rest: Box<[Vec3]>,
    pub material: Material,
    pub shape: ShapeType,
    /// Ring position with the initial height
    pub anchor: Vec3,
    /// Per-object phase of the levitation bob
    pub bob_offset: f32,
    /// Anchor plus the current bob
    pub position: Vec3,
}

impl FusionObject {
    pub fn rest_positions(&self) -> &[Vec3] {
        &self.rest
    }

    /// Object-to-world transform inside a group rotated by `group_rotation_y`.
    pub fn model_matrix(&self, group_rotation_y: f32) -> Mat4 {
        Mat4::from_rotation_y(group_rotation_y) * Mat4::from_translation(self.position)
    }
}

pub struct FusionCluster {
    params: SimulationParameters,
    objects: Vec<FusionObject>,
    state: ClusterState,
    rotation_y: f32,
    iridescence_phase: f32,
}

impl FusionCluster {
    pub fn build(
        params: &SimulationParameters,
        mode: RenderMode,
        render: &RenderConfig,
        has_theme: bool,
        rng: &mut StdRng,
    ) -> Self {
        let count = params.object_count();
        let spread = 1.5 - params.fusion_factor();
        let mut objects = Vec::with_capacity(count);

        for i in 0..count {
            let shape = params.shape_type.clone();
            let mesh = base_mesh(&shape, rng);
            let material = Material::new(mode, params, render, has_theme, rng);

            let angle = ring_angle(i, count);
            let dist = FUSION_RADIUS * (0.3 + rng.gen::<f32>() * 0.4) * spread;
            let anchor = Vec3::new(angle.cos() * dist, (rng.gen::<f32>() - 0.5) * 6.0, angle.sin() * dist);
            let bob_offset = rng.gen::<f32>() * TAU;

            objects.push(FusionObject {
                rest: mesh.positions.clone().into_boxed_slice(),
                mesh,
                material,
                shape,
                anchor,
                bob_offset,
                position: anchor,
            });
        }

        let vertices: usize = objects.iter().map(|o| o.mesh.vertex_count()).sum();
        log::info!(
            "Cluster built: {} x {:?} ({} vertices, {} shading)",
            count,
            params.shape_type,
            vertices,
            mode.as_str()
        );

        Self {
            params: params.clone(),
            objects,
            state: ClusterState::Constructed,
            rotation_y: 0.0,
            iridescence_phase: 0.0,
        }
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn objects(&self) -> &[FusionObject] {
        &self.objects
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn rotation_y(&self) -> f32 {
        self.rotation_y
    }

    pub fn iridescence_phase(&self) -> f32 {
        self.iridescence_phase
    }

    /// Advance one frame at elapsed time `t` with the latest band sample.
    pub fn animate(&mut self, t: f32, bands: AudioBands) {
        if self.state == ClusterState::Disposed {
            return;
        }
        self.state = ClusterState::Animating;

        self.iridescence_phase = (self.iridescence_phase + phase_step(bands)) % TAU;
        let frame = DeformFrame::new(t, bands, &self.params);
        let surface = SurfaceAnimation::at(t, bands, self.iridescence_phase);
        let levitation = self.params.levitation_scale();

        let mut replaced = 0;
        for object in &mut self.objects {
            replaced += frame.displace_all(&object.rest, &mut object.mesh.positions);
            object.mesh.recompute_normals();
            object.material.animate(surface);

            let bob = (t * 0.3 + object.bob_offset).sin() * levitation * 1.5;
            object.position = object.anchor + Vec3::Y * bob;
        }
        if replaced > 0 {
            log::warn!("Replaced {} non-finite vertices with rest positions", replaced);
        }

        self.rotation_y = (self.rotation_y + self.params.rotation_speed() * ROTATION_PER_FRAME) % TAU;
    }

    /// Release every mesh and rest-position record.
    pub fn dispose(&mut self) {
        if self.state != ClusterState::Disposed {
            log::debug!("Cluster disposed ({} objects)", self.objects.len());
        }
        self.objects.clear();
        self.objects.shrink_to_fit();
        self.state = ClusterState::Disposed;
    }
}

/// Base geometry for one core; `size` and household variant come from `rng`.
pub fn base_mesh(shape: &ShapeType, rng: &mut StdRng) -> Mesh {
    let size = 4.0 + rng.gen::<f32>() * 4.0;

    match shape {
        ShapeType::Levitrope => geometry::uv_sphere(size, 64, 64),
        ShapeType::Slime | ShapeType::Sphere => geometry::uv_sphere(size, 48, 48),
        ShapeType::Box | ShapeType::Voxel => geometry::subdivided_box(Vec3::splat(size), [16, 16, 16]),
        ShapeType::Torus => geometry::torus(size, size * 0.35, 32, 64, TAU),
        ShapeType::Dodecahedron => geometry::dodecahedron(size, 4),
        ShapeType::Ring => geometry::torus(size, size * 0.12, 32, 128, TAU),
        ShapeType::Complex => geometry::torus_knot(size, size * 0.25, 200, 48),
        ShapeType::Particles => geometry::icosahedron(size * 0.5, 3),
        ShapeType::PixelGrid => geometry::plane(size * 2.0, 32),
        ShapeType::ParticleField => geometry::icosahedron(size * 0.3, 2),
        ShapeType::Environment => geometry::uv_sphere(size * 2.0, 64, 64),
        ShapeType::Household => {
            let r: f32 = rng.gen();
            if r < 0.15 {
                geometry::chair()
            } else if r < 0.30 {
                geometry::lamp()
            } else if r < 0.45 {
                geometry::sofa()
            } else if r < 0.60 {
                geometry::mug()
            } else {
                geometry::torus(size, size * 0.35, 48, 96, TAU)
            }
        }
        ShapeType::Unknown(_) => geometry::icosahedron(size, 20),
    }
}

/// Ring angle of object `index` out of `count`.
pub fn ring_angle(index: usize, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    index as f32 / count as f32 * 2.0 * PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn build(params: &SimulationParameters, seed: u64) -> FusionCluster {
        let mut rng = StdRng::seed_from_u64(seed);
        FusionCluster::build(params, RenderMode::Physical, &RenderConfig::default(), false, &mut rng)
    }

    fn small(shape: ShapeType, count: f32) -> SimulationParameters {
        SimulationParameters {
            shape_type: shape,
            object_count: Some(count),
            ..Default::default()
        }
    }

    #[test]
    fn test_object_count_clamped_to_five_with_even_spacing() {
        let cluster = build(&small(ShapeType::Particles, 8.0), 1);
        assert_eq!(cluster.objects().len(), 5);
        for (i, object) in cluster.objects().iter().enumerate() {
            let angle = object.anchor.z.atan2(object.anchor.x).rem_euclid(TAU);
            let expected = ring_angle(i, 5);
            let diff = (angle - expected).abs();
            assert!(diff < 1e-4 || (TAU - diff) < 1e-4, "object {} at {}", i, angle);
        }
    }

    #[test]
    fn test_lifecycle() {
        let params = small(ShapeType::Torus, 2.0);
        let mut cluster = build(&params, 2);
        assert_eq!(cluster.state(), ClusterState::Constructed);

        cluster.animate(0.5, AudioBands::SILENT);
        assert_eq!(cluster.state(), ClusterState::Animating);

        cluster.dispose();
        assert_eq!(cluster.state(), ClusterState::Disposed);
        assert!(cluster.objects().is_empty());

        // Disposed clusters ignore frames
        cluster.animate(1.0, AudioBands::SILENT);
        assert_eq!(cluster.state(), ClusterState::Disposed);
        cluster.dispose();
    }

    #[test]
    fn test_animation_recomputes_from_rest() {
        let params = small(ShapeType::Particles, 2.0);
        let mut a = build(&params, 3);
        let mut b = build(&params, 3);

        // Many frames then t = 2 must equal a single frame at t = 2
        for i in 0..30 {
            a.animate(i as f32 * 0.1, AudioBands { low: 0.4, mid: 0.2, high: 0.9 });
        }
        a.animate(2.0, AudioBands::SILENT);
        b.animate(2.0, AudioBands::SILENT);
        for (oa, ob) in a.objects().iter().zip(b.objects()) {
            assert_eq!(oa.mesh.positions, ob.mesh.positions);
            assert_eq!(oa.rest_positions(), ob.rest_positions());
        }
    }

    #[test]
    fn test_frames_stay_finite_and_normals_unit() {
        let params = SimulationParameters {
            mutation_scale: Some(f32::NAN),
            levitation_scale: Some(f32::INFINITY),
            ..small(ShapeType::Box, 3.0)
        };
        let mut cluster = build(&params, 4);
        for i in 0..5 {
            cluster.animate(i as f32, AudioBands { low: 1.0, mid: 1.0, high: 1.0 });
        }
        for object in cluster.objects() {
            assert!(object.position.is_finite());
            assert!(object.mesh.positions.iter().all(|p| p.is_finite()));
            assert!(object.mesh.normals.iter().all(|n| (n.length() - 1.0).abs() < 1e-3));
            assert!(object.model_matrix(cluster.rotation_y()).is_finite());
        }
    }

    #[test]
    fn test_bob_and_rotation() {
        let params = SimulationParameters {
            levitation_scale: Some(2.0),
            rotation_speed: Some(1.0),
            ..small(ShapeType::Particles, 2.0)
        };
        let mut cluster = build(&params, 5);
        cluster.animate(0.0, AudioBands::SILENT);
        cluster.animate(1.0, AudioBands::SILENT);
        assert!((cluster.rotation_y() - 2.0 * ROTATION_PER_FRAME).abs() < 1e-6);
        for object in cluster.objects() {
            let bob = object.position.y - object.anchor.y;
            assert!(bob.abs() <= 3.0 + 1e-4);
            let expected = (0.3 + object.bob_offset).sin() * 3.0;
            assert!((bob - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_same_seed_same_cluster() {
        let params = small(ShapeType::Household, 4.0);
        let a = build(&params, 11);
        let b = build(&params, 11);
        for (oa, ob) in a.objects().iter().zip(b.objects()) {
            assert_eq!(oa.anchor, ob.anchor);
            assert_eq!(oa.mesh.vertex_count(), ob.mesh.vertex_count());
            assert_eq!(oa.material, ob.material);
        }
    }

    #[test]
    fn test_every_shape_builds() {
        let mut rng = StdRng::seed_from_u64(0);
        for shape in [
            ShapeType::Sphere,
            ShapeType::Box,
            ShapeType::Torus,
            ShapeType::Dodecahedron,
            ShapeType::Particles,
            ShapeType::Slime,
            ShapeType::Ring,
            ShapeType::Complex,
            ShapeType::Levitrope,
            ShapeType::Voxel,
            ShapeType::PixelGrid,
            ShapeType::ParticleField,
            ShapeType::Environment,
            ShapeType::Household,
            ShapeType::Unknown("METABALL".into()),
        ] {
            let mesh = base_mesh(&shape, &mut rng);
            assert!(mesh.triangle_count() > 0, "{:?}", shape);
            assert!(mesh.positions.iter().all(|p| p.is_finite()));
        }
    }
}
