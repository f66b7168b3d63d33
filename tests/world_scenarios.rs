//! Cluster, shading and persistence scenarios through the public API.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use fusionscape::audio::AudioBands;
use fusionscape::params::{
    CameraMode, GenerationBundle, OscillatorType, RenderConfig, ShapeType, SimulationParameters,
    SoundParameters, WorldRecord,
};
use fusionscape::visual::deform::{breathe, DAMPING, REFERENCE_MUTATION};
use fusionscape::visual::{ClusterState, DeformFrame, FusionCluster, RenderMode};

fn bands(low: f32, mid: f32, high: f32) -> AudioBands {
    AudioBands { low, mid, high }
}

fn cluster(params: &SimulationParameters, mode: RenderMode, seed: u64) -> FusionCluster {
    let mut rng = StdRng::seed_from_u64(seed);
    FusionCluster::build(params, mode, &RenderConfig::default(), false, &mut rng)
}

#[test]
fn test_object_count_clamps_to_five_on_an_even_ring() {
    let params = SimulationParameters {
        shape_type: ShapeType::Torus,
        object_count: Some(8.0),
        ..Default::default()
    };
    let cluster = cluster(&params, RenderMode::Physical, 3);
    assert_eq!(cluster.objects().len(), 5);

    let angles: Vec<f32> = cluster
        .objects()
        .iter()
        .map(|o| o.anchor.z.atan2(o.anchor.x).rem_euclid(TAU))
        .collect();
    for (i, angle) in angles.iter().enumerate() {
        let expected = i as f32 * TAU / 5.0;
        let diff = (angle - expected).abs();
        assert!(diff < 1e-4 || (TAU - diff) < 1e-4, "object {} at {}", i, angle);
    }
}

#[test]
fn test_nan_iridescence_never_reaches_uniforms() {
    let params = SimulationParameters {
        shape_type: ShapeType::Box,
        iridescence_intensity: Some(f32::NAN),
        mutation_scale: Some(f32::NAN),
        ..Default::default()
    };
    assert_eq!(params.iridescence_intensity(), 0.5);

    for mode in [RenderMode::Physical, RenderMode::Refraction] {
        let mut cluster = cluster(&params, mode, 8);
        for frame in 0..20 {
            let t = frame as f32 / 60.0;
            cluster.animate(t, bands(0.4, 0.7, 0.2));
            for object in cluster.objects() {
                let uniforms = object.material.uniforms(t, bands(0.4, 0.7, 0.2), cluster.iridescence_phase());
                assert!(uniforms.is_finite(), "{:?} frame {}", mode, frame);
                assert!(object.mesh.positions.iter().all(|p| p.is_finite()));
            }
        }
    }
}

#[test]
fn test_silent_zero_mutation_leaves_only_breathing() {
    let params = SimulationParameters {
        mutation_scale: Some(0.0),
        ..Default::default()
    };
    let t = 7.3;
    let frame = DeformFrame::new(t, AudioBands::SILENT, &params);
    let breathing = breathe(t) * REFERENCE_MUTATION * DAMPING;

    for rest in [
        Vec3::new(6.0, 0.0, 0.0),
        Vec3::new(-1.5, 2.5, 4.0),
        Vec3::new(0.3, -7.0, 0.2),
    ] {
        let offset = frame.displace(rest) - rest;
        let along_normal = offset.dot(rest.normalize());
        assert!((along_normal - breathing).abs() < 1e-4);
        assert!((offset - rest.normalize() * breathing).length() < 1e-4);
    }
}

#[test]
fn test_cluster_lifecycle_under_animation() {
    let params = SimulationParameters {
        shape_type: ShapeType::Household,
        object_count: Some(3.0),
        ..Default::default()
    };
    let mut cluster = cluster(&params, RenderMode::Refraction, 21);
    assert_eq!(cluster.state(), ClusterState::Constructed);

    cluster.animate(0.5, bands(0.9, 0.1, 0.6));
    assert_eq!(cluster.state(), ClusterState::Animating);

    cluster.dispose();
    cluster.dispose();
    assert_eq!(cluster.state(), ClusterState::Disposed);
}

#[test]
fn test_world_record_reproduces_bundle() {
    let bundle = GenerationBundle {
        simulation: SimulationParameters {
            shape_type: ShapeType::Dodecahedron,
            color_palette: vec!["#ff8800".into(), "#2244aa".into(), "#ccffee".into()],
            mutation_scale: Some(7.5),
            object_count: Some(4.0),
            iridescence_intensity: Some(0.8),
            fusion_factor: Some(0.25),
            ..Default::default()
        },
        sound: SoundParameters {
            style_ratio: Some(0.4),
            bpm: Some(126.0),
            musical_scale: vec![196.0, 220.0, 246.94],
            gate_intensity: Some(0.6),
            ..Default::default()
        },
        description: "molten glass choir".into(),
        image_prompt: "aurora over a frozen lake".into(),
        background_image_url: None,
    };

    let path = std::env::temp_dir().join(format!("fusionscape-world-{}.json", std::process::id()));
    let record = WorldRecord::from_bundle(&bundle, "creator-1", "glass choir", 1_700_000_000_000);
    record.save(&path).unwrap();
    let loaded = WorldRecord::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, record);
    assert_eq!(loaded.to_bundle(), bundle);

    let reparsed = GenerationBundle::from_json(&bundle.to_json().unwrap()).unwrap();
    assert_eq!(reparsed, bundle);

    // Same bundle and seed rebuild the same cluster
    let a = cluster(&reparsed.simulation, RenderMode::Physical, 4);
    let b = cluster(&bundle.simulation, RenderMode::Physical, 4);
    assert_eq!(a.objects().len(), 4);
    for (x, y) in a.objects().iter().zip(b.objects()) {
        assert_eq!(x.anchor, y.anchor);
        assert_eq!(x.mesh.positions, y.mesh.positions);
    }
}

#[test]
fn test_unrecognized_selectors_survive_save() {
    let json = r#"{
        "creatorId": "creator-2",
        "prompt": "liquid chrome",
        "createdAt": 1700000000123,
        "simulationParams": { "shapeType": "METABALL", "cameraMode": "SPIRAL_DIVE", "objectCount": 3 },
        "soundParams": { "oscillatorType": "pulse", "harmonyType": "DRONE", "musicStyle": "VAPORWAVE" },
        "description": "",
        "imagePrompt": "",
        "likes": 7
    }"#;
    let record: WorldRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.simulation_params.shape_type, ShapeType::Unknown("METABALL".into()));
    assert_eq!(record.simulation_params.camera_mode, CameraMode::Unknown("SPIRAL_DIVE".into()));
    assert_eq!(record.sound_params.oscillator_type, OscillatorType::Unknown("pulse".into()));

    let path = std::env::temp_dir().join(format!("fusionscape-selectors-{}.json", std::process::id()));
    record.save(&path).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(saved["simulationParams"]["shapeType"], "METABALL");
    assert_eq!(saved["simulationParams"]["cameraMode"], "SPIRAL_DIVE");
    assert_eq!(saved["soundParams"]["oscillatorType"], "pulse");
    assert_eq!(saved["soundParams"]["harmonyType"], "DRONE");
    assert_eq!(saved["soundParams"]["musicStyle"], "VAPORWAVE");
    assert_eq!(saved["likes"], 7);

    // Unknown selectors still build a renderable cluster
    let cluster = cluster(&record.simulation_params, RenderMode::Physical, 1);
    assert_eq!(cluster.objects().len(), 3);
}
