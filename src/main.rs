//! Fusionscape - audio-reactive fusion sculpture
//!
//! A cluster of iridescent cores breathes and flows to a generative score.
//! Band energy from the score drives deformation, shading and camera lift.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use fusionscape::audio::{render_offline, AudioBands, AudioEngine};
use fusionscape::cli::Args;
use fusionscape::params::{AudioConfig, CameraDrift, GenerationBundle, LightRig, RenderConfig};
use fusionscape::rendering::{RenderSystem, SceneUniforms, ThemeImage};
use fusionscape::visual::camera::scene_lights;
use fusionscape::visual::{CameraRig, FieldRings, FusionCluster, ParticleField, RenderMode};

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,

    // Current generation
    bundle: GenerationBundle,
    seed: u64,
    mode: RenderMode,
    theme: ThemeImage,
    cluster: FusionCluster,
    particles: ParticleField,
    rings: FieldRings,
    camera: CameraRig,

    // Audio (visual-only when not initialized)
    audio: AudioEngine,
    want_audio: bool,

    // Configuration
    render_config: RenderConfig,
    light_rig: LightRig,

    // Time tracking
    start_time: Instant,
}

impl App {
    fn new(args: &Args, bundle: GenerationBundle) -> Self {
        let render_config = RenderConfig::default();
        let mode = args.parse_render_mode();
        let theme = ThemeImage::load_or_fallback(
            args.theme_image.as_deref(),
            &bundle.simulation,
            render_config.fallback_texture_width,
        );

        let mut rng = StdRng::seed_from_u64(args.seed);
        let cluster = FusionCluster::build(&bundle.simulation, mode, &render_config, theme.loaded, &mut rng);
        let particles = ParticleField::generate(&mut rng);
        let camera = CameraRig::new(bundle.simulation.camera_mode.clone(), CameraDrift::default(), args.seed);

        Self {
            window: None,
            render_system: None,
            audio: AudioEngine::new(AudioConfig::default(), args.seed),
            want_audio: !args.no_audio,
            bundle,
            seed: args.seed,
            mode,
            theme,
            cluster,
            particles,
            rings: FieldRings::new(),
            camera,
            render_config,
            light_rig: LightRig::default(),
            start_time: Instant::now(),
        }
    }

    fn start_audio(&mut self) {
        if !self.want_audio {
            log::info!("Audio disabled, running visual-only");
            return;
        }
        match self.audio.init() {
            Ok(()) => {
                self.audio.configure(self.bundle.sound.clone());
            }
            Err(e) => log::warn!("Audio unavailable ({}), running visual-only", e),
        }
    }

    /// Rebuild the cluster and score with the next seed.
    fn regenerate(&mut self) {
        self.seed = self.seed.wrapping_add(1);
        log::info!("Regenerating with seed {}", self.seed);

        if let Some(render_system) = &mut self.render_system {
            render_system.release_cluster();
        }
        self.cluster.dispose();

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.cluster = FusionCluster::build(
            &self.bundle.simulation,
            self.mode,
            &self.render_config,
            self.theme.loaded,
            &mut rng,
        );
        self.particles = ParticleField::generate(&mut rng);
        self.camera = CameraRig::new(self.bundle.simulation.camera_mode.clone(), CameraDrift::default(), self.seed);

        if let Some(render_system) = &mut self.render_system {
            render_system.upload_cluster(&self.cluster);
            render_system.upload_atmosphere(&self.particles, &self.rings);
        }
        self.audio.configure(self.bundle.sound.clone());
    }

    /// Render a single frame
    fn render_frame(&mut self) {
        let time_s = self.start_time.elapsed().as_secs_f32();
        let bands: AudioBands = self.audio.frame_tick();

        self.cluster.animate(time_s, bands);
        self.rings.advance();

        let Some(render_system) = &mut self.render_system else {
            return;
        };

        let pose = self.camera.pose(time_s, bands, self.render_config.fov_degrees);
        let lights = scene_lights(&self.light_rig, &self.bundle.simulation, time_s, bands);
        let scene = SceneUniforms::new(&pose, &self.render_config, &lights, time_s, self.theme.loaded);

        render_system.update_scene(&scene);
        render_system.update_cluster(&self.cluster, time_s, bands);
        render_system.update_atmosphere(&self.rings, time_s);

        match render_system.render() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                render_system.resize(self.render_config.window_width, self.render_config.window_height);
            }
            Err(e) => log::error!("Render error: {:?}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let window_attributes = Window::default_attributes()
            .with_title("Fusionscape")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let mut render_system = match pollster::block_on(RenderSystem::new(
            Arc::clone(&window),
            &self.render_config,
            &self.theme.image,
        )) {
            Ok(render_system) => render_system,
            Err(e) => {
                log::error!("Failed to initialize renderer: {}", e);
                event_loop.exit();
                return;
            }
        };
        render_system.upload_cluster(&self.cluster);
        render_system.upload_atmosphere(&self.particles, &self.rings);

        self.start_audio();

        log::info!("Fusionscape is running (R: regenerate, ESC: quit)");

        self.window = Some(window);
        self.render_system = Some(render_system);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::KeyR => self.regenerate(),
                _ => {}
            },
            WindowEvent::Resized(size) => {
                self.render_config.window_width = size.width.max(1);
                self.render_config.window_height = size.height.max(1);
                if let Some(render_system) = &mut self.render_system {
                    render_system.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.audio.dispose();
        self.cluster.dispose();
        if let Some(render_system) = &mut self.render_system {
            render_system.release_cluster();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let bundle = match &args.bundle {
        Some(path) => GenerationBundle::load(path)
            .with_context(|| format!("failed to load bundle {}", path.display()))?,
        None => GenerationBundle::default(),
    };
    if !bundle.description.is_empty() {
        log::info!("{}", bundle.description);
    }

    if let Some(path) = &args.render_wav {
        let score = render_offline(
            &AudioConfig::default(),
            bundle.sound.clone(),
            args.render_seconds(),
            args.seed,
            path,
        )
        .with_context(|| format!("failed to render {}", path.display()))?;
        log::info!("Peak level {:.3} over {} samples", score.peak(), score.samples.len());
        return Ok(());
    }

    let mut app = App::new(&args, bundle);
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.run_app(&mut app).context("event loop terminated with an error")?;
    Ok(())
}
