//! Rendering configuration.

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (pixels)
    pub window_width: u32,

    /// Window height (pixels)
    pub window_height: u32,

    /// Vertical field of view (degrees)
    pub fov_degrees: f32,

    /// Near clipping plane (scene units)
    pub near_plane: f32,

    /// Far clipping plane (scene units)
    pub far_plane: f32,

    /// Clear color behind the backdrop
    pub clear_color: [f64; 3],

    /// Fresnel exponent of the refraction shader
    pub fresnel_power: f32,

    /// Opacity band of the refraction shader (perpendicular, grazing)
    pub opacity_range: (f32, f32),

    /// Size of the procedural fallback backdrop (pixels, square-ish 2:1)
    pub fallback_texture_width: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            fov_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 1000.0,
            clear_color: [0.02, 0.02, 0.04],
            fresnel_power: 5.0,
            opacity_range: (0.35, 0.95),
            fallback_texture_width: 256,
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.window_width as f32 / self.window_height.max(1) as f32
    }
}
