//! Camera drift and light choreography configuration.

/// Autonomous orbit drift parameters (scene units, radians, seconds)
#[derive(Debug, Clone)]
pub struct CameraDrift {
    /// Base angular speed of the orbit (rad/s)
    pub base_speed: f32,

    /// Amplitude of the slow speed wander (rad/s)
    pub speed_wander: f32,

    /// Frequency of the speed wander (rad/s of the inner sine)
    pub speed_wander_freq: f32,

    /// Mean orbit radius
    pub radius: f32,

    /// Orbit radius wander amplitude
    pub radius_wander: f32,

    /// Orbit radius wander frequency
    pub radius_wander_freq: f32,

    /// Mean camera height
    pub height: f32,

    /// Primary and secondary height wander (amplitude, frequency)
    pub height_wander: [(f32, f32); 2],

    /// Height lift per unit of low-band energy
    pub low_band_lift: f32,

    /// Look-at lag behind the camera clock (seconds)
    pub look_lag_s: f32,

    /// Handheld jitter amplitude
    pub handheld_jitter: f32,

    /// Fixed wide shot used by STATIC_WIDE and INTERACTIVE
    pub wide_position: [f32; 3],
}

impl Default for CameraDrift {
    fn default() -> Self {
        Self {
            base_speed: 0.05,
            speed_wander: 0.015,
            speed_wander_freq: 0.008,
            radius: 38.0,
            radius_wander: 8.0,
            radius_wander_freq: 0.1,
            height: 12.0,
            height_wander: [(8.0, 0.08), (4.0, 0.03)],
            low_band_lift: 3.0,
            look_lag_s: 0.15,
            handheld_jitter: 0.6,
            wide_position: [0.0, 14.0, 46.0],
        }
    }
}

/// Orbiting point-light rig
#[derive(Debug, Clone)]
pub struct LightRig {
    /// Light colors, one per orbiting light
    pub colors: [[f32; 3]; 4],

    /// Orbit radius of the lights
    pub radius: f32,

    /// Angular speed (rad/s)
    pub speed: f32,

    /// Mean light height and its wander amplitude
    pub height: f32,
    pub height_wander: f32,

    /// Base intensity and the mid-band gain
    pub base_intensity: f32,
    pub mid_gain: f32,
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            colors: [
                [0xee as f32 / 255.0, 0xee as f32 / 255.0, 1.0],
                [0x88 as f32 / 255.0, 0xcc as f32 / 255.0, 1.0],
                [1.0, 0xaa as f32 / 255.0, 1.0],
                [0xaa as f32 / 255.0, 1.0, 1.0],
            ],
            radius: 30.0,
            speed: 0.3,
            height: 15.0,
            height_wander: 8.0,
            base_intensity: 50.0,
            mid_gain: 150.0,
        }
    }
}
