//! Parameter definitions with units and documented semantics.
//!
//! Two families live here:
//! - Generation snapshots (`SimulationParameters`, `SoundParameters`) that
//!   arrive untrusted on the wire and are sanitized at consumption time
//! - Engine configuration structs with `Default` values and units

/// Closed selector enum with a verbatim catch-all.
///
/// Values arrive as strings; anything unrecognized lands in `Unknown` with
/// the raw text so it serializes back unchanged.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            Unknown(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unknown(raw) => raw.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $($wire => Self::$variant,)+
                    _ => Self::Unknown(raw),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                match value {
                    $name::Unknown(raw) => raw,
                    known => known.as_str().to_owned(),
                }
            }
        }
    };
}

mod audio;
mod bundle;
mod camera;
mod render;
mod simulation;
mod sound;

// Re-export all types
pub use audio::AudioConfig;
pub use bundle::{BundleError, GenerationBundle, WorldRecord};
pub use camera::{CameraDrift, LightRig};
pub use render::RenderConfig;
pub use simulation::{CameraMode, ShapeType, SimulationParameters, MAX_OBJECTS, MIN_OBJECTS};
pub use sound::{HarmonyType, MusicStyle, OscillatorType, SoundParameters, MAX_BPM, MIN_BPM};
