//! Visual side: cluster geometry, deformation, shading and camera motion.
//!
//! Everything here is CPU-side and device independent; `rendering` uploads
//! the results each frame.

pub mod atmosphere;
pub mod camera;
pub mod deform;
pub mod fusion;
pub mod geometry;
pub mod material;
pub mod noise;

pub use atmosphere::{FieldRings, ParticleField};
pub use camera::{CameraPose, CameraRig, SceneLights};
pub use deform::DeformFrame;
pub use fusion::{ClusterState, FusionCluster, FusionObject};
pub use geometry::Mesh;
pub use material::{Material, MaterialUniforms, RenderMode};
