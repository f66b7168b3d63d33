//! Inbound generation bundle and the persisted world record.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{SimulationParameters, SoundParameters};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to access bundle file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bundle JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one generation produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationBundle {
    pub simulation: SimulationParameters,
    pub sound: SoundParameters,
    pub description: String,
    pub image_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
}

impl GenerationBundle {
    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A saved world as the storage collaborator keeps it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub creator_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    pub prompt: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub simulation_params: SimulationParameters,
    pub sound_params: SoundParameters,
    pub description: String,
    pub image_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
    pub likes: u32,
}

impl WorldRecord {
    /// Wrap a freshly generated bundle for persistence.
    pub fn from_bundle(
        bundle: &GenerationBundle,
        creator_id: impl Into<String>,
        prompt: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: None,
            creator_id: creator_id.into(),
            creator_name: None,
            prompt: prompt.into(),
            created_at,
            simulation_params: bundle.simulation.clone(),
            sound_params: bundle.sound.clone(),
            description: bundle.description.clone(),
            image_prompt: bundle.image_prompt.clone(),
            background_image_url: bundle.background_image_url.clone(),
            likes: 0,
        }
    }

    /// Recover the bundle that reproduces this world.
    pub fn to_bundle(&self) -> GenerationBundle {
        GenerationBundle {
            simulation: self.simulation_params.clone(),
            sound: self.sound_params.clone(),
            description: self.description.clone(),
            image_prompt: self.image_prompt.clone(),
            background_image_url: self.background_image_url.clone(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), BundleError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
