//! Sequencer settings

use crate::spawn::{ReuseSettings, ReusingSpawnRegister, SpawnRegister, StandardSpawnRegister};
use crate::time::{EvaluationClock, DEFAULT_FRAME_RATE};
use crate::world::{ObjectClass, WorldKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    pub spawning: SpawningSettings,
    pub playback: PlaybackSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawningSettings {
    /// Hide released objects and hand them out again instead of destroying.
    pub reuse_spawned_objects: bool,
    pub separate_instance_per_sequence_instance: bool,
    pub destroying_just_hides: bool,
    pub excluded_classes: Vec<String>,
}

impl Default for SpawningSettings {
    fn default() -> Self {
        Self {
            reuse_spawned_objects: false,
            separate_instance_per_sequence_instance: true,
            destroying_just_hides: true,
            excluded_classes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Evaluate into an editor world.
    pub preview: bool,
    pub frame_rate: u32,
    pub ticks: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            preview: false,
            frame_rate: DEFAULT_FRAME_RATE,
            ticks: 8,
        }
    }
}

impl SequencerSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn reuse_settings(&self) -> ReuseSettings {
        ReuseSettings {
            separate_instance_per_sequence_instance: self
                .spawning
                .separate_instance_per_sequence_instance,
            destroying_just_hides: self.spawning.destroying_just_hides,
            excluded_classes: self
                .spawning
                .excluded_classes
                .iter()
                .map(|class| ObjectClass::new(class.as_str()))
                .collect(),
        }
    }

    /// The register these settings ask for.
    pub fn build_register(&self) -> Box<dyn SpawnRegister> {
        if self.spawning.reuse_spawned_objects {
            Box::new(ReusingSpawnRegister::new(self.reuse_settings()))
        } else {
            Box::new(StandardSpawnRegister::new())
        }
    }

    pub fn world_kind(&self) -> WorldKind {
        if self.playback.preview {
            WorldKind::Editor
        } else {
            WorldKind::Game
        }
    }

    pub fn clock(&self) -> EvaluationClock {
        EvaluationClock::new(self.playback.frame_rate)
    }
}
