//! Game settings read from `settings.ron`.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "settings.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid RON: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Where explicit and automatic saves go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveMode {
    #[default]
    Local,
    Cloud,
}

/// Backend order for loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadPreference {
    #[default]
    RemoteFirst,
    LocalFirst,
    LocalOnly,
}

/// Account and document store used for cloud saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Directory holding the remote documents and the account file.
    pub documents_dir: PathBuf,
    pub email: String,
    pub password: String,
}

impl RemoteSettings {
    pub fn accounts_file(&self) -> PathBuf {
        self.documents_dir.join("accounts.json")
    }
}

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub save_mode: SaveMode,
    pub read_preference: ReadPreference,
    /// Cloud saves also write the local slot file.
    pub mirror_cloud_saves_locally: bool,
    pub autosave_interval_secs: f64,
    pub saves_dir: PathBuf,
    pub active_slot: u8,
    /// Without this, cloud saves have nowhere to go and stay local.
    pub remote: Option<RemoteSettings>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            save_mode: SaveMode::Local,
            read_preference: ReadPreference::RemoteFirst,
            mirror_cloud_saves_locally: true,
            autosave_interval_secs: 30.0,
            saves_dir: PathBuf::from("saves"),
            active_slot: 0,
            remote: None,
        }
    }
}

impl GameSettings {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Settings next to the executable, then in the working directory.
    /// A missing file gives defaults; a broken one gives defaults and a warning.
    pub fn discover() -> Self {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(SETTINGS_FILE)));
        let candidates = beside_exe
            .into_iter()
            .chain(std::iter::once(PathBuf::from(SETTINGS_FILE)));

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    return settings.sanitized();
                }
                Err(e) => {
                    warn!("Ignoring {}: {e}", path.display());
                    return Self::default();
                }
            }
        }
        Self::default()
    }

    fn sanitized(mut self) -> Self {
        if self.active_slot >= crate::shared::NUM_SAVE_SLOTS {
            warn!("active_slot {} out of range, using 0", self.active_slot);
            self.active_slot = 0;
        }
        if !(self.autosave_interval_secs.is_finite() && self.autosave_interval_secs > 0.0) {
            self.autosave_interval_secs = Self::default().autosave_interval_secs;
        }
        self
    }
}

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<GameSettings>() {
            app.insert_resource(GameSettings::discover());
        }
    }
}
