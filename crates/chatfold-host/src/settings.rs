//! Persisted user settings for the virtualizer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::Display;

use crate::error::SettingsError;

/// How collapsed items are represented in the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CollapsePolicy {
    /// Content blanked in place; the item node stays in the document
    Strict,
    /// Item node removed entirely; a zero-height placeholder marks its
    /// position and scroll is compensated
    #[default]
    Detached,
}

const DEFAULT_TAIL_SIZE: usize = 8;
const TAIL_SIZE_MIN: usize = 1;
const TAIL_SIZE_MAX: usize = 64;

/// User-facing virtualizer settings. Persisted by the host environment;
/// the engine only reads a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Number of most-recent turns that are always kept expanded
    #[serde(default = "default_tail_size")]
    pub tail_size: usize,

    #[serde(default)]
    pub policy: CollapsePolicy,

    /// Whether the status overlay (and placeholder affordances) render
    #[serde(default = "default_overlay_visible")]
    pub overlay_visible: bool,

    /// Persisted overlay screen position, if the user dragged it
    pub overlay_pos: Option<(f32, f32)>,
}

fn default_tail_size() -> usize {
    DEFAULT_TAIL_SIZE
}

fn default_overlay_visible() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tail_size: DEFAULT_TAIL_SIZE,
            policy: CollapsePolicy::default(),
            overlay_visible: true,
            overlay_pos: None,
        }
    }
}

impl Settings {
    /// Clamp out-of-range values to something usable rather than
    /// rejecting the stored file.
    pub fn sanitized(mut self) -> Self {
        self.tail_size = self.tail_size.clamp(TAIL_SIZE_MIN, TAIL_SIZE_MAX);
        self
    }
}

/// Read/write access to persisted settings. The engine tolerates store
/// unavailability by falling back to defaults.
pub trait SettingsStore {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError>;
}

/// In-memory store for tests and the simulation CLI.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    settings: Option<Settings>,
}

impl MemoryStore {
    pub fn with(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self
            .settings
            .clone()
            .unwrap_or_default()
            .sanitized())
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        self.settings = Some(settings.clone());
        Ok(())
    }
}

/// TOML-backed store at `<config-dir>/chatfold/settings.toml`.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    /// Store at the platform default location.
    pub fn at_default_path() -> Result<Self, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self {
            path: config_dir.join("chatfold").join("settings.toml"),
        })
    }

    /// Store at an explicit path (tests, --settings override).
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        match toml::from_str::<Settings>(&contents) {
            Ok(settings) => Ok(settings.sanitized()),
            Err(e) => {
                tracing::warn!(
                    "failed to parse settings file at {:?}: {}. Using defaults.",
                    self.path,
                    e
                );
                Ok(Settings::default())
            }
        }
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(settings)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.tail_size, 8);
        assert_eq!(s.policy, CollapsePolicy::Detached);
        assert!(s.overlay_visible);
    }

    #[test]
    fn sanitize_clamps_tail_size() {
        let s = Settings {
            tail_size: 0,
            ..Settings::default()
        };
        assert_eq!(s.sanitized().tail_size, 1);

        let s = Settings {
            tail_size: 10_000,
            ..Settings::default()
        };
        assert_eq!(s.sanitized().tail_size, 64);
    }

    #[test]
    fn toml_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlSettingsStore::at_path(dir.path().join("settings.toml"));

        let settings = Settings {
            tail_size: 12,
            policy: CollapsePolicy::Strict,
            overlay_visible: false,
            overlay_pos: Some((24.0, 48.0)),
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn toml_store_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlSettingsStore::at_path(dir.path().join("nope.toml"));
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn toml_store_garbage_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "tail-size = \"many\"").unwrap();
        let store = TomlSettingsStore::at_path(path);
        assert_eq!(store.load().unwrap(), Settings::default());
    }
}
