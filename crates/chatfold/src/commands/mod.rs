use std::path::PathBuf;

use eyre::Result;

use chatfold_host::{Settings, SettingsStore, TomlSettingsStore};

pub mod settings;
pub mod simulate;

pub(crate) fn open_store(path: Option<PathBuf>) -> Result<TomlSettingsStore> {
    Ok(match path {
        Some(path) => TomlSettingsStore::at_path(path),
        None => TomlSettingsStore::at_default_path()?,
    })
}

pub(crate) fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    Ok(open_store(path)?.load()?)
}
