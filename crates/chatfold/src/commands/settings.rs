use std::io::Write;
use std::path::PathBuf;

use eyre::Result;

use chatfold_host::SettingsStore;

use crate::cli::SettingsAction;

pub fn run(path_override: Option<PathBuf>, action: SettingsAction) -> Result<()> {
    let mut store = super::open_store(path_override)?;
    let mut stdout = std::io::stdout();
    match action {
        SettingsAction::Show => {
            let settings = store.load()?;
            writeln!(stdout, "Settings file: {}", store.path().display())?;
            writeln!(stdout, "\n{}", toml::to_string_pretty(&settings)?)?;
        }
        SettingsAction::Set {
            tail,
            policy,
            overlay,
        } => {
            let mut settings = store.load()?;
            if let Some(tail) = tail {
                settings.tail_size = tail;
            }
            if let Some(policy) = policy {
                settings.policy = policy.into();
            }
            if let Some(overlay) = overlay {
                settings.overlay_visible = overlay;
            }
            let settings = settings.sanitized();
            store.save(&settings)?;
            writeln!(stdout, "{}", toml::to_string_pretty(&settings)?)?;
        }
        SettingsAction::Reset => {
            let path = store.path();
            if path.exists() {
                std::fs::remove_file(path)?;
                writeln!(stdout, "Settings reset to defaults")?;
            } else {
                writeln!(stdout, "No settings file found")?;
            }
        }
    }
    Ok(())
}
