use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use chatfold_host::CollapsePolicy;

#[derive(Debug, Parser)]
#[command(
    name = "chatfold",
    version,
    about = "Virtualization engine for live chat documents, driven against a simulated page"
)]
pub struct Cli {
    /// Settings file to use instead of the per-user default location
    #[arg(long, global = true, env = "CHATFOLD_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Replay a scripted streaming conversation and report what folded
    Simulate {
        /// Conversation turns to replay
        #[arg(long, default_value_t = 40)]
        turns: usize,

        /// Keep this many newest turns always materialized
        #[arg(long)]
        tail: Option<usize>,

        /// Collapse policy, overriding the stored setting
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Seed for turn sizes and stream chunking
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Disable and re-enable the engine halfway through the replay
        #[arg(long)]
        toggle: bool,

        /// Report engine state after every turn instead of only at the end
        #[arg(long)]
        verbose: bool,
    },

    /// Inspect or update the persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum SettingsAction {
    /// Print the settings file location and contents
    Show,
    /// Update and persist settings values
    Set {
        /// Number of newest turns kept expanded (1-64)
        #[arg(long)]
        tail: Option<usize>,

        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Whether placeholders render the click-to-expand affordance
        #[arg(long)]
        overlay: Option<bool>,
    },
    /// Delete the settings file, reverting to defaults
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Strict,
    Detached,
}

impl From<PolicyArg> for CollapsePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Strict => CollapsePolicy::Strict,
            PolicyArg::Detached => CollapsePolicy::Detached,
        }
    }
}
