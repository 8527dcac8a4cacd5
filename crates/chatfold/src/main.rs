use clap::Parser;
use eyre::Result;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init_tracing();

    // No subcommand runs a default simulation.
    let command = cli.command.clone().unwrap_or(Commands::Simulate {
        turns: 40,
        tail: None,
        policy: None,
        seed: 7,
        toggle: false,
        verbose: false,
    });

    match command {
        Commands::Simulate {
            turns,
            tail,
            policy,
            seed,
            toggle,
            verbose,
        } => {
            let mut settings = commands::load_settings(cli.settings.clone())?;
            if let Some(tail) = tail {
                settings.tail_size = tail;
            }
            if let Some(policy) = policy {
                settings.policy = policy.into();
            }
            commands::simulate::run(settings.sanitized(), turns, seed, toggle, verbose)
        }
        Commands::Settings { action } => commands::settings::run(cli.settings.clone(), action),
    }
}
