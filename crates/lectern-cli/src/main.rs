//! Lectern CLI - Consolidate training courses into one curriculum outline.

use clap::Parser;
use lectern_cli::commands;
use lectern_cli::{Cli, Command, Config, Formatter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> lectern_cli::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let format = cli.format.map(Into::into).unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Import(args) => {
            commands::execute_import(args, &formatter).await?;
        }
        Command::Plan(args) => {
            commands::execute_plan(args, &config, &formatter).await?;
        }
        Command::Generate(args) => {
            commands::execute_generate(args, &config, &formatter).await?;
        }
        Command::Config => {
            commands::execute_config(&config, &formatter).await?;
        }
    }

    Ok(())
}
