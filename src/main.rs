mod cli;
mod handlers;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use sharefetch::ConfigManager;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Validate CLI arguments first
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    // Initialize logging based on verbosity
    let verbose = args.verbose;
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let mut config_manager = match &args.config {
        Some(path) => ConfigManager::load_from(path.clone())?,
        None => ConfigManager::new()?,
    };

    if !args.skips_config_validation() {
        if let Err(e) = config_manager.validate() {
            eprintln!("Configuration validation failed: {}", e);
            eprintln!("Run 'sharefetch config validate' for details");
            eprintln!("Or run 'sharefetch config reset' to restore defaults");
            process::exit(1);
        }
    }

    match args.command {
        Commands::Normalize { link } => {
            handlers::handle_normalize(&link)?;
        }
        Commands::Info { link, json } => {
            handlers::handle_info(config_manager.config(), &link, json).await?;
        }
        Commands::Download {
            link,
            output_dir,
            retries,
            yes,
        } => {
            handlers::handle_download(
                config_manager.config().clone(),
                &link,
                output_dir,
                retries,
                yes,
            )
            .await?;
        }
        Commands::Play { link, player } => {
            handlers::handle_play(config_manager.config().clone(), &link, player).await?;
        }
        Commands::Config { action } => {
            handlers::handle_config(&mut config_manager, action)?;
        }
    }

    Ok(())
}
