use crate::cli::ConfigAction;
use anyhow::{Context, Result};
use console::{Term, style};
use dialoguer::Confirm;
use sharefetch::ConfigManager;
use std::process;

pub fn handle_config(config_manager: &mut ConfigManager, action: ConfigAction) -> Result<()> {
    let term = Term::stdout();

    match action {
        ConfigAction::Show => {
            let config_content = toml::to_string_pretty(config_manager.config())
                .context("Failed to serialize config")?;

            term.write_line(&format!("{} Current configuration:", style("⚙️").cyan()))?;
            term.write_line("")?;
            term.write_line(&config_content)?;
        }

        ConfigAction::Path => {
            term.write_line(&config_manager.config_file().display().to_string())?;
        }

        ConfigAction::Validate => {
            term.write_line(&format!(
                "{} Validating configuration...",
                style("🔍").cyan()
            ))?;

            match config_manager.validate() {
                Ok(()) => {
                    term.write_line(&format!("{} Configuration is valid", style("✅").green()))?;
                }
                Err(e) => {
                    term.write_line(&format!(
                        "{} Configuration validation failed:",
                        style("❌").red()
                    ))?;
                    term.write_line(&format!("   {}", e))?;
                    term.write_line(&format!(
                        "{} Edit {:?} or run 'sharefetch config reset'",
                        style("💡").yellow(),
                        config_manager.config_file()
                    ))?;
                    process::exit(1);
                }
            }
        }

        ConfigAction::Reset { yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Are you sure you want to reset the configuration?")
                    .default(false)
                    .interact()?;

                if !confirmed {
                    term.write_line(&format!("{} Operation cancelled", style("❌").red()))?;
                    return Ok(());
                }
            }

            config_manager.reset()?;
            term.write_line(&format!(
                "{} Configuration reset to defaults",
                style("🔄").cyan()
            ))?;
        }

        ConfigAction::Sample => {
            let sample_file = config_manager.create_sample_config()?;
            term.write_line(&format!(
                "{} Sample configuration created at: {:?}",
                style("✅").green(),
                sample_file
            ))?;
        }
    }

    Ok(())
}
