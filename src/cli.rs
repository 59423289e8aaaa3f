use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sharefetch")]
#[command(about = "Resolve TeraBox share links, preview and download them")]
#[command(long_about = "
sharefetch takes a TeraBox share link (plain or wrapped by a redirect proxy),
resolves it through the link API and either buffers it for playback or
downloads it to your download directory.

Examples:
  sharefetch info https://1024terabox.com/s/abc123
  sharefetch download https://1024terabox.com/s/abc123 -o ~/Videos
  sharefetch play https://1024terabox.com/s/abc123 --player mpv
  sharefetch config show
")]
#[command(version)]
pub struct Cli {
    /// Override config file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a pasted link and check that it is a share link
    #[command(visible_alias = "n")]
    Normalize {
        /// Share link, possibly wrapped by a redirect proxy
        link: String,
    },

    /// Show the title and size behind a share link
    #[command(visible_alias = "i")]
    Info {
        /// Share link
        link: String,

        /// Print metadata as JSON
        #[arg(long)]
        #[arg(help = "Print metadata as JSON")]
        json: bool,
    },

    /// Download the shared file
    #[command(visible_alias = "dl")]
    Download {
        /// Share link
        link: String,

        /// Download directory override
        #[arg(short, long, value_name = "DIR")]
        #[arg(help = "Download to specific directory")]
        output_dir: Option<PathBuf>,

        /// Retry budget override
        #[arg(short, long, value_name = "N")]
        #[arg(help = "Number of retries after a failed attempt")]
        retries: Option<u32>,

        /// Cancel on Ctrl-C without asking
        #[arg(short, long)]
        #[arg(help = "Skip the cancel confirmation prompt")]
        yes: bool,
    },

    /// Buffer the shared file and play it while it downloads
    #[command(visible_alias = "p")]
    Play {
        /// Share link
        link: String,

        /// Player command override
        #[arg(short, long, value_name = "CMD")]
        #[arg(help = "Media player to launch once enough is buffered (e.g. mpv)")]
        player: Option<String>,
    },

    /// Manage configuration
    #[command(visible_alias = "cfg")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Validate configuration
    #[command(visible_alias = "check")]
    Validate,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        #[arg(help = "Skip confirmation prompt")]
        yes: bool,
    },

    /// Create sample configuration next to the active one
    Sample,
}

impl Cli {
    /// Validate CLI arguments and show helpful error messages
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Commands::Download {
                retries: Some(retries),
                ..
            } if *retries > 10 => Err("Retries must be between 0 and 10".to_string()),
            Commands::Play {
                player: Some(player),
                ..
            } if player.trim().is_empty() => Err("Player command cannot be empty".to_string()),
            _ => Ok(()),
        }
    }

    /// Get the link argument of commands that take one
    pub fn link(&self) -> Option<&str> {
        match &self.command {
            Commands::Normalize { link }
            | Commands::Info { link, .. }
            | Commands::Download { link, .. }
            | Commands::Play { link, .. } => Some(link),
            Commands::Config { .. } => None,
        }
    }

    /// Check if config validation should be skipped before running
    pub fn skips_config_validation(&self) -> bool {
        matches!(
            self.command,
            Commands::Normalize { .. }
                | Commands::Config {
                    action: ConfigAction::Validate
                        | ConfigAction::Reset { .. }
                        | ConfigAction::Path
                        | ConfigAction::Show
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["sharefetch", "info", "https://1024terabox.com/s/abc"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Info { json: false, .. }));
        assert_eq!(cli.link(), Some("https://1024terabox.com/s/abc"));

        let cli = Cli::try_parse_from(["sharefetch", "config", "show"]).unwrap();
        assert!(cli.link().is_none());
    }

    #[test]
    fn test_download_options() {
        let cli = Cli::try_parse_from([
            "sharefetch",
            "dl",
            "https://1024terabox.com/s/abc",
            "--output-dir",
            "/tmp/videos",
            "--retries",
            "4",
            "-y",
        ])
        .unwrap();

        if let Commands::Download {
            output_dir,
            retries,
            yes,
            ..
        } = cli.command
        {
            assert_eq!(output_dir, Some(PathBuf::from("/tmp/videos")));
            assert_eq!(retries, Some(4));
            assert!(yes);
        } else {
            panic!("Expected Download command");
        }
    }

    #[test]
    fn test_validation() {
        let cli = Cli::try_parse_from(["sharefetch", "download", "x", "--retries", "2"]).unwrap();
        assert!(cli.validate().is_ok());

        let cli = Cli::try_parse_from(["sharefetch", "download", "x", "--retries", "50"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["sharefetch", "play", "x", "--player", " "]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["sharefetch", "-v", "config", "validate"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.skips_config_validation());

        let cli = Cli::try_parse_from(["sharefetch", "play", "x", "-c", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(!cli.skips_config_validation());
    }
}
