//! Command-line interface for affiliate-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Reading the root key, from the arguments or a prompt
//! - Assembling the export pipeline from the effective configuration

pub mod completion;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EnginePreference, LogLevel};
use crate::connection::ConnectionManager;
use crate::error::{InvocationError, Result};
use crate::export::{
    ChunkedCollector, DisplayTarget, ExportPipeline, ProgressReporter, SpreadsheetWriter,
};
use crate::formatter::ConsoleObserver;

/// Exit code: file written
pub const EXIT_OK: i32 = 0;

/// Exit code: any failure, including an empty result
pub const EXIT_FAILURE: i32 = 1;

/// Exit code: interrupted by the user
pub const EXIT_CANCELLED: i32 = 2;

/// Export an affiliate's player hierarchy to a spreadsheet
#[derive(Parser, Debug)]
#[command(
    name = "affiliate-export",
    version,
    about = "Export an affiliate's player hierarchy to a spreadsheet",
    long_about = "Calls the hierarchy stored procedure for one root affiliate key, collects the
populated result set in bounded batches and writes it to an .xlsx workbook."
)]
pub struct CliArgs {
    /// Root affiliate key; prompted for when omitted
    #[arg(value_name = "ROOT_KEY")]
    pub root_key: Option<String>,

    /// Datasource name from config file
    #[arg(short = 'd', long, value_name = "NAME")]
    pub datasource: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Directory the workbook is written to
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum rows per fetch
    #[arg(long, value_name = "ROWS")]
    pub chunk_size: Option<usize>,

    /// Spreadsheet engine
    #[arg(long, value_enum, value_name = "ENGINE")]
    pub engine: Option<EnginePreference>,

    /// Disable the progress spinner
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Quiet mode (minimal output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for affiliate-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,

        /// List datasource ids, one per line
        #[arg(long)]
        list_datasources: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if let Some(id) = &args.datasource {
            if config.datasources.contains_key(id) {
                config.default_datasource = id.clone();
            }
        }
        if let Some(dir) = &args.output_dir {
            config.export.output_dir = dir.clone();
        }
        if let Some(chunk) = args.chunk_size {
            config.export.chunk_size = chunk;
        }
        if let Some(engine) = args.engine {
            config.export.engine = engine;
        }
        if args.no_progress || args.quiet {
            config.display.progress = false;
        }
        if args.no_color {
            config.display.color_output = false;
        }

        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Console observer matching the color and quiet settings
    pub fn observer(&self) -> ConsoleObserver {
        ConsoleObserver::new(self.config.display.color_output, self.args.quiet)
    }

    /// The root key from the arguments, or one line read from stdin
    pub fn root_key(&self) -> Result<String> {
        let raw = match &self.args.root_key {
            Some(key) => key.clone(),
            None => {
                let mut err = std::io::stderr();
                write!(err, "Root affiliate key: ")?;
                err.flush()?;
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
                line
            }
        };
        let key = raw.trim();
        if key.is_empty() {
            return Err(InvocationError::EmptyRootKey.into());
        }
        Ok(key.to_string())
    }

    /// Assemble the pipeline for the selected datasource
    ///
    /// # Arguments
    /// * `cancel` - Token fired on Ctrl+C
    ///
    /// # Returns
    /// * `Result<ExportPipeline>` - Ready pipeline, or a configuration error
    ///   when the credential is not available
    pub fn build_pipeline(&self, cancel: CancellationToken) -> Result<ExportPipeline> {
        let (_, source) = self.config.datasource(self.args.datasource.as_deref())?;
        let settings = source.resolve()?;
        let command_timeout = settings.command_timeout;
        let connector = Arc::new(ConnectionManager::new(settings));

        let export = &self.config.export;
        let writer = SpreadsheetWriter::from_config(export);
        let collector = ChunkedCollector::new(export.chunk_size, export.milestone_interval);

        Ok(ExportPipeline::new(connector, export.procedure.clone(), writer)
            .with_collector(collector)
            .with_reporter(self.reporter())
            .with_observer(Arc::new(self.observer()))
            .with_command_timeout(command_timeout)
            .with_cancellation(cancel))
    }

    fn reporter(&self) -> ProgressReporter {
        let display = &self.config.display;
        let target = if display.progress && std::io::stderr().is_terminal() {
            DisplayTarget::Stderr
        } else {
            DisplayTarget::Hidden
        };
        ProgressReporter::new(target, Duration::from_millis(display.tick_interval_ms))
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config {
                show,
                validate,
                list_datasources,
            }) => {
                if *list_datasources {
                    for id in self.config.list_datasources() {
                        println!("{id}");
                    }
                }
                if *validate {
                    self.validate_config_file();
                }
                if *show {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn show_version(&self) {
        println!("affiliate-export version {}", crate::VERSION);
        println!(
            "Spreadsheet engines: {}",
            if crate::export::SheetWriter::styled_available() {
                "styled, plain"
            } else {
                "plain"
            }
        );
    }

    fn validate_config_file(&self) {
        let observer = self.observer();
        let colorizer = observer.colorizer();
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("{}", colorizer.warning("Configuration file does not exist"));
            return;
        }

        match Config::from_file(&path).and_then(|config| config.validate()) {
            Ok(()) => println!("{}", colorizer.success("Configuration is valid")),
            Err(e) => println!("{}", colorizer.error(&e.to_string())),
        }
    }

    /// Show effective configuration. Credentials are never part of it.
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();
        println!("{}", self.config.to_toml_string()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Print where the export connects to
    pub fn print_banner(&self) {
        if self.args.quiet {
            return;
        }
        if let Ok((id, source)) = self.config.datasource(self.args.datasource.as_deref()) {
            tracing::debug!("Using datasource '{}'", id);
            println!(
                "Connecting to: {} ({}:{}/{})",
                source.name, source.host, source.port, source.database
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from(["affiliate-export"]).unwrap();
        assert!(args.root_key.is_none());
        assert!(args.datasource.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_full() {
        let args = CliArgs::try_parse_from([
            "affiliate-export",
            "AcmeAffiliate",
            "-d",
            "staging",
            "-o",
            "/tmp/out",
            "--chunk-size",
            "1000",
            "--engine",
            "plain",
            "--no-progress",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(args.root_key.as_deref(), Some("AcmeAffiliate"));
        assert_eq!(args.datasource.as_deref(), Some("staging"));
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.chunk_size, Some(1000));
        assert_eq!(args.engine, Some(EnginePreference::Plain));
        assert!(args.no_progress && args.no_color);
    }

    #[test]
    fn test_subcommands() {
        let args = CliArgs::try_parse_from(["affiliate-export", "config", "--show"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                show: true,
                validate: false,
                list_datasources: false
            })
        ));

        let args = CliArgs::try_parse_from(["affiliate-export", "completion", "zsh"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Completion { .. })));
    }

    #[test]
    fn test_args_override_config() {
        let args = CliArgs::try_parse_from([
            "affiliate-export",
            "--chunk-size",
            "123",
            "--engine",
            "plain",
            "-q",
        ])
        .unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);

        assert_eq!(config.export.chunk_size, 123);
        assert_eq!(config.export.engine, EnginePreference::Plain);
        assert!(!config.display.progress);
        assert_eq!(config.logging.level, LogLevel::Error);
    }

    #[test]
    fn test_verbose_wins_over_config_level() {
        let args = CliArgs::try_parse_from(["affiliate-export", "--vv"]).unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_root_key_from_args_is_trimmed() {
        let cli = CliInterface {
            args: CliArgs::try_parse_from(["affiliate-export", " AcmeAffiliate "]).unwrap(),
            config: Config::default(),
        };
        assert_eq!(cli.root_key().unwrap(), "AcmeAffiliate");
    }
}
