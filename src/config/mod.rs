//! Configuration management for affiliate-export
//!
//! Configuration is loaded from:
//! - A TOML configuration file
//! - Environment variables (`AFFILIATE_EXPORT_*`)
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! Credentials never live in the file. A datasource names the environment
//! variable holding its password and the value is read when the connection
//! settings are resolved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::{ConfigError, Result};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AFFILIATE_EXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Datasource used when none is requested
    #[serde(default = "default_datasource_id")]
    pub default_datasource: String,

    /// Named datasources
    #[serde(default = "default_datasources")]
    pub datasources: BTreeMap<String, DataSourceConfig>,

    /// Export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One SQL Server database the exporter can read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Display name
    #[serde(default)]
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    /// Environment variable holding the password
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// Accept the server certificate without validation
    #[serde(default = "default_trust_cert")]
    pub trust_cert: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// Which spreadsheet engine to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnginePreference {
    /// Styled when available, plain otherwise
    #[default]
    Auto,
    /// Styled; falls back to plain when not compiled in
    Styled,
    /// Always plain
    Plain,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Stored routine taking the root key as its only parameter
    #[serde(default = "default_procedure")]
    pub procedure: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Maximum rows per fetch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rows between progress milestones
    #[serde(default = "default_milestone_interval")]
    pub milestone_interval: u64,

    #[serde(default)]
    pub engine: EnginePreference,
}

/// Display and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Show the progress spinner
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Enable colored output
    #[serde(default = "default_color_output")]
    pub color_output: bool,

    /// Spinner frame interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Resolved settings for opening one session
#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub credential: Credential,
    pub trust_cert: bool,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

/// A password that never shows up in `Debug` output
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("credential", &self.credential)
            .field("trust_cert", &self.trust_cert)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

// Default value functions
fn default_datasource_id() -> String {
    "sportsbet".to_string()
}

fn default_datasources() -> BTreeMap<String, DataSourceConfig> {
    let mut map = BTreeMap::new();
    map.insert(default_datasource_id(), DataSourceConfig::default());
    map
}

fn default_port() -> u16 {
    1433
}

fn default_credential_env() -> String {
    format!("{ENV_PREFIX}PASSWORD")
}

fn default_trust_cert() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    600
}

fn default_procedure() -> String {
    "[_V2_].[GetHierarchicalPlayersEmailVerified]".to_string()
}

fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ExportacionesAfiliados")
}

fn default_file_prefix() -> String {
    "afiliados_export".to_string()
}

fn default_extension() -> String {
    "xlsx".to_string()
}

fn default_sheet_name() -> String {
    "Jugadores".to_string()
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_milestone_interval() -> u64 {
    100_000
}

fn default_progress() -> bool {
    true
}

fn default_color_output() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    150
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_datasource: default_datasource_id(),
            datasources: default_datasources(),
            export: ExportConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            name: "SportsBet Afiliados".to_string(),
            host: "localhost".to_string(),
            port: default_port(),
            database: "SportsBet_Afiliados".to_string(),
            user: "SportsBetLogin".to_string(),
            credential_env: default_credential_env(),
            trust_cert: default_trust_cert(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            procedure: default_procedure(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            extension: default_extension(),
            sheet_name: default_sheet_name(),
            chunk_size: default_chunk_size(),
            milestone_interval: default_milestone_interval(),
            engine: EnginePreference::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            progress: default_progress(),
            color_output: default_color_output(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load from an explicit path, or from the default path if it exists
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file just yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `AFFILIATE_EXPORT_*` overrides through the given lookup
    ///
    /// Host, database and user apply to the default datasource.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(id) = var("DATASOURCE") {
            self.default_datasource = id;
        }
        if let Some(dir) = var("OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(dir);
        }

        let default_id = self.default_datasource.clone();
        if let Some(source) = self.datasources.get_mut(&default_id) {
            if let Some(host) = var("HOST") {
                source.host = host;
            }
            if let Some(database) = var("DATABASE") {
                source.database = database;
            }
            if let Some(user) = var("USER") {
                source.user = user;
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".affiliate-export")
            .join("config.toml")
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.datasources.is_empty() {
            return Err(ConfigError::MissingField("datasources".into()).into());
        }
        if !self.datasources.contains_key(&self.default_datasource) {
            return Err(ConfigError::UnknownDatasource(self.default_datasource.clone()).into());
        }
        for (id, source) in &self.datasources {
            source.validate(id)?;
        }
        self.export.validate()?;
        if self.display.tick_interval_ms == 0 {
            return Err(invalid("display.tick_interval_ms", "0"));
        }
        Ok(())
    }

    /// Pick a datasource by id, falling back to the default
    ///
    /// An unknown id logs the available ones and uses the default.
    pub fn datasource(&self, id: Option<&str>) -> Result<(&str, &DataSourceConfig)> {
        if let Some(id) = id {
            if let Some((key, source)) = self.datasources.get_key_value(id) {
                return Ok((key.as_str(), source));
            }
            warn!(
                "Datasource '{}' not found, available: {}",
                id,
                self.list_datasources().join(", ")
            );
        }
        self.datasources
            .get_key_value(&self.default_datasource)
            .map(|(key, source)| (key.as_str(), source))
            .ok_or_else(|| ConfigError::UnknownDatasource(self.default_datasource.clone()).into())
    }

    /// Ids of all configured datasources
    pub fn list_datasources(&self) -> Vec<String> {
        self.datasources.keys().cloned().collect()
    }
}

fn invalid(field: &str, value: impl Into<String>) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
    }
    .into()
}

impl DataSourceConfig {
    fn validate(&self, id: &str) -> Result<()> {
        for (field, value) in [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
            ("credential_env", &self.credential_env),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("datasources.{id}.{field}")).into());
            }
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid(
                &format!("datasources.{id}.connect_timeout_secs"),
                "0",
            ));
        }
        Ok(())
    }

    /// Resolve into connection settings, reading the credential through `lookup`
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ConnectionSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(&self.credential_env)
            .ok_or_else(|| ConfigError::MissingCredential(self.credential_env.clone()))?;

        Ok(ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            credential: Credential::new(secret),
            trust_cert: self.trust_cert,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        })
    }

    /// Resolve into connection settings, reading the credential from the environment
    pub fn resolve(&self) -> Result<ConnectionSettings> {
        self.resolve_with(|key| std::env::var(key).ok())
    }
}

impl ExportConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid("export.chunk_size", "0"));
        }
        if self.milestone_interval == 0 {
            return Err(invalid("export.milestone_interval", "0"));
        }
        if !is_valid_procedure_name(&self.procedure) {
            return Err(invalid("export.procedure", self.procedure.clone()));
        }
        if self.file_prefix.trim().is_empty() {
            return Err(ConfigError::MissingField("export.file_prefix".into()).into());
        }
        if self.sheet_name.is_empty() || self.sheet_name.chars().count() > 31 {
            return Err(invalid("export.sheet_name", self.sheet_name.clone()));
        }
        Ok(())
    }
}

/// Accept `name`, `schema.name` and bracketed parts like `[_V2_].[Proc]`
pub fn is_valid_procedure_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.split('.').all(|part| {
        let inner = match part.strip_prefix('[') {
            Some(rest) => match rest.strip_suffix(']') {
                Some(inner) => inner,
                None => return false,
            },
            None => part,
        };
        !inner.is_empty()
            && inner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '#')
    })
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
