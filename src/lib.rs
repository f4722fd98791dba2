//! Affiliate hierarchy export library
//!
//! Calls a hierarchy stored procedure on SQL Server for one root affiliate
//! key and writes the populated result set to an `.xlsx` workbook.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: SQL Server sessions over TDS
//! - `error`: Error types and handling
//! - `export`: The extraction pipeline and spreadsheet writers
//! - `formatter`: Console presentation of pipeline events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use affiliate_export::{Config, ConnectionManager};
//! use affiliate_export::export::{ExportPipeline, SpreadsheetWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let (_, source) = config.datasource(None)?;
//!     let connector = Arc::new(ConnectionManager::new(source.resolve()?));
//!     let writer = SpreadsheetWriter::from_config(&config.export);
//!
//!     let mut pipeline = ExportPipeline::new(connector, config.export.procedure.clone(), writer);
//!     pipeline.run("AcmeAffiliate").await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod formatter;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ExportError, Result};
pub use export::{ExportOutcome, ExportPipeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
