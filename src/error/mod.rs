//! Error handling for the export pipeline.
//!
//! Every pipeline stage owns one error kind:
//! - [`ConnectionError`]: opening or authenticating the session
//! - [`InvocationError`]: calling the routine, scanning or fetching its results
//! - [`EmptyResultError`]: no populated result set, or a populated one with no rows
//! - [`BuildError`]: rows that do not fit the column descriptor
//! - [`WriteError`]: rendering or persisting the spreadsheet
//!
//! Failures that a stage does not own surface unchanged through [`ExportError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use affiliate_export::error::{ErrorKind, ExportError, EmptyResultError};
//!
//! let err: ExportError = EmptyResultError::NoResultSet { sets_seen: 2 }.into();
//! assert_eq!(err.kind(), ErrorKind::EmptyResult);
//! ```

pub mod kinds;
pub mod server;

pub use kinds::{
    BuildError, ConfigError, ConnectionError, EmptyResultError, ErrorKind, ExportError,
    InvocationError, Result, WriteError,
};
pub use server::ServerErrorInfo;
