use std::{fmt, io};

use crate::error::server::{ServerErrorInfo, format_driver_error};

/// Crate-wide `Result` type using [`ExportError`] as the error.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for the export pipeline.
#[derive(Debug)]
pub enum ExportError {
    /// Opening the session failed.
    Connection(ConnectionError),

    /// The remote routine call or one of its result sets failed.
    Invocation(InvocationError),

    /// Nothing to export.
    EmptyResult(EmptyResultError),

    /// Accumulated rows did not match the column descriptor.
    Build(BuildError),

    /// Rendering or saving the spreadsheet failed.
    Write(WriteError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors outside the write stage.
    Io(io::Error),
}

/// Stable classification of an [`ExportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Invocation,
    EmptyResult,
    Build,
    Write,
    Config,
    Io,
}

/// Session open errors. Never retried.
#[derive(Debug)]
pub enum ConnectionError {
    /// TCP connect or handshake did not finish within the connect timeout.
    Timeout { host: String, seconds: u64 },

    /// The server could not be reached.
    Unreachable { host: String, message: String },

    /// Login was rejected.
    AuthenticationFailed(ServerErrorInfo),

    /// Any other driver failure while opening.
    Driver(String),

    /// Operation needs an open session.
    NotConnected,
}

/// Routine invocation errors.
#[derive(Debug)]
pub enum InvocationError {
    /// The root key was empty after trimming.
    EmptyRootKey,

    /// The configured routine name is not a valid identifier.
    InvalidProcedure(String),

    /// The call did not produce its first response within the command timeout.
    Timeout { seconds: u64 },

    /// The server raised an error while running the routine.
    Server(ServerErrorInfo),

    /// The driver failed while reading results.
    Driver(String),

    /// A row arrived that the result-set protocol does not allow.
    Protocol(String),
}

/// Nothing to export. Reported, not fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyResultError {
    /// Every result set was columnless, or there were none.
    NoResultSet { sets_seen: usize },

    /// A result set carried columns but produced zero rows.
    NoRows { columns: usize },
}

/// Table assembly errors. Indicate a violated upstream contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A row had a different number of values than there are columns.
    ArityMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The same column name appeared twice in the descriptor.
    DuplicateColumn(String),
}

/// Spreadsheet rendering errors.
#[derive(Debug)]
pub enum WriteError {
    /// The output directory could not be created or written.
    Io { path: String, source: io::Error },

    /// The spreadsheet engine rejected the workbook.
    Engine(String),

    /// The table does not fit on a single sheet.
    SheetLimit { rows: u64, columns: usize },

    /// The background rendering task died.
    TaskFailed(String),
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// The named credential variable is not set.
    MissingCredential(String),

    /// Requested datasource does not exist.
    UnknownDatasource(String),
}

impl ExportError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::Connection(_) => ErrorKind::Connection,
            ExportError::Invocation(_) => ErrorKind::Invocation,
            ExportError::EmptyResult(_) => ErrorKind::EmptyResult,
            ExportError::Build(_) => ErrorKind::Build,
            ExportError::Write(_) => ErrorKind::Write,
            ExportError::Config(_) => ErrorKind::Config,
            ExportError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error only reports that there was nothing to export.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, ExportError::EmptyResult(_))
    }
}

impl ConnectionError {
    /// Classify a driver error raised while opening the session.
    pub fn from_driver(host: &str, err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => {
                Self::from_server(ServerErrorInfo::from_token(&token))
            }
            tiberius::error::Error::Io { message, .. } => ConnectionError::Unreachable {
                host: host.to_string(),
                message,
            },
            other => ConnectionError::Driver(format_driver_error(&other)),
        }
    }

    /// Login failures are authentication errors; anything else the server
    /// raised during login is reported as a driver error.
    fn from_server(info: ServerErrorInfo) -> Self {
        if info.is_login_failure() {
            ConnectionError::AuthenticationFailed(info)
        } else {
            ConnectionError::Driver(info.to_string())
        }
    }
}

impl From<tiberius::error::Error> for InvocationError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => {
                InvocationError::Server(ServerErrorInfo::from_token(&token))
            }
            other => InvocationError::Driver(format_driver_error(&other)),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Invocation(e) => write!(f, "Invocation error: {e}"),
            ExportError::EmptyResult(e) => write!(f, "{e}"),
            ExportError::Build(e) => write!(f, "Build error: {e}"),
            ExportError::Write(e) => write!(f, "Write error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Invocation => "invocation",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::Build => "build",
            ErrorKind::Write => "write",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Timeout { host, seconds } => {
                write!(f, "Timed out after {seconds}s connecting to {host}")
            }
            ConnectionError::Unreachable { host, message } => {
                write!(f, "Cannot reach {host}: {message}")
            }
            ConnectionError::AuthenticationFailed(info) => {
                write!(f, "Authentication failed: {info}")
            }
            ConnectionError::Driver(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::NotConnected => write!(f, "Not connected"),
        }
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::EmptyRootKey => write!(f, "Root key must not be empty"),
            InvocationError::InvalidProcedure(name) => {
                write!(f, "Invalid procedure name: {name}")
            }
            InvocationError::Timeout { seconds } => {
                write!(f, "Procedure did not respond within {seconds}s")
            }
            InvocationError::Server(info) => write!(f, "{info}"),
            InvocationError::Driver(msg) => write!(f, "Driver error: {msg}"),
            InvocationError::Protocol(msg) => write!(f, "Protocol violation: {msg}"),
        }
    }
}

impl fmt::Display for EmptyResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyResultError::NoResultSet { sets_seen } => write!(
                f,
                "The procedure returned no data ({sets_seen} result set(s) without columns)"
            ),
            EmptyResultError::NoRows { columns } => {
                write!(f, "The procedure returned {columns} column(s) but no rows")
            }
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ArityMismatch {
                row,
                expected,
                found,
            } => write!(
                f,
                "Row {row} has {found} value(s), expected {expected} column(s)"
            ),
            BuildError::DuplicateColumn(name) => write!(f, "Duplicate column '{name}'"),
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Io { path, source } => write!(f, "{path}: {source}"),
            WriteError::Engine(msg) => write!(f, "Spreadsheet engine failed: {msg}"),
            WriteError::SheetLimit { rows, columns } => write!(
                f,
                "{rows} rows x {columns} columns does not fit on a single sheet"
            ),
            WriteError::TaskFailed(msg) => write!(f, "Rendering task failed: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::MissingCredential(var) => {
                write!(f, "Environment variable {var} is not set")
            }
            ConfigError::UnknownDatasource(name) => write!(f, "Unknown datasource: {name}"),
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for InvocationError {}
impl std::error::Error for EmptyResultError {}
impl std::error::Error for BuildError {}
impl std::error::Error for WriteError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<InvocationError> for ExportError {
    fn from(err: InvocationError) -> Self {
        ExportError::Invocation(err)
    }
}

impl From<EmptyResultError> for ExportError {
    fn from(err: EmptyResultError) -> Self {
        ExportError::EmptyResult(err)
    }
}

impl From<BuildError> for ExportError {
    fn from(err: BuildError) -> Self {
        ExportError::Build(err)
    }
}

impl From<WriteError> for ExportError {
    fn from(err: WriteError) -> Self {
        ExportError::Write(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for WriteError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        WriteError::Engine(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Write(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_variant() {
        let err: ExportError = BuildError::DuplicateColumn("id".into()).into();
        assert_eq!(err.kind(), ErrorKind::Build);

        let err: ExportError = EmptyResultError::NoRows { columns: 2 }.into();
        assert!(err.is_empty_result());
        assert_eq!(err.kind().to_string(), "empty_result");
    }

    #[test]
    fn test_arity_message() {
        let err = BuildError::ArityMismatch {
            row: 7,
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "Row 7 has 2 value(s), expected 3 column(s)");
    }

    #[test]
    fn test_driver_io_error_is_unreachable() {
        let err = tiberius::error::Error::Io {
            kind: io::ErrorKind::ConnectionRefused,
            message: "refused".into(),
        };
        match ConnectionError::from_driver("db.local", err) {
            ConnectionError::Unreachable { host, message } => {
                assert_eq!(host, "db.local");
                assert_eq!(message, "refused");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_login_failure_is_authentication_error() {
        let info = ServerErrorInfo {
            code: 18456,
            message: "Login failed for user 'reporter'.".into(),
            ..Default::default()
        };
        assert!(matches!(
            ConnectionError::from_server(info),
            ConnectionError::AuthenticationFailed(ref i) if i.code == 18456
        ));

        let info = ServerErrorInfo {
            code: 4060,
            message: "Cannot open database".into(),
            ..Default::default()
        };
        match ConnectionError::from_server(info) {
            ConnectionError::Driver(msg) => assert_eq!(msg, "[4060] Cannot open database"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
