use std::fmt;

use tiberius::error::{Error as DriverError, TokenError};

/// Structured fields of an error raised by SQL Server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServerErrorInfo {
    pub code: u32,
    pub state: u8,
    pub class: u8,
    pub message: String,
    pub server: Option<String>,
    pub procedure: Option<String>,
    pub line: u32,
}

impl ServerErrorInfo {
    /// Copy the token fields the driver exposes.
    pub fn from_token(token: &TokenError) -> Self {
        Self {
            code: token.code(),
            state: token.state(),
            class: token.class(),
            message: token.message().to_string(),
            server: non_empty(token.server()),
            procedure: non_empty(token.procedure()),
            line: token.line(),
        }
    }

    /// SQL Server error 18456, "Login failed for user".
    pub fn is_login_failure(&self) -> bool {
        self.code == 18456
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl fmt::Display for ServerErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref procedure) = self.procedure {
            write!(f, " (in {procedure}, line {})", self.line)?;
        }
        Ok(())
    }
}

/// Render a driver error that did not come from the server.
pub fn format_driver_error(error: &DriverError) -> String {
    match error {
        DriverError::Server(token) => ServerErrorInfo::from_token(token).to_string(),
        DriverError::Routing { host, port } => {
            format!("server requested routing to {host}:{port}")
        }
        other => other.to_string(),
    }
}
