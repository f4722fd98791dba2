//! Connection management for SQL Server
//!
//! This module provides:
//! - The [`Connector`] and [`Session`] seams the pipeline drives
//! - [`ConnectionManager`], which opens TDS sessions with the configured timeouts
//!
//! A session is owned by a single driver and is never shared; every call on
//! it blocks the caller until the server answers.

pub mod tds;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::{ConnectionError, Result};
use crate::export::{Invocation, ResultSetCursor};

pub use tds::{TdsCursor, TdsSession};

/// Opens sessions to the data source
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session. Failures are [`ConnectionError`]s and are not retried.
    async fn open(&self) -> Result<Box<dyn Session>>;

    /// Where this connector points, for display
    fn describe(&self) -> String;
}

/// An open session to the data source
#[async_trait]
pub trait Session: Send {
    /// Call `procedure` with the invocation's root key as its only parameter
    ///
    /// The returned cursor is positioned on the first result set.
    async fn call_procedure<'s>(
        &'s mut self,
        procedure: &str,
        invocation: &Invocation,
    ) -> Result<Box<dyn ResultSetCursor + 's>>;

    /// Close the session. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the session is still open
    fn is_open(&self) -> bool;
}

/// SQL Server connection manager
///
/// Holds resolved settings and opens one [`TdsSession`] per request.
pub struct ConnectionManager {
    /// Resolved settings, including the credential
    settings: ConnectionSettings,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    /// Build the driver configuration
    fn driver_config(&self) -> tiberius::Config {
        let mut config = tiberius::Config::new();
        config.host(&self.settings.host);
        config.port(self.settings.port);
        config.database(&self.settings.database);
        config.application_name(env!("CARGO_PKG_NAME"));
        config.authentication(tiberius::AuthMethod::sql_server(
            &self.settings.user,
            self.settings.credential.expose(),
        ));
        if self.settings.trust_cert {
            config.trust_cert();
        }
        config
    }
}

#[async_trait]
impl Connector for ConnectionManager {
    async fn open(&self) -> Result<Box<dyn Session>> {
        debug!(
            "Connecting to {}:{}/{} as {}",
            self.settings.host, self.settings.port, self.settings.database, self.settings.user
        );

        let timeout = self.settings.connect_timeout;
        let opened = tokio::time::timeout(
            timeout,
            TdsSession::connect(self.driver_config(), &self.settings.host),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ConnectionError::Timeout {
                host: self.settings.host.clone(),
                seconds: timeout.as_secs(),
            }
            .into())
        });

        let session = opened?;
        info!("Connected to {}", self.describe());
        Ok(Box::new(session))
    }

    fn describe(&self) -> String {
        format!(
            "{}:{}/{}",
            self.settings.host, self.settings.port, self.settings.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use std::time::Duration;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "db.example".into(),
            port: 1433,
            database: "Affiliates".into(),
            user: "reporter".into(),
            credential: Credential::new("pw"),
            trust_cert: true,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(600),
        }
    }

    #[test]
    fn test_describe_omits_credentials() {
        let manager = ConnectionManager::new(settings());
        assert_eq!(manager.describe(), "db.example:1433/Affiliates");
    }

    #[test]
    fn test_driver_config_address() {
        let manager = ConnectionManager::new(settings());
        assert_eq!(manager.driver_config().get_addr(), "db.example:1433");
    }
}
