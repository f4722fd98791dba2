//! Routine invocation

use std::time::{Duration, Instant};

use tracing::info;

use crate::connection::Session;
use crate::error::{InvocationError, Result};

use super::streaming::ResultSetCursor;

/// One request: the root key and how long the call may take to answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    root_key: String,
    command_timeout: Duration,
}

impl Invocation {
    /// Create an invocation
    ///
    /// The key is trimmed; an empty key is refused before anything else runs.
    pub fn new(root_key: impl AsRef<str>, command_timeout: Duration) -> Result<Self> {
        let root_key = root_key.as_ref().trim();
        if root_key.is_empty() {
            return Err(InvocationError::EmptyRootKey.into());
        }
        Ok(Self {
            root_key: root_key.to_string(),
            command_timeout,
        })
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

/// Issues the parameterized call
pub struct ProcedureInvoker {
    procedure: String,
}

impl ProcedureInvoker {
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
        }
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Call the routine with the root key as its sole parameter
    pub async fn invoke<'s>(
        &self,
        session: &'s mut dyn Session,
        invocation: &Invocation,
    ) -> Result<Box<dyn ResultSetCursor + 's>> {
        let started = Instant::now();
        let cursor = session.call_procedure(&self.procedure, invocation).await?;
        info!(
            "{} answered in {:.1}s",
            self.procedure,
            started.elapsed().as_secs_f64()
        );
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::export::testing::{FixtureSession, FixtureSet};

    #[test]
    fn test_empty_root_key_refused() {
        let err = Invocation::new("   ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Invocation(InvocationError::EmptyRootKey)
        ));
    }

    #[test]
    fn test_root_key_trimmed() {
        let invocation = Invocation::new(" AcmeAffiliate\n", Duration::from_secs(600)).unwrap();
        assert_eq!(invocation.root_key(), "AcmeAffiliate");
        assert_eq!(invocation.command_timeout(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_invoke_passes_root_key() {
        let mut session = FixtureSession::new(vec![FixtureSet::columnless()]);
        let calls = session.calls();
        let invoker = ProcedureInvoker::new("dbo.GetPlayers");
        let invocation = Invocation::new("AcmeAffiliate", Duration::from_secs(5)).unwrap();

        let cursor = invoker.invoke(&mut session, &invocation).await.unwrap();
        assert!(cursor.columns().is_some_and(|c| c.is_empty()));
        drop(cursor);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), [("dbo.GetPlayers".to_string(), "AcmeAffiliate".to_string())]);
    }
}
