//! In-memory sessions and cursors for pipeline tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connector, Session};
use crate::error::{ConnectionError, Result};

use super::events::{PipelineEvent, PipelineObserver};
use super::invoker::Invocation;
use super::streaming::ResultSetCursor;
use super::table::{CellValue, Row};

/// One scripted result set
#[derive(Debug, Clone)]
pub struct FixtureSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl FixtureSet {
    pub fn with_rows(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn columnless() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// `count` rows of `width` integer cells, numbered from zero
pub fn int_rows(count: usize, width: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            (0..width)
                .map(|j| CellValue::Int((i * width + j) as i64))
                .collect()
        })
        .collect()
}

/// Cursor over scripted result sets
pub struct FixtureCursor {
    pending: VecDeque<FixtureSet>,
    current: Option<FixtureSet>,
    batches_served: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FixtureCursor {
    pub fn new(sets: Vec<FixtureSet>) -> Self {
        let mut pending: VecDeque<_> = sets.into();
        let current = pending.pop_front();
        Self {
            pending,
            current,
            batches_served: 0,
            cancel_after: None,
        }
    }

    /// Cancel `token` right after the given number of non-empty batches
    pub fn cancel_after(mut self, batches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((batches, token));
        self
    }
}

#[async_trait]
impl ResultSetCursor for FixtureCursor {
    fn columns(&self) -> Option<&[String]> {
        self.current.as_ref().map(|s| s.columns.as_slice())
    }

    async fn next_set(&mut self) -> Result<bool> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    async fn fetch_many(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let Some(set) = self.current.as_mut() else {
            return Ok(Vec::new());
        };
        let take = max_rows.min(set.rows.len());
        let batch: Vec<Row> = set.rows.drain(..take).collect();

        if !batch.is_empty() {
            self.batches_served += 1;
            if let Some((after, ref token)) = self.cancel_after {
                if self.batches_served == after {
                    token.cancel();
                }
            }
        }
        Ok(batch)
    }
}

/// Session handing out a [`FixtureCursor`] and recording calls
pub struct FixtureSession {
    sets: Vec<FixtureSet>,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    closed: Arc<AtomicBool>,
}

impl FixtureSession {
    pub fn new(sets: Vec<FixtureSet>) -> Self {
        Self {
            sets,
            cancel_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `(procedure, root key)` for every call made
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Session for FixtureSession {
    async fn call_procedure<'s>(
        &'s mut self,
        procedure: &str,
        invocation: &Invocation,
    ) -> Result<Box<dyn ResultSetCursor + 's>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::NotConnected.into());
        }
        self.calls
            .lock()
            .unwrap()
            .push((procedure.to_string(), invocation.root_key().to_string()));

        let mut cursor = FixtureCursor::new(std::mem::take(&mut self.sets));
        if let Some((after, token)) = self.cancel_after.take() {
            cursor = cursor.cancel_after(after, token);
        }
        Ok(Box::new(cursor))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Connector opening [`FixtureSession`]s over a fixed script
pub struct FixtureConnector {
    sets: Vec<FixtureSet>,
    fail: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    opened: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl FixtureConnector {
    pub fn new(sets: Vec<FixtureSet>) -> Self {
        Self {
            sets,
            fail: false,
            cancel_after: None,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A connector whose every open is refused
    pub fn refusing() -> Self {
        let mut connector = Self::new(Vec::new());
        connector.fail = true;
        connector
    }

    pub fn cancel_after(mut self, batches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((batches, token));
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether the last opened session has been closed
    pub fn session_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FixtureConnector {
    async fn open(&self) -> Result<Box<dyn Session>> {
        if self.fail {
            return Err(ConnectionError::Driver("login refused".into()).into());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut session = FixtureSession::new(self.sets.clone());
        session.cancel_after = self.cancel_after.clone();
        session.closed = Arc::clone(&self.closed);
        self.closed.store(false, Ordering::SeqCst);
        Ok(Box::new(session))
    }

    fn describe(&self) -> String {
        "fixture".to_string()
    }
}

/// Observer keeping every event
#[derive(Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
