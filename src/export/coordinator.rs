//! Export pipeline driver
//!
//! [`ExportPipeline`] runs one request end to end on the calling task:
//!
//! ```text
//! Idle -> Connected -> Invoked -> Scanning -> Collecting -> Building -> Writing -> Done
//!   any stage -> Failed(stage, kind)
//!   any stage -> Cancelled
//! ```
//!
//! The session is closed and any running spinner is stopped before `run`
//! returns, whatever the outcome. The only concurrent work is the spinner's
//! ticker task and the blocking render of the workbook.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connector, Session};
use crate::error::{Result, WriteError};

use super::collector::{ChunkedCollector, Collected};
use super::events::{EventKind, NullObserver, PipelineEvent, PipelineObserver, PipelineStage};
use super::invoker::{Invocation, ProcedureInvoker};
use super::progress::ProgressReporter;
use super::scanner::ResultSetScanner;
use super::table::TableBuilder;
use super::writers::{ExportArtifact, MAX_CELL_CHARS, SpreadsheetWriter};

/// Default time allowed for the procedure call
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// How a pipeline run ended
#[derive(Debug)]
pub enum ExportOutcome {
    /// A file was written
    Completed {
        artifact: ExportArtifact,
        elapsed: Duration,
    },
    /// The run was interrupted; no file was written
    Cancelled { rows_collected: usize },
}

/// Drives one export from connection to file
pub struct ExportPipeline {
    connector: Arc<dyn Connector>,
    invoker: ProcedureInvoker,
    collector: ChunkedCollector,
    writer: SpreadsheetWriter,
    reporter: ProgressReporter,
    observer: Arc<dyn PipelineObserver>,
    command_timeout: Duration,
    cancel: CancellationToken,
    stage: PipelineStage,
    /// Label of the step in progress, reported on failure
    step: &'static str,
}

impl ExportPipeline {
    /// Create a pipeline
    ///
    /// # Arguments
    /// * `connector` - Opens the session
    /// * `procedure` - Routine called with the root key
    /// * `writer` - Where and how the spreadsheet is written
    pub fn new(
        connector: Arc<dyn Connector>,
        procedure: impl Into<String>,
        writer: SpreadsheetWriter,
    ) -> Self {
        Self {
            connector,
            invoker: ProcedureInvoker::new(procedure),
            collector: ChunkedCollector::default(),
            writer,
            reporter: ProgressReporter::hidden(),
            observer: Arc::new(NullObserver),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            cancel: CancellationToken::new(),
            stage: PipelineStage::Idle,
            step: "idle",
        }
    }

    pub fn with_collector(mut self, collector: ChunkedCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set cancellation token for this run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current stage
    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    /// Export everything `root_key` owns
    ///
    /// # Returns
    /// * `Ok(Completed)` - the artifact and total elapsed time
    /// * `Ok(Cancelled)` - the token fired; nothing was written
    /// * `Err(_)` - the stage failed; the pipeline is in `Failed`
    pub async fn run(&mut self, root_key: &str) -> Result<ExportOutcome> {
        let started = Instant::now();
        let result = self.drive(root_key, started).await;
        self.reporter.stop().await;

        match result {
            Ok(ExportOutcome::Cancelled { rows_collected }) => {
                info!("Export cancelled after {} rows", rows_collected);
                self.enter(
                    PipelineStage::Cancelled,
                    EventKind::Aborted,
                    "Export cancelled, no file written",
                    Some(rows_collected as u64),
                );
                Ok(ExportOutcome::Cancelled { rows_collected })
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("Export failed while {}: {}", self.step, e);
                let stage = PipelineStage::Failed {
                    stage: self.step,
                    kind: e.kind(),
                };
                self.enter(stage, EventKind::Aborted, e.to_string(), None);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, root_key: &str, started: Instant) -> Result<ExportOutcome> {
        let invocation = Invocation::new(root_key, self.command_timeout)?;

        self.step = "connecting";
        let connector = Arc::clone(&self.connector);
        let mut session = connector.open().await?;
        self.enter(
            PipelineStage::Connected,
            EventKind::Stage,
            format!("Connected to {}", connector.describe()),
            None,
        );

        let result = self.run_session(session.as_mut(), &invocation, started).await;

        self.reporter.stop().await;
        if session.is_open() {
            if let Err(e) = session.close().await {
                warn!("Failed to close session: {}", e);
            }
        }
        debug!("Session closed");
        result
    }

    async fn run_session(
        &mut self,
        session: &mut dyn Session,
        invocation: &Invocation,
        started: Instant,
    ) -> Result<ExportOutcome> {
        self.step = "invoking";
        self.reporter.start("Executing procedure");
        let call = self.invoker.invoke(session, invocation);
        let mut cursor = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Ok(ExportOutcome::Cancelled { rows_collected: 0 });
            }
            cursor = call => cursor?,
        };
        self.enter(
            PipelineStage::Invoked,
            EventKind::Stage,
            format!(
                "{} called for {}",
                self.invoker.procedure(),
                invocation.root_key()
            ),
            None,
        );

        self.step = "scanning";
        self.enter(
            PipelineStage::Scanning,
            EventKind::Stage,
            "Looking for the populated result set",
            None,
        );
        let mut scanner = ResultSetScanner::new();
        let columns = scanner.scan(cursor.as_mut()).await?;
        self.reporter.stop().await;
        self.emit(
            PipelineEvent::new(
                PipelineStage::Scanning,
                EventKind::Detail,
                format!("Result set #{} has {} columns", scanner.sets_seen(), columns.len()),
            )
            .with_count(columns.len() as u64),
        );

        self.step = "collecting";
        self.enter(
            PipelineStage::Collecting,
            EventKind::Stage,
            format!("Fetching rows in batches of {}", self.collector.chunk_size()),
            None,
        );
        self.reporter.start("Collecting rows");
        let collect_started = Instant::now();
        let collected = {
            let reporter = &self.reporter;
            let observer = &self.observer;
            self.collector
                .collect(cursor.as_mut(), columns.len(), &self.cancel, |total| {
                    reporter.set_message(format!("Collecting rows ({total})"));
                    let event = PipelineEvent::new(
                        PipelineStage::Collecting,
                        EventKind::Milestone,
                        "Rows collected",
                    )
                    .with_count(total);
                    reporter.suspend(|| observer.on_event(&event));
                })
                .await?
        };
        self.reporter.stop().await;
        drop(cursor);

        let buffer = match collected {
            Collected::Complete(buffer) => buffer,
            Collected::Cancelled(buffer) => {
                return Ok(ExportOutcome::Cancelled {
                    rows_collected: buffer.len(),
                });
            }
        };
        info!(
            "Collected {} rows in {} batches ({:.1}s)",
            buffer.len(),
            buffer.batches(),
            collect_started.elapsed().as_secs_f64()
        );

        self.step = "building";
        self.enter(
            PipelineStage::Building,
            EventKind::Stage,
            "Building table",
            Some(buffer.len() as u64),
        );
        let table = TableBuilder::build(columns, buffer)?;

        if self.cancel.is_cancelled() {
            return Ok(ExportOutcome::Cancelled {
                rows_collected: table.rows().len(),
            });
        }

        self.step = "writing";
        self.enter(
            PipelineStage::Writing,
            EventKind::Stage,
            format!("Writing spreadsheet ({} engine)", self.writer.engine().name()),
            Some(table.row_count()),
        );
        self.reporter.start("Writing spreadsheet");
        let writer = self.writer.clone();
        let root_key = invocation.root_key().to_string();
        let write_started = Instant::now();
        let artifact = tokio::task::spawn_blocking(move || writer.write(&table, &root_key))
            .await
            .map_err(|e| WriteError::TaskFailed(e.to_string()))??;
        self.reporter.stop().await;
        debug!("Rendered in {:.1}s", write_started.elapsed().as_secs_f64());
        if artifact.truncated_cells > 0 {
            self.emit(
                PipelineEvent::new(
                    PipelineStage::Writing,
                    EventKind::Warning,
                    format!(
                        "{} text cells exceeded {} characters and were truncated",
                        artifact.truncated_cells,
                        MAX_CELL_CHARS
                    ),
                )
                .with_count(artifact.truncated_cells),
            );
        }

        let elapsed = started.elapsed();
        self.step = "done";
        self.enter(
            PipelineStage::Done,
            EventKind::Completed,
            artifact.path.display().to_string(),
            Some(artifact.row_count),
        );

        Ok(ExportOutcome::Completed { artifact, elapsed })
    }

    fn enter(
        &mut self,
        stage: PipelineStage,
        kind: EventKind,
        message: impl Into<String>,
        count: Option<u64>,
    ) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage.clone();
        let mut event = PipelineEvent::new(stage, kind, message);
        event.count = count;
        self.emit(event);
    }

    fn emit(&self, event: PipelineEvent) {
        self.reporter.suspend(|| self.observer.on_event(&event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnginePreference;
    use crate::error::{EmptyResultError, ErrorKind, ExportError};
    use crate::export::progress::DisplayTarget;
    use crate::export::table::CellValue;
    use crate::export::testing::{FixtureConnector, FixtureSet, RecordingObserver, int_rows};
    use crate::export::writers::SheetWriter;
    use crate::export::writers::test_support::read_sheet;
    use std::path::Path;

    fn writer(dir: &Path) -> SpreadsheetWriter {
        SpreadsheetWriter::new(SheetWriter::probe(EnginePreference::Auto, "Jugadores"), dir)
    }

    fn players(count: usize) -> Vec<Vec<CellValue>> {
        (0..count)
            .map(|i| {
                vec![
                    CellValue::Int(i as i64),
                    CellValue::Text(format!("player{i}")),
                ]
            })
            .collect()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_end_to_end_third_set() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::new(vec![
            FixtureSet::columnless(),
            FixtureSet::columnless(),
            FixtureSet::with_rows(&["PlayerId", "Username"], players(120_000)),
        ]));
        let observer = RecordingObserver::default();
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()))
            .with_observer(Arc::new(observer.clone()));

        let outcome = pipeline.run("AcmeAffiliate").await.unwrap();
        let ExportOutcome::Completed { artifact, .. } = outcome else {
            panic!("expected a file");
        };

        assert_eq!(pipeline.stage(), &PipelineStage::Done);
        assert_eq!(artifact.row_count, 120_000);
        assert!(connector.session_closed());

        let rows = read_sheet(&artifact.path, "Jugadores");
        assert_eq!(rows.len(), 120_001);
        assert_eq!(rows[0], vec!["PlayerId", "Username"]);
        assert_eq!(rows[120_000][1], "player119999");

        let milestones: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::Milestone)
            .filter_map(|e| e.count)
            .collect();
        assert_eq!(milestones, vec![100_000]);
    }

    #[tokio::test]
    async fn test_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::new(vec![FixtureSet::with_rows(
            &["id"],
            int_rows(3, 1),
        )]));
        let observer = RecordingObserver::default();
        let mut pipeline = ExportPipeline::new(connector, "dbo.GetPlayers", writer(dir.path()))
            .with_observer(Arc::new(observer.clone()));
        pipeline.run("AcmeAffiliate").await.unwrap();

        let mut stages: Vec<&'static str> = observer
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Stage | EventKind::Completed))
            .map(|e| e.stage.name())
            .collect();
        stages.dedup();
        assert_eq!(
            stages,
            vec!["connected", "invoked", "scanning", "collecting", "building", "writing", "done"]
        );
    }

    #[tokio::test]
    async fn test_all_columnless_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::new(vec![
            FixtureSet::columnless(),
            FixtureSet::columnless(),
        ]));
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()));

        let err = pipeline.run("AcmeAffiliate").await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::EmptyResult(EmptyResultError::NoResultSet { sets_seen: 2 })
        ));
        assert_eq!(
            pipeline.stage(),
            &PipelineStage::Failed {
                stage: "scanning",
                kind: ErrorKind::EmptyResult
            }
        );
        assert!(connector.session_closed());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_stage_clears_display() {
        let dir = tempfile::tempdir().unwrap();
        let term = indicatif::InMemoryTerm::new(4, 80);
        let connector = Arc::new(FixtureConnector::new(vec![
            FixtureSet::columnless(),
            FixtureSet::columnless(),
        ]));
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()))
            .with_reporter(ProgressReporter::new(
                DisplayTarget::Memory(term.clone()),
                Duration::from_millis(10),
            ));

        assert!(pipeline.run("AcmeAffiliate").await.is_err());
        assert!(term.contents().trim().is_empty());
        assert_eq!(pipeline.reporter.active_tasks(), 0);
        assert!(connector.session_closed());
    }

    #[tokio::test]
    async fn test_truncated_text_emits_warning() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::new(vec![FixtureSet::with_rows(
            &["PlayerId", "Notes"],
            vec![
                vec![CellValue::Int(1), CellValue::Text("n".repeat(40_000))],
                vec![CellValue::Int(2), CellValue::Text("ok".into())],
            ],
        )]));
        let observer = RecordingObserver::default();
        let mut pipeline = ExportPipeline::new(connector, "dbo.GetPlayers", writer(dir.path()))
            .with_observer(Arc::new(observer.clone()));

        let outcome = pipeline.run("AcmeAffiliate").await.unwrap();
        assert!(matches!(
            outcome,
            ExportOutcome::Completed { ref artifact, .. } if artifact.truncated_cells == 1
        ));

        let warnings: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].count, Some(1));
        assert_eq!(warnings[0].stage, PipelineStage::Writing);
    }

    #[tokio::test]
    async fn test_cancel_mid_collection_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let connector = Arc::new(
            FixtureConnector::new(vec![FixtureSet::with_rows(&["id"], int_rows(30, 1))])
                .cancel_after(2, token.clone()),
        );
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()))
            .with_collector(ChunkedCollector::new(10, 100))
            .with_cancellation(token);

        let outcome = pipeline.run("AcmeAffiliate").await.unwrap();
        assert!(matches!(
            outcome,
            ExportOutcome::Cancelled { rows_collected: 20 }
        ));
        assert_eq!(pipeline.stage(), &PipelineStage::Cancelled);
        assert!(connector.session_closed());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::refusing());
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()));

        let err = pipeline.run("AcmeAffiliate").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(
            pipeline.stage(),
            &PipelineStage::Failed {
                stage: "connecting",
                kind: ErrorKind::Connection
            }
        );
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_empty_root_key_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FixtureConnector::new(Vec::new()));
        let mut pipeline = ExportPipeline::new(connector.clone(), "dbo.GetPlayers", writer(dir.path()));

        let err = pipeline.run("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_row_count_invariant_under_chunk_size() {
        for chunk in [1_000, 7_777, 50_000] {
            let dir = tempfile::tempdir().unwrap();
            let connector = Arc::new(FixtureConnector::new(vec![FixtureSet::with_rows(
                &["id", "value"],
                int_rows(12_345, 2),
            )]));
            let mut pipeline = ExportPipeline::new(connector, "dbo.GetPlayers", writer(dir.path()))
                .with_collector(ChunkedCollector::new(chunk, 100_000));

            match pipeline.run("AcmeAffiliate").await.unwrap() {
                ExportOutcome::Completed { artifact, .. } => {
                    assert_eq!(artifact.row_count, 12_345, "chunk size {chunk}");
                }
                ExportOutcome::Cancelled { .. } => panic!("not cancelled"),
            }
        }
    }
}
