//! Extraction pipeline
//!
//! One request flows through these stages, in order:
//!
//! 1. **ProcedureInvoker**: calls the stored procedure with the root key
//! 2. **ResultSetScanner**: skips result sets that carry no columns
//! 3. **ChunkedCollector**: drains the located set in bounded batches
//! 4. **TableBuilder**: checks arity and assembles the [`Table`]
//! 5. **SpreadsheetWriter**: renders the workbook with the probed engine
//!
//! [`ExportPipeline`] drives them, closes the session on every exit path and
//! keeps a [`ProgressReporter`] spinning while a stage waits on the server.
//! Everything the pipeline has to say goes out as neutral
//! [`PipelineEvent`]s to an injected [`PipelineObserver`].

pub mod collector;
pub mod coordinator;
pub mod events;
pub mod invoker;
pub mod progress;
pub mod scanner;
pub mod streaming;
pub mod table;
pub mod writers;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{ChunkedCollector, Collected, DEFAULT_CHUNK_SIZE, DEFAULT_MILESTONE_INTERVAL};
pub use coordinator::{DEFAULT_COMMAND_TIMEOUT, ExportOutcome, ExportPipeline};
pub use events::{EventKind, NullObserver, PipelineEvent, PipelineObserver, PipelineStage};
pub use invoker::{Invocation, ProcedureInvoker};
pub use progress::{DisplayTarget, ProgressReporter};
pub use scanner::{ResultSetScanner, ScanState};
pub use streaming::ResultSetCursor;
pub use table::{CellValue, Row, RowBuffer, Table, TableBuilder};
pub use writers::{ExportArtifact, SheetWriter, SpreadsheetWriter};
