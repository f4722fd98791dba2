//! Neutral pipeline events
//!
//! The pipeline reports what happens through [`PipelineObserver`]; how events
//! look on screen is entirely up to the observer.

use std::fmt;

use crate::error::ErrorKind;

/// Pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Connected,
    Invoked,
    Scanning,
    Collecting,
    Building,
    Writing,
    Done,
    Cancelled,
    Failed { stage: &'static str, kind: ErrorKind },
}

impl PipelineStage {
    /// Short lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Connected => "connected",
            PipelineStage::Invoked => "invoked",
            PipelineStage::Scanning => "scanning",
            PipelineStage::Collecting => "collecting",
            PipelineStage::Building => "building",
            PipelineStage::Writing => "writing",
            PipelineStage::Done => "done",
            PipelineStage::Cancelled => "cancelled",
            PipelineStage::Failed { .. } => "failed",
        }
    }

    /// `Done`, `Cancelled` and `Failed` end the pipeline
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Done | PipelineStage::Cancelled | PipelineStage::Failed { .. }
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Failed { stage, kind } => write!(f, "failed({stage}, {kind})"),
            other => f.write_str(other.name()),
        }
    }
}

/// What kind of thing happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A stage began
    Stage,
    /// Additional detail within a stage
    Detail,
    /// The running row total crossed a milestone
    Milestone,
    /// Something noteworthy that does not stop the pipeline
    Warning,
    /// The export finished
    Completed,
    /// The pipeline stopped with an error or cancellation
    Aborted,
}

/// One event: `{stage, message, count}`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub stage: PipelineStage,
    pub kind: EventKind,
    pub message: String,
    pub count: Option<u64>,
}

impl PipelineEvent {
    pub fn new(stage: PipelineStage, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            count: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Receives pipeline events
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Cancelled.is_terminal());
        assert!(!PipelineStage::Collecting.is_terminal());
        let failed = PipelineStage::Failed {
            stage: "writing",
            kind: ErrorKind::Write,
        };
        assert!(failed.is_terminal());
        assert_eq!(failed.to_string(), "failed(writing, write)");
    }
}
