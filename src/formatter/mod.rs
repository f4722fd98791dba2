//! Console presentation of pipeline events
//!
//! This module provides:
//! - [`ConsoleObserver`]: renders [`PipelineEvent`]s as colored status lines
//! - [`Colorizer`]: optional ANSI styling
//! - Count, size and duration helpers in [`stats`]

pub mod colorizer;
pub mod stats;

use std::io::Write;
use std::time::Duration;

use crate::export::{EventKind, ExportArtifact, PipelineEvent, PipelineObserver};

pub use colorizer::Colorizer;
pub use stats::{format_count, format_elapsed, format_size};

/// Prints pipeline events to stdout
#[derive(Debug, Clone, Copy)]
pub struct ConsoleObserver {
    colorizer: Colorizer,
    quiet: bool,
}

impl ConsoleObserver {
    /// Create a console observer
    ///
    /// # Arguments
    /// * `color` - Enable ANSI colors
    /// * `quiet` - Only print warnings, failures and the final result
    pub fn new(color: bool, quiet: bool) -> Self {
        Self {
            colorizer: Colorizer::new(color),
            quiet,
        }
    }

    pub fn colorizer(&self) -> &Colorizer {
        &self.colorizer
    }

    /// Render one event, or `None` when it is not shown
    pub fn render(&self, event: &PipelineEvent) -> Option<String> {
        let c = &self.colorizer;
        match event.kind {
            EventKind::Stage | EventKind::Detail if self.quiet => None,
            EventKind::Milestone if self.quiet => None,
            EventKind::Stage => Some(match event.count {
                Some(n) => format!(
                    "{} {} ({} rows)",
                    c.info("→"),
                    event.message,
                    c.value(&format_count(n))
                ),
                None => format!("{} {}", c.info("→"), event.message),
            }),
            EventKind::Detail => Some(format!("  {}", c.dim(&event.message))),
            EventKind::Milestone => Some(format!(
                "  {}: {}",
                event.message,
                c.value(&format_count(event.count.unwrap_or(0)))
            )),
            EventKind::Warning => Some(c.warning(&event.message)),
            EventKind::Completed => Some(format!(
                "{} {} rows exported",
                c.success("✓"),
                format_count(event.count.unwrap_or(0))
            )),
            EventKind::Aborted => Some(c.warning(&event.message)),
        }
    }

    /// Completion summary: file, row count, size and elapsed time
    pub fn summary(&self, artifact: &ExportArtifact, elapsed: Duration) -> String {
        let c = &self.colorizer;
        format!(
            "{} {}\n  File:    {}\n  Rows:    {}\n  Size:    {}\n  Engine:  {}\n  Elapsed: {}",
            c.success("✓"),
            c.success("Export complete"),
            c.value(&artifact.path.display().to_string()),
            format_count(artifact.row_count),
            format_size(artifact.size_bytes),
            artifact.engine,
            format_elapsed(elapsed)
        )
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_event(&self, event: &PipelineEvent) {
        if let Some(line) = self.render(event) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::PipelineStage;
    use chrono::Local;
    use std::path::PathBuf;

    #[test]
    fn test_render_milestone() {
        let observer = ConsoleObserver::new(false, false);
        let event = PipelineEvent::new(
            PipelineStage::Collecting,
            EventKind::Milestone,
            "Rows collected",
        )
        .with_count(200_000);
        assert_eq!(
            observer.render(&event).as_deref(),
            Some("  Rows collected: 200,000")
        );
    }

    #[test]
    fn test_quiet_hides_progress_events() {
        let observer = ConsoleObserver::new(false, true);
        let stage = PipelineEvent::new(PipelineStage::Collecting, EventKind::Stage, "Fetching");
        assert!(observer.render(&stage).is_none());

        let done = PipelineEvent::new(PipelineStage::Done, EventKind::Completed, "out.xlsx")
            .with_count(1_500);
        assert_eq!(observer.render(&done).as_deref(), Some("✓ 1,500 rows exported"));
    }

    #[test]
    fn test_summary_plain() {
        let observer = ConsoleObserver::new(false, false);
        let artifact = ExportArtifact {
            path: PathBuf::from("/tmp/afiliados_export_Acme_20240101_000000.xlsx"),
            size_bytes: 2 * 1024 * 1024,
            generated_at: Local::now(),
            row_count: 120_000,
            truncated_cells: 0,
            engine: "styled",
        };
        let text = observer.summary(&artifact, Duration::from_secs(5));
        assert!(text.contains("Rows:    120,000"));
        assert!(text.contains("Size:    2.00 MiB"));
        assert!(text.contains("Elapsed: 5.0s"));
        assert!(!text.contains('\x1b'));
    }
}
