//! Bounded-batch row collection
//!
//! Rows are pulled in batches of at most `chunk_size` until a fetch returns
//! nothing. A zero-row fetch ends the loop; it is not an error. The total is
//! the same for any positive chunk size.

use std::num::NonZeroUsize;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EmptyResultError, InvocationError, Result};

use super::streaming::ResultSetCursor;
use super::table::RowBuffer;

/// Default maximum rows per fetch
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Default rows between milestones
pub const DEFAULT_MILESTONE_INTERVAL: u64 = 100_000;

/// How a collection run ended
#[derive(Debug)]
pub enum Collected {
    /// The result set was drained
    Complete(RowBuffer),
    /// Cancellation was seen at a batch boundary; rows so far are kept
    Cancelled(RowBuffer),
}

/// Pulls rows from the located result set into a [`RowBuffer`]
#[derive(Debug, Clone)]
pub struct ChunkedCollector {
    chunk_size: NonZeroUsize,
    milestone_interval: u64,
}

impl Default for ChunkedCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MILESTONE_INTERVAL)
    }
}

impl ChunkedCollector {
    /// Create a collector
    ///
    /// Zero values are raised to one.
    pub fn new(chunk_size: usize, milestone_interval: u64) -> Self {
        Self {
            chunk_size: NonZeroUsize::new(chunk_size).unwrap_or(NonZeroUsize::MIN),
            milestone_interval: milestone_interval.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    /// Drain the current result set
    ///
    /// `on_milestone` is called with the running total each time it crosses a
    /// multiple of the milestone interval. `cancel` is checked before every
    /// fetch.
    ///
    /// # Errors
    /// * [`EmptyResultError::NoRows`] - the set produced no rows at all
    /// * [`InvocationError::Protocol`] - a batch larger than requested, or
    ///   rows after the set reported its end
    pub async fn collect<F>(
        &self,
        cursor: &mut dyn ResultSetCursor,
        column_count: usize,
        cancel: &CancellationToken,
        mut on_milestone: F,
    ) -> Result<Collected>
    where
        F: FnMut(u64),
    {
        let chunk = self.chunk_size.get();
        let mut buffer = RowBuffer::new();
        let mut total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!("Collection cancelled after {} rows", total);
                return Ok(Collected::Cancelled(buffer));
            }

            let batch = cursor.fetch_many(chunk).await?;
            if batch.is_empty() {
                break;
            }
            if batch.len() > chunk {
                return Err(InvocationError::Protocol(format!(
                    "asked for {} rows, received {}",
                    chunk,
                    batch.len()
                ))
                .into());
            }

            let before = total;
            total += batch.len() as u64;
            buffer.append(batch);
            debug!("Fetched batch #{} (total: {})", buffer.batches(), total);

            if total / self.milestone_interval > before / self.milestone_interval {
                on_milestone(total);
            }
        }

        // The set reported its end; it must stay ended.
        if !cursor.fetch_many(chunk).await?.is_empty() {
            return Err(InvocationError::Protocol(format!(
                "rows arrived after the result set ended at {total}"
            ))
            .into());
        }

        if buffer.is_empty() {
            return Err(EmptyResultError::NoRows {
                columns: column_count,
            }
            .into());
        }

        Ok(Collected::Complete(buffer))
    }
}
