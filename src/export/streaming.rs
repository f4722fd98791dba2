//! Result-set cursor abstraction
//!
//! A routine call can return several result sets. The cursor exposes them one
//! at a time and hands out rows of the current set in bounded batches, so the
//! pipeline never needs the whole set in a single call.

use async_trait::async_trait;

use crate::error::Result;

use super::table::Row;

/// Cursor over the result sets of one routine call
///
/// Starts positioned on the first result set, if any.
#[async_trait]
pub trait ResultSetCursor: Send {
    /// Column descriptor of the current result set
    ///
    /// An empty slice for a set without columns, `None` when no set is
    /// current (none returned, or all consumed).
    fn columns(&self) -> Option<&[String]>;

    /// Move to the next result set, discarding unread rows of the current one
    ///
    /// # Returns
    /// * `Result<bool>` - `false` once there are no more result sets
    async fn next_set(&mut self) -> Result<bool>;

    /// Fetch up to `max_rows` rows of the current result set
    ///
    /// An empty batch means the current set is drained; every later call
    /// returns an empty batch as well.
    async fn fetch_many(&mut self, max_rows: usize) -> Result<Vec<Row>>;
}
