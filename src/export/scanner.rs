//! Result-set discovery
//!
//! ```text
//! Scanning --(no descriptor, more sets)--> Scanning
//! Scanning --(non-empty descriptor)------> Found(columns)
//! Scanning --(sets exhausted)------------> Empty
//! ```

use tracing::debug;

use crate::error::{EmptyResultError, Result};

use super::streaming::ResultSetCursor;

/// Scanner state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    Found(Vec<String>),
    Empty,
}

/// Advances through result sets until one carries columns
#[derive(Debug)]
pub struct ResultSetScanner {
    state: ScanState,
    sets_seen: usize,
}

impl Default for ResultSetScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSetScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Scanning,
            sets_seen: 0,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Result sets inspected so far, including the one found
    pub fn sets_seen(&self) -> usize {
        self.sets_seen
    }

    /// Leave the cursor on the first set with a non-empty descriptor
    ///
    /// # Returns
    /// * `Ok(columns)` - descriptor of the located set
    /// * `Err(EmptyResult)` - every set was columnless, or there were none
    pub async fn scan(&mut self, cursor: &mut dyn ResultSetCursor) -> Result<Vec<String>> {
        loop {
            if let Some(columns) = cursor.columns() {
                self.sets_seen += 1;
                if !columns.is_empty() {
                    debug!(
                        "Result set #{} has {} column(s)",
                        self.sets_seen,
                        columns.len()
                    );
                    let columns = columns.to_vec();
                    self.state = ScanState::Found(columns.clone());
                    return Ok(columns);
                }
                debug!("Result set #{} has no columns, skipping", self.sets_seen);
            }

            if !cursor.next_set().await? {
                self.state = ScanState::Empty;
                return Err(EmptyResultError::NoResultSet {
                    sets_seen: self.sets_seen,
                }
                .into());
            }
        }
    }
}
