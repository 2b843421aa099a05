//! Cursor-driven pagination
//!
//! A [`Paginator`] drives a [`PageFetcher`] until the remote listing is
//! exhausted. It is a small state machine:
//!
//! ```text
//! NotStarted ──fetch(None)──► InProgress(cursor) ──fetch(cursor)──► InProgress(next)
//!      │                            │
//!      └──── no next cursor ────────┴──── no next cursor ──────────► Done
//! ```
//!
//! Termination depends only on whether a page carries a non-empty next
//! cursor. An empty page with a cursor keeps going; a full page without one
//! is the last.
//!
//! ## Failures
//!
//! A failure on the first page always aborts. After that, [`FailurePolicy`]
//! decides: `Stop` records the failure as the paginator's
//! [`interruption`](Paginator::interruption) and ends the sequence (the pages
//! already yielded stand as a partial result), `Abort` returns the error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, FetchFailure, Result};
use crate::fetch::PageFetcher;
use crate::types::Cursor;

/// What to do when a page after the first one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log, stop paginating, keep what was fetched
    #[default]
    Stop,
    /// Propagate the failure
    Abort,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Stop => "stop",
            FailurePolicy::Abort => "abort",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stop" => Ok(FailurePolicy::Stop),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(Error::Config(format!(
                "unknown failure policy {:?} (expected \"stop\" or \"abort\")",
                other
            ))),
        }
    }
}

/// Where the paginator is in the listing.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginatorState {
    /// No request made yet
    NotStarted,
    /// Next request resumes at this cursor
    InProgress(Cursor),
    /// Listing exhausted (or stopped after a failure)
    Done,
}

/// Lazy, forward-only walk over every item of a paged listing.
///
/// Single use: once `Done`, it stays done. Start a new run with a new
/// paginator.
pub struct Paginator<F: PageFetcher> {
    fetcher: F,
    policy: FailurePolicy,
    state: PaginatorState,
    buffer: std::vec::IntoIter<F::Item>,
    pages_fetched: usize,
    items_yielded: usize,
    interruption: Option<FetchFailure>,
}

impl<F: PageFetcher> Paginator<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            policy: FailurePolicy::default(),
            state: PaginatorState::NotStarted,
            buffer: Vec::new().into_iter(),
            pages_fetched: 0,
            items_yielded: 0,
            interruption: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn state(&self) -> &PaginatorState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == PaginatorState::Done
    }

    /// Failure that ended pagination early under [`FailurePolicy::Stop`].
    pub fn interruption(&self) -> Option<&FetchFailure> {
        self.interruption.as_ref()
    }

    pub fn take_interruption(&mut self) -> Option<FetchFailure> {
        self.interruption.take()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Items handed to the caller so far, through either iterator.
    pub fn items_yielded(&self) -> usize {
        self.items_yielded
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the listing is exhausted or stopped.
    pub async fn next_page(&mut self) -> Result<Option<Vec<F::Item>>> {
        let page = self.fetch_next().await?;
        if let Some(items) = &page {
            self.items_yielded += items.len();
        }
        Ok(page)
    }

    async fn fetch_next(&mut self) -> Result<Option<Vec<F::Item>>> {
        let cursor = match &self.state {
            PaginatorState::Done => return Ok(None),
            PaginatorState::NotStarted => None,
            PaginatorState::InProgress(cursor) => Some(cursor.clone()),
        };

        let outcome = match self.fetcher.fetch(cursor.as_ref()).await {
            Ok(page) if cursor.is_some() && page.next_cursor == cursor => Err(FetchFailure::new(
                cursor.as_ref(),
                "upstream returned the same cursor twice",
            )),
            other => other,
        };

        match outcome {
            Ok(page) => {
                self.pages_fetched += 1;
                self.state = match page.next_cursor {
                    Some(next) if !next.is_empty() => PaginatorState::InProgress(next),
                    _ => PaginatorState::Done,
                };
                tracing::debug!(
                    page = self.pages_fetched,
                    items = page.items.len(),
                    last = self.is_done(),
                    "Fetched page"
                );
                Ok(Some(page.items))
            }
            Err(failure) => {
                self.state = PaginatorState::Done;

                if cursor.is_none() || self.policy == FailurePolicy::Abort {
                    tracing::error!(
                        pages_fetched = self.pages_fetched,
                        error = %failure,
                        "Pagination aborted"
                    );
                    return Err(failure.into());
                }

                tracing::warn!(
                    pages_fetched = self.pages_fetched,
                    items_yielded = self.items_yielded,
                    error = %failure,
                    "Page fetch failed, stopping with partial results"
                );
                self.interruption = Some(failure);
                Ok(None)
            }
        }
    }

    /// Pull the next item, fetching pages as needed.
    ///
    /// Items come out in the order they were received.
    pub async fn next_item(&mut self) -> Result<Option<F::Item>> {
        loop {
            if let Some(item) = self.buffer.next() {
                self.items_yielded += 1;
                return Ok(Some(item));
            }
            match self.fetch_next().await? {
                Some(items) => self.buffer = items.into_iter(),
                None => return Ok(None),
            }
        }
    }
}
