//! Asset record streams
//!
//! The aggregator pulls records one at a time through [`AssetRecordStream`]
//! and does not care where they come from:
//!
//! - [`LiveRecordStream`]: straight from the search API via a [`Paginator`]
//! - [`ReplayRecordStream`]: from a persisted raw blob, i.e. the fetched
//!   pages written back to back as JSON arrays (`[..][..]`, optionally
//!   newline separated), read in write order
//!
//! Both end with `Ok(None)`. A stream is consumed once; replaying again means
//! opening the raw data again from the start.

use std::io::Read;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;

use crate::error::{FetchFailure, Result};
use crate::fetch::PageFetcher;
use crate::paginate::Paginator;
use crate::types::AssetRecord;

/// Single-pass pull interface over asset records.
#[async_trait]
pub trait AssetRecordStream: Send {
    /// Next record, or `None` at end of stream.
    async fn next_record(&mut self) -> Result<Option<AssetRecord>>;
}

/// Records pulled live from the search API.
pub struct LiveRecordStream<F: PageFetcher<Item = AssetRecord>> {
    paginator: Paginator<F>,
}

impl<F: PageFetcher<Item = AssetRecord>> LiveRecordStream<F> {
    pub fn new(paginator: Paginator<F>) -> Self {
        Self { paginator }
    }

    pub fn paginator(&self) -> &Paginator<F> {
        &self.paginator
    }

    /// Failure that ended the stream early, if any.
    pub fn take_interruption(&mut self) -> Option<FetchFailure> {
        self.paginator.take_interruption()
    }
}

#[async_trait]
impl<F: PageFetcher<Item = AssetRecord>> AssetRecordStream for LiveRecordStream<F> {
    async fn next_record(&mut self) -> Result<Option<AssetRecord>> {
        self.paginator.next_item().await
    }
}

/// Records replayed from persisted raw pages.
///
/// Holds at most one page in memory. A `null` page is read as empty.
pub struct ReplayRecordStream<R: Read> {
    pages: StreamDeserializer<'static, IoRead<R>, Option<Vec<AssetRecord>>>,
    current: std::vec::IntoIter<AssetRecord>,
    pages_read: usize,
}

impl ReplayRecordStream<std::io::Cursor<Bytes>> {
    /// Replay a raw blob held in memory.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::from_reader(std::io::Cursor::new(bytes))
    }
}

impl<R: Read> ReplayRecordStream<R> {
    /// Replay raw pages from any reader (a local file, a downloaded blob).
    pub fn from_reader(reader: R) -> Self {
        Self {
            pages: serde_json::Deserializer::from_reader(reader).into_iter(),
            current: Vec::new().into_iter(),
            pages_read: 0,
        }
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    fn pull(&mut self) -> Result<Option<AssetRecord>> {
        loop {
            if let Some(record) = self.current.next() {
                return Ok(Some(record));
            }
            match self.pages.next() {
                Some(page) => {
                    let page = page?;
                    self.pages_read += 1;
                    self.current = page.unwrap_or_default().into_iter();
                }
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl<R: Read + Send> AssetRecordStream for ReplayRecordStream<R> {
    async fn next_record(&mut self) -> Result<Option<AssetRecord>> {
        self.pull()
    }
}
