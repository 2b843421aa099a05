//! Fetch and transform stages
//!
//! ```text
//!  fetch:      SearchClient ─► Paginator ─► RawPageWriter ─► BlobStore[raw_data_key]
//!
//!  transform:  DirectoryLister ─► AccountDirectory ─┐
//!              BlobStore[raw_data_key] ─► Replay ───┴► Aggregator ─► ReportExporter ─► BlobStore[output_key]
//!
//!  live:       DirectoryLister ─► AccountDirectory ─┐
//!              SearchClient ─► Paginator ─► Live ───┴► Aggregator ─► ReportExporter ─► BlobStore[output_key]
//! ```
//!
//! The two stages are independent runs connected only through the raw blob.
//! Every run is parameterized by [`RunParams`] and tagged with a `run_id` in
//! its tracing span.
//!
//! Neither stage holds the full record set: fetched pages are spooled to a
//! temporary file and streamed into the store, and replay reads the stored
//! blob one page at a time.
//!
//! The account directory is always built, and awaited, before the first
//! record is pulled.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::Bytes;
use chrono::{Datelike, Local, NaiveDate};
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::directory::AccountDirectory;
use crate::error::{Error, FetchFailure, Result};
use crate::export::ReportExporter;
use crate::fetch::PageFetcher;
use crate::paginate::{FailurePolicy, Paginator};
use crate::store::BlobStore;
use crate::stream::{AssetRecordStream, LiveRecordStream, ReplayRecordStream};
use crate::types::{AccountDirectoryEntry, AggregateRow, AssetRecord};

// ============================================
// Run parameters
// ============================================

/// Per-run inputs: which day, where the raw blob lives, where the report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    /// Value of the report's Date column
    pub report_date: String,
    /// Blob key of the persisted raw pages
    pub raw_data_key: String,
    /// Blob key of the CSV report
    pub output_key: String,
    /// Assets requested per search page
    pub page_size: u32,
}

impl RunParams {
    /// Defaults for a calendar day.
    ///
    /// `2022-09-08` gives report date `9/8/2022`, raw key
    /// `rawData/cloud-guard-protected-assets-2022-September-08.json` and
    /// output key `reports/cloud-guard-assets-2022-September-08.csv`.
    pub fn for_date(date: NaiveDate, page_size: u32) -> Self {
        let stamp = date.format("%Y-%B-%d");
        Self {
            report_date: us_date(date),
            raw_data_key: format!("rawData/cloud-guard-protected-assets-{}.json", stamp),
            output_key: format!("reports/cloud-guard-assets-{}.csv", stamp),
            page_size,
        }
    }

    /// Defaults for today, local time.
    pub fn today(page_size: u32) -> Self {
        Self::for_date(Local::now().date_naive(), page_size)
    }

    pub fn with_report_date(mut self, report_date: impl Into<String>) -> Self {
        self.report_date = report_date.into();
        self
    }

    pub fn with_raw_data_key(mut self, key: impl Into<String>) -> Self {
        self.raw_data_key = key.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config(
                "page size must be a positive integer".to_string(),
            ));
        }
        if self.raw_data_key.is_empty() || self.output_key.is_empty() {
            return Err(Error::Config("blob keys must not be empty".to_string()));
        }
        Ok(())
    }
}

/// US-style date without zero padding, e.g. `9/8/2022`.
pub fn us_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

// ============================================
// Raw page persistence
// ============================================

/// Spools fetched pages in raw-blob form (one JSON array per page, newline
/// terminated) to an anonymous temporary file.
///
/// Only the page being appended is held in memory.
#[derive(Debug)]
pub struct RawPageWriter {
    spool: BufWriter<File>,
    pages: usize,
    records: usize,
    bytes: u64,
}

impl RawPageWriter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            spool: BufWriter::new(tempfile::tempfile()?),
            pages: 0,
            records: 0,
            bytes: 0,
        })
    }

    pub fn append(&mut self, page: &[AssetRecord]) -> Result<()> {
        let mut line = serde_json::to_vec(page)?;
        line.push(b'\n');
        self.spool.write_all(&line)?;
        self.pages += 1;
        self.records += page.len();
        self.bytes += line.len() as u64;
        Ok(())
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Bytes spooled so far.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Flush the spool and hand over the file for upload.
    pub fn into_file(self) -> Result<File> {
        self.spool.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

// ============================================
// Report destinations
// ============================================

/// Where a transform run writes its report.
#[derive(Clone, Copy)]
pub enum ReportSink<'a> {
    /// The blob store, under the run's `output_key`
    Store(&'a dyn BlobStore),
    /// A local file
    File(&'a Path),
}

impl ReportSink<'_> {
    /// Blob key or file path the report goes to.
    pub fn destination(&self, params: &RunParams) -> String {
        match self {
            ReportSink::Store(_) => params.output_key.clone(),
            ReportSink::File(path) => path.display().to_string(),
        }
    }
}

impl fmt::Debug for ReportSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSink::Store(_) => f.write_str("Store"),
            ReportSink::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

// ============================================
// Summaries
// ============================================

/// Outcome of a fetch run.
#[derive(Debug)]
pub struct FetchSummary {
    pub run_id: Uuid,
    pub pages: usize,
    pub records: usize,
    pub bytes: u64,
    pub raw_data_key: String,
    /// Set when pagination stopped early; the blob holds the pages before it
    pub interruption: Option<FetchFailure>,
}

impl FetchSummary {
    pub fn is_partial(&self) -> bool {
        self.interruption.is_some()
    }
}

/// Outcome of a transform or live run.
#[derive(Debug)]
pub struct ReportSummary {
    pub run_id: Uuid,
    pub records: u64,
    pub rows: usize,
    pub accounts: usize,
    pub bytes: usize,
    /// Blob key or file path of the report
    pub destination: String,
    /// Pages fetched (live runs only)
    pub pages: Option<usize>,
    /// Set when a live run's pagination stopped early
    pub interruption: Option<FetchFailure>,
}

impl ReportSummary {
    pub fn is_partial(&self) -> bool {
        self.interruption.is_some()
    }
}

// ============================================
// Stages
// ============================================

/// Fetch every page and persist the raw blob.
pub async fn run_fetch<F>(
    fetcher: F,
    store: &dyn BlobStore,
    params: &RunParams,
    policy: FailurePolicy,
) -> Result<FetchSummary>
where
    F: PageFetcher<Item = AssetRecord>,
{
    run_fetch_with_progress(fetcher, store, params, policy, |_, _| {}).await
}

/// Fetch with a progress callback.
///
/// The callback receives `(pages_fetched, records_fetched)` after each page.
///
/// A first-page failure, or any failure under [`FailurePolicy::Abort`],
/// returns the error and writes nothing. Under [`FailurePolicy::Stop`] the
/// pages fetched before a mid-run failure are persisted and the failure is
/// reported in [`FetchSummary::interruption`].
pub async fn run_fetch_with_progress<F, P>(
    fetcher: F,
    store: &dyn BlobStore,
    params: &RunParams,
    policy: FailurePolicy,
    on_page: P,
) -> Result<FetchSummary>
where
    F: PageFetcher<Item = AssetRecord>,
    P: FnMut(usize, usize),
{
    params.validate()?;
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("fetch", %run_id, key = %params.raw_data_key);

    fetch_pages(run_id, fetcher, store, params, policy, on_page)
        .instrument(span)
        .await
}

async fn fetch_pages<F, P>(
    run_id: Uuid,
    fetcher: F,
    store: &dyn BlobStore,
    params: &RunParams,
    policy: FailurePolicy,
    mut on_page: P,
) -> Result<FetchSummary>
where
    F: PageFetcher<Item = AssetRecord>,
    P: FnMut(usize, usize),
{
    tracing::info!(page_size = params.page_size, policy = %policy, "Fetch starting");

    let mut paginator = Paginator::new(fetcher).with_policy(policy);
    let mut raw = RawPageWriter::new()?;

    while let Some(page) = paginator.next_page().await? {
        raw.append(&page)?;
        on_page(raw.pages(), raw.records());
    }

    let interruption = paginator.take_interruption();
    let pages = raw.pages();
    let records = raw.records();

    let bytes = store.put_file(&params.raw_data_key, raw.into_file()?).await?;

    if let Some(failure) = &interruption {
        tracing::warn!(pages, records, error = %failure, "Fetch finished with partial data");
    } else {
        tracing::info!(pages, records, bytes, "Fetch complete");
    }

    Ok(FetchSummary {
        run_id,
        pages,
        records,
        bytes,
        raw_data_key: params.raw_data_key.clone(),
        interruption,
    })
}

/// Replay the stored raw blob into a report in the store.
pub async fn run_transform<D>(
    directory_fetcher: D,
    store: &dyn BlobStore,
    params: &RunParams,
) -> Result<ReportSummary>
where
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    params.validate()?;
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("transform", %run_id, key = %params.raw_data_key);

    replay_raw(run_id, directory_fetcher, store, params)
        .instrument(span)
        .await
}

/// Transform an already opened record source into a report at `sink`.
///
/// Used for runs whose raw pages or report live outside the store, such as
/// local files.
pub async fn run_transform_stream<D>(
    directory_fetcher: D,
    stream: &mut dyn AssetRecordStream,
    sink: ReportSink<'_>,
    params: &RunParams,
) -> Result<ReportSummary>
where
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    params.validate()?;
    let run_id = Uuid::new_v4();
    let destination = sink.destination(params);
    let span = tracing::info_span!("transform", %run_id, %destination);

    transform_records(run_id, directory_fetcher, stream, sink, params)
        .instrument(span)
        .await
}

async fn replay_raw<D>(
    run_id: Uuid,
    directory_fetcher: D,
    store: &dyn BlobStore,
    params: &RunParams,
) -> Result<ReportSummary>
where
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    let raw = store.open(&params.raw_data_key).await?;
    tracing::info!("Replaying raw pages");
    let mut stream = ReplayRecordStream::from_reader(raw);

    transform_records(
        run_id,
        directory_fetcher,
        &mut stream,
        ReportSink::Store(store),
        params,
    )
    .await
}

async fn transform_records<D>(
    run_id: Uuid,
    directory_fetcher: D,
    stream: &mut dyn AssetRecordStream,
    sink: ReportSink<'_>,
    params: &RunParams,
) -> Result<ReportSummary>
where
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    let directory = AccountDirectory::build(directory_fetcher).await?;

    let aggregator = aggregate(stream, &directory, &params.report_date).await?;
    let records = aggregator.total();
    let rows = aggregator.finalize();
    let bytes = write_report(sink, params, &rows).await?;

    Ok(ReportSummary {
        run_id,
        records,
        rows: rows.len(),
        accounts: directory.len(),
        bytes,
        destination: sink.destination(params),
        pages: None,
        interruption: None,
    })
}

/// Aggregate straight from the search API, without a raw blob.
pub async fn run_live<S, D>(
    search: S,
    directory_fetcher: D,
    store: &dyn BlobStore,
    params: &RunParams,
    policy: FailurePolicy,
) -> Result<ReportSummary>
where
    S: PageFetcher<Item = AssetRecord>,
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    params.validate()?;
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("live", %run_id, key = %params.output_key);

    aggregate_live(run_id, search, directory_fetcher, store, params, policy)
        .instrument(span)
        .await
}

async fn aggregate_live<S, D>(
    run_id: Uuid,
    search: S,
    directory_fetcher: D,
    store: &dyn BlobStore,
    params: &RunParams,
    policy: FailurePolicy,
) -> Result<ReportSummary>
where
    S: PageFetcher<Item = AssetRecord>,
    D: PageFetcher<Item = AccountDirectoryEntry>,
{
    let directory = AccountDirectory::build(directory_fetcher).await?;

    let mut stream = LiveRecordStream::new(Paginator::new(search).with_policy(policy));
    let aggregator = aggregate(&mut stream, &directory, &params.report_date).await?;
    let pages = stream.paginator().pages_fetched();
    let interruption = stream.take_interruption();

    let records = aggregator.total();
    let rows = aggregator.finalize();
    let sink = ReportSink::Store(store);
    let bytes = write_report(sink, params, &rows).await?;

    if let Some(failure) = &interruption {
        tracing::warn!(pages, records, error = %failure, "Report built from partial data");
    }

    Ok(ReportSummary {
        run_id,
        records,
        rows: rows.len(),
        accounts: directory.len(),
        bytes,
        destination: sink.destination(params),
        pages: Some(pages),
        interruption,
    })
}

/// Export rows and persist the report. Returns the report size in bytes.
async fn write_report(
    sink: ReportSink<'_>,
    params: &RunParams,
    rows: &[AggregateRow],
) -> Result<usize> {
    let report = ReportExporter::new().export(rows)?;
    let bytes = report.len();
    let destination = sink.destination(params);

    let written = match sink {
        ReportSink::Store(store) => store.put(&params.output_key, Bytes::from(report)).await,
        ReportSink::File(path) => tokio::fs::write(path, report).await.map_err(Error::from),
    };
    if let Err(e) = written {
        tracing::error!(%destination, rows = rows.len(), error = %e, "Report was not persisted");
        return Err(Error::Export(format!(
            "failed to write report {}: {}",
            destination, e
        )));
    }

    tracing::info!(%destination, rows = rows.len(), bytes, "Report written");
    Ok(bytes)
}
