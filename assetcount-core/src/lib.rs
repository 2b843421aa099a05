//! # assetcount-core
//!
//! Core library for assetcount - a protected cloud asset inventory reporter.
//!
//! This library provides:
//! - Cursor pagination over the asset search and account directory APIs
//! - Record streams, live or replayed from persisted raw pages
//! - Streaming per-(account, type) aggregation and CSV export
//! - Blob storage, configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Work is split into two independently triggered stages that hand data over
//! through a blob store:
//! - **Fetch:** page through the search API and persist every raw page
//! - **Transform:** build the account directory, replay the raw pages,
//!   count assets per account and type, write the CSV report
//!
//! ## Example
//!
//! ```rust,no_run
//! use assetcount_core::directory::DirectorySource;
//! use assetcount_core::pipeline::{run_transform, RunParams};
//! use assetcount_core::store::FsBlobStore;
//! use assetcount_core::Config;
//!
//! # async fn demo() -> assetcount_core::Result<()> {
//! let config = Config::load()?;
//! let directory = DirectorySource::from_config(&config.directory)?;
//! let store = FsBlobStore::new(config.store.root_dir());
//! let params = RunParams::today(config.search.page_size);
//!
//! let summary = run_transform(&directory, &store, &params).await?;
//! println!("{} rows written to {}", summary.rows, summary.destination);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, FetchFailure, Result};
pub use pipeline::{FetchSummary, ReportSummary, RunParams};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod fetch;
pub mod logging;
pub mod paginate;
pub mod pipeline;
pub mod store;
pub mod stream;
pub mod types;
