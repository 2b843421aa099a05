//! assetcount - protected asset inventory fetcher and daily count reporter
//!
//! Two stages, usually triggered separately:
//! - `fetch`: page through the asset search API and store the raw pages
//! - `transform`: replay the raw pages and write the per-account, per-type report
//!
//! `live` does both in one pass without keeping the raw pages.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Blobs: $XDG_DATA_HOME/assetcount/blobs (~/.local/share/assetcount/blobs)
//! - Logs: $XDG_STATE_HOME/assetcount/assetcount.log (~/.local/state/assetcount/assetcount.log)
//! - Config: $XDG_CONFIG_HOME/assetcount/config.toml (~/.config/assetcount/config.toml)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use assetcount_core::directory::DirectorySource;
use assetcount_core::fetch::{ConfigCredentials, SearchClient};
use assetcount_core::paginate::FailurePolicy;
use assetcount_core::pipeline::{
    run_fetch_with_progress, run_live, run_transform, run_transform_stream, ReportSink,
};
use assetcount_core::store::{BlobStore, FsBlobStore};
use assetcount_core::stream::{AssetRecordStream, ReplayRecordStream};
use assetcount_core::{Config, FetchSummary, ReportSummary, RunParams};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(name = "assetcount")]
#[command(about = "Fetch the protected asset inventory and report daily counts")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/assetcount/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Page through the search API and store the raw pages
    Fetch {
        /// Day the run is for, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Assets per page (default: from config)
        #[arg(long)]
        page_size: Option<u32>,

        /// Blob key for the raw pages (default: derived from the date)
        #[arg(long)]
        raw_key: Option<String>,

        /// What to do when a page after the first fails: stop or abort
        #[arg(long)]
        on_failure: Option<FailurePolicy>,
    },

    /// Count stored raw pages per account and type and write the report
    Transform {
        /// Day the run is for, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Value of the report's Date column (default: M/D/YYYY of --date)
        #[arg(long)]
        report_date: Option<String>,

        /// Blob key of the raw pages (default: derived from the date)
        #[arg(long)]
        raw_key: Option<String>,

        /// Blob key for the report (default: derived from the date)
        #[arg(long)]
        output_key: Option<String>,

        /// Read raw pages from a local file instead of the blob store
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write the report to a local file instead of the blob store
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fetch and count in one pass, without storing raw pages
    Live {
        /// Day the run is for, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Value of the report's Date column (default: M/D/YYYY of --date)
        #[arg(long)]
        report_date: Option<String>,

        /// Blob key for the report (default: derived from the date)
        #[arg(long)]
        output_key: Option<String>,

        /// Assets per page (default: from config)
        #[arg(long)]
        page_size: Option<u32>,

        /// What to do when a page after the first fails: stop or abort
        #[arg(long)]
        on_failure: Option<FailurePolicy>,
    },

    /// Show configuration and resolved paths
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard =
        assetcount_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("assetcount starting");

    match args.command {
        Command::Fetch {
            date,
            page_size,
            raw_key,
            on_failure,
        } => {
            let mut params = params_for(&config, date, page_size);
            if let Some(key) = raw_key {
                params = params.with_raw_data_key(key);
            }
            let policy = on_failure.unwrap_or(config.pagination.on_failure);
            cmd_fetch(&config, &params, policy, args.verbose).await
        }
        Command::Transform {
            date,
            report_date,
            raw_key,
            output_key,
            input,
            output,
        } => {
            let mut params = params_for(&config, date, None);
            if let Some(report_date) = report_date {
                params = params.with_report_date(report_date);
            }
            if let Some(key) = raw_key {
                params = params.with_raw_data_key(key);
            }
            if let Some(key) = output_key {
                params = params.with_output_key(key);
            }
            if input.is_some() || output.is_some() {
                cmd_transform_local(&config, &params, input.as_deref(), output.as_deref()).await
            } else {
                cmd_transform(&config, &params).await
            }
        }
        Command::Live {
            date,
            report_date,
            output_key,
            page_size,
            on_failure,
        } => {
            let mut params = params_for(&config, date, page_size);
            if let Some(report_date) = report_date {
                params = params.with_report_date(report_date);
            }
            if let Some(key) = output_key {
                params = params.with_output_key(key);
            }
            let policy = on_failure.unwrap_or(config.pagination.on_failure);
            cmd_live(&config, &params, policy).await
        }
        Command::Status => cmd_status(&config, args.config.as_deref()),
    }
}

/// Run parameters for a date (today when omitted).
fn params_for(config: &Config, date: Option<NaiveDate>, page_size: Option<u32>) -> RunParams {
    let page_size = page_size.unwrap_or(config.search.page_size);
    match date {
        Some(date) => RunParams::for_date(date, page_size),
        None => RunParams::today(page_size),
    }
}

async fn search_client(config: &Config, params: &RunParams) -> Result<SearchClient> {
    let credentials = ConfigCredentials::new(&config.search);
    let client = SearchClient::connect(&config.search, &credentials)
        .await
        .context("failed to create search client")?
        .with_page_size(params.page_size)?;
    Ok(client)
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

async fn cmd_fetch(
    config: &Config,
    params: &RunParams,
    policy: FailurePolicy,
    verbose: bool,
) -> Result<()> {
    let client = search_client(config, params).await?;
    let store = FsBlobStore::new(config.store.root_dir());

    println!("Search API:  {}", client.url());
    println!("Page size:   {}", params.page_size);
    if verbose {
        println!("On failure:  {}", policy);
        println!("Blob store:  {}", store.root().display());
    }

    let pb = spinner()?;
    let result = run_fetch_with_progress(&client, &store, params, policy, |pages, records| {
        pb.set_message(format!("{} pages, {} assets", pages, records));
    })
    .await;
    pb.finish_and_clear();

    let summary = result.context("fetch failed")?;
    print_fetch_summary(&summary);
    Ok(())
}

async fn cmd_transform(config: &Config, params: &RunParams) -> Result<()> {
    let directory = DirectorySource::from_config(&config.directory)
        .context("account directory is not configured")?;
    let store = FsBlobStore::new(config.store.root_dir());

    println!("Directory:   {}", directory.describe());
    println!("Raw data:    {}", params.raw_data_key);

    let summary = run_transform(&directory, &store, params)
        .await
        .context("transform failed")?;
    print_report_summary(&summary);
    Ok(())
}

/// Transform with local files on either end.
async fn cmd_transform_local(
    config: &Config,
    params: &RunParams,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let directory = DirectorySource::from_config(&config.directory)
        .context("account directory is not configured")?;
    let store = FsBlobStore::new(config.store.root_dir());

    let mut stream: Box<dyn AssetRecordStream> = match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            println!("Raw data:    {}", path.display());
            Box::new(ReplayRecordStream::from_reader(BufReader::new(file)))
        }
        None => {
            let raw = store
                .open(&params.raw_data_key)
                .await
                .context("failed to read raw data")?;
            println!("Raw data:    {}", params.raw_data_key);
            Box::new(ReplayRecordStream::from_reader(raw))
        }
    };
    let sink = match output {
        Some(path) => ReportSink::File(path),
        None => ReportSink::Store(&store),
    };
    println!("Directory:   {}", directory.describe());

    let summary = run_transform_stream(&directory, stream.as_mut(), sink, params)
        .await
        .context("transform failed")?;
    print_report_summary(&summary);
    Ok(())
}

async fn cmd_live(config: &Config, params: &RunParams, policy: FailurePolicy) -> Result<()> {
    let directory = DirectorySource::from_config(&config.directory)
        .context("account directory is not configured")?;
    let client = search_client(config, params).await?;
    let store = FsBlobStore::new(config.store.root_dir());

    println!("Search API:  {}", client.url());
    println!("Directory:   {}", directory.describe());

    let summary = run_live(&client, &directory, &store, params, policy)
        .await
        .context("live run failed")?;
    print_report_summary(&summary);
    Ok(())
}

fn print_fetch_summary(summary: &FetchSummary) {
    println!("Fetch complete:");
    println!("  Pages fetched:    {}", summary.pages);
    println!("  Assets fetched:   {}", summary.records);
    println!("  Raw data:         {} ({} bytes)", summary.raw_data_key, summary.bytes);
    println!("  Run ID:           {}", summary.run_id);
    if let Some(failure) = &summary.interruption {
        println!();
        println!("WARNING: pagination stopped early, raw data is partial");
        println!("  {}", failure);
    }
}

fn print_report_summary(summary: &ReportSummary) {
    println!("Report complete:");
    if let Some(pages) = summary.pages {
        println!("  Pages fetched:    {}", pages);
    }
    println!("  Records counted:  {}", summary.records);
    println!("  Report rows:      {}", summary.rows);
    println!("  Accounts known:   {}", summary.accounts);
    println!("  Report:           {} ({} bytes)", summary.destination, summary.bytes);
    println!("  Run ID:           {}", summary.run_id);
    if let Some(failure) = &summary.interruption {
        println!();
        println!("WARNING: pagination stopped early, report is partial");
        println!("  {}", failure);
    }
}

fn cmd_status(config: &Config, config_override: Option<&Path>) -> Result<()> {
    println!("assetcount Configuration");
    println!("========================");
    println!();

    let config_path = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);
    println!("Config file:     {}", config_path.display());
    println!("Blob store:      {}", config.store.root_dir().display());
    println!("Log file:        {}", Config::log_path().display());
    println!();

    let search = &config.search;
    println!(
        "Search API:      {}",
        search.base_url.as_deref().unwrap_or("<not set>")
    );
    println!("Search path:     {}", search.search_path);
    println!("Page size:       {}", search.page_size);
    println!("Timeout:         {}s", search.timeout_secs);
    println!(
        "API key:         {}",
        if search.api_key_id.is_some() && search.api_key_secret.is_some() {
            "<set>"
        } else if let Some(path) = &search.credentials_file {
            credentials_file_note(path)
        } else {
            "<from environment>"
        }
    );
    println!("On failure:      {}", config.pagination.on_failure);
    println!();

    let directory = &config.directory;
    if !directory.accounts.is_empty() {
        println!("Directory:       inline ({} accounts)", directory.accounts.len());
    } else {
        println!(
            "Directory:       {}",
            directory.base_url.as_deref().unwrap_or("<not set>")
        );
    }

    println!();
    let search_ready = search.base_url.is_some();
    let directory_ready = directory.is_ready();
    match (search_ready, directory_ready) {
        (true, true) => println!("Status: Ready"),
        (false, true) => println!("Status: transform only (search.base_url not set)"),
        (true, false) => println!("Status: fetch only (no account directory configured)"),
        (false, false) => println!("Status: Not ready (missing required configuration)"),
    }

    Ok(())
}

fn credentials_file_note(path: &Path) -> &'static str {
    if path.exists() {
        "<credentials file>"
    } else {
        "<credentials file missing>"
    }
}
