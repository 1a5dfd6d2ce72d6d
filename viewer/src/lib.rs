use anyhow::{anyhow, Result};
use archive_core::{Archive, ArchiveOptions, EngineConfig, PageRequest, RecordId, SortOrder};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "archive-viewer")]
#[command(about = "Browse and search an archive site directory", long_about = None)]
pub struct Cli {
    /// Site data directory
    #[arg(long)]
    pub data: PathBuf,
    /// Where the built search index is kept between runs
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// Ignore the shipped search index and always index locally
    #[arg(long, default_value_t = false)]
    pub no_prebuilt: bool,
    /// Record ids indexed per batch
    #[arg(long, default_value_t = EngineConfig::default().batch_size)]
    pub batch_size: usize,
    /// Give up when the data files take longer than this to load
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print one page of rows
    Page {
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 25)]
        length: usize,
        /// subject, author, timestamp, id or relevance
        #[arg(long)]
        sort: Option<SortOrder>,
        #[arg(long, default_value_t = false)]
        ascending: bool,
        #[arg(long)]
        search: Option<String>,
    },
    /// Print one message with its body
    Message { id: RecordId },
}

impl Cli {
    fn options(&self) -> ArchiveOptions {
        ArchiveOptions {
            store_path: self.store.clone(),
            engine: EngineConfig {
                batch_size: self.batch_size,
                ..Default::default()
            },
            prebuilt_index: !self.no_prebuilt,
        }
    }
}

/// Run the command under the configured timeout. Data scripts that never
/// deliver would otherwise block forever.
pub async fn run(cli: &Cli) -> Result<Value> {
    let limit = Duration::from_secs(cli.timeout_secs);
    tokio::time::timeout(limit, execute(cli))
        .await
        .map_err(|_| anyhow!("timed out after {}s waiting for site data in {}", cli.timeout_secs, cli.data.display()))?
}

pub async fn execute(cli: &Cli) -> Result<Value> {
    let archive = Archive::open_dir(&cli.data, cli.options()).await?;

    match &cli.command {
        Command::Page { start, length, sort, ascending, search } => {
            let mut request = PageRequest::new(*start, *length);
            if let Some(sort) = sort {
                request = request.sorted_by(*sort, *ascending);
            }
            if let Some(text) = search {
                archive
                    .build_search_index(|done, total| tracing::debug!(done, total, "loading search index"))
                    .await?;
                request = request.searching(text.clone());
            }
            let page = archive.get_page(&request).await?;
            tracing::info!(
                total = page.total_count,
                filtered = page.filtered_count,
                rows = page.rows.len(),
                "page ready"
            );
            Ok(serde_json::to_value(page)?)
        }
        Command::Message { id } => {
            let message = archive
                .message(*id)
                .await?
                .ok_or_else(|| anyhow!("message {id} not found"))?;
            Ok(serde_json::to_value(message)?)
        }
    }
}
