use anyhow::{bail, Context, Result};
use archive_core::indexer::PrebuiltIndex;
use archive_core::loader::ScriptLoader;
use archive_core::persist::{store_chunked, SitePaths, CONFIG_FILE, SEARCH_INDEX_PREFIX};
use archive_core::script::FileScriptSource;
use archive_core::{Archive, ArchiveOptions, EngineConfig, SiteConfig};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "archive-indexer")]
#[command(about = "Build and check the shipped search index of an archive site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every record of a site directory and write the chunked index files
    Build {
        /// Site data directory
        #[arg(long)]
        data: String,
        /// Uncompressed bytes per index part
        #[arg(long, default_value_t = EngineConfig::default().file_chunk_bytes)]
        chunk_bytes: usize,
        /// File name prefix of the index parts
        #[arg(long, default_value = SEARCH_INDEX_PREFIX)]
        prefix: String,
    },
    /// Reload the chunked index files and report what they contain
    Verify {
        /// Site data directory
        #[arg(long)]
        data: String,
        /// File name prefix of the index parts
        #[arg(long, default_value = SEARCH_INDEX_PREFIX)]
        prefix: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { data, chunk_bytes, prefix } => build_index(&data, chunk_bytes, &prefix).await,
        Commands::Verify { data, prefix } => verify_index(&data, &prefix).await,
    }
}

async fn build_index(data: &str, chunk_bytes: usize, prefix: &str) -> Result<()> {
    let archive = Archive::open_dir(data, ArchiveOptions::default())
        .await
        .with_context(|| format!("opening site {data}"))?;
    archive.build_search_index(|_, _| {}).await?;

    let built_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into());
    let prebuilt = archive.indexer().prebuilt(built_at);
    let text = serde_json::to_string(&prebuilt)?;
    let parts = store_chunked(&SitePaths::new(data), prefix, &text, chunk_bytes)?;

    tracing::info!(
        data,
        records = archive.collection().len(),
        indexed = prebuilt.index.num_docs(),
        num_terms = prebuilt.index.num_terms(),
        parts,
        "index build complete"
    );
    Ok(())
}

async fn verify_index(data: &str, prefix: &str) -> Result<()> {
    let paths = SitePaths::new(data);
    if !paths.has_chunked(prefix) {
        bail!("no index parts named {prefix}-part*.js under {data}");
    }

    let loader = ScriptLoader::new(Arc::new(FileScriptSource::new(&paths.root)));
    let config: SiteConfig = loader.load_as(CONFIG_FILE).await?;
    let prebuilt: PrebuiltIndex = loader
        .load_chunked(prefix, |done, total| tracing::debug!(done, total, "loading index"))
        .await?;

    let report = serde_json::json!({
        "stamp": prebuilt.stamp.as_str(),
        "siteStamp": config.stamp().as_str(),
        "lastId": prebuilt.last_id,
        "builtAt": prebuilt.built_at,
        "numDocs": prebuilt.index.num_docs(),
        "numTerms": prebuilt.index.num_terms(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if &prebuilt.stamp != config.stamp() {
        bail!("index was built for stamp {} but the site is at {}", prebuilt.stamp, config.stamp());
    }
    Ok(())
}
