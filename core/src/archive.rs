use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collection::IndexedCollection;
use crate::config::{EngineConfig, SiteConfig};
use crate::engine::{PageRequest, PageResult, QueryEngine};
use crate::error::Result;
use crate::indexer::{IncrementalIndexer, IndexerConfig, PrebuiltIndex, SearchHandle};
use crate::loader::ScriptLoader;
use crate::persist::{IndexStore, SitePaths, CONFIG_FILE, INDEX_ROWS_FILE, SEARCH_INDEX_PREFIX};
use crate::record::{IndexRow, Message, RecordId};
use crate::script::{FileScriptSource, ScriptSource};
use crate::store::MessageStore;

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Where the built search index is persisted between runs.
    pub store_path: Option<PathBuf>,
    pub engine: EngineConfig,
    /// Try the shipped `data.searchIndex` chunk set before indexing.
    pub prebuilt_index: bool,
}

/// A loaded site: its config, every record, the message store, the
/// incremental indexer and the query engine over them.
pub struct Archive {
    config: SiteConfig,
    options: ArchiveOptions,
    loader: Arc<ScriptLoader>,
    collection: Arc<IndexedCollection>,
    store: Arc<MessageStore>,
    indexer: Arc<IncrementalIndexer<Arc<MessageStore>>>,
    engine: QueryEngine<Arc<MessageStore>>,
}

impl Archive {
    /// Load the site config and every index row through `source`, then
    /// restore the persisted search index if it matches the corpus stamp.
    pub async fn open(source: Arc<dyn ScriptSource>, options: ArchiveOptions) -> Result<Self> {
        let loader = Arc::new(ScriptLoader::new(source));

        let config: SiteConfig = loader.load_as(CONFIG_FILE).await?;
        config.validate()?;
        let rows: Vec<IndexRow> = loader.load_as(INDEX_ROWS_FILE).await?;
        let collection = Arc::new(IndexedCollection::from_rows(rows)?);
        tracing::info!(group = %config.group_name, records = collection.len(), stamp = %config.stamp(), "archive opened");

        let store = Arc::new(MessageStore::new(
            loader.clone(),
            collection.clone(),
            config.message_db_page_size,
            options.engine.page_cache_capacity,
            options.engine.excerpt_chars,
        ));

        let index_store = options
            .store_path
            .as_ref()
            .map(|p| IndexStore::open(p, options.engine.store_chunk_bytes))
            .transpose()?;
        let indexer = Arc::new(IncrementalIndexer::open(
            store.clone(),
            index_store,
            config.stamp().clone(),
            IndexerConfig::from(&options.engine),
        ));
        let engine = QueryEngine::new(collection.clone(), indexer.handle(), store.clone());

        Ok(Self { config, options, loader, collection, store, indexer, engine })
    }

    /// Open a site directory on disk. The pre-built index is only tried if
    /// its first part exists, since a missing script never delivers.
    pub async fn open_dir<P: AsRef<Path>>(dir: P, mut options: ArchiveOptions) -> Result<Self> {
        let paths = SitePaths::new(dir.as_ref());
        options.prebuilt_index = options.prebuilt_index && paths.has_chunked(SEARCH_INDEX_PREFIX);
        Self::open(Arc::new(FileScriptSource::new(paths.root)), options).await
    }

    /// Bring the search index up to date: adopt the shipped index when
    /// allowed and matching, then index whatever remains.
    /// `on_chunk(done, total)` reports the shipped index download.
    pub async fn build_search_index<F>(&self, on_chunk: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        if self.options.prebuilt_index && !self.indexer.finished_loading() {
            match self.loader.load_chunked::<PrebuiltIndex, _>(SEARCH_INDEX_PREFIX, on_chunk).await {
                Ok(prebuilt) => {
                    self.indexer.adopt_prebuilt(prebuilt);
                }
                Err(e) => tracing::warn!(error = %e, "pre-built search index unusable; indexing locally"),
            }
        }
        self.indexer.run_to_completion().await
    }

    pub async fn get_page(&self, request: &PageRequest) -> Result<PageResult> {
        self.engine.get_page(request).await
    }

    pub async fn message(&self, id: RecordId) -> Result<Option<Message>> {
        self.store.message(id).await
    }

    pub fn search_handle(&self) -> SearchHandle {
        self.indexer.handle()
    }

    pub fn indexer(&self) -> &Arc<IncrementalIndexer<Arc<MessageStore>>> {
        &self.indexer
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<IndexedCollection> {
        &self.collection
    }
}
