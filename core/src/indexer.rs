//! Incremental search indexing.
//!
//! The indexer walks record ids `1..=last_id` in fixed-size batches,
//! yielding to the scheduler between batches so page requests can interleave.
//! Progress is the pair `(last_processed_id, last_known_max_id)`; indexing is
//! finished once they are equal. The finished index is persisted under the
//! corpus stamp and restored on the next start if the stamp still matches.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{CorpusStamp, EngineConfig};
use crate::error::{ArchiveError, Result};
use crate::index::{InvertedIndex, SearchDocument, SearchHit};
use crate::persist::IndexStore;
use crate::query::parse_query;
use crate::record::RecordId;
use crate::tokenizer::strip_markup;

/// Supplies the documents to index.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Highest record id of the corpus.
    fn last_id(&self) -> Option<RecordId>;

    /// The document for `id` with its raw (markup) body, or `None` if the
    /// record or its body is absent.
    async fn document(&self, id: RecordId) -> Result<Option<SearchDocument>>;
}

#[async_trait]
impl<T: DocumentSource + ?Sized> DocumentSource for Arc<T> {
    fn last_id(&self) -> Option<RecordId> {
        (**self).last_id()
    }

    async fn document(&self, id: RecordId) -> Result<Option<SearchDocument>> {
        (**self).document(id).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingProgress {
    pub last_processed_id: RecordId,
    pub last_known_max_id: Option<RecordId>,
}

impl IndexingProgress {
    pub fn is_finished(&self) -> bool {
        self.last_known_max_id == Some(self.last_processed_id)
    }

    /// Fraction in `[0, 1]`; 0 while the target is unknown.
    pub fn fraction(&self) -> f64 {
        match self.last_known_max_id {
            None => 0.0,
            Some(0) => 1.0,
            Some(max) => f64::from(self.last_processed_id.min(max)) / f64::from(max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    Restoring,
    Building,
    Complete,
}

/// A shipped, fully built index as written by the offline generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltIndex {
    pub stamp: CorpusStamp,
    pub last_id: RecordId,
    pub built_at: String,
    pub index: InvertedIndex,
}

/// Result of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids looked at in this batch.
    pub attempted: usize,
    /// Ids that were present and added.
    pub indexed: usize,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub batch_size: usize,
    pub checkpoint_every: usize,
    pub expand_prefixes: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for IndexerConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            batch_size: cfg.batch_size.max(1),
            checkpoint_every: cfg.checkpoint_every,
            expand_prefixes: cfg.expand_prefixes,
        }
    }
}

struct Shared {
    index: InvertedIndex,
    progress: IndexingProgress,
    state: IndexerState,
}

/// Read side of an indexer: progress and search.
#[derive(Clone)]
pub struct SearchHandle {
    shared: Arc<RwLock<Shared>>,
    expand_prefixes: bool,
}

impl SearchHandle {
    pub fn finished_loading(&self) -> bool {
        self.shared.read().progress.is_finished()
    }

    pub fn loading_progress(&self) -> f64 {
        self.shared.read().progress.fraction()
    }

    pub fn progress(&self) -> IndexingProgress {
        self.shared.read().progress
    }

    pub fn state(&self) -> IndexerState {
        self.shared.read().state
    }

    pub fn num_docs(&self) -> u32 {
        self.shared.read().index.num_docs()
    }

    /// Ranked matches for `query`. Refused until indexing has finished.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let shared = self.shared.read();
        if !shared.progress.is_finished() {
            return Err(ArchiveError::SearchNotReady {
                processed: shared.progress.last_processed_id,
                target: shared.progress.last_known_max_id,
            });
        }
        let groups = parse_query(query);
        Ok(shared.index.search(&groups, self.expand_prefixes))
    }
}

pub struct IncrementalIndexer<S> {
    source: S,
    store: Option<IndexStore>,
    stamp: CorpusStamp,
    config: IndexerConfig,
    shared: Arc<RwLock<Shared>>,
    batches_since_checkpoint: AtomicUsize,
    running: tokio::sync::Mutex<()>,
}

impl<S: DocumentSource> IncrementalIndexer<S> {
    /// Restore the persisted index for `stamp` or start cold.
    pub fn open(source: S, store: Option<IndexStore>, stamp: CorpusStamp, config: IndexerConfig) -> Self {
        let shared = Arc::new(RwLock::new(Shared {
            index: InvertedIndex::new(),
            progress: IndexingProgress::default(),
            state: IndexerState::Restoring,
        }));
        let max_id = source.last_id().unwrap_or(0);

        let restored = match store.as_ref().map(|s| s.load(&stamp)) {
            Some(Ok(Some((index, last)))) if last <= max_id => Some((index, last)),
            Some(Ok(Some((_, last)))) => {
                tracing::warn!(last_processed = last, max_id, "persisted progress is past the corpus end; rebuilding");
                None
            }
            Some(Ok(None)) | None => None,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "discarding unreadable persisted index");
                None
            }
        };

        {
            let mut s = shared.write();
            if let Some((index, last)) = restored {
                tracing::info!(stamp = %stamp, last_processed = last, docs = index.num_docs(), "search index restored");
                s.index = index;
                s.progress.last_processed_id = last;
            }
            s.progress.last_known_max_id = Some(max_id);
            s.state = if s.progress.is_finished() { IndexerState::Complete } else { IndexerState::Building };
        }

        Self {
            source,
            store,
            stamp,
            config,
            shared,
            batches_since_checkpoint: AtomicUsize::new(0),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn handle(&self) -> SearchHandle {
        SearchHandle {
            shared: self.shared.clone(),
            expand_prefixes: self.config.expand_prefixes,
        }
    }

    pub fn stamp(&self) -> &CorpusStamp {
        &self.stamp
    }

    pub fn progress(&self) -> IndexingProgress {
        self.shared.read().progress
    }

    pub fn state(&self) -> IndexerState {
        self.shared.read().state
    }

    pub fn finished_loading(&self) -> bool {
        self.handle().finished_loading()
    }

    pub fn loading_progress(&self) -> f64 {
        self.handle().loading_progress()
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.handle().search(query)
    }

    /// Index the next batch of ids.
    pub async fn step_batch(&self) -> Result<BatchOutcome> {
        let _running = self.running.lock().await;

        let (first, last) = {
            let s = self.shared.read();
            let max = s.progress.last_known_max_id.unwrap_or(0);
            if s.progress.is_finished() {
                return Ok(BatchOutcome { attempted: 0, indexed: 0, finished: true });
            }
            let first = s.progress.last_processed_id + 1;
            let last = s
                .progress
                .last_processed_id
                .saturating_add(self.config.batch_size as RecordId)
                .min(max);
            (first, last)
        };

        let mut docs = Vec::new();
        for id in first..=last {
            match self.source.document(id).await? {
                Some(mut doc) => {
                    doc.body = strip_markup(&doc.body);
                    docs.push(doc);
                }
                None => tracing::warn!(id, "record missing from corpus; marked processed"),
            }
        }

        let finished = {
            let mut s = self.shared.write();
            for doc in &docs {
                s.index.add_document(doc);
            }
            s.progress.last_processed_id = last;
            if s.progress.is_finished() {
                s.state = IndexerState::Complete;
            }
            s.progress.is_finished()
        };
        tracing::debug!(first, last, indexed = docs.len(), "indexed batch");

        if finished {
            tracing::info!(stamp = %self.stamp, docs = self.handle().num_docs(), "search index complete");
            self.persist();
        } else if self.config.checkpoint_every > 0 {
            let batches = self.batches_since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1;
            if batches >= self.config.checkpoint_every {
                self.batches_since_checkpoint.store(0, Ordering::Relaxed);
                self.persist();
            }
        }

        Ok(BatchOutcome {
            attempted: (last - first + 1) as usize,
            indexed: docs.len(),
            finished,
        })
    }

    /// Run batches until every id was processed, yielding after each batch
    /// that indexed something.
    pub async fn run_to_completion(&self) -> Result<()> {
        loop {
            let outcome = self.step_batch().await?;
            if outcome.finished {
                return Ok(());
            }
            if outcome.indexed > 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Persist the current index and progress now.
    pub fn checkpoint(&self) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let s = self.shared.read();
        store.save(&self.stamp, &s.index, s.progress.last_processed_id)
    }

    fn persist(&self) {
        if let Err(e) = self.checkpoint() {
            tracing::error!(error = %e, "failed to persist search index");
        }
    }

    /// Take over a shipped index built for the same stamp. Returns false if
    /// it was built for another corpus version.
    pub fn adopt_prebuilt(&self, prebuilt: PrebuiltIndex) -> bool {
        if prebuilt.stamp != self.stamp {
            tracing::warn!(prebuilt = %prebuilt.stamp, current = %self.stamp, "ignoring pre-built index for another corpus version");
            return false;
        }
        let finished = {
            let mut s = self.shared.write();
            let max = s.progress.last_known_max_id.unwrap_or(0);
            s.index = prebuilt.index;
            s.progress.last_processed_id = prebuilt.last_id.min(max);
            s.state = if s.progress.is_finished() { IndexerState::Complete } else { IndexerState::Building };
            s.progress.is_finished()
        };
        tracing::info!(built_at = %prebuilt.built_at, finished, "pre-built search index adopted");
        if finished {
            self.persist();
        }
        true
    }

    /// Snapshot of the current index for shipping.
    pub fn prebuilt(&self, built_at: String) -> PrebuiltIndex {
        let s = self.shared.read();
        PrebuiltIndex {
            stamp: self.stamp.clone(),
            last_id: s.progress.last_processed_id,
            built_at,
            index: s.index.clone(),
        }
    }
}
