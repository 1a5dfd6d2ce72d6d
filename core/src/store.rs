use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{PageCache, PageRange, RecordPage};
use crate::collection::IndexedCollection;
use crate::engine::Excerpter;
use crate::error::Result;
use crate::index::SearchDocument;
use crate::indexer::DocumentSource;
use crate::loader::ScriptLoader;
use crate::record::{Message, MessageBody, RecordId};
use crate::tokenizer::plain_excerpt;

/// Joins collection records with bodies from the paged message files.
/// Recently used pages are kept in a bounded cache.
pub struct MessageStore {
    loader: Arc<ScriptLoader>,
    collection: Arc<IndexedCollection>,
    pages: PageCache<PageRange, RecordPage>,
    page_size: u32,
    excerpt_chars: usize,
}

impl MessageStore {
    pub fn new(
        loader: Arc<ScriptLoader>,
        collection: Arc<IndexedCollection>,
        page_size: u32,
        cache_capacity: usize,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            loader,
            collection,
            pages: PageCache::new(cache_capacity),
            page_size,
            excerpt_chars,
        }
    }

    pub fn collection(&self) -> &Arc<IndexedCollection> {
        &self.collection
    }

    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    async fn page(&self, range: PageRange) -> Result<Arc<RecordPage>> {
        self.pages
            .get(range, || async move {
                let bodies: Vec<MessageBody> = self.loader.load_as(&range.file_name()).await?;
                tracing::debug!(%range, bodies = bodies.len(), "message page loaded");
                Ok(RecordPage::new(bodies))
            })
            .await
    }

    /// Raw body of `id`, `None` if its page has no entry for it.
    pub async fn body(&self, id: RecordId) -> Result<Option<String>> {
        let page = self.page(PageRange::containing(id, self.page_size)).await?;
        Ok(page.body(id).map(str::to_owned))
    }

    /// The record for `id` joined with its body.
    pub async fn message(&self, id: RecordId) -> Result<Option<Message>> {
        let Some(record) = self.collection.find_by_id(id) else {
            return Ok(None);
        };
        match self.body(id).await? {
            Some(message_body) => Ok(Some(Message {
                record: record.clone(),
                message_body,
            })),
            None => {
                tracing::warn!(id, "record has no body in its message page");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DocumentSource for MessageStore {
    fn last_id(&self) -> Option<RecordId> {
        self.collection.last_id()
    }

    async fn document(&self, id: RecordId) -> Result<Option<SearchDocument>> {
        Ok(self.message(id).await?.map(|m| SearchDocument {
            id,
            subject: m.record.subject,
            author: m.record.author,
            body: m.message_body,
        }))
    }
}

#[async_trait]
impl Excerpter for MessageStore {
    async fn excerpt(&self, id: RecordId) -> Result<Option<String>> {
        Ok(self
            .body(id)
            .await?
            .map(|body| plain_excerpt(&body, self.excerpt_chars)))
    }
}
