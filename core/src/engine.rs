//! Paged, sorted and searched views over the collection.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::collection::{IndexedCollection, SortField, SortValue};
use crate::error::Result;
use crate::indexer::SearchHandle;
use crate::record::{Record, RecordId};

/// Produces the plain-text excerpt shown with a row.
#[async_trait]
pub trait Excerpter: Send + Sync {
    async fn excerpt(&self, id: RecordId) -> Result<Option<String>>;
}

#[async_trait]
impl<T: Excerpter + ?Sized> Excerpter for Arc<T> {
    async fn excerpt(&self, id: RecordId) -> Result<Option<String>> {
        (**self).excerpt(id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Field(SortField),
    /// Search rank; only meaningful together with search text.
    Relevance,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" | "score" => Ok(SortOrder::Relevance),
            other => other.parse().map(SortOrder::Field),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub start: usize,
    pub length: usize,
    pub sort: Option<SortOrder>,
    pub ascending: bool,
    pub search: Option<String>,
}

impl PageRequest {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length, ..Default::default() }
    }

    pub fn sorted_by(mut self, sort: SortOrder, ascending: bool) -> Self {
        self.sort = Some(sort);
        self.ascending = ascending;
        self
    }

    pub fn searching(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRow {
    #[serde(flatten)]
    pub record: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub total_count: usize,
    pub filtered_count: usize,
    pub rows: Vec<PageRow>,
    /// Sort value of the first row of every page of `length` rows.
    pub page_boundaries: Vec<SortValue>,
}

pub struct QueryEngine<E> {
    collection: Arc<IndexedCollection>,
    search: SearchHandle,
    excerpter: E,
}

impl<E: Excerpter> QueryEngine<E> {
    pub fn new(collection: Arc<IndexedCollection>, search: SearchHandle, excerpter: E) -> Self {
        Self { collection, search, excerpter }
    }

    pub fn collection(&self) -> &Arc<IndexedCollection> {
        &self.collection
    }

    pub fn search_handle(&self) -> &SearchHandle {
        &self.search
    }

    /// Answer one page request. Search text requires a finished index.
    pub async fn get_page(&self, request: &PageRequest) -> Result<PageResult> {
        let field = match request.sort {
            Some(SortOrder::Field(f)) => Some(f),
            Some(SortOrder::Relevance) | None => None,
        };

        let ordered: Vec<(&Record, Option<f32>)> = match request.search_text() {
            None => {
                let view = match field {
                    Some(f) => self.collection.sorted_view(f, !request.ascending),
                    None => self.collection.insertion_view(),
                };
                view.iter().map(|r| (r, None)).collect()
            }
            Some(text) => {
                let hits = self.search.search(text)?;
                match field {
                    // filter the field order down to the matches
                    Some(f) => {
                        let scores: HashMap<RecordId, f32> = hits.iter().map(|h| (h.id, h.score)).collect();
                        self.collection
                            .sorted_view(f, !request.ascending)
                            .iter()
                            .filter_map(|r| scores.get(&r.id).map(|&s| (r, Some(s))))
                            .collect()
                    }
                    None => hits
                        .iter()
                        .filter_map(|h| match self.collection.find_by_id(h.id) {
                            Some(r) => Some((r, Some(h.score))),
                            None => {
                                tracing::warn!(id = h.id, "search hit has no row in the collection");
                                None
                            }
                        })
                        .collect(),
                }
            }
        };

        let page_boundaries = match field {
            Some(f) if request.length > 0 => ordered
                .iter()
                .step_by(request.length)
                .map(|(r, _)| f.value(r))
                .collect(),
            _ => Vec::new(),
        };

        let mut rows = Vec::with_capacity(request.length.min(ordered.len()));
        for &(record, score) in ordered.iter().skip(request.start).take(request.length) {
            let snippet = match self.excerpter.excerpt(record.id).await {
                Ok(snippet) => snippet,
                Err(e) => {
                    tracing::warn!(id = record.id, error = %e, "no excerpt for row");
                    None
                }
            };
            rows.push(PageRow { record: record.clone(), score, snippet });
        }

        Ok(PageResult {
            total_count: self.collection.len(),
            filtered_count: ordered.len(),
            rows,
            page_boundaries,
        })
    }
}
