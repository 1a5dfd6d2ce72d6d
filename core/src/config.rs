use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{ArchiveError, Result};

/// Opaque corpus version token. A persisted index is only valid for the stamp
/// it was written under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CorpusStamp(String);

impl CorpusStamp {
    pub fn new(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorpusStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// The site generator writes the stamp as a unix timestamp number; hand-written
// configs may use a string.
impl<'de> Deserialize<'de> for CorpusStamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStamp {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match RawStamp::deserialize(deserializer)? {
            RawStamp::Number(n) => CorpusStamp(n.to_string()),
            RawStamp::Text(s) => CorpusStamp(s),
        })
    }
}

/// Contents of the site's `data.config.js`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub last_message_time: Option<i64>,
    /// Number of record ids covered by each message body file.
    pub message_db_page_size: u32,
    pub cache_buster: CorpusStamp,
}

impl SiteConfig {
    pub fn stamp(&self) -> &CorpusStamp {
        &self.cache_buster
    }

    pub fn validate(&self) -> Result<()> {
        if self.message_db_page_size == 0 {
            return Err(ArchiveError::InvalidConfig("messageDbPageSize must be positive".into()));
        }
        Ok(())
    }
}

/// Runtime knobs for loading, indexing and querying.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Record ids processed per indexing batch.
    pub batch_size: usize,
    /// Message body pages kept in memory.
    pub page_cache_capacity: usize,
    /// Chunk size used when persisting the index to the local store.
    pub store_chunk_bytes: usize,
    /// Chunk size used by the offline generator for the shipped index files.
    pub file_chunk_bytes: usize,
    /// Persist a checkpoint every N batches while building; 0 persists only on completion.
    pub checkpoint_every: usize,
    /// Maximum characters in a row excerpt.
    pub excerpt_chars: usize,
    /// Let single search terms match indexed terms they prefix.
    pub expand_prefixes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            page_cache_capacity: 10,
            store_chunk_bytes: 1024 * 1024,
            file_chunk_bytes: 10 * 1024 * 1024,
            checkpoint_every: 0,
            excerpt_chars: 300,
            expand_prefixes: true,
        }
    }
}
