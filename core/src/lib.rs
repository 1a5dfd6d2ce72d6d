//! Data-loading, indexing and query engine for statically hosted message archives.
//!
//! A site directory holds script-style data files (`dataLoaded(...)`): the
//! site config, every index row, paged message bodies and optionally a
//! chunked pre-built search index. [`archive::Archive`] wires the pieces
//! together; each piece is usable on its own.

pub mod archive;
pub mod cache;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod persist;
pub mod query;
pub mod record;
pub mod script;
pub mod store;
pub mod tokenizer;

pub use archive::{Archive, ArchiveOptions};
pub use collection::{IndexedCollection, SortField, SortValue};
pub use config::{CorpusStamp, EngineConfig, SiteConfig};
pub use engine::{PageRequest, PageResult, PageRow, QueryEngine, SortOrder};
pub use error::{ArchiveError, Result};
pub use index::{Field, InvertedIndex, SearchDocument, SearchHit};
pub use indexer::{IncrementalIndexer, IndexingProgress, SearchHandle};
pub use record::{IndexRow, Message, MessageBody, Record, RecordId};
