use serde_json::Value;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use crate::cache::PageRange;
use crate::chunk::{self, ChunkAssembler, ChunkPayload};
use crate::config::{CorpusStamp, SiteConfig};
use crate::error::Result;
use crate::index::InvertedIndex;
use crate::loader::chunk_path;
use crate::record::{IndexRow, MessageBody, RecordId};
use crate::script::{to_script, to_table_script};

pub const CONFIG_FILE: &str = "data.config.js";
pub const INDEX_ROWS_FILE: &str = "data.index.js";
pub const SEARCH_INDEX_PREFIX: &str = "data.searchIndex";

pub const STAMP_KEY: &str = "cacheBusterStamp";
pub const LAST_PROCESSED_KEY: &str = "lastProcessedId";
pub const BLOB_PART_PREFIX: &str = "indexBlob-part";

const INDEX_ROW_KEYS: [&str; 6] = ["authorName", "from", "id", "profile", "subject", "timestamp"];
const BODY_KEYS: [&str; 2] = ["id", "messageBody"];

/// Locations of the data files of a site directory.
pub struct SitePaths {
    pub root: PathBuf,
}

impl SitePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn config(&self) -> PathBuf { self.root.join(CONFIG_FILE) }
    pub fn index_rows(&self) -> PathBuf { self.root.join(INDEX_ROWS_FILE) }
    pub fn message_page(&self, range: PageRange) -> PathBuf { self.root.join(range.file_name()) }
    pub fn chunk_part(&self, prefix: &str, index: usize) -> PathBuf { self.root.join(chunk_path(prefix, index)) }
    pub fn has_chunked(&self, prefix: &str) -> bool { self.chunk_part(prefix, 0).is_file() }
}

pub fn save_site_config(paths: &SitePaths, config: &SiteConfig) -> Result<()> {
    create_dir_all(&paths.root)?;
    fs::write(paths.config(), to_script(&serde_json::to_value(config)?)?)?;
    Ok(())
}

/// Write every index row as one compact record table.
pub fn save_index_rows(paths: &SitePaths, rows: &[IndexRow]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let records: Vec<Vec<Value>> = rows
        .iter()
        .map(|r| {
            vec![
                Value::from(r.author_name.as_str()),
                Value::from(r.from.as_str()),
                Value::from(r.id),
                Value::from(r.profile.as_str()),
                Value::from(r.subject.as_str()),
                Value::from(r.timestamp),
            ]
        })
        .collect();
    fs::write(paths.index_rows(), to_table_script(&INDEX_ROW_KEYS, &records)?)?;
    Ok(())
}

/// Write bodies into one file per `page_size` ids, covering ids `0..=last_id`.
/// Pages with no bodies are still written, empty.
pub fn save_message_pages(paths: &SitePaths, bodies: &[MessageBody], page_size: u32, last_id: RecordId) -> Result<usize> {
    create_dir_all(&paths.root)?;
    let page_size = page_size.max(1);
    let mut written = 0;
    let mut start = 0;
    while start <= last_id {
        let range = PageRange::containing(start, page_size);
        let records: Vec<Vec<Value>> = bodies
            .iter()
            .filter(|b| range.contains(b.id))
            .map(|b| vec![Value::from(b.id), Value::from(b.message_body.as_str())])
            .collect();
        fs::write(paths.message_page(range), to_table_script(&BODY_KEYS, &records)?)?;
        written += 1;
        if range.end == RecordId::MAX {
            break;
        }
        start = range.end;
    }
    Ok(written)
}

/// Chunk-encode `text` and write one script per part. Returns the part count.
pub fn store_chunked(paths: &SitePaths, prefix: &str, text: &str, chunk_bytes: usize) -> Result<usize> {
    create_dir_all(&paths.root)?;
    let chunks = chunk::encode(text, chunk_bytes)?;
    for c in &chunks {
        let script = to_script(&serde_json::to_value(c)?)?;
        fs::write(paths.chunk_part(prefix, c.chunk_index), script)?;
    }
    tracing::info!(prefix, chunks = chunks.len(), bytes = text.len(), "chunked object stored");
    Ok(chunks.len())
}

/// Persisted copy of the search index, keyed by corpus stamp.
///
/// A save first removes the stamp, then rewrites the index parts and the
/// progress, and only then writes the new stamp. An interrupted save
/// therefore reads back as a stamp mismatch. Clones share the same tree.
#[derive(Clone)]
pub struct IndexStore {
    db: sled::Db,
    chunk_bytes: usize,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P, chunk_bytes: usize) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db, chunk_bytes })
    }

    /// A store that disappears when dropped.
    pub fn temporary(chunk_bytes: usize) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, chunk_bytes })
    }

    pub fn stamp(&self) -> Result<Option<CorpusStamp>> {
        Ok(self
            .db
            .get(STAMP_KEY)?
            .map(|v| CorpusStamp::new(String::from_utf8_lossy(&v).into_owned())))
    }

    pub fn last_processed_id(&self) -> Result<Option<RecordId>> {
        Ok(self
            .db
            .get(LAST_PROCESSED_KEY)?
            .and_then(|v| String::from_utf8_lossy(&v).parse().ok()))
    }

    /// The stored index and its progress if they were written under `stamp`.
    /// `Ok(None)` on a mismatch; an error if the parts are unreadable.
    pub fn load(&self, stamp: &CorpusStamp) -> Result<Option<(InvertedIndex, RecordId)>> {
        match self.stamp()? {
            Some(stored) if &stored == stamp => {}
            stored => {
                tracing::info!(stored = ?stored.as_ref().map(CorpusStamp::as_str), current = %stamp, "persisted index stamp does not match");
                return Ok(None);
            }
        }
        let Some(last_processed) = self.last_processed_id()? else {
            return Ok(None);
        };

        let mut assembler = ChunkAssembler::new();
        let mut index = 0;
        loop {
            let key = format!("{BLOB_PART_PREFIX}{index}");
            let part = self.db.get(key.as_bytes())?.ok_or(chunk::CodecError::Truncated {
                received: assembler.received(),
                total: assembler.total_chunks().unwrap_or(index + 1),
            })?;
            let payload: ChunkPayload = serde_json::from_slice(&part).map_err(chunk::CodecError::Parse)?;
            assembler.push(&payload)?;
            index += 1;
            if assembler.is_complete() {
                break;
            }
        }
        let index: InvertedIndex = assembler.finish()?;
        Ok(Some((index, last_processed)))
    }

    pub fn save(&self, stamp: &CorpusStamp, index: &InvertedIndex, last_processed: RecordId) -> Result<()> {
        let chunks = chunk::encode_value(index, self.chunk_bytes)?;

        self.db.remove(STAMP_KEY)?;
        self.db.flush()?;

        for key in self.db.scan_prefix(BLOB_PART_PREFIX).keys() {
            self.db.remove(key?)?;
        }
        for c in &chunks {
            let key = format!("{BLOB_PART_PREFIX}{}", c.chunk_index);
            self.db.insert(key.as_bytes(), serde_json::to_vec(c)?)?;
        }
        self.db.insert(LAST_PROCESSED_KEY, last_processed.to_string().as_bytes())?;
        self.db.insert(STAMP_KEY, stamp.as_str().as_bytes())?;
        self.db.flush()?;

        tracing::info!(stamp = %stamp, last_processed, parts = chunks.len(), "search index persisted");
        Ok(())
    }

    /// Drop the stamp so the next load is a miss.
    pub fn invalidate(&self) -> Result<()> {
        self.db.remove(STAMP_KEY)?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchDocument;

    fn small_index() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        for id in 1..=20 {
            idx.add_document(&SearchDocument {
                id,
                subject: format!("subject {id}"),
                author: "someone".into(),
                body: "lorem ipsum dolor sit amet ".repeat(5),
            });
        }
        idx
    }

    #[test]
    fn save_then_load_with_same_stamp() {
        let store = IndexStore::temporary(256).unwrap();
        let stamp = CorpusStamp::new("42");
        store.save(&stamp, &small_index(), 20).unwrap();

        let (idx, last) = store.load(&stamp).unwrap().expect("hit");
        assert_eq!(last, 20);
        assert_eq!(idx.num_docs(), 20);
    }

    #[test]
    fn other_stamp_is_a_miss() {
        let store = IndexStore::temporary(256).unwrap();
        store.save(&CorpusStamp::new("1"), &small_index(), 20).unwrap();
        assert!(store.load(&CorpusStamp::new("2")).unwrap().is_none());
    }

    #[test]
    fn interrupted_save_reads_as_miss() {
        let store = IndexStore::temporary(256).unwrap();
        let stamp = CorpusStamp::new("1");
        store.save(&stamp, &small_index(), 20).unwrap();
        // a save that died after clearing the stamp
        store.invalidate().unwrap();
        assert!(store.load(&stamp).unwrap().is_none());
    }

    #[test]
    fn shrinking_save_drops_stale_parts() {
        let store = IndexStore::temporary(64).unwrap();
        let stamp = CorpusStamp::new("1");
        store.save(&stamp, &small_index(), 20).unwrap();
        store.save(&stamp, &InvertedIndex::new(), 0).unwrap();
        let (idx, last) = store.load(&stamp).unwrap().expect("hit");
        assert_eq!((idx.num_docs(), last), (0, 0));
    }

    #[test]
    fn message_pages_cover_every_range() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SitePaths::new(dir.path());
        let bodies = vec![
            MessageBody { id: 1, message_body: "one".into() },
            MessageBody { id: 12, message_body: "twelve".into() },
        ];
        let written = save_message_pages(&paths, &bodies, 10, 25).unwrap();
        assert_eq!(written, 3);
        assert!(paths.message_page(PageRange::containing(15, 10)).is_file());
        assert!(paths.message_page(PageRange::containing(25, 10)).is_file());
    }
}
