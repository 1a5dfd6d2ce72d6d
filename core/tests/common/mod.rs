#![allow(dead_code)]

use archive_core::persist::{save_index_rows, save_message_pages, save_site_config, SitePaths};
use archive_core::script::{CompletionHook, ScriptSource};
use archive_core::{CorpusStamp, IndexRow, MessageBody, RecordId, SiteConfig};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Delivers stored payloads immediately; unknown paths never deliver.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn insert(&self, path: impl Into<String>, value: Value) {
        self.files.lock().insert(path.into(), value);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl ScriptSource for MemorySource {
    fn invoke(&self, path: &str, hook: CompletionHook) {
        self.requests.lock().push(path.to_string());
        if let Some(value) = self.files.lock().get(path).cloned() {
            hook.deliver(value).expect("a load is pending");
        }
    }
}

/// Records every invocation; the test decides when (and whether) to deliver.
#[derive(Default)]
pub struct ManualSource {
    calls: Mutex<Vec<(String, CompletionHook)>>,
}

impl ManualSource {
    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn deliver(&self, call: usize, value: Value) {
        let hook = self.calls.lock()[call].1.clone();
        hook.deliver(value).expect("a load is pending");
    }
}

impl ScriptSource for ManualSource {
    fn invoke(&self, path: &str, hook: CompletionHook) {
        self.calls.lock().push((path.to_string(), hook));
    }
}

pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn row(id: RecordId, subject: &str, author: &str, timestamp: i64) -> IndexRow {
    IndexRow {
        id,
        subject: subject.into(),
        author_name: author.into(),
        timestamp,
        ..Default::default()
    }
}

pub fn body(id: RecordId, html: &str) -> MessageBody {
    MessageBody { id, message_body: html.into() }
}

/// Write a complete site directory.
pub fn write_site(dir: &Path, rows: &[IndexRow], bodies: &[MessageBody], page_size: u32, stamp: &str) {
    let paths = SitePaths::new(dir);
    let config = SiteConfig {
        group_name: "test-group".into(),
        last_message_time: rows.iter().map(|r| r.timestamp).max(),
        message_db_page_size: page_size,
        cache_buster: CorpusStamp::new(stamp),
    };
    save_site_config(&paths, &config).unwrap();
    save_index_rows(&paths, rows).unwrap();
    let last = rows.iter().map(|r| r.id).max().unwrap_or(0);
    save_message_pages(&paths, bodies, page_size, last).unwrap();
}
