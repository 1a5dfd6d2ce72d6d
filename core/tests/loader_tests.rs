mod common;

use archive_core::chunk::{self, CodecError};
use archive_core::loader::{chunk_path, ScriptLoader};
use archive_core::ArchiveError;
use common::{settle, ManualSource, MemorySource};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn second_load_starts_after_first_resolves() {
    let source = Arc::new(ManualSource::default());
    let loader = Arc::new(ScriptLoader::new(source.clone()));

    let l = loader.clone();
    let first = tokio::spawn(async move { l.load("a.js").await });
    let l = loader.clone();
    let second = tokio::spawn(async move { l.load("b.js").await });
    settle().await;

    assert_eq!(source.paths(), vec!["a.js"]);
    assert_eq!(loader.channel().pending_path().as_deref(), Some("a.js"));

    source.deliver(0, json!("A"));
    settle().await;
    assert_eq!(source.paths(), vec!["a.js", "b.js"]);

    source.deliver(1, json!("B"));
    assert_eq!(first.await.unwrap().unwrap(), json!("A"));
    assert_eq!(second.await.unwrap().unwrap(), json!("B"));
    assert!(loader.channel().is_idle());
}

#[tokio::test]
async fn queued_loads_run_in_submission_order() {
    let source = Arc::new(ManualSource::default());
    let loader = Arc::new(ScriptLoader::new(source.clone()));

    let mut tasks = Vec::new();
    for name in ["1.js", "2.js", "3.js"] {
        let l = loader.clone();
        tasks.push(tokio::spawn(async move { l.load(name).await }));
    }
    for i in 0..3 {
        settle().await;
        assert_eq!(source.paths().len(), i + 1);
        source.deliver(i, json!(i));
    }
    assert_eq!(source.paths(), vec!["1.js", "2.js", "3.js"]);
    for (i, t) in tasks.into_iter().enumerate() {
        assert_eq!(t.await.unwrap().unwrap(), json!(i));
    }
}

#[tokio::test]
async fn undelivered_load_stalls_the_queue() {
    let source = Arc::new(ManualSource::default());
    let loader = Arc::new(ScriptLoader::new(source.clone()));

    let l = loader.clone();
    let _stuck = tokio::spawn(async move { l.load("missing.js").await });
    let l = loader.clone();
    let behind = tokio::spawn(async move { l.load("next.js").await });
    settle().await;

    assert_eq!(source.paths(), vec!["missing.js"]);
    assert!(!behind.is_finished());
}

fn chunk_files(source: &MemorySource, prefix: &str, value: &Value, chunk_bytes: usize) -> usize {
    let chunks = chunk::encode_value(value, chunk_bytes).unwrap();
    for c in &chunks {
        source.insert(chunk_path(prefix, c.chunk_index), serde_json::to_value(c).unwrap());
    }
    chunks.len()
}

#[tokio::test]
async fn load_chunked_reports_every_step() {
    let source = Arc::new(MemorySource::default());
    let value = json!({ "words": "lorem ipsum dolor sit amet ".repeat(20) });
    let n = chunk_files(&source, "data.searchIndex", &value, 200);
    assert!(n > 2);

    let loader = ScriptLoader::new(source.clone());
    let mut steps = Vec::new();
    let loaded: Value = loader
        .load_chunked("data.searchIndex", |done, total| steps.push((done, total)))
        .await
        .unwrap();

    assert_eq!(loaded, value);
    let total = 2 * n + 1;
    let expected: Vec<(usize, usize)> = (1..=total).map(|d| (d, total)).collect();
    assert_eq!(steps, expected);
    let parts: Vec<String> = (0..n).map(|i| chunk_path("data.searchIndex", i)).collect();
    assert_eq!(source.requests(), parts);
}

#[tokio::test]
async fn malformed_chunk_text_is_a_parse_error() {
    let source = Arc::new(MemorySource::default());
    for c in chunk::encode("{\"unterminated\": [1, 2", 8).unwrap() {
        source.insert(chunk_path("broken", c.chunk_index), serde_json::to_value(&c).unwrap());
    }

    let loader = ScriptLoader::new(source);
    let err = loader.load_chunked::<Value, _>("broken", |_, _| {}).await.unwrap_err();
    assert!(matches!(err, ArchiveError::Codec(CodecError::Parse(_))), "{err}");
}
