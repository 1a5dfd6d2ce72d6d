use archive_core::persist::{save_index_rows, save_message_pages, save_site_config, SitePaths};
use archive_core::{CorpusStamp, IndexRow, MessageBody, SiteConfig};
use archive_viewer::{run, Cli};
use clap::Parser;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;

fn build_tiny_site(dir: &Path) {
    let paths = SitePaths::new(dir);
    let config = SiteConfig {
        group_name: "rust-users".into(),
        last_message_time: Some(1_700_000_300),
        message_db_page_size: 2,
        cache_buster: CorpusStamp::new("1700000300"),
    };
    save_site_config(&paths, &config).unwrap();

    let rows: Vec<IndexRow> = [
        (1, "Welcome", "Ann", 1_700_000_000),
        (2, "Re: Welcome", "Ben", 1_700_000_100),
        (3, "Borrow checker help", "Ann", 1_700_000_200),
        (4, "Release notes", "Cy", 1_700_000_300),
    ]
    .into_iter()
    .map(|(id, subject, author, timestamp)| IndexRow {
        id,
        subject: subject.into(),
        author_name: author.into(),
        timestamp,
        ..Default::default()
    })
    .collect();
    save_index_rows(&paths, &rows).unwrap();

    let bodies = vec![
        MessageBody { id: 1, message_body: "<p>Hello and welcome to the list.</p>".into() },
        MessageBody { id: 2, message_body: "<p>Thanks!</p>".into() },
        MessageBody { id: 3, message_body: "<p>Why does the borrow checker reject this?</p>".into() },
        MessageBody { id: 4, message_body: "<p>Version 2 is out.</p>".into() },
    ];
    save_message_pages(&paths, &bodies, 2, 4).unwrap();
}

async fn run_args(dir: &Path, args: &[&str]) -> Value {
    let mut argv = vec!["archive-viewer", "--data", dir.to_str().unwrap()];
    argv.extend_from_slice(args);
    run(&Cli::try_parse_from(argv).unwrap()).await.unwrap()
}

#[tokio::test]
async fn page_sorted_by_timestamp() {
    let dir = tempdir().unwrap();
    build_tiny_site(dir.path());

    let page = run_args(dir.path(), &["page", "--length", "2", "--sort", "timestamp"]).await;
    assert_eq!(page["totalCount"], 4);
    assert_eq!(page["filteredCount"], 4);
    let ids: Vec<u64> = page["rows"].as_array().unwrap().iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![4, 3]);
    assert_eq!(page["pageBoundaries"], serde_json::json!([1_700_000_300, 1_700_000_100]));
}

#[tokio::test]
async fn page_with_search() {
    let dir = tempdir().unwrap();
    build_tiny_site(dir.path());

    let page = run_args(dir.path(), &["page", "--search", "author:ann", "--sort", "relevance"]).await;
    assert_eq!(page["filteredCount"], 2);
    assert!(page["pageBoundaries"].as_array().unwrap().is_empty());
    assert!(page["rows"][0]["score"].as_f64().unwrap() > 0.0);

    let page = run_args(dir.path(), &["page", "--search", "borrow"]).await;
    assert_eq!(page["rows"][0]["id"], 3);
    assert_eq!(page["rows"][0]["snippet"], "Why does the borrow checker reject this?");
}

#[tokio::test]
async fn message_is_joined_with_body() {
    let dir = tempdir().unwrap();
    build_tiny_site(dir.path());

    let msg = run_args(dir.path(), &["message", "2"]).await;
    assert_eq!(msg["subject"], "Re: Welcome");
    assert_eq!(msg["messageBody"], "<p>Thanks!</p>");
    assert_eq!(msg["prevInSequence"], 1);
    assert_eq!(msg["nextInSequence"], 3);
}

#[tokio::test]
async fn unknown_message_is_an_error() {
    let dir = tempdir().unwrap();
    build_tiny_site(dir.path());

    let cli = Cli::try_parse_from(["archive-viewer", "--data", dir.path().to_str().unwrap(), "message", "99"]).unwrap();
    assert!(run(&cli).await.is_err());
}

#[tokio::test]
async fn missing_site_times_out() {
    let dir = tempdir().unwrap();
    let cli = Cli::try_parse_from([
        "archive-viewer",
        "--data",
        dir.path().to_str().unwrap(),
        "--timeout-secs",
        "1",
        "page",
    ])
    .unwrap();
    let err = run(&cli).await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
}
