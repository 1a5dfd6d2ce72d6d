use archive_core::tokenizer::{plain_excerpt, strip_markup, terms, tokenize};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The café's menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    assert!(words.iter().any(|w| w.starts_with("caf")));
}

#[test]
fn it_keeps_common_words() {
    let words = terms("The quick brown fox and the lazy dog");
    assert_eq!(words.len(), 8);
    assert_eq!(words[0], "the");
    assert!(words.contains(&"and".to_string()));
}

#[test]
fn markup_becomes_plain_text() {
    let text = strip_markup("<div>Hello<br/>world &lt;3</div>");
    assert_eq!(terms(&text), terms("hello world 3"));
}

#[test]
fn excerpt_skips_quoted_reply_when_enough_remains() {
    let own = "This is my own fairly long answer to the question you asked earlier.";
    let html = format!("<p>{own}</p><blockquote>quoted original text</blockquote>");
    assert_eq!(plain_excerpt(&html, 300), own);
}

#[test]
fn excerpt_skips_nested_quotes_entirely() {
    let own = "This is my own fairly long answer to the question you asked earlier.";
    let html = format!(
        "<p>{own}</p><blockquote>outer start<blockquote>inner</blockquote>outer tail</blockquote><p>Thanks</p>"
    );
    assert_eq!(plain_excerpt(&html, 300), format!("{own} Thanks"));
}

#[test]
fn excerpt_keeps_quote_when_reply_is_short() {
    let html = "<p>+1</p><blockquote>the original proposal</blockquote>";
    assert_eq!(plain_excerpt(html, 300), "+1 the original proposal");
}

#[test]
fn excerpt_is_truncated_with_ellipsis() {
    assert_eq!(plain_excerpt("<p>abcdefghij</p>", 4), "abcd...");
    assert_eq!(plain_excerpt("<p>abcd</p>", 4), "abcd");
}
