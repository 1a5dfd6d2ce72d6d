use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").expect("valid regex");
    static ref BLOCKQUOTE_TAG_RE: Regex = Regex::new(r"(?i)<(/?)blockquote\b[^>]*>").expect("valid regex");
    static ref ENTITY_RE: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Excerpts that drop quoted replies must keep at least this many characters,
/// otherwise the quotes are left in.
const MIN_UNQUOTED_EXCERPT: usize = 50;

/// Tokenize text into (term, position) using NFKC normalization, lowercase and stemming.
/// Positions count every word, so consecutive words have consecutive positions.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    WORD_RE
        .find_iter(&normalized)
        .enumerate()
        .map(|(pos, mat)| (STEMMER.stem(mat.as_str()).to_string(), pos))
        .collect()
}

/// Terms only, in order.
pub fn terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|(t, _)| t).collect()
}

/// Replace every tag with a space and decode character references.
pub fn strip_markup(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    decode_entities(&without_tags)
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Remove every blockquote with its contents, nested ones included. An
/// unclosed blockquote runs to the end of the text.
fn strip_blockquotes(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut depth = 0usize;
    let mut last = 0;
    for caps in BLOCKQUOTE_TAG_RE.captures_iter(html) {
        let Some(tag) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();
        if depth == 0 {
            out.push_str(&html[last..tag.start()]);
            out.push(' ');
        }
        if closing {
            depth = depth.saturating_sub(1);
        } else {
            depth += 1;
        }
        last = tag.end();
    }
    if depth == 0 {
        out.push_str(&html[last..]);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One-line plain-text excerpt of an HTML body, at most `max_chars` characters
/// followed by `...` when truncated. Quoted replies are dropped unless that
/// leaves almost nothing.
pub fn plain_excerpt(html: &str, max_chars: usize) -> String {
    let with_quotes = collapse_whitespace(&strip_markup(html));
    let without_quotes = collapse_whitespace(&strip_markup(&strip_blockquotes(html)));

    let text = if without_quotes.chars().count() >= MIN_UNQUOTED_EXCERPT {
        without_quotes
    } else {
        with_quotes
    };

    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
