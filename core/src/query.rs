//! Search query syntax.
//!
//! A query is a sequence of whitespace-separated groups, all of which must
//! match:
//!
//! - `budget`: a bare term, searched in every field
//! - `"annual budget"`: a phrase, words must be adjacent
//! - `author:jane` / `author:"Jane Doe"`: a term or phrase restricted to one field
//!
//! An unknown field prefix is searched as plain text.

use crate::index::Field;
use crate::tokenizer::terms;

/// One required part of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryGroup {
    /// Field restriction; `None` searches every field.
    pub field: Option<Field>,
    /// Normalized terms; more than one means a phrase.
    pub terms: Vec<String>,
    /// Quoted groups never expand to longer terms.
    pub exact: bool,
}

impl QueryGroup {
    pub fn is_phrase(&self) -> bool {
        self.terms.len() > 1
    }
}

struct RawGroup {
    field: Option<String>,
    text: String,
    quoted: bool,
}

fn split_groups(query: &str) -> Vec<RawGroup> {
    let chars: Vec<char> = query.chars().collect();
    let n = chars.len();
    let mut groups = Vec::new();
    let mut i = 0;

    let read_quoted = |i: &mut usize| -> String {
        let start = *i;
        while *i < n && chars[*i] != '"' {
            *i += 1;
        }
        let text: String = chars[start..*i].iter().collect();
        if *i < n {
            *i += 1;
        }
        text
    };

    while i < n {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        if chars[i] == '"' {
            i += 1;
            let text = read_quoted(&mut i);
            groups.push(RawGroup { field: None, text, quoted: true });
            continue;
        }

        let start = i;
        let mut group = None;
        while i < n && !chars[i].is_whitespace() {
            if chars[i] == ':' && i + 1 < n && chars[i + 1] == '"' {
                let field: String = chars[start..i].iter().collect();
                i += 2;
                let text = read_quoted(&mut i);
                group = Some(RawGroup { field: Some(field), text, quoted: true });
                // text glued to the closing quote starts the next group
                break;
            }
            i += 1;
        }

        let group = group.unwrap_or_else(|| {
            let word: String = chars[start..i].iter().collect();
            match word.split_once(':') {
                Some((field, text)) if !text.is_empty() && Field::from_name(field).is_some() => RawGroup {
                    field: Some(field.to_string()),
                    text: text.to_string(),
                    quoted: false,
                },
                _ => RawGroup { field: None, text: word, quoted: false },
            }
        });
        groups.push(group);
    }

    groups
}

/// Parse query text into its required groups. Groups without any searchable
/// word are dropped.
pub fn parse_query(query: &str) -> Vec<QueryGroup> {
    split_groups(query)
        .into_iter()
        .filter_map(|raw| {
            let field = raw.field.as_deref().and_then(Field::from_name);
            // unknown qualifier: search the whole thing as text
            let text = match (&raw.field, field) {
                (Some(name), None) => format!("{name} {}", raw.text),
                _ => raw.text,
            };
            let terms = terms(&text);
            if terms.is_empty() {
                return None;
            }
            Some(QueryGroup {
                field,
                terms,
                exact: raw.quoted,
            })
        })
        .collect()
}
