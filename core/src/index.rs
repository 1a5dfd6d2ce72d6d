use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::query::QueryGroup;
use crate::record::RecordId;
use crate::tokenizer::tokenize;

// BM25 parameters.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Indexed fields. Each has a fixed relevance boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Subject,
    Author,
    Body,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Author, Field::Body, Field::Subject];

    /// Author matches should vastly outweigh body and subject matches.
    pub fn boost(self) -> f32 {
        match self {
            Field::Author => 10.0,
            Field::Body => 3.0,
            Field::Subject => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Subject => "subject",
            Field::Author => "author",
            Field::Body => "body",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        match name.to_ascii_lowercase().as_str() {
            "subject" => Some(Field::Subject),
            "author" | "from" | "shortdisplayauthor" => Some(Field::Author),
            "body" | "messagebody" => Some(Field::Body),
            _ => None,
        }
    }
}

/// Plain text of one record as it enters the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub id: RecordId,
    pub subject: String,
    pub author: String,
    pub body: String,
}

impl SearchDocument {
    fn text(&self, field: Field) -> &str {
        match field {
            Field::Subject => &self.subject,
            Field::Author => &self.author,
            Field::Body => &self.body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: RecordId,
    /// Word positions of the term in the field; the term frequency is its length.
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FieldIndex {
    postings: BTreeMap<String, Vec<Posting>>, // postings sorted by doc_id
    doc_lengths: HashMap<RecordId, u32>,
    total_length: u64,
}

impl FieldIndex {
    fn add(&mut self, doc_id: RecordId, text: &str) {
        let tokens = tokenize(text);
        self.doc_lengths.insert(doc_id, tokens.len() as u32);
        self.total_length += tokens.len() as u64;

        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in tokens {
            positions.entry(term).or_default().push(pos as u32);
        }
        for (term, positions) in positions {
            let list = self.postings.entry(term).or_default();
            let at = list.partition_point(|p| p.doc_id < doc_id);
            list.insert(at, Posting { doc_id, positions });
        }
    }

    fn posting(&self, term: &str, doc_id: RecordId) -> Option<&Posting> {
        let list = self.postings.get(term)?;
        list.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| &list[i])
    }

    fn avg_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_length as f32 / self.doc_lengths.len() as f32
    }

    /// BM25 contribution of `term` appearing `tf` times in `doc_id`.
    fn score(&self, term: &str, doc_id: RecordId, tf: usize, num_docs: usize) -> f32 {
        let df = self.postings.get(term).map_or(0, Vec::len) as f32;
        let n = num_docs as f32;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        let dl = self.doc_lengths.get(&doc_id).copied().unwrap_or(0) as f32;
        let avg = self.avg_length().max(1.0);
        let tf = tf as f32;
        idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avg))
    }

    /// Indexed terms equal to `term` or starting with it, each with a weight
    /// that penalizes longer expansions.
    fn expansions<'a>(&'a self, term: &'a str) -> impl Iterator<Item = (&'a str, f32)> + 'a {
        self.postings
            .range::<str, _>((std::ops::Bound::Included(term), std::ops::Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(term))
            .map(move |(key, _)| {
                let extra = key.len() - term.len();
                let weight = if extra == 0 { 1.0 } else { 1.0 / (1.0 + (extra as f32).ln_1p()) };
                (key.as_str(), weight)
            })
    }
}

/// A ranked search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: RecordId,
    pub score: f32,
}

/// Inverted index over the subject, author and body of every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    subject: FieldIndex,
    author: FieldIndex,
    body: FieldIndex,
    num_docs: u32,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn field(&self, field: Field) -> &FieldIndex {
        match field {
            Field::Subject => &self.subject,
            Field::Author => &self.author,
            Field::Body => &self.body,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut FieldIndex {
        match field {
            Field::Subject => &mut self.subject,
            Field::Author => &mut self.author,
            Field::Body => &mut self.body,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_terms(&self) -> usize {
        Field::ALL.iter().map(|&f| self.field(f).postings.len()).sum()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        // every document gets a length entry in every field, even when empty
        self.subject.doc_lengths.contains_key(&id)
    }

    /// Add a document. Returns false if its id is already indexed.
    pub fn add_document(&mut self, doc: &SearchDocument) -> bool {
        if self.contains(doc.id) {
            return false;
        }
        for field in Field::ALL {
            self.field_mut(field).add(doc.id, doc.text(field));
        }
        self.num_docs += 1;
        true
    }

    /// Records matching every group, best first. A record's score is the sum
    /// of its per-group scores.
    pub fn search(&self, groups: &[QueryGroup], expand: bool) -> Vec<SearchHit> {
        let mut combined: Option<HashMap<RecordId, f32>> = None;
        for group in groups {
            let scores = self.score_group(group, expand);
            combined = Some(match combined {
                None => scores,
                Some(mut acc) => {
                    acc.retain(|id, total| match scores.get(id) {
                        Some(s) => {
                            *total += s;
                            true
                        }
                        None => false,
                    });
                    acc
                }
            });
            if combined.as_ref().is_some_and(HashMap::is_empty) {
                break;
            }
        }

        let mut hits: Vec<SearchHit> = combined
            .unwrap_or_default()
            .into_iter()
            .map(|(id, score)| SearchHit { id, score })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits
    }

    fn score_group(&self, group: &QueryGroup, expand: bool) -> HashMap<RecordId, f32> {
        let fields: Vec<Field> = match group.field {
            Some(f) => vec![f],
            None => Field::ALL.to_vec(),
        };
        let mut scores: HashMap<RecordId, f32> = HashMap::new();
        for field in fields {
            if group.is_phrase() {
                self.score_phrase(field, &group.terms, &mut scores);
            } else {
                self.score_term(field, &group.terms[0], expand && !group.exact, &mut scores);
            }
        }
        scores
    }

    fn score_term(&self, field: Field, term: &str, expand: bool, scores: &mut HashMap<RecordId, f32>) {
        let index = self.field(field);
        let n = self.num_docs as usize;
        let candidates: Vec<(&str, f32)> = if expand {
            index.expansions(term).collect()
        } else {
            vec![(term, 1.0)]
        };
        for (key, weight) in candidates {
            let Some(list) = index.postings.get(key) else { continue };
            for p in list {
                let s = index.score(key, p.doc_id, p.positions.len(), n);
                *scores.entry(p.doc_id).or_insert(0.0) += field.boost() * weight * s;
            }
        }
    }

    fn score_phrase(&self, field: Field, terms: &[String], scores: &mut HashMap<RecordId, f32>) {
        let index = self.field(field);
        let n = self.num_docs as usize;
        let Some(first) = index.postings.get(&terms[0]) else { return };

        for head in first {
            let rest: Option<Vec<&Posting>> = terms[1..]
                .iter()
                .map(|t| index.posting(t, head.doc_id))
                .collect();
            let Some(rest) = rest else { continue };

            let adjacent = head.positions.iter().any(|&start| {
                rest.iter()
                    .enumerate()
                    .all(|(i, p)| p.positions.binary_search(&(start + i as u32 + 1)).is_ok())
            });
            if !adjacent {
                continue;
            }

            let s: f32 = terms
                .iter()
                .zip(std::iter::once(head).chain(rest.iter().copied()))
                .map(|(t, p)| index.score(t, head.doc_id, p.positions.len(), n))
                .sum();
            *scores.entry(head.doc_id).or_insert(0.0) += field.boost() * s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn doc(id: RecordId, subject: &str, author: &str, body: &str) -> SearchDocument {
        SearchDocument { id, subject: subject.into(), author: author.into(), body: body.into() }
    }

    fn sample() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        idx.add_document(&doc(1, "Budget meeting", "Jane Doe", "The annual budget is due."));
        idx.add_document(&doc(2, "Picnic", "John Doe", "Bring the budget for snacks."));
        idx.add_document(&doc(3, "Re: budget", "Doe Jane", "no comment"));
        idx
    }

    fn ids(hits: &[SearchHit]) -> Vec<RecordId> {
        hits.iter().map(|h| h.id).collect()
    }

    #[test]
    fn duplicate_documents_are_ignored() {
        let mut idx = sample();
        assert!(!idx.add_document(&doc(1, "x", "y", "z")));
        assert_eq!(idx.num_docs(), 3);
    }

    #[test]
    fn phrase_requires_adjacency_and_order() {
        let idx = sample();
        let hits = idx.search(&parse_query(r#"author:"Jane Doe""#), true);
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn groups_are_anded() {
        let idx = sample();
        let hits = idx.search(&parse_query("budget snacks"), true);
        assert_eq!(ids(&hits), vec![2]);
        assert!(idx.search(&parse_query("budget nonexistent"), true).is_empty());
    }

    #[test]
    fn author_matches_outrank_subject_matches() {
        let mut idx = InvertedIndex::new();
        idx.add_document(&doc(1, "walrus", "someone", "text"));
        idx.add_document(&doc(2, "other", "walrus", "text"));
        let hits = idx.search(&parse_query("walrus"), false);
        assert_eq!(ids(&hits), vec![2, 1]);
    }

    #[test]
    fn prefix_expansion_only_for_unquoted_terms() {
        let idx = sample();
        assert_eq!(ids(&idx.search(&parse_query("snack"), false)), vec![2]);
        assert_eq!(ids(&idx.search(&parse_query("pic"), true)), vec![2]);
        assert!(idx.search(&parse_query("pic"), false).is_empty());
        assert!(idx.search(&parse_query(r#""pic""#), true).is_empty());
    }

    #[test]
    fn serializes_round_trip() {
        let idx = sample();
        let json = serde_json::to_string(&idx).unwrap();
        let back: InvertedIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_docs(), 3);
        assert_eq!(ids(&back.search(&parse_query("budget"), true)), ids(&idx.search(&parse_query("budget"), true)));
    }
}
