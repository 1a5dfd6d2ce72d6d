use serde::{Deserialize, Deserializer, Serialize};

pub type RecordId = u32;

/// One row of `data.index.js`, as the site generator writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRow {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
}

// Compact record tables fill absent columns with null.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl IndexRow {
    /// Name shown for the author: `name (profile)` when both are known and
    /// differ, otherwise whichever is present, then the sender address.
    pub fn display_author(&self) -> String {
        match (self.author_name.is_empty(), self.profile.is_empty()) {
            (false, false) if self.author_name == self.profile => self.author_name.clone(),
            (false, false) => format!("{} ({})", self.author_name, self.profile),
            (false, true) => self.author_name.clone(),
            (true, false) => self.profile.clone(),
            (true, true) if !self.from.is_empty() => self.from.clone(),
            (true, true) => "???".to_string(),
        }
    }
}

/// A corpus record as held by the indexed collection. Bodies live in the
/// paged message files and are joined on demand into a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub subject: String,
    pub author: String,
    pub timestamp: i64,
    /// Previous record in corpus order, 0 if none.
    pub prev_in_sequence: RecordId,
    /// Next record in corpus order, 0 if none.
    pub next_in_sequence: RecordId,
}

impl Record {
    /// Convert rows (in corpus order) into records, linking each to its
    /// neighbours.
    pub fn from_rows(rows: Vec<IndexRow>) -> Vec<Record> {
        let ids: Vec<RecordId> = rows.iter().map(|r| r.id).collect();
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| Record {
                id: row.id,
                author: row.display_author(),
                subject: row.subject,
                timestamp: row.timestamp,
                prev_in_sequence: if i == 0 { 0 } else { ids[i - 1] },
                next_in_sequence: ids.get(i + 1).copied().unwrap_or(0),
            })
            .collect()
    }
}

/// One entry of a `data.messageData-{start}-{end}.js` page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_body: String,
}

/// A record joined with its body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(flatten)]
    pub record: Record,
    pub message_body: String,
}
