//! Chunked object codec.
//!
//! A serialized blob is cut into fixed-size byte windows; each window is
//! compressed with zstd on its own and carried as base64 text inside a
//! [`ChunkPayload`] that also names its position and the total part count.
//! Parts must be reassembled strictly in order `0..total`; the first part is
//! enough to learn the total.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// zstd level for chunk compression.
const COMPRESSION_LEVEL: i32 = 6;

/// File extension of a stored chunk part.
pub const CHUNK_FILE_EXT: &str = "zst.js";

/// One transportable part of a chunked blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    #[serde(alias = "chunkI")]
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// base64 of the zstd-compressed byte window.
    pub chunk_data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("chunk size must be positive")]
    InvalidChunkSize,

    #[error("chunk set is empty")]
    Empty,

    #[error("chunk {found} arrived where chunk {expected} was expected")]
    OutOfOrder { expected: usize, found: usize },

    #[error("chunk {index} claims {found} total chunks but chunk 0 claimed {expected}")]
    TotalMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("chunk {index} is beyond the declared total of {total}")]
    Excess { index: usize, total: usize },

    #[error("chunk set truncated: {received} of {total} chunks received")]
    Truncated { received: usize, total: usize },

    #[error("chunk {index} is not valid base64: {source}")]
    Base64 {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("chunk {index} could not be (de)compressed: {source}")]
    Compression {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("reassembled chunk data is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Split `text` into compressed parts of at most `chunk_bytes` input bytes.
///
/// Empty input still produces one (empty) part so that part 0 always exists.
pub fn encode(text: &str, chunk_bytes: usize) -> Result<Vec<ChunkPayload>, CodecError> {
    if chunk_bytes == 0 {
        return Err(CodecError::InvalidChunkSize);
    }

    let bytes = text.as_bytes();
    let windows: Vec<&[u8]> = if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(chunk_bytes).collect()
    };
    let total = windows.len();

    windows
        .into_iter()
        .enumerate()
        .map(|(index, window)| {
            let compressed = zstd::stream::encode_all(window, COMPRESSION_LEVEL)
                .map_err(|source| CodecError::Compression { index, source })?;
            Ok(ChunkPayload {
                chunk_index: index,
                total_chunks: total,
                chunk_data: BASE64.encode(compressed),
            })
        })
        .collect()
}

/// Serialize `value` as JSON and [`encode`] it.
pub fn encode_value<T: Serialize>(value: &T, chunk_bytes: usize) -> Result<Vec<ChunkPayload>, CodecError> {
    let text = serde_json::to_string(value)?;
    encode(&text, chunk_bytes)
}

/// Incremental reassembly of a chunk set, fed one part at a time in order.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    total: Option<usize>,
    received: usize,
    buf: Vec<u8>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total part count, known once the first part was pushed.
    pub fn total_chunks(&self) -> Option<usize> {
        self.total
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.total == Some(self.received)
    }

    /// Decompress and append the next part.
    pub fn push(&mut self, chunk: &ChunkPayload) -> Result<(), CodecError> {
        if chunk.chunk_index != self.received {
            return Err(CodecError::OutOfOrder {
                expected: self.received,
                found: chunk.chunk_index,
            });
        }

        let total = match self.total {
            None if chunk.total_chunks == 0 => return Err(CodecError::Empty),
            None => *self.total.insert(chunk.total_chunks),
            Some(total) if total != chunk.total_chunks => {
                return Err(CodecError::TotalMismatch {
                    index: chunk.chunk_index,
                    expected: total,
                    found: chunk.total_chunks,
                })
            }
            Some(total) => total,
        };
        if chunk.chunk_index >= total {
            return Err(CodecError::Excess {
                index: chunk.chunk_index,
                total,
            });
        }

        let index = chunk.chunk_index;
        let compressed = BASE64
            .decode(chunk.chunk_data.as_bytes())
            .map_err(|source| CodecError::Base64 { index, source })?;
        let window = zstd::stream::decode_all(compressed.as_slice())
            .map_err(|source| CodecError::Compression { index, source })?;
        self.buf.extend_from_slice(&window);
        self.received += 1;
        Ok(())
    }

    /// The reassembled text. Fails unless every declared part was pushed.
    pub fn finish_text(self) -> Result<String, CodecError> {
        match self.total {
            None => Err(CodecError::Empty),
            Some(total) if self.received < total => Err(CodecError::Truncated {
                received: self.received,
                total,
            }),
            Some(_) => Ok(String::from_utf8(self.buf)?),
        }
    }

    /// The reassembled text parsed as JSON.
    pub fn finish<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        let text = self.finish_text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Reassemble a complete chunk set into its text.
pub fn decode<I>(chunks: I) -> Result<String, CodecError>
where
    I: IntoIterator<Item = ChunkPayload>,
{
    let mut assembler = ChunkAssembler::new();
    for chunk in chunks {
        assembler.push(&chunk)?;
    }
    assembler.finish_text()
}

/// Reassemble a complete chunk set and parse it as JSON.
pub fn decode_value<T, I>(chunks: I) -> Result<T, CodecError>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = ChunkPayload>,
{
    let text = decode(chunks)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_by_bytes_and_tags_every_part() {
        let chunks = encode("abcdefghij", 4).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, 3);
        }
        assert_eq!(decode(chunks).unwrap(), "abcdefghij");
    }

    #[test]
    fn multibyte_text_split_mid_character_survives() {
        let text = "héllo wörld ☃☃☃";
        let chunks = encode(text, 3).unwrap();
        assert_eq!(decode(chunks).unwrap(), text);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(encode("x", 0), Err(CodecError::InvalidChunkSize)));
    }

    #[test]
    fn out_of_order_part_is_rejected() {
        let mut chunks = encode("abcdefgh", 2).unwrap();
        chunks.swap(1, 2);
        assert!(matches!(
            decode(chunks),
            Err(CodecError::OutOfOrder { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn missing_tail_is_truncation() {
        let mut chunks = encode("abcdefgh", 2).unwrap();
        chunks.pop();
        assert!(matches!(
            decode(chunks),
            Err(CodecError::Truncated { received: 3, total: 4 })
        ));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let chunks = encode("{\"a\": ", 3).unwrap();
        let res: Result<serde_json::Value, _> = decode_value(chunks);
        assert!(matches!(res, Err(CodecError::Parse(_))));
    }

    #[test]
    fn legacy_chunk_index_name_is_accepted() {
        let c: ChunkPayload =
            serde_json::from_str(r#"{"chunkI":0,"totalChunks":1,"chunkData":""}"#).unwrap();
        assert_eq!(c.chunk_index, 0);
    }
}
