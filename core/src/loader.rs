use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::chunk::{ChunkAssembler, ChunkPayload, CodecError, CHUNK_FILE_EXT};
use crate::error::Result;
use crate::script::{CompletionHook, ScriptChannel, ScriptSource};

/// Path of part `index` of the chunk set stored under `prefix`.
pub fn chunk_path(prefix: &str, index: usize) -> String {
    format!("{prefix}-part{index}.{CHUNK_FILE_EXT}")
}

/// Loads data scripts one at a time over a single [`ScriptChannel`].
///
/// Requests issued while a load is in flight wait their turn in submission
/// order. There is no timeout: a script that never delivers stalls every load
/// queued behind it.
pub struct ScriptLoader {
    channel: Arc<ScriptChannel>,
    source: Arc<dyn ScriptSource>,
}

impl ScriptLoader {
    pub fn new(source: Arc<dyn ScriptSource>) -> Self {
        Self {
            channel: Arc::new(ScriptChannel::new()),
            source,
        }
    }

    pub fn channel(&self) -> &Arc<ScriptChannel> {
        &self.channel
    }

    pub async fn load(&self, path: &str) -> Result<Value> {
        if let Some(current) = self.channel.pending_path() {
            tracing::debug!(path, waiting_on = %current, "queueing script load");
        }
        let delivery = self.channel.begin(path).await?;
        tracing::debug!(path, "loading script");
        self.source.invoke(path, CompletionHook::new(self.channel.clone()));
        Ok(delivery.next_delivery().await?)
    }

    pub async fn load_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.load(path).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Load and decode the chunk set stored under `prefix`.
    ///
    /// `progress(done, total)` is called after every fetch, every
    /// decompression and the final parse; `total` is `2 * chunks + 1`.
    pub async fn load_chunked<T, F>(&self, prefix: &str, mut progress: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut(usize, usize),
    {
        let first = self.load_chunk(prefix, 0).await?;
        let steps = 2 * first.total_chunks + 1;
        progress(1, steps);

        let mut assembler = ChunkAssembler::new();
        assembler.push(&first)?;
        progress(2, steps);

        for index in 1..first.total_chunks {
            let chunk = self.load_chunk(prefix, index).await?;
            progress(2 * index + 1, steps);
            assembler.push(&chunk)?;
            progress(2 * index + 2, steps);
        }

        let value = assembler.finish()?;
        progress(steps, steps);
        tracing::info!(prefix, chunks = first.total_chunks, "chunked object loaded");
        Ok(value)
    }

    async fn load_chunk(&self, prefix: &str, index: usize) -> Result<ChunkPayload> {
        let value = self.load(&chunk_path(prefix, index)).await?;
        Ok(serde_json::from_value(value).map_err(CodecError::Parse)?)
    }
}
