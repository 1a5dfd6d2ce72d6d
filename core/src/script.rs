//! Script-style data files and the single-slot channel that delivers them.
//!
//! Every data file is a call `dataLoaded(<json>);` (or
//! `dataLoadedTable({"keys": [...], "records": [[...]]});` for compact record
//! tables). Running a file hands its payload to the one completion hook of a
//! [`ScriptChannel`]. The channel is either idle or loading exactly one path;
//! a second load can only begin after the first delivery returned it to idle.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

pub const DATA_LOADED: &str = "dataLoaded";
pub const DATA_LOADED_TABLE: &str = "dataLoadedTable";

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("completion hook invoked with no pending load")]
    StaleCallback,

    #[error("script channel is still loading '{0}'")]
    ChannelBusy(String),

    #[error("script channel closed before '{0}' was delivered")]
    ChannelClosed(String),

    #[error("malformed script: {0}")]
    Envelope(String),
}

enum ChannelState {
    Idle,
    Loading {
        path: String,
        hook: oneshot::Sender<Value>,
        // Released on delivery, not when the caller stops waiting.
        _turn: OwnedSemaphorePermit,
    },
}

/// Single-slot completion channel. Loads queue FIFO for their turn.
pub struct ScriptChannel {
    state: Mutex<ChannelState>,
    turn: Arc<Semaphore>,
}

impl Default for ScriptChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::Idle),
            turn: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), ChannelState::Idle)
    }

    /// Path of the load currently in flight.
    pub fn pending_path(&self) -> Option<String> {
        match &*self.state.lock() {
            ChannelState::Idle => None,
            ChannelState::Loading { path, .. } => Some(path.clone()),
        }
    }

    /// Wait for the channel's turn, then move Idle -> Loading(path).
    pub(crate) async fn begin(&self, path: &str) -> Result<Delivery, LoaderError> {
        let turn = self
            .turn
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LoaderError::ChannelClosed(path.to_string()))?;

        let (hook, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if let ChannelState::Loading { path: current, .. } = &*state {
            return Err(LoaderError::ChannelBusy(current.clone()));
        }
        *state = ChannelState::Loading {
            path: path.to_string(),
            hook,
            _turn: turn,
        };
        Ok(Delivery {
            path: path.to_string(),
            rx,
        })
    }

    /// Hand `value` to the pending load and return to Idle.
    pub fn complete(&self, value: Value) -> Result<(), LoaderError> {
        let previous = std::mem::replace(&mut *self.state.lock(), ChannelState::Idle);
        match previous {
            ChannelState::Idle => Err(LoaderError::StaleCallback),
            ChannelState::Loading { path, hook, .. } => {
                if hook.send(value).is_err() {
                    tracing::debug!(%path, "script delivered after its caller stopped waiting");
                }
                Ok(())
            }
        }
    }
}

/// The receiving end of one load.
pub struct Delivery {
    path: String,
    rx: oneshot::Receiver<Value>,
}

impl Delivery {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn next_delivery(self) -> Result<Value, LoaderError> {
        let Delivery { path, rx } = self;
        rx.await.map_err(|_| LoaderError::ChannelClosed(path))
    }
}

/// Handle a running script uses to report its payload.
#[derive(Clone)]
pub struct CompletionHook {
    channel: Arc<ScriptChannel>,
}

impl CompletionHook {
    pub fn new(channel: Arc<ScriptChannel>) -> Self {
        Self { channel }
    }

    pub fn deliver(&self, value: Value) -> Result<(), LoaderError> {
        self.channel.complete(value)
    }
}

/// Something that can run a data script by path. Implementations must not
/// call the hook more than once per invocation; a script that fails simply
/// never calls it.
pub trait ScriptSource: Send + Sync + 'static {
    fn invoke(&self, path: &str, hook: CompletionHook);
}

/// Runs scripts stored under a site directory.
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    root: PathBuf,
}

impl FileScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ScriptSource for FileScriptSource {
    fn invoke(&self, path: &str, hook: CompletionHook) {
        let file = self.root.join(path);
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(path = %file.display(), error = %e, "no runtime to run script on");
                return;
            }
        };
        handle.spawn(async move {
            let text = match tokio::fs::read_to_string(&file).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(path = %file.display(), error = %e, "script could not be read; it will never deliver");
                    return;
                }
            };
            match run_script(&text) {
                Ok(value) => {
                    if let Err(e) = hook.deliver(value) {
                        tracing::error!(path = %file.display(), error = %e, "script delivery rejected");
                    }
                }
                Err(e) => {
                    tracing::error!(path = %file.display(), error = %e, "script did not deliver data");
                }
            }
        });
    }
}

#[derive(Deserialize)]
struct RecordTable {
    keys: Vec<String>,
    records: Vec<Vec<Value>>,
}

/// Evaluate a data script and return the payload it delivers.
pub fn run_script(source: &str) -> Result<Value, LoaderError> {
    let call = source.trim().trim_end_matches(';').trim_end();
    let open = call
        .find('(')
        .ok_or_else(|| LoaderError::Envelope("missing callback invocation".into()))?;
    let callback = call[..open].trim();
    let args = call[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| LoaderError::Envelope("unterminated callback invocation".into()))?;
    let payload: Value =
        serde_json::from_str(args).map_err(|e| LoaderError::Envelope(e.to_string()))?;

    match callback {
        DATA_LOADED => Ok(payload),
        DATA_LOADED_TABLE => expand_table(payload),
        other => Err(LoaderError::Envelope(format!("unknown callback '{other}'"))),
    }
}

fn expand_table(payload: Value) -> Result<Value, LoaderError> {
    let table: RecordTable =
        serde_json::from_value(payload).map_err(|e| LoaderError::Envelope(e.to_string()))?;
    let mut rows = Vec::with_capacity(table.records.len());
    for (i, record) in table.records.into_iter().enumerate() {
        if record.len() != table.keys.len() {
            return Err(LoaderError::Envelope(format!(
                "record {i} has {} values for {} keys",
                record.len(),
                table.keys.len()
            )));
        }
        let obj: Map<String, Value> = table.keys.iter().cloned().zip(record).collect();
        rows.push(Value::Object(obj));
    }
    Ok(Value::Array(rows))
}

/// Script text delivering `value`.
pub fn to_script(value: &Value) -> Result<String, serde_json::Error> {
    Ok(format!("{DATA_LOADED}({});", serde_json::to_string(value)?))
}

/// Compact script text delivering a list of objects sharing `keys`.
pub fn to_table_script(keys: &[&str], records: &[Vec<Value>]) -> Result<String, serde_json::Error> {
    let table = serde_json::json!({ "keys": keys, "records": records });
    Ok(format!("{DATA_LOADED_TABLE}({});", serde_json::to_string(&table)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_script_round_trips() {
        let v = json!({"groupName": "g", "cacheBuster": 7});
        let text = to_script(&v).unwrap();
        assert_eq!(run_script(&text).unwrap(), v);
    }

    #[test]
    fn table_script_expands_to_objects() {
        let text = to_table_script(&["id", "subject"], &[vec![json!(1), json!("a")], vec![json!(2), json!(null)]]).unwrap();
        assert_eq!(
            run_script(&text).unwrap(),
            json!([{"id": 1, "subject": "a"}, {"id": 2, "subject": null}])
        );
    }

    #[test]
    fn malformed_scripts_are_rejected() {
        assert!(run_script("var x = 1").is_err());
        assert!(run_script("dataLoaded({\"a\":1}").is_err());
        assert!(run_script("somethingElse(1);").is_err());
        assert!(run_script("dataLoadedTable({\"keys\":[\"a\"],\"records\":[[1,2]]});").is_err());
    }

    #[test]
    fn delivery_without_pending_load_is_stale() {
        let channel = ScriptChannel::new();
        assert!(matches!(channel.complete(json!(1)), Err(LoaderError::StaleCallback)));
    }

    #[tokio::test]
    async fn second_delivery_is_stale() {
        let channel = Arc::new(ScriptChannel::new());
        let delivery = channel.begin("a.js").await.unwrap();
        assert_eq!(channel.pending_path().as_deref(), Some("a.js"));

        let hook = CompletionHook::new(channel.clone());
        hook.deliver(json!("first")).unwrap();
        assert!(channel.is_idle());
        assert!(matches!(hook.deliver(json!("again")), Err(LoaderError::StaleCallback)));
        assert_eq!(delivery.next_delivery().await.unwrap(), json!("first"));
    }
}
