use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::record::{MessageBody, RecordId};

/// The `[start, end)` id range covered by one message body file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRange {
    pub start: RecordId,
    pub end: RecordId,
}

impl PageRange {
    /// The page holding `id` when pages span `page_size` ids. The last page
    /// ends at `RecordId::MAX`.
    pub fn containing(id: RecordId, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        let start = (id / page_size) * page_size;
        Self {
            start,
            end: start.saturating_add(page_size),
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        (self.start..self.end).contains(&id)
    }

    pub fn file_name(&self) -> String {
        format!("data.messageData-{}-{}.js", self.start, self.end)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parsed contents of one message body file.
#[derive(Debug, Default)]
pub struct RecordPage {
    bodies: Vec<MessageBody>,
    by_id: HashMap<RecordId, usize>,
}

impl RecordPage {
    pub fn new(bodies: Vec<MessageBody>) -> Self {
        let by_id = bodies.iter().enumerate().map(|(i, b)| (b.id, i)).collect();
        Self { bodies, by_id }
    }

    pub fn body(&self, id: RecordId) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.bodies[i].message_body.as_str())
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Bounded memoizing cache; the least recently accessed entry is evicted
/// once capacity is exceeded. Concurrent misses for one key share a single
/// load. Failed loads are not cached.
pub struct PageCache<K, V> {
    state: Mutex<CacheState<K, V>>,
}

struct CacheState<K, V> {
    entries: LruCache<K, Arc<V>>,
    in_flight: HashMap<K, Arc<OnceCell<Arc<V>>>>,
}

impl<K, V> PageCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Cached value for `key`, or the result of `loader`, which is then cached.
    /// While a load for `key` is pending, other callers wait for it instead of
    /// running their own loader.
    pub async fn get<F, Fut>(&self, key: K, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = {
            let mut state = self.state.lock();
            if let Some(hit) = state.entries.get(&key) {
                return Ok(hit.clone());
            }
            state.in_flight.entry(key.clone()).or_default().clone()
        };

        let loaded = cell.get_or_try_init(|| async { loader().await.map(Arc::new) }).await;

        let mut state = self.state.lock();
        if state.in_flight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            state.in_flight.remove(&key);
        }
        let value = loaded?.clone();
        if !state.entries.contains(&key) {
            if let Some((old, _)) = state.entries.push(key.clone(), value.clone()) {
                tracing::debug!(evicted = ?old, "evicting page from cache");
            }
        }
        Ok(value)
    }

    /// Whether `key` is cached; does not refresh its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }
}
