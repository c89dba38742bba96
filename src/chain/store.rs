// Skip-delta revision store.
//
// Entries live in push order; the id index maps stable ids back to
// positions so parents resolve independently of array order. Decoded
// plaintexts are memoized per entry id as shared futures:
//
//   get(i) -> plan (sync, under the cache lock) -> await (lock released)
//
// Planning walks from the requested entry towards the root until it meets a
// root or an ancestor that is already cached, then creates the missing decode
// futures nearest-the-root first. Each future awaits its parent's future, so
// a chain of any length is reconstructed without recursion, and two readers
// needing the same ancestor await the same decode.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};
use log::{debug, trace};
use parking_lot::Mutex;

use super::base::delta_base;
use super::entry::{RevisionEntry, RevisionId};
use crate::codec::{Codec, CodecError};
use crate::memo::LruMemo;
use crate::snapshot::TextEncoding;

/// Default number of decoded revisions kept per store.
pub const DEFAULT_CACHE_SIZE: usize = 20;

/// A decode that may still be running. Cloning shares the computation.
pub(crate) type SharedDecode = Shared<BoxFuture<'static, Result<Bytes, StoreError>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("revision index {index} out of range (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("broken chain: revision {id} refers to missing parent {parent}")]
    BrokenChain { id: RevisionId, parent: RevisionId },
    #[error("revision ids exhausted")]
    IdsExhausted,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How many decoded revisions the memo cache keeps.
    pub cache_size: usize,
    /// Text encoding used for `data` when writing snapshots.
    pub snapshot_encoding: TextEncoding,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            snapshot_encoding: TextEncoding::Base64,
        }
    }
}

/// Summary counters for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub revisions: usize,
    pub roots: usize,
    /// Bytes held by entries (root content plus deltas).
    pub stored_bytes: usize,
    /// Decoded revisions currently in the memo cache.
    pub cached: usize,
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// Append-only sequence of revisions stored as skip-deltas.
///
/// Writes take `&mut self`, so pushes are serialized against each other and
/// against reads. Reads take `&self` and may run concurrently; they share
/// in-flight decodes through the memo cache.
pub struct Revisions<C> {
    entries: Vec<RevisionEntry>,
    ids: HashMap<RevisionId, usize>,
    next_id: u64,
    codec: Arc<C>,
    cache: Mutex<LruMemo<RevisionId, SharedDecode>>,
    cache_size: Arc<AtomicUsize>,
    snapshot_encoding: TextEncoding,
}

/// Outcome of planning a reconstruction.
enum Plan {
    Ready(Bytes),
    Pending(SharedDecode),
}

impl<C: Codec + 'static> Revisions<C> {
    /// Create an empty store.
    pub fn new(codec: C, options: StoreOptions) -> Self {
        Self::with_codec(Arc::new(codec), options)
    }

    /// Create an empty store around a shared codec.
    pub fn with_codec(codec: Arc<C>, options: StoreOptions) -> Self {
        let cache_size = Arc::new(AtomicUsize::new(options.cache_size));
        let limit = cache_size.clone();
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
            next_id: 0,
            codec,
            cache: Mutex::new(LruMemo::new(move || limit.load(Ordering::Relaxed))),
            cache_size,
            snapshot_encoding: options.snapshot_encoding,
        }
    }

    /// Rebuild a store from already validated entries.
    pub(crate) fn from_parts(
        entries: Vec<RevisionEntry>,
        next_id: u64,
        codec: Arc<C>,
        options: StoreOptions,
    ) -> Self {
        let mut store = Self::with_codec(codec, options);
        store.ids = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.id, index))
            .collect();
        store.entries = entries;
        store.next_id = next_id;
        store
    }

    /// Append `data` as the newest revision.
    ///
    /// The entry is only appended once the codec produced its delta; on
    /// error the store is left exactly as it was.
    pub async fn push(&mut self, data: impl Into<Bytes>) -> Result<(), StoreError> {
        let data = data.into();
        let index = self.entries.len();

        let Some(base_index) = delta_base(index) else {
            let id = self.allocate_id()?;
            debug!("push #{index}: root {id} ({} bytes)", data.len());
            self.append(RevisionEntry::root(id, data));
            return Ok(());
        };

        let base_id = self.entries[base_index].id;
        trace!("push #{index}: base #{base_index} ({base_id})");
        let base = self.get(base_index).await?;
        let delta = self.codec.encode(base, data.clone()).await?;

        let id = self.allocate_id()?;
        debug!(
            "push #{index}: {id} as {}-byte delta against {base_id} ({} bytes)",
            delta.len(),
            data.len()
        );
        self.append(RevisionEntry::delta(id, delta, base_id));

        // The plaintext is already known; later reads must not decode it.
        let ready: SharedDecode = future::ready(Ok(data)).boxed().shared();
        self.cache.lock().write_cache(&[id], ready);
        Ok(())
    }

    /// Reconstruct the revision at `index`.
    pub async fn get(&self, index: usize) -> Result<Bytes, StoreError> {
        let pending = match self.plan(index)? {
            Plan::Ready(data) => return Ok(data),
            Plan::Pending(pending) => pending,
        };

        let result = pending.await;
        if result.is_err() {
            // Failed decodes must not be served from the cache later.
            self.cache
                .lock()
                .retain(|_, decode| !matches!(decode.peek(), Some(Err(_))));
        }
        result
    }

    /// Resolve `index` to its plaintext or to the future producing it.
    fn plan(&self, index: usize) -> Result<Plan, StoreError> {
        let entry = self.entry(index).ok_or(StoreError::IndexOutOfBounds {
            index,
            len: self.entries.len(),
        })?;
        if entry.is_root() {
            return Ok(Plan::Ready(entry.data.clone()));
        }

        let mut cache = self.cache.lock();

        // Walk up to the first root or cached ancestor. A chain longer than
        // the store itself can only be a parent cycle.
        let mut missing = Vec::new();
        let mut current = entry;
        let mut base: SharedDecode = loop {
            if current.is_root() {
                break future::ready(Ok(current.data.clone())).boxed().shared();
            }
            if let Some(cached) = cache.get(&[current.id]) {
                break cached;
            }
            if missing.len() == self.entries.len() {
                return Err(StoreError::BrokenChain {
                    id: current.id,
                    parent: current.parent.unwrap_or(current.id),
                });
            }
            missing.push(current);
            current = self.parent_of(current)?;
        };
        trace!(
            "reconstruct #{index}: {} decode(s) to schedule, {} cached",
            missing.len(),
            cache.len()
        );

        // Schedule decodes nearest-the-root first.
        for entry in missing.into_iter().rev() {
            let parent = base;
            let codec = self.codec.clone();
            let delta = entry.data.clone();
            base = cache.get_or_insert_with(&[entry.id], move || {
                async move {
                    let plaintext = parent.await?;
                    Ok(codec.decode(plaintext, delta).await?)
                }
                .boxed()
                .shared()
            });
        }
        Ok(Plan::Pending(base))
    }

    fn parent_of(&self, entry: &RevisionEntry) -> Result<&RevisionEntry, StoreError> {
        entry
            .parent
            .and_then(|parent| self.ids.get(&parent))
            .map(|&index| &self.entries[index])
            .ok_or(StoreError::BrokenChain {
                id: entry.id,
                parent: entry.parent.unwrap_or(entry.id),
            })
    }

    fn allocate_id(&mut self) -> Result<RevisionId, StoreError> {
        let id = RevisionId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        Ok(id)
    }

    fn append(&mut self, entry: RevisionEntry) {
        self.ids.insert(entry.id, self.entries.len());
        self.entries.push(entry);
    }
}

impl<C> Revisions<C> {
    /// Number of revisions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in revision order.
    pub fn entries(&self) -> &[RevisionEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&RevisionEntry> {
        self.entries.get(index)
    }

    /// Position of the revision with `id`.
    pub fn position(&self, id: RevisionId) -> Option<usize> {
        self.ids.get(&id).copied()
    }

    /// Index of the entry the revision at `index` was delta-encoded against.
    ///
    /// `None` for roots, out-of-range indices and unresolvable parents.
    pub fn base_index(&self, index: usize) -> Option<usize> {
        self.entry(index)?.parent.and_then(|id| self.position(id))
    }

    /// Number of decodes needed to reconstruct `index` with a cold cache.
    ///
    /// `None` when the chain is broken or loops back on itself.
    pub fn depth(&self, index: usize) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.entry(index)?;
        while let Some(parent) = current.parent {
            if depth == self.entries.len() {
                return None;
            }
            current = self.entry(self.position(parent)?)?;
            depth += 1;
        }
        Some(depth)
    }

    /// The id the next pushed revision will receive.
    pub fn next_id(&self) -> RevisionId {
        RevisionId(self.next_id)
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size.load(Ordering::Relaxed)
    }

    /// Change the cache bound. Takes effect on the next cache access.
    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size, Ordering::Relaxed);
    }

    /// Number of decoded revisions currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every cached plaintext.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn snapshot_encoding(&self) -> TextEncoding {
        self.snapshot_encoding
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            revisions: self.entries.len(),
            roots: self.entries.iter().filter(|e| e.is_root()).count(),
            stored_bytes: self.entries.iter().map(|e| e.data.len()).sum(),
            cached: self.cached_len(),
        }
    }
}

impl<C> fmt::Debug for Revisions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revisions")
            .field("len", &self.entries.len())
            .field("next_id", &self.next_id)
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
