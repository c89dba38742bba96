// Bounded n-ary memoizer with LRU eviction.
//
// - `tree`     — the argument tree (one map level per argument)
// - `LruMemo`  — the cache: tree + recency order + dynamic size limit
// - `Memoized` — a function bundled with its cache
//
// Values are returned by clone. Storing a `Shared` future as the value makes
// concurrent callers with equal arguments await one computation instead of
// starting their own.

pub mod tree;

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;

use log::trace;

pub use tree::{Level, Slot};

type LimitFn = Box<dyn Fn() -> usize + Send + Sync>;

// ---------------------------------------------------------------------------
// LruMemo
// ---------------------------------------------------------------------------

/// Memo cache keyed by argument tuples, bounded by a dynamic limit.
///
/// The limit provider is re-read after every access, so the bound can change
/// while the cache is live. After each access, least-recently-used entries
/// are evicted until the number of cached tuples is within the limit. A
/// limit of `0` therefore keeps nothing once the access completes.
///
/// # Panics
///
/// Every call must pass the same, non-zero number of arguments as the first
/// call. A different count is a programming error and panics.
pub struct LruMemo<K, V> {
    root: Level<K, V>,
    /// Argument paths, least recently used first.
    recency: VecDeque<Vec<K>>,
    arity: Option<usize>,
    limit: LimitFn,
}

impl<K, V> LruMemo<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose size limit is read from `limit` on every access.
    pub fn new<L>(limit: L) -> Self
    where
        L: Fn() -> usize + Send + Sync + 'static,
    {
        Self {
            root: Level::new(),
            recency: VecDeque::new(),
            arity: None,
            limit: Box::new(limit),
        }
    }

    /// Create a cache with a fixed size limit.
    pub fn bounded(limit: usize) -> Self {
        Self::new(move || limit)
    }

    /// Return the value cached for `args`, computing and caching it on a miss.
    pub fn get_or_insert_with<F>(&mut self, args: &[K], compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.fix_arity(args);

        let value = match tree::lookup(&self.root, args).cloned() {
            Some(hit) => {
                trace!("memo hit ({} cached)", self.recency.len());
                self.promote(args);
                hit
            }
            None => {
                trace!("memo miss ({} cached)", self.recency.len());
                let value = compute();
                tree::insert(&mut self.root, args, value.clone());
                self.recency.push_back(args.to_vec());
                value
            }
        };

        self.enforce_limit();
        value
    }

    /// Return the cached value for `args` and mark it most recently used.
    ///
    /// Unlike [`get_or_insert_with`](Self::get_or_insert_with) a miss stores
    /// nothing.
    pub fn get(&mut self, args: &[K]) -> Option<V> {
        self.fix_arity(args);
        let hit = tree::lookup(&self.root, args).cloned();
        if hit.is_some() {
            self.promote(args);
        }
        self.enforce_limit();
        hit
    }

    /// Prime the cache with a precomputed `value` for `args`.
    ///
    /// The entry takes part in recency and eviction exactly as if it had just
    /// been computed: it becomes the most recently used entry, replacing any
    /// value already cached for `args`.
    pub fn write_cache(&mut self, args: &[K], value: V) {
        self.fix_arity(args);
        match tree::insert(&mut self.root, args, value) {
            Some(_) => self.promote(args),
            None => self.recency.push_back(args.to_vec()),
        }
        self.enforce_limit();
    }

    /// Look at the cached value for `args` without touching recency.
    pub fn peek(&self, args: &[K]) -> Option<&V> {
        self.check_arity(args);
        tree::lookup(&self.root, args)
    }

    /// Whether a value is cached for `args`. Does not touch recency.
    pub fn contains(&self, args: &[K]) -> bool {
        self.peek(args).is_some()
    }

    /// Drop the value cached for `args`, pruning emptied levels.
    pub fn remove(&mut self, args: &[K]) -> Option<V> {
        self.check_arity(args);
        let removed = tree::remove(&mut self.root, args);
        if removed.is_some()
            && let Some(pos) = self.position(args)
        {
            self.recency.remove(pos);
        }
        removed
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[K], &V) -> bool,
    {
        let doomed: Vec<Vec<K>> = self
            .recency
            .iter()
            .filter(|path| match tree::lookup(&self.root, path.as_slice()) {
                Some(value) => !keep(path.as_slice(), value),
                None => true,
            })
            .cloned()
            .collect();

        for path in &doomed {
            tree::remove(&mut self.root, path);
        }
        if !doomed.is_empty() {
            self.recency.retain(|path| !doomed.contains(path));
            trace!("memo dropped {} entries", doomed.len());
        }
    }

    /// Drop every cached value. The arity stays fixed.
    pub fn clear(&mut self) {
        self.root.clear();
        self.recency.clear();
    }

    /// Number of cached argument tuples.
    pub fn len(&self) -> usize {
        self.recency.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }

    /// The current size limit.
    pub fn limit(&self) -> usize {
        (self.limit)()
    }

    /// Argument count fixed by the first call, if any call happened yet.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// The raw argument tree, for introspection.
    pub fn cache(&self) -> &Level<K, V> {
        &self.root
    }

    /// Cached argument paths, least recently used first.
    pub fn recency(&self) -> impl Iterator<Item = &[K]> {
        self.recency.iter().map(Vec::as_slice)
    }

    fn fix_arity(&mut self, args: &[K]) {
        self.check_arity(args);
        self.arity.get_or_insert(args.len());
    }

    fn check_arity(&self, args: &[K]) {
        assert!(
            !args.is_empty(),
            "memoized functions need at least one argument"
        );
        if let Some(arity) = self.arity {
            assert_eq!(
                arity,
                args.len(),
                "memoized functions must always be called with the same number of arguments"
            );
        }
    }

    fn position(&self, args: &[K]) -> Option<usize> {
        self.recency.iter().position(|path| path.as_slice() == args)
    }

    /// Move `args` to the most recently used end.
    fn promote(&mut self, args: &[K]) {
        if let Some(pos) = self.position(args)
            && let Some(path) = self.recency.remove(pos)
        {
            self.recency.push_back(path);
        }
    }

    fn enforce_limit(&mut self) {
        let limit = (self.limit)();
        while self.recency.len() > limit {
            let Some(path) = self.recency.pop_front() else {
                break;
            };
            tree::remove(&mut self.root, &path);
            trace!("memo evicted LRU entry (limit {limit})");
        }
    }
}

impl<K, V> fmt::Debug for LruMemo<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruMemo")
            .field("len", &self.recency.len())
            .field("arity", &self.arity)
            .field("limit", &(self.limit)())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Memoized
// ---------------------------------------------------------------------------

/// A function of one or more arguments, memoized through an [`LruMemo`].
pub struct Memoized<K, V, F> {
    memo: LruMemo<K, V>,
    compute: F,
}

impl<K, V, F> Memoized<K, V, F>
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: FnMut(&[K]) -> V,
{
    /// Wrap `compute`, bounding its cache by `limit` (re-read on every call).
    pub fn new<L>(limit: L, compute: F) -> Self
    where
        L: Fn() -> usize + Send + Sync + 'static,
    {
        Self {
            memo: LruMemo::new(limit),
            compute,
        }
    }

    /// Call the function, serving repeated arguments from the cache.
    ///
    /// # Panics
    ///
    /// Panics if `args` has a different length than the first call's.
    pub fn call(&mut self, args: &[K]) -> V {
        let Self { memo, compute } = self;
        memo.get_or_insert_with(args, || compute(args))
    }

    /// Cache `value` for `args` without calling the function.
    pub fn write_cache(&mut self, args: &[K], value: V) {
        self.memo.write_cache(args, value);
    }

    /// The raw argument tree, for introspection.
    pub fn cache(&self) -> &Level<K, V> {
        self.memo.cache()
    }

    /// The underlying cache.
    pub fn memo(&self) -> &LruMemo<K, V> {
        &self.memo
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
