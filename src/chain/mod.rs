// Skip-delta revision chain.
//
// - `base`  — base selection (`n & (n - 1)`) and chain depth
// - `entry` — revision ids and stored entries
// - `store` — the `Revisions` store: push, get, memoized reconstruction
// - `iter`  — lazy iteration (`Revisions::stream`, `RevisionCursor`)

pub mod base;
pub mod entry;
pub mod iter;
pub mod store;

pub use base::{base_chain, chain_depth, delta_base};
pub use entry::{RevisionEntry, RevisionId};
pub use iter::RevisionCursor;
pub use store::{DEFAULT_CACHE_SIZE, Revisions, StoreError, StoreOptions, StoreStats};
