//! Skipdelta: an append-only revision store built on skip-delta chains.
//!
//! Revision `n` is stored as a delta against revision `n & (n - 1)`, so any
//! revision is rebuilt from at most ceil(log2(n + 1)) decodes. Decoded
//! revisions are memoized in a bounded LRU cache that shares in-flight work
//! between concurrent readers.
//!
//! The crate provides:
//! - A generic n-ary LRU memoizer (`memo`)
//! - The revision store and its base-selection rule (`chain`)
//! - The codec boundary plus an in-process delta format (`codec`)
//! - JSON snapshots (`snapshot`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use skipdelta::chain::{Revisions, StoreOptions};
//! use skipdelta::codec::DeltaCodec;
//!
//! # async fn demo() -> Result<(), skipdelta::chain::StoreError> {
//! let mut revs = Revisions::new(DeltaCodec::default(), StoreOptions::default());
//! revs.push(&b"hello old world"[..]).await?;
//! revs.push(&b"hello new world"[..]).await?;
//! assert_eq!(revs.get(0).await?, "hello old world");
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod codec;
pub mod memo;
pub mod snapshot;

#[cfg(feature = "cli")]
pub mod cli;

pub use chain::{RevisionCursor, RevisionEntry, RevisionId, Revisions, StoreError, StoreOptions};
pub use codec::{Codec, CodecError, DeltaCodec, DeltaOptions, WorkerCodec};
pub use memo::{LruMemo, Memoized};
pub use snapshot::{Snapshot, SnapshotError, TextEncoding};
