// Codec service boundary.
//
// The revision store only sees the async `Codec` trait. Implementations:
//
// - `DeltaCodec`  — runs the `delta` format on the calling task
// - `WorkerCodec` — ships requests to a dedicated codec thread
//
// # Modules
//
// - `varint`  — base-128 big-endian integers
// - `matcher` — rolling-hash match finder producing ADD/COPY/RUN ops
// - `delta`   — the in-memory delta format (header + ops + Adler-32)
// - `worker`  — thread-backed transport with per-request reply channels

pub mod delta;
pub mod matcher;
pub mod varint;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use delta::{DELTA_MAGIC, DeltaFlags, DeltaHeader, DeltaOptions};
pub use worker::WorkerCodec;

/// Errors raised by a codec or by the transport in front of it.
///
/// `Clone` so one failure can be handed to every caller awaiting a shared
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid delta: {0}")]
    InvalidDelta(String),
    #[error("delta expects a {expected}-byte base, got {actual} bytes")]
    BaseMismatch { expected: u64, actual: u64 },
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("codec worker is not running")]
    WorkerUnavailable,
    #[error("codec backend failed: {0}")]
    Backend(String),
}

/// Diff/patch service used by the revision store.
///
/// `decode(base, encode(base, target)?)` must return `target`.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Compute a delta turning `base` into `target`.
    async fn encode(&self, base: Bytes, target: Bytes) -> Result<Bytes, CodecError>;

    /// Apply `delta` to `base`.
    async fn decode(&self, base: Bytes, delta: Bytes) -> Result<Bytes, CodecError>;
}

#[async_trait]
impl<C: Codec + ?Sized> Codec for Arc<C> {
    async fn encode(&self, base: Bytes, target: Bytes) -> Result<Bytes, CodecError> {
        (**self).encode(base, target).await
    }

    async fn decode(&self, base: Bytes, delta: Bytes) -> Result<Bytes, CodecError> {
        (**self).decode(base, delta).await
    }
}

// ---------------------------------------------------------------------------
// DeltaCodec
// ---------------------------------------------------------------------------

/// In-process codec over the [`delta`] format.
#[derive(Debug, Clone, Default)]
pub struct DeltaCodec {
    pub options: DeltaOptions,
}

impl DeltaCodec {
    pub fn new(options: DeltaOptions) -> Self {
        Self { options }
    }

    /// Synchronous encode, shared with the worker thread.
    pub fn encode_sync(&self, base: &[u8], target: &[u8]) -> Bytes {
        Bytes::from(delta::encode(base, target, &self.options))
    }

    /// Synchronous decode, shared with the worker thread.
    pub fn decode_sync(&self, base: &[u8], delta: &[u8]) -> Result<Bytes, CodecError> {
        delta::decode(base, delta).map(Bytes::from)
    }
}

#[async_trait]
impl Codec for DeltaCodec {
    async fn encode(&self, base: Bytes, target: Bytes) -> Result<Bytes, CodecError> {
        Ok(self.encode_sync(&base, &target))
    }

    async fn decode(&self, base: Bytes, delta: Bytes) -> Result<Bytes, CodecError> {
        self.decode_sync(&base, &delta)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delta_codec_roundtrip() {
        let codec = DeltaCodec::default();
        let base = Bytes::from_static(b"the quick brown fox jumps over the lazy dog");
        let target = Bytes::from_static(b"the quick brown cat jumps over the lazy dog!");

        let delta = codec.encode(base.clone(), target.clone()).await.unwrap();
        assert_eq!(&delta[..4], &DELTA_MAGIC);
        assert_eq!(codec.decode(base, delta).await.unwrap(), target);
    }

    #[tokio::test]
    async fn arc_codec_forwards() {
        let codec: Arc<dyn Codec> = Arc::new(DeltaCodec::new(DeltaOptions {
            level: 0,
            checksum: false,
        }));
        let delta = codec
            .encode(Bytes::new(), Bytes::from_static(b"abc"))
            .await
            .unwrap();
        let header = DeltaHeader::parse(&delta).unwrap();
        assert!(header.checksum.is_none());
        assert_eq!(
            codec.decode(Bytes::new(), delta).await.unwrap(),
            Bytes::from_static(b"abc")
        );
    }

    #[tokio::test]
    async fn decode_error_surfaces() {
        let codec = DeltaCodec::default();
        let err = codec
            .decode(Bytes::new(), Bytes::from_static(b"garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidDelta(_)));
    }
}
