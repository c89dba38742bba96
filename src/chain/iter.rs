// Lazy iteration over reconstructed revisions.
//
// Both forms re-read the store length at every step, so they behave like
// `get(0)`, `get(1)`, .. issued one at a time.

use bytes::Bytes;
use futures::stream::{self, Stream};

use super::store::{Revisions, StoreError};
use crate::codec::Codec;

impl<C: Codec + 'static> Revisions<C> {
    /// Stream every revision in order.
    ///
    /// The stream borrows the store; use a [`RevisionCursor`] to push while
    /// iterating.
    pub fn stream(&self) -> impl Stream<Item = Result<Bytes, StoreError>> + '_ {
        stream::unfold(0usize, move |index| async move {
            if index >= self.len() {
                return None;
            }
            Some((self.get(index).await, index + 1))
        })
    }
}

/// Restartable position in a store that holds no borrow between steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionCursor {
    index: usize,
}

impl RevisionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the revision the next call to [`next`](Self::next) yields.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Reconstruct the next revision, or `None` once past the current end.
    ///
    /// Revisions pushed since the previous call are picked up.
    pub async fn next<C: Codec + 'static>(
        &mut self,
        store: &Revisions<C>,
    ) -> Option<Result<Bytes, StoreError>> {
        if self.index >= store.len() {
            return None;
        }
        let item = store.get(self.index).await;
        self.index += 1;
        Some(item)
    }

    /// Start over from the first revision.
    pub fn rewind(&mut self) {
        self.index = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
