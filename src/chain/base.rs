// Skip-delta base selection.
//
// Revision `n > 0` is stored as a delta against revision `n & (n - 1)`:
// `n` with its lowest set bit cleared. Following bases from `n` clears one
// bit per step, so reconstructing `n` takes popcount(n) decodes, which is
// at most ceil(log2(n + 1)).

/// Index of the delta base for the revision at `index`.
///
/// `None` for index 0, the root of every chain.
#[inline]
pub fn delta_base(index: usize) -> Option<usize> {
    (index != 0).then(|| index & (index - 1))
}

/// Successive bases of `index`, nearest first, ending at 0.
pub fn base_chain(index: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(delta_base(index), |&base| delta_base(base))
}

/// Number of delta-decode steps needed to reconstruct `index`.
#[inline]
pub fn chain_depth(index: usize) -> u32 {
    index.count_ones()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
