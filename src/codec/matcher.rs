// Source matching for the delta encoder.
//
// Finds the parts of a target that already exist in its base:
//   1. Index base positions 0, step, 2*step, .. by a `look`-byte rolling
//      hash (indexed back to front, so the earliest position wins)
//   2. Roll the same hash across the target one byte at a time
//   3. Verify each candidate, then extend it greedily forward and backward
//   4. Split the literal spans between copies into ADD and RUN

/// Shortest run of one repeated byte worth a RUN instead of an ADD.
pub const MIN_RUN: usize = 8;

/// Hash multiplier (the 32-bit LCG constant used by xdelta3's hashes).
const HASH_MULT: u64 = 1_597_334_677;

/// Stored positions are offset by one so an empty bucket reads as 0.
const BUCKET_OFFSET: usize = 1;

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Matcher profile: hash window width and base indexing stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Name for display purposes.
    pub name: &'static str,
    /// Hash window width; also the shortest COPY the matcher emits.
    pub look: usize,
    /// Distance between indexed base positions.
    pub step: usize,
}

pub const FASTEST: MatcherConfig = MatcherConfig {
    name: "fastest",
    look: 32,
    step: 16,
};

pub const FAST: MatcherConfig = MatcherConfig {
    name: "fast",
    look: 16,
    step: 8,
};

pub const DEFAULT: MatcherConfig = MatcherConfig {
    name: "default",
    look: 12,
    step: 4,
};

pub const SLOW: MatcherConfig = MatcherConfig {
    name: "slow",
    look: 8,
    step: 1,
};

/// Map a compression level to a matcher profile.
///
/// - Level 0: no matching (the whole target is literal)
/// - Level 1: fastest
/// - Levels 2-3: fast
/// - Levels 4-6: default
/// - Levels 7-9: slow
pub fn config_for_level(level: u32) -> Option<MatcherConfig> {
    match level {
        0 => None,
        1 => Some(FASTEST),
        2 | 3 => Some(FAST),
        4..=6 => Some(DEFAULT),
        _ => Some(SLOW),
    }
}

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// One step of target reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Take the next `len` literal bytes.
    Add { len: usize },
    /// Copy `len` bytes of the base starting at `addr`.
    Copy { addr: usize, len: usize },
    /// Repeat `byte` `len` times.
    Run { byte: u8, len: usize },
}

impl Op {
    /// Number of target bytes this op produces.
    pub fn len(&self) -> usize {
        match *self {
            Op::Add { len } | Op::Copy { len, .. } | Op::Run { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Rolling hash
// ---------------------------------------------------------------------------

/// Polynomial hash over a fixed window, updatable one byte at a time.
#[derive(Debug, Clone, Copy)]
struct RollingHash {
    look: usize,
    /// HASH_MULT^(look - 1): weight of the byte leaving the window.
    leading: u64,
}

impl RollingHash {
    fn new(look: usize) -> Self {
        let leading = (1..look).fold(1u64, |acc, _| acc.wrapping_mul(HASH_MULT));
        Self { look, leading }
    }

    fn checksum(&self, window: &[u8]) -> u64 {
        window[..self.look]
            .iter()
            .fold(0u64, |h, &b| h.wrapping_mul(HASH_MULT).wrapping_add(u64::from(b)))
    }

    #[inline]
    fn roll(&self, hash: u64, out: u8, next: u8) -> u64 {
        hash.wrapping_sub(u64::from(out).wrapping_mul(self.leading))
            .wrapping_mul(HASH_MULT)
            .wrapping_add(u64::from(next))
    }
}

// ---------------------------------------------------------------------------
// Base index
// ---------------------------------------------------------------------------

/// Hash table of sampled base positions. Last write wins per bucket.
struct SourceIndex {
    buckets: Vec<usize>,
    mask: usize,
}

impl SourceIndex {
    fn build(base: &[u8], config: MatcherConfig, hasher: &RollingHash) -> Self {
        let slots = (base.len() / config.step).next_power_of_two().max(8);
        let mut index = Self {
            buckets: vec![0; slots],
            mask: slots - 1,
        };
        if base.len() < config.look {
            return index;
        }

        // Back to front so earlier positions overwrite later ones.
        let last = base.len() - config.look;
        let mut pos = last - last % config.step;
        loop {
            let bucket = index.bucket(hasher.checksum(&base[pos..]));
            index.buckets[bucket] = pos + BUCKET_OFFSET;
            if pos < config.step {
                break;
            }
            pos -= config.step;
        }
        index
    }

    #[inline]
    fn bucket(&self, hash: u64) -> usize {
        ((hash ^ (hash >> 29)) as usize) & self.mask
    }

    #[inline]
    fn lookup(&self, hash: u64) -> Option<usize> {
        match self.buckets[self.bucket(hash)] {
            0 => None,
            stored => Some(stored - BUCKET_OFFSET),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Compute the ops that rebuild `target` from `base`.
///
/// With `config == None` no matching is attempted and the target is emitted
/// as literal spans. The ops always cover the target exactly.
pub fn find_ops(base: &[u8], target: &[u8], config: Option<MatcherConfig>) -> Vec<Op> {
    let mut ops = Vec::new();
    let Some(config) = config else {
        push_literal(&mut ops, target);
        return ops;
    };
    if base.len() < config.look || target.len() < config.look {
        push_literal(&mut ops, target);
        return ops;
    }

    let hasher = RollingHash::new(config.look);
    let index = SourceIndex::build(base, config, &hasher);
    let look = config.look;

    let mut literal_start = 0usize;
    let mut pos = 0usize;
    let mut hash = hasher.checksum(target);

    while pos + look <= target.len() {
        if let Some(src) = index.lookup(hash)
            && base[src..src + look] == target[pos..pos + look]
        {
            let forward = common_prefix(&base[src..], &target[pos..]);
            let backward = common_suffix(&base[..src], &target[literal_start..pos]);
            let start = pos - backward;

            push_literal(&mut ops, &target[literal_start..start]);
            ops.push(Op::Copy {
                addr: src - backward,
                len: backward + forward,
            });

            pos += forward;
            literal_start = pos;
            if pos + look <= target.len() {
                hash = hasher.checksum(&target[pos..]);
            }
            continue;
        }

        if pos + look < target.len() {
            hash = hasher.roll(hash, target[pos], target[pos + look]);
        }
        pos += 1;
    }

    push_literal(&mut ops, &target[literal_start..]);

    debug_assert_eq!(
        ops.iter().map(Op::len).sum::<usize>(),
        target.len(),
        "ops must cover the target exactly"
    );
    ops
}

/// Length of the common prefix of `a` and `b`.
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Length of the common suffix of `a` and `b`.
fn common_suffix(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Emit a literal span as ADDs, splitting out runs of `MIN_RUN` or more.
fn push_literal(ops: &mut Vec<Op>, span: &[u8]) {
    let mut add_start = 0usize;
    let mut i = 0usize;
    while i < span.len() {
        let byte = span[i];
        let run = span[i..].iter().take_while(|&&b| b == byte).count();
        if run >= MIN_RUN {
            if i > add_start {
                ops.push(Op::Add { len: i - add_start });
            }
            ops.push(Op::Run { byte, len: run });
            add_start = i + run;
        }
        i += run;
    }
    if add_start < span.len() {
        ops.push(Op::Add {
            len: span.len() - add_start,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
