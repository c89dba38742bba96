// In-memory delta format.
//
// Layout:
//   magic       4 bytes   "SKD\x01"
//   flags       1 byte    DeltaFlags
//   base_len    varint
//   target_len  varint
//   [adler32]   4 bytes   big-endian, present if CHECKSUM is set
//   ops         repeated until target_len bytes are produced:
//                 0x01 ADD   varint len, then len literal bytes
//                 0x02 COPY  varint len, varint base offset
//                 0x03 RUN   varint len, then the repeated byte

use bitflags::bitflags;
use log::trace;

use super::CodecError;
use super::matcher::{self, Op};
use super::varint;

pub const DELTA_MAGIC: [u8; 4] = *b"SKD\x01";

const OP_ADD: u8 = 0x01;
const OP_COPY: u8 = 0x02;
const OP_RUN: u8 = 0x03;

/// Upper bound on the output buffer reserved from an untrusted header.
const MAX_PREALLOC: usize = 1 << 24; // 16 MiB

/// Largest target a delta may describe.
pub const MAX_TARGET_LEN: u64 = 1 << 30; // 1 GiB

bitflags! {
    /// Header indicator bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeltaFlags: u8 {
        /// An Adler-32 of the target follows the lengths.
        const CHECKSUM = 1 << 0;
        /// Ops may COPY from the base.
        const SOURCE = 1 << 1;
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for delta encoding.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Compression level (0-9). Level 0 = literal only (no matching).
    pub level: u32,
    /// Whether to emit an Adler-32 of the target.
    pub checksum: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            level: 6,
            checksum: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed delta header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaHeader {
    pub flags: DeltaFlags,
    /// Length of the base the delta was computed against.
    pub base_len: u64,
    /// Length of the reconstructed target.
    pub target_len: u64,
    /// Adler-32 of the target, if present.
    pub checksum: Option<u32>,
    /// Encoded header length; ops start at this offset.
    pub header_len: usize,
}

impl DeltaHeader {
    /// Parse the header at the front of `delta`.
    pub fn parse(delta: &[u8]) -> Result<Self, CodecError> {
        if delta.len() < DELTA_MAGIC.len() + 1 || delta[..4] != DELTA_MAGIC {
            return Err(CodecError::InvalidDelta("bad magic".into()));
        }
        let flags = DeltaFlags::from_bits(delta[4])
            .ok_or_else(|| CodecError::InvalidDelta(format!("unknown flags {:#04x}", delta[4])))?;

        let mut pos = 5;
        let (base_len, n) = varint::read_u64(&delta[pos..]).map_err(invalid("base length"))?;
        pos += n;
        let (target_len, n) = varint::read_u64(&delta[pos..]).map_err(invalid("target length"))?;
        pos += n;

        let checksum = if flags.contains(DeltaFlags::CHECKSUM) {
            let bytes: [u8; 4] = delta
                .get(pos..pos + 4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| CodecError::InvalidDelta("truncated checksum".into()))?;
            pos += 4;
            Some(u32::from_be_bytes(bytes))
        } else {
            None
        };

        Ok(Self {
            flags,
            base_len,
            target_len,
            checksum,
            header_len: pos,
        })
    }
}

fn invalid(what: &'static str) -> impl Fn(varint::VarIntError) -> CodecError {
    move |e| CodecError::InvalidDelta(format!("{what}: {e}"))
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode the delta that rebuilds `target` from `base`.
pub fn encode(base: &[u8], target: &[u8], opts: &DeltaOptions) -> Vec<u8> {
    let ops = matcher::find_ops(base, target, matcher::config_for_level(opts.level));

    let mut flags = DeltaFlags::empty();
    if opts.checksum {
        flags |= DeltaFlags::CHECKSUM;
    }
    if ops.iter().any(|op| matches!(op, Op::Copy { .. })) {
        flags |= DeltaFlags::SOURCE;
    }

    let mut out = Vec::with_capacity(16 + target.len() / 4);
    out.extend_from_slice(&DELTA_MAGIC);
    out.push(flags.bits());
    varint::push_usize(&mut out, base.len());
    varint::push_usize(&mut out, target.len());
    if opts.checksum {
        out.extend_from_slice(&compute_adler32(target).to_be_bytes());
    }

    let mut target_pos = 0usize;
    for op in &ops {
        match *op {
            Op::Add { len } => {
                out.push(OP_ADD);
                varint::push_usize(&mut out, len);
                out.extend_from_slice(&target[target_pos..target_pos + len]);
            }
            Op::Copy { addr, len } => {
                out.push(OP_COPY);
                varint::push_usize(&mut out, len);
                varint::push_usize(&mut out, addr);
            }
            Op::Run { byte, len } => {
                out.push(OP_RUN);
                varint::push_usize(&mut out, len);
                out.push(byte);
            }
        }
        target_pos += op.len();
    }

    trace!(
        "encoded delta: base={} target={} ops={} delta={}",
        base.len(),
        target.len(),
        ops.len(),
        out.len()
    );
    out
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Rebuild the target from `base` and a delta produced by [`encode`].
pub fn decode(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = DeltaHeader::parse(delta)?;
    if header.base_len != base.len() as u64 {
        return Err(CodecError::BaseMismatch {
            expected: header.base_len,
            actual: base.len() as u64,
        });
    }
    if header.target_len > MAX_TARGET_LEN {
        return Err(CodecError::InvalidDelta(format!(
            "target length {} exceeds max {MAX_TARGET_LEN}",
            header.target_len
        )));
    }
    let target_len = usize::try_from(header.target_len)
        .map_err(|_| CodecError::InvalidDelta("target length exceeds address space".into()))?;
    let may_copy = header.flags.contains(DeltaFlags::SOURCE);

    let mut out = Vec::with_capacity(target_len.min(MAX_PREALLOC));
    let mut pos = header.header_len;

    while out.len() < target_len {
        let opcode = *delta
            .get(pos)
            .ok_or_else(|| CodecError::InvalidDelta("ops end before the target is complete".into()))?;
        pos += 1;
        let (len, n) = varint::read_usize(&delta[pos..]).map_err(invalid("op length"))?;
        pos += n;
        if len == 0 || len > target_len - out.len() {
            return Err(CodecError::InvalidDelta(format!(
                "op length {len} does not fit the remaining {} target bytes",
                target_len - out.len()
            )));
        }

        match opcode {
            OP_ADD => {
                let literal = pos
                    .checked_add(len)
                    .and_then(|end| delta.get(pos..end))
                    .ok_or_else(|| CodecError::InvalidDelta("truncated ADD data".into()))?;
                out.extend_from_slice(literal);
                pos += len;
            }
            OP_COPY => {
                if !may_copy {
                    return Err(CodecError::InvalidDelta("COPY without SOURCE flag".into()));
                }
                let (addr, n) = varint::read_usize(&delta[pos..]).map_err(invalid("copy address"))?;
                pos += n;
                let span = addr
                    .checked_add(len)
                    .and_then(|end| base.get(addr..end))
                    .ok_or_else(|| {
                        CodecError::InvalidDelta(format!(
                            "COPY {addr}+{len} outside a {}-byte base",
                            base.len()
                        ))
                    })?;
                out.extend_from_slice(span);
            }
            OP_RUN => {
                let byte = *delta
                    .get(pos)
                    .ok_or_else(|| CodecError::InvalidDelta("truncated RUN byte".into()))?;
                pos += 1;
                out.resize(out.len() + len, byte);
            }
            other => {
                return Err(CodecError::InvalidDelta(format!("unknown op {other:#04x}")));
            }
        }
    }

    if pos != delta.len() {
        return Err(CodecError::InvalidDelta(format!(
            "{} trailing bytes after the last op",
            delta.len() - pos
        )));
    }

    if let Some(expected) = header.checksum {
        let actual = compute_adler32(&out);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

fn compute_adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let (a, b) = data.iter().fold((1u32, 0u32), |(a, b), &byte| {
            let a = (a + u32::from(byte)) % MOD_ADLER;
            (a, (b + a) % MOD_ADLER)
        });
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(base: &[u8], target: &[u8]) -> Vec<u8> {
        let delta = encode(base, target, &DeltaOptions::default());
        let rebuilt = decode(base, &delta).expect("decode failed");
        assert_eq!(
            rebuilt,
            target,
            "roundtrip mismatch (base={}, target={}, delta={})",
            base.len(),
            target.len(),
            delta.len()
        );
        delta
    }

    #[test]
    fn roundtrip_identical() {
        let data = b"The quick brown fox jumps over the lazy dog.";
        roundtrip(data, data);
    }

    #[test]
    fn roundtrip_small_edit() {
        roundtrip(
            b"Hello, world! This is a test of the delta format.",
            b"Hello, earth! This is a test of the delta format.",
        );
    }

    #[test]
    fn roundtrip_empty_base_and_target() {
        roundtrip(b"", b"ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        roundtrip(b"some base", b"");
        roundtrip(b"", b"");
    }

    #[test]
    fn roundtrip_binary_with_runs() {
        let base: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let mut target = base.clone();
        target[100] = 0xFF;
        target[1000..1040].fill(0x00);
        target.extend_from_slice(&[1, 2, 3]);
        roundtrip(&base, &target);
    }

    #[test]
    fn roundtrip_all_levels() {
        let base = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789abcdefghijklmnopqrstuvwxyz";
        let target = b"ABCDEFGHIJKLMNOP--CHANGED--UVWXYZ0123456789abcdefghijklmnopqrstuvwxyz!!!";
        for level in 0..=9 {
            let opts = DeltaOptions {
                level,
                checksum: level % 2 == 0,
            };
            let delta = encode(base, target, &opts);
            assert_eq!(decode(base, &delta).unwrap(), target, "level {level}");
        }
    }

    #[test]
    fn delta_is_smaller_for_similar_data() {
        let base: Vec<u8> = (0..=255).cycle().take(8192).collect();
        let mut target = base.clone();
        target[4096] ^= 0xFF;
        let delta = roundtrip(&base, &target);
        assert!(
            delta.len() < target.len() / 8,
            "delta ({}) should be much smaller than target ({})",
            delta.len(),
            target.len()
        );
    }

    #[test]
    fn header_fields() {
        let delta = encode(b"0123456789abcdef", b"0123456789abcdef!", &DeltaOptions::default());
        let header = DeltaHeader::parse(&delta).unwrap();
        assert_eq!(header.base_len, 16);
        assert_eq!(header.target_len, 17);
        assert!(header.flags.contains(DeltaFlags::CHECKSUM | DeltaFlags::SOURCE));
        assert!(header.checksum.is_some());
    }

    #[test]
    fn rejects_wrong_base() {
        let delta = encode(b"base one", b"target", &DeltaOptions::default());
        assert_eq!(
            decode(b"base number two", &delta),
            Err(CodecError::BaseMismatch {
                expected: 8,
                actual: 15
            })
        );
    }

    #[test]
    fn rejects_corrupted_payload() {
        let opts = DeltaOptions {
            level: 0,
            checksum: true,
        };
        let mut delta = encode(b"", b"literal payload", &opts);
        let last = delta.len() - 1;
        delta[last] ^= 0x01;
        assert!(matches!(
            decode(b"", &delta),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(decode(b"", b"").is_err());
        assert!(decode(b"", b"NOPE\x00\x00\x00").is_err());

        let delta = encode(b"", b"abc", &DeltaOptions::default());
        assert!(decode(b"", &delta[..delta.len() - 1]).is_err());

        let mut trailing = delta.clone();
        trailing.push(0);
        assert!(decode(b"", &trailing).is_err());

        let mut bad_flags = delta;
        bad_flags[4] = 0x80;
        assert!(decode(b"", &bad_flags).is_err());
    }

    #[test]
    fn rejects_copy_outside_base() {
        let mut delta = DELTA_MAGIC.to_vec();
        delta.push(DeltaFlags::SOURCE.bits());
        varint::push_usize(&mut delta, 4); // base_len
        varint::push_usize(&mut delta, 8); // target_len
        delta.push(OP_COPY);
        varint::push_usize(&mut delta, 8);
        varint::push_usize(&mut delta, 0);
        assert!(matches!(
            decode(b"abcd", &delta),
            Err(CodecError::InvalidDelta(_))
        ));
    }

    #[test]
    fn rejects_oversized_target() {
        let mut delta = DELTA_MAGIC.to_vec();
        delta.push(0);
        varint::push_usize(&mut delta, 0);
        varint::push_u64(&mut delta, MAX_TARGET_LEN + 1);
        delta.push(OP_RUN);
        varint::push_u64(&mut delta, MAX_TARGET_LEN + 1);
        delta.push(b'x');
        assert!(matches!(decode(b"", &delta), Err(CodecError::InvalidDelta(_))));
    }

    #[test]
    fn adler32_reference_value() {
        assert_eq!(compute_adler32(b"Wikipedia"), 0x11E6_0398);
    }
}
