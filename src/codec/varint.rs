// Variable-length integers for the delta format.
//
// Base-128, big-endian: most-significant group first, bit 7 set on every
// byte except the last one (the VCDIFF integer layout).

/// Maximum encoded length of a `u64` (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

/// Bits that must be clear before another `<< 7` fits in a `u64`.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    #[error("varint overflows 64 bits")]
    Overflow,
    #[error("varint is truncated")]
    Truncated,
}

/// Append `value` to `out`.
pub fn push_u64(out: &mut Vec<u8>, value: u64) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let mut start = MAX_VARINT_LEN;
    let mut rest = value;
    loop {
        start -= 1;
        scratch[start] = (rest & 0x7F) as u8 | 0x80;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    scratch[MAX_VARINT_LEN - 1] &= 0x7F;
    out.extend_from_slice(&scratch[start..]);
}

/// Append a `usize` to `out`.
#[inline]
pub fn push_usize(out: &mut Vec<u8>, value: usize) {
    push_u64(out, value as u64);
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = (u64::BITS - value.leading_zeros()).max(1) as usize;
    bits.div_ceil(7)
}

/// Decode a `u64` from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarIntError::Truncated)
}

/// Decode a `usize` from the front of `data`.
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarIntError> {
    let (value, len) = read_u64(data)?;
    let value = usize::try_from(value).map_err(|_| VarIntError::Overflow)?;
    Ok((value, len))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
