//! Hash function for bucket selection

/// Multiplicative string hash, `h = 31 * h + byte`, wrapping at 32 bits.
///
/// Stable across processes and platforms so bucket placement is reproducible.
#[inline]
pub fn simple_hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(simple_hash(b""), 0);
        assert_eq!(simple_hash(b"a"), 97);
        assert_eq!(simple_hash(b"ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_wraps_without_panic() {
        let long = "x".repeat(4096);
        let _ = simple_hash(long.as_bytes());
    }
}
