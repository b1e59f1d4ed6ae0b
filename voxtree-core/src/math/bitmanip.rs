/// Inserts two zero-bits before any bit of `val`. Only the lowest 21 bits of `val` are used
pub fn expand_bits_by_3(mut val: u64) -> u64 {
    val &= 0x1FFFFF; //Truncate to 21 bits
    val = (val | (val << 32)) & 0x00FF00000000FFFF;
    val = (val | (val << 16)) & 0x00FF0000FF0000FF;
    val = (val | (val << 8)) & 0xF00F00F00F00F00F;
    val = (val | (val << 4)) & 0x30C30C30C30C30C3;
    val = (val | (val << 2)) & 0x1249249249249249;
    val
}

/// Inverse of [expand_bits_by_3]: gathers every third bit of `val`, starting at bit 0
pub fn compact_bits_by_3(mut val: u64) -> u64 {
    val &= 0x1249249249249249;
    val = (val | (val >> 2)) & 0x30C30C30C30C30C3;
    val = (val | (val >> 4)) & 0xF00F00F00F00F00F;
    val = (val | (val >> 8)) & 0x00FF0000FF0000FF;
    val = (val | (val >> 16)) & 0x00FF00000000FFFF;
    val = (val | (val >> 32)) & 0x1FFFFF;
    val
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_compact() {
        assert_eq!(0b1001001, expand_bits_by_3(0b111));
        for val in [0_u64, 1, 2, 0x1FFFFF, 0x15555, 123_456] {
            assert_eq!(val, compact_bits_by_3(expand_bits_by_3(val)));
        }
    }
}
