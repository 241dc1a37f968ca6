//! Payload packing. All multi-byte integers on the bus are big-endian,
//! for 16-bit data-point values and 24-bit product ids alike.

/// Pack a data-point value into the two trailing payload slots.
pub fn pack_value(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn unpack_value(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// Spread a 24-bit integer across all three payload slots. The top byte of
/// the input must be zero; anything wider cannot ride a frame.
pub fn pack_wide(value: u32) -> [u8; 3] {
    let b = value.to_be_bytes();
    [b[1], b[2], b[3]]
}

pub fn unpack_wide(bytes: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_big_endian_and_signed() {
        assert_eq!(pack_value(-50), [0xFF, 0xCE]);
        assert_eq!(unpack_value([0xFF, 0xCE]), -50);
        assert_eq!(pack_value(100), [0x00, 0x64]);
        assert_eq!(unpack_value(pack_value(i16::MIN)), i16::MIN);
        assert_eq!(unpack_value(pack_value(i16::MAX)), i16::MAX);
    }

    #[test]
    fn wide_uses_all_three_slots() {
        assert_eq!(pack_wide(0x0102_03), [0x01, 0x02, 0x03]);
        assert_eq!(unpack_wide([0x01, 0x02, 0x03]), 0x0102_03);
        assert_eq!(unpack_wide(pack_wide(0xFF_FFFF)), 0xFF_FFFF);
    }
}
