//! Bit and byte-lane helpers
//!
//! Distributor registers are 32-bit words, but guests may touch the
//! byte-per-line groups (priority, targets, pending) one byte at a time.
//! These helpers move a single byte lane in and out of a word.

/// Extract the byte lane selected by `offset` from `value`
///
/// With `signed` set, bit 7 of the lane is sign-extended to 32 bits.
#[inline]
pub fn byte_read(value: u32, signed: bool, offset: usize) -> u32 {
    let byte = (value >> (8 * (offset & 0x3))) & 0xff;
    if signed && byte & 0x80 != 0 {
        byte | 0xffff_ff00
    } else {
        byte
    }
}

/// Replace the byte lane selected by `offset` in `reg` with the low byte of `value`
#[inline]
pub fn byte_write(reg: &mut u32, value: u32, offset: usize) {
    let shift = 8 * (offset & 0x3);
    *reg = (*reg & !(0xff << shift)) | ((value & 0xff) << shift);
}

/// Replicate one byte into all four lanes of a word
#[inline]
pub const fn byte_splat(byte: u8) -> u32 {
    u32::from_ne_bytes([byte; 4])
}

/// Iterator over the set bits of a 32-bit mask, lowest first
#[derive(Debug, Clone, Copy)]
pub struct SetBits(u32);

impl SetBits {
    /// Create an iterator over the set bits of `mask`
    pub const fn new(mask: u32) -> Self {
        Self(mask)
    }
}

impl Iterator for SetBits {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        // Clear the lowest set bit
        self.0 &= self.0 - 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SetBits {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x4433_2211, 0, 0x11)]
    #[test_case(0x4433_2211, 1, 0x22)]
    #[test_case(0x4433_2211, 2, 0x33)]
    #[test_case(0x4433_2211, 3, 0x44)]
    #[test_case(0x4433_2211, 0x405, 0x22; "only the low two offset bits select the lane")]
    fn test_byte_read_unsigned(value: u32, offset: usize, expected: u32) {
        assert_eq!(byte_read(value, false, offset), expected);
    }

    #[test]
    fn test_byte_read_sign_extends() {
        assert_eq!(byte_read(0x0000_8000, true, 1), 0xffff_ff80);
        assert_eq!(byte_read(0x0000_8000, false, 1), 0x80);
        assert_eq!(byte_read(0x0000_7f00, true, 1), 0x7f);
    }

    #[test]
    fn test_byte_write_touches_one_lane() {
        let mut reg = 0xaabb_ccdd;
        byte_write(&mut reg, 0x11, 2);
        assert_eq!(reg, 0xaa11_ccdd);

        // Only the low byte of the value is used
        byte_write(&mut reg, 0xffff_ff22, 0);
        assert_eq!(reg, 0xaa11_cc22);
    }

    #[test]
    fn test_byte_splat() {
        assert_eq!(byte_splat(0x04), 0x0404_0404);
        assert_eq!(byte_splat(0), 0);
    }

    #[test]
    fn test_set_bits() {
        let bits: Vec<usize> = SetBits::new(0x8000_0005).collect();
        assert_eq!(bits, vec![0, 2, 31]);
        assert_eq!(SetBits::new(0).count(), 0);
        assert_eq!(SetBits::new(0xffff_ffff).len(), 32);
    }
}
