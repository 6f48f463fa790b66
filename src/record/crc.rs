//! CRC-32C (Castagnoli) checksums for record framing.
//!
//! TFRecord frames store the checksum "masked" so that a CRC computed over data
//! that itself embeds CRCs does not collapse to trivial values.

/// Reflected Castagnoli polynomial.
const POLY: u32 = 0x82F6_3B78;

/// Constant added after rotating the raw checksum.
const MASK_DELTA: u32 = 0xA282_EAD8;

const TABLE: [u32; 256] = build_table();

#[allow(clippy::cast_possible_truncation)]
const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Raw CRC-32C of `data`.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc = TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Masked CRC-32C as stored in TFRecord headers and footers.
#[must_use]
pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c(data);
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_check_value() {
        // Standard check value for CRC-32C
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_crc32c_zeros() {
        assert_eq!(crc32c(&[0u8; 32]), 0x8A91_36AA);
    }

    #[test]
    fn test_crc32c_empty() {
        assert_eq!(crc32c(&[]), 0);
    }

    #[test]
    fn test_masked_differs_from_raw() {
        let data = b"pipe mode";
        assert_ne!(crc32c(data), masked_crc32c(data));
    }
}
