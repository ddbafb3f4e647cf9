//! CRC-16 trailer for SWI transactions
//!
//! CRC-16/USB: polynomial 0x8005 reflected, seed 0xFFFF, final XOR 0xFFFF.
//!
//! Every payload byte that crosses the wire during a transaction, in either
//! direction, is fed to the same running CRC. The trailer is sent low byte
//! first.

use crc::{Crc, Digest, CRC_16_USB};

static CRC_SWI: Crc<u16> = Crc::<u16>::new(&CRC_16_USB);

/// Number of trailer bytes appended to a transaction
pub const CRC_LEN: usize = 2;

/// Incremental CRC-16 calculator
#[derive(Clone)]
pub struct Crc16 {
    digest: Digest<'static, u16>,
}

impl core::fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Crc16").field("value", &self.value()).finish()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    /// Start a new calculation
    pub fn new() -> Self {
        Self {
            digest: CRC_SWI.digest(),
        }
    }

    /// Feed one byte
    pub fn update_byte(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    /// Feed a slice of bytes
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Current CRC value (does not consume the calculator)
    pub fn value(&self) -> u16 {
        self.digest.clone().finalize()
    }

    /// Trailer bytes in wire order (low byte first)
    pub fn trailer(&self) -> [u8; CRC_LEN] {
        self.value().to_le_bytes()
    }

    /// Check received trailer bytes against the running value
    pub fn matches(&self, trailer: [u8; CRC_LEN]) -> bool {
        u16::from_le_bytes(trailer) == self.value()
    }
}

/// One-shot CRC over a byte slice
pub fn crc16(data: &[u8]) -> u16 {
    CRC_SWI.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_value() {
        // Standard CRC-16/USB check value
        assert_eq!(crc16(b"123456789"), 0xB4C8);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc16(&[]), 0x0000);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = [0x20, 0x00, 0x10, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut crc = Crc16::new();
        crc.update(&data[..3]);
        crc.update(&data[3..]);
        assert_eq!(crc.value(), crc16(&data));
    }

    #[test]
    fn test_trailer_is_little_endian() {
        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert_eq!(crc.trailer(), [0xC8, 0xB4]);
        assert!(crc.matches([0xC8, 0xB4]));
        assert!(!crc.matches([0xB4, 0xC8]));
    }

    proptest! {
        #[test]
        fn prop_deterministic(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(crc16(&data), crc16(&data));
        }

        #[test]
        fn prop_detects_single_bit_flip(
            data in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut corrupted = data.clone();
            let i = index.index(corrupted.len());
            corrupted[i] ^= 1 << bit;
            prop_assert_ne!(crc16(&data), crc16(&corrupted));
        }
    }
}
