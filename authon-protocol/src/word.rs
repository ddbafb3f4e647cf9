//! Protected 17-bit wire words
//!
//! Word layout (bit 16 is sent first):
//!
//! ```text
//!  16   15   14   13 ............................ 0
//! ┌────┬────┬─────┬─────────────────────────────────┐
//! │ 0  │ 1  │ INV │ 14 protected bits (Hamming pos) │
//! └────┴────┴─────┴─────────────────────────────────┘
//! ```
//!
//! - Bits 16/15 are training bits (`0` then `1`) the receiver uses to
//!   measure tau.
//! - The 14 protected bits carry the 2-bit class and 8-bit payload at the
//!   data positions, and 4 even-parity bits at positions 1, 2, 4 and 8
//!   (1-based), each covering one of [`PARITY_MASKS`].
//! - If 8 or more protected bits are set they are inverted and INV is set,
//!   which keeps the number of long pulses per word low.

/// Number of bits (and pulse intervals) per word
pub const WORD_BITS: usize = 17;

/// Mask of the 14 protected bits
pub const PROTECTED_MASK: u32 = 0x3FFF;

/// Inversion flag
pub const INVERT_BIT: u32 = 1 << 14;

/// Training bits as they appear in a raw word (`0` at bit 16, `1` at bit 15)
pub const TRAINING_BITS: u32 = 1 << 15;

/// Mask covering both training bits
const TRAINING_MASK: u32 = 0b11 << 15;

/// Set-bit count at which the protected field is inverted
const INVERT_THRESHOLD: u32 = 8;

/// Even-parity groups over the protected field (each includes its parity bit)
pub const PARITY_MASKS: [u16; 4] = [0x1555, 0x2666, 0x3878, 0x3F80];

/// Bit index of each parity bit within the protected field
const PARITY_POSITIONS: [u8; 4] = [0, 1, 3, 7];

/// Bit index of data bits d0..d9 (payload d0..d7, class d8..d9)
const DATA_POSITIONS: [u8; 10] = [2, 4, 5, 6, 8, 9, 10, 11, 12, 13];

/// Errors from decoding a raw word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordError {
    /// Training bits are not `0`,`1`
    Framing,
    /// One of the four parity groups is odd
    Parity,
    /// A data response arrived without the ACK class (raw payload kept)
    Acknowledge(u8),
}

/// Word class (two bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WordClass {
    /// Bus command; payload is an opcode
    Bus = 0b00,
    /// Device or register address byte
    Address = 0b01,
    /// Data byte (host to device, or device data without ACK)
    Data = 0b10,
    /// Data byte acknowledged by the device
    DataAck = 0b11,
}

impl WordClass {
    /// Create a class from its two-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => WordClass::Bus,
            0b01 => WordClass::Address,
            0b10 => WordClass::Data,
            _ => WordClass::DataAck,
        }
    }
}

/// A logical word: class plus payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WireWord {
    pub class: WordClass,
    pub payload: u8,
}

impl WireWord {
    /// Create a word
    pub const fn new(class: WordClass, payload: u8) -> Self {
        Self { class, payload }
    }

    /// Bus command word
    pub const fn bus(opcode: u8) -> Self {
        Self::new(WordClass::Bus, opcode)
    }

    /// Address word
    pub const fn address(byte: u8) -> Self {
        Self::new(WordClass::Address, byte)
    }

    /// Host data word
    pub const fn data(byte: u8) -> Self {
        Self::new(WordClass::Data, byte)
    }

    /// The 10 data bits (class above payload)
    fn data_bits(self) -> u16 {
        ((self.class as u16) << 8) | self.payload as u16
    }

    /// Encode into the 17-bit raw form
    pub fn encode(self) -> RawWord {
        let data = self.data_bits();

        let mut field = 0u16;
        for (i, &pos) in DATA_POSITIONS.iter().enumerate() {
            if (data >> i) & 1 != 0 {
                field |= 1 << pos;
            }
        }

        for (mask, &pos) in PARITY_MASKS.iter().zip(PARITY_POSITIONS.iter()) {
            if (field & mask).count_ones() % 2 == 1 {
                field |= 1 << pos;
            }
        }

        let mut raw = TRAINING_BITS;
        if field.count_ones() >= INVERT_THRESHOLD {
            raw |= INVERT_BIT | (!field as u32 & PROTECTED_MASK);
        } else {
            raw |= field as u32;
        }
        RawWord(raw)
    }

    /// Interpret a device answer as a data byte, requiring the ACK class
    pub fn into_response(self) -> Result<u8, WordError> {
        match self.class {
            WordClass::DataAck => Ok(self.payload),
            _ => Err(WordError::Acknowledge(self.payload)),
        }
    }
}

/// A raw 17-bit word as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawWord(pub u32);

impl RawWord {
    /// Bit `index` of the word (0 = last bit on the wire)
    pub fn bit(self, index: usize) -> bool {
        (self.0 >> index) & 1 != 0
    }

    /// Whether the protected field was sent inverted
    pub fn is_inverted(self) -> bool {
        self.0 & INVERT_BIT != 0
    }

    /// Protected field with inversion undone
    pub fn protected_field(self) -> u16 {
        let field = (self.0 & PROTECTED_MASK) as u16;
        if self.is_inverted() {
            !field & PROTECTED_MASK as u16
        } else {
            field
        }
    }

    /// Bits in wire order, first bit first
    pub fn bits_msb_first(self) -> impl Iterator<Item = bool> {
        (0..WORD_BITS).rev().map(move |i| self.bit(i))
    }

    /// Assemble a raw word from bits in wire order
    pub fn from_bits_msb_first(bits: &[bool; WORD_BITS]) -> Self {
        let mut raw = 0u32;
        for &bit in bits.iter() {
            raw = (raw << 1) | bit as u32;
        }
        RawWord(raw)
    }

    /// Decode into a logical word
    pub fn decode(self) -> Result<WireWord, WordError> {
        if self.0 & TRAINING_MASK != TRAINING_BITS {
            return Err(WordError::Framing);
        }

        let field = self.protected_field();
        if PARITY_MASKS
            .iter()
            .any(|mask| (field & mask).count_ones() % 2 != 0)
        {
            return Err(WordError::Parity);
        }

        let mut data = 0u16;
        for (i, &pos) in DATA_POSITIONS.iter().enumerate() {
            if (field >> pos) & 1 != 0 {
                data |= 1 << i;
            }
        }

        Ok(WireWord {
            class: WordClass::from_bits((data >> 8) as u8),
            payload: data as u8,
        })
    }
}
