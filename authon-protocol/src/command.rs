//! Bus opcodes and transaction framing
//!
//! A transaction is a `Bus` word carrying the opcode, optional address and
//! data words from the host, and optional data words from the device.
//! Every multi-word transaction ends with a two-word CRC trailer covering
//! all payload bytes exchanged so far, in both directions:
//!
//! ```text
//! host writes:  [op][addr/data ...][crc lo][crc hi]
//! host reads:   [op]  ->  device: [data ...][crc lo][crc hi]
//! ```

use crate::crc::{Crc16, CRC_LEN};
use crate::word::WireWord;
use heapless::Vec;

/// Largest burst a single RD transaction returns
pub const MAX_BURST: usize = 256;

/// Largest data payload of one WD transaction
pub const MAX_WRITE: usize = 32;

/// Host words in the largest outbound transaction
pub const MAX_TX_WORDS: usize = 1 + MAX_WRITE + CRC_LEN;

/// Bytes of a maintenance MAC
pub const MAC_LEN: usize = 10;

/// Bytes of a host-auth nonce or tag
pub const HOST_AUTH_LEN: usize = 10;

/// Bytes of an ECC challenge
pub const ECC_CHALLENGE_LEN: usize = 21;

/// Bytes of an ECC response
pub const ECC_RESPONSE_LEN: usize = 44;

/// Bus command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Bus reset
    Bres = 0x00,
    /// Power down, line held low afterwards
    Pdwn = 0x01,
    /// Start search
    Diss = 0x08,
    /// Probe bit 0
    Dip0 = 0x09,
    /// Probe bit 1
    Dip1 = 0x0A,
    /// Enter bit 0
    Die0 = 0x0B,
    /// Enter bit 1
    Die1 = 0x0C,
    /// Select by extended device address
    Eda = 0x10,
    /// Select by short device address
    Sda = 0x11,
    /// Extended (two byte) register address
    Era = 0x18,
    /// Short (one byte) register address
    Sra = 0x19,
    /// Read burst length for NVM space
    Rbl = 0x1A,
    /// Read data
    Rd = 0x20,
    /// Write data
    Wd = 0x21,
    /// Start a MAC-protected maintenance operation
    Macs = 0x30,
    /// Read the maintenance result
    Macr = 0x31,
    /// Start an ECC computation
    Eccs = 0x38,
    /// Read the ECC response
    Eccr = 0x39,
    /// Host-auth: read nonce A
    Hana = 0x40,
    /// Host-auth: send nonce B
    Hanb = 0x41,
    /// Host-auth: send tag A
    Hata = 0x42,
    /// Host-auth: read tag B
    Hatb = 0x43,
}

impl Opcode {
    /// Parse an opcode byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Bres),
            0x01 => Some(Opcode::Pdwn),
            0x08 => Some(Opcode::Diss),
            0x09 => Some(Opcode::Dip0),
            0x0A => Some(Opcode::Dip1),
            0x0B => Some(Opcode::Die0),
            0x0C => Some(Opcode::Die1),
            0x10 => Some(Opcode::Eda),
            0x11 => Some(Opcode::Sda),
            0x18 => Some(Opcode::Era),
            0x19 => Some(Opcode::Sra),
            0x1A => Some(Opcode::Rbl),
            0x20 => Some(Opcode::Rd),
            0x21 => Some(Opcode::Wd),
            0x30 => Some(Opcode::Macs),
            0x31 => Some(Opcode::Macr),
            0x38 => Some(Opcode::Eccs),
            0x39 => Some(Opcode::Eccr),
            0x40 => Some(Opcode::Hana),
            0x41 => Some(Opcode::Hanb),
            0x42 => Some(Opcode::Hata),
            0x43 => Some(Opcode::Hatb),
            _ => None,
        }
    }

    /// Opcode byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Probe opcode for a bit value
    pub fn probe(bit: bool) -> Self {
        if bit {
            Opcode::Dip1
        } else {
            Opcode::Dip0
        }
    }

    /// Enter opcode for a bit value
    pub fn enter(bit: bool) -> Self {
        if bit {
            Opcode::Die1
        } else {
            Opcode::Die0
        }
    }
}

/// Errors while framing or checking a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Too many words for one transaction
    TooLong,
    /// Response buffer does not match the expected length
    LengthMismatch,
    /// Received trailer does not match the running CRC
    CrcMismatch,
}

/// An outbound transaction under construction
///
/// The CRC is updated as words are added so the trailer and the response
/// check cover every payload byte in wire order.
#[derive(Debug, Clone)]
pub struct Transaction {
    words: Vec<WireWord, MAX_TX_WORDS>,
    rx_len: usize,
    crc: Crc16,
}

impl Transaction {
    /// Start a transaction with its opcode word
    pub fn new(opcode: Opcode) -> Self {
        let mut crc = Crc16::new();
        crc.update_byte(opcode.as_u8());
        let mut words = Vec::new();
        // Capacity is always at least one
        let _ = words.push(WireWord::bus(opcode.as_u8()));
        Self {
            words,
            rx_len: 0,
            crc,
        }
    }

    fn push(&mut self, word: WireWord) -> Result<(), FrameError> {
        self.crc.update_byte(word.payload);
        self.words.push(word).map_err(|_| FrameError::TooLong)
    }

    /// Append an address byte
    pub fn address(mut self, byte: u8) -> Result<Self, FrameError> {
        self.push(WireWord::address(byte))?;
        Ok(self)
    }

    /// Append host data bytes
    pub fn data(mut self, bytes: &[u8]) -> Result<Self, FrameError> {
        for &byte in bytes {
            self.push(WireWord::data(byte))?;
        }
        Ok(self)
    }

    /// Expect `len` data bytes back from the device
    pub fn read(mut self, len: usize) -> Self {
        self.rx_len = len;
        self
    }

    /// Close the transaction, appending the trailer for multi-word writes
    ///
    /// Transactions with a response get their trailer from the device.
    pub fn finish(mut self) -> Result<Self, FrameError> {
        if self.rx_len == 0 && self.words.len() > 1 {
            for byte in self.crc.trailer() {
                // Trailer words are data class but do not feed the CRC
                self.words
                    .push(WireWord::data(byte))
                    .map_err(|_| FrameError::TooLong)?;
            }
        }
        Ok(self)
    }

    /// Words to transmit
    pub fn words(&self) -> &[WireWord] {
        &self.words
    }

    /// Bytes the device sends back, trailer included
    pub fn response_len(&self) -> usize {
        if self.rx_len == 0 {
            0
        } else {
            self.rx_len + CRC_LEN
        }
    }

    /// Check a response against the running CRC and return its payload
    pub fn check_response<'a>(&self, rx: &'a [u8]) -> Result<&'a [u8], FrameError> {
        if rx.len() != self.response_len() {
            return Err(FrameError::LengthMismatch);
        }
        if rx.is_empty() {
            return Ok(rx);
        }

        let (payload, trailer) = rx.split_at(self.rx_len);
        let mut crc = self.crc.clone();
        crc.update(payload);
        if crc.matches([trailer[0], trailer[1]]) {
            Ok(payload)
        } else {
            Err(FrameError::CrcMismatch)
        }
    }
}
