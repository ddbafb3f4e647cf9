//! Single-wire interface (SWI) wire codecs
//!
//! This crate holds everything about how bytes become pulses on the wire
//! and back, with no knowledge of the devices behind it:
//!
//! - [`timing`] - pulse widths, pulse trains, the two receive decoders
//! - [`word`] - the 17-bit parity and inversion protected word
//! - [`crc`] - the CRC-16 transaction trailer
//! - [`command`] - bus opcodes and transaction framing
//!
//! # Word on the wire
//!
//! ```text
//!   bit16 bit15 bit14  bits 13..0                        stop
//!  ┌─────┬─────┬─────┬──────────────────────────────┬──────────┐
//!  │  0  │  1  │ INV │ class, payload, parity       │ 5τ high  │
//!  └─────┴─────┴─────┴──────────────────────────────┴──────────┘
//!    1τ    3τ   1/3τ   1τ or 3τ each, levels alternate
//! ```

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod command;
pub mod crc;
pub mod timing;
pub mod word;

pub use command::{FrameError, Opcode, Transaction, MAX_BURST, MAX_WRITE};
pub use crc::{crc16, Crc16, CRC_LEN};
pub use timing::{reconcile, CycleDecoder, Pulse, PulseWidths, Reconciled, TimestampDecoder, TimingError};
pub use word::{RawWord, WireWord, WordClass, WordError, WORD_BITS};
