//! RP2040 implementation of the single-wire collaborator traits
//!
//! - [`gpio::FlexSwiPin`] - an embassy-rp `Flex` pin used open-drain style
//! - [`clock::EmbassyClock`] - embassy-time ticks and blocking delays
//! - [`critical::InterruptFree`] - masks interrupts on the calling core
//!
//! Exchanges run with interrupts masked, so the embassy executor does not
//! make progress during one. Keep other tasks tolerant of a few
//! milliseconds of latency.

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod critical;
pub mod gpio;

pub use clock::EmbassyClock;
pub use critical::InterruptFree;
pub use gpio::FlexSwiPin;
