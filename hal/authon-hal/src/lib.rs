//! Authon Hardware Abstraction Layer
//!
//! This crate defines the collaborator traits the single-wire stack needs
//! from the host platform. Chip-specific HALs (RP2040, ...) implement them
//! so the same protocol code runs on different hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  authon-core (bus, search, NVM, auth)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  authon-drivers (SwiPhy bit-banging)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  authon-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │  authon-hal-  │
//!             │    rp2040     │
//!             └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::SwiPin`] - The single bidirectional data line
//! - [`clock::Clock`] - Monotonic nanosecond time and blocking delays
//! - [`critical::CriticalSection`] - Run code with interrupts disabled
//!
//! # Porting requirement
//!
//! Bits on the wire are pulse widths of a few microseconds. An exchange is
//! only decodable if nothing preempts the host between edges, so
//! [`critical::CriticalSection`] must really mask interrupts (and preemption,
//! on an OS). Where that is impossible the pulse generation and sampling
//! must move to a hardware timer or PIO block.

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod critical;
pub mod gpio;

// Re-export key traits at crate root for convenience
pub use clock::Clock;
pub use critical::CriticalSection;
pub use gpio::{Direction, Level, SwiPin};
