//! Abstraction traits
//!
//! These traits define the interface between the protocol logic and the
//! platform: the physical layer below and host cryptography beside it.

pub mod crypto;
pub mod phy;

pub use crypto::HostCrypto;
pub use phy::{Interrupt, Phy, PhyError, WaitMode};
