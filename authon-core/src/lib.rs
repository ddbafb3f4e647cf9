//! Board-agnostic protocol logic for single-wire battery authentication
//!
//! This crate contains everything above the physical layer:
//!
//! - The [`traits::Phy`] seam the bit-banged driver implements
//! - Bus command primitives and bounded busy polls
//! - Device enumeration (binary trie search) and selection
//! - Register, NVM and life-span counter access
//! - Host authentication and ECC challenge/response
//! - The layered status taxonomy
//! - Configuration types and a small TOML-subset loader
//! - [`session::Session`], the handle that owns one wire

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod bus;
pub mod capability;
pub mod config;
pub mod ecc;
pub mod host_auth;
pub mod lsc;
pub mod nvm;
pub mod page_buffer;
pub mod register;
pub mod search;
pub mod session;
pub mod status;
pub mod traits;

#[cfg(test)]
mod sim;

pub use capability::{Capability, DeviceFeatures};
pub use search::Uid;
pub use session::Session;
pub use status::{Error, Layer};
