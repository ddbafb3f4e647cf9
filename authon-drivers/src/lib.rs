//! Physical layer implementations
//!
//! This crate provides the concrete [`authon_core::traits::Phy`] for a
//! bit-banged single-wire bus on top of the `authon-hal` collaborator
//! traits:
//!
//! - [`swi::SwiPhy`] - pulse transmission, dual-decoder reception,
//!   interrupt waits and power sequencing
//! - [`swi::embedded`] - adapters from embedded-hal 1.0 pins and delays

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod swi;

pub use swi::{PhyStats, SwiPhy};
