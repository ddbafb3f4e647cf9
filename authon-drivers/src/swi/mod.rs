//! Single-wire interface drivers

pub mod embedded;
pub mod phy;

#[cfg(test)]
mod mock;

pub use phy::{PhyStats, SwiPhy};
