//! Configuration types
//!
//! Board-agnostic configuration, loadable from a TOML subset and stored as
//! postcard binary data.

pub mod parse;
pub mod timing;

pub use parse::{parse_config, ParseError};
pub use timing::{TimingProfile, TimingProfileError, TimingWarnings};

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bus::PollBudget;
use crate::search::{SearchMode, MAX_DEVICES};

/// Interfaces (wires) one configuration can describe
pub const MAX_INTERFACES: usize = 2;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No interface configured
    NoInterface,
    /// Active interface index out of range
    InvalidActiveInterface,
    /// Timing profile rejected
    Timing(TimingProfileError),
    /// Device capacity is zero or above the supported maximum
    InvalidCapacity,
    /// A poll budget allows no attempts
    InvalidBudget,
    /// Binary form could not be encoded or decoded
    Serialize,
}

/// One single-wire interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InterfaceConfig {
    /// GPIO pin number of the data line
    pub gpio: u8,
    pub timing: TimingProfile,
    /// Time allowed for the first response edge
    pub response_timeout_us: u32,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            gpio: 0,
            timing: TimingProfile::default(),
            response_timeout_us: 1_000,
        }
    }
}

/// How the device is powered
///
/// Indirect powering charges through the data line and needs longer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PowerMode {
    #[default]
    Direct,
    Indirect,
}

impl PowerMode {
    /// Time the line is held low to power the device down
    pub fn power_down_us(self) -> u32 {
        match self {
            PowerMode::Direct => 2_000,
            PowerMode::Indirect => 2_500,
        }
    }

    /// Time the line is held high for the device to power up
    pub fn power_up_us(self) -> u32 {
        match self {
            PowerMode::Direct => 8_000,
            PowerMode::Indirect => 10_000,
        }
    }
}

/// Settle delays after each host authentication step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HostAuthTiming {
    pub nonce_a_settle_us: u32,
    pub nonce_b_settle_us: u32,
    pub tag_a_settle_us: u32,
    pub tag_b_settle_us: u32,
}

impl Default for HostAuthTiming {
    fn default() -> Self {
        Self {
            nonce_a_settle_us: 1_000,
            nonce_b_settle_us: 500,
            tag_a_settle_us: 500,
            tag_b_settle_us: 500,
        }
    }
}

/// Complete stack configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SwiConfig {
    pub interfaces: Vec<InterfaceConfig, MAX_INTERFACES>,
    /// Index into `interfaces` of the wire in use
    pub active_interface: u8,
    pub power_mode: PowerMode,
    pub search_mode: SearchMode,
    /// Most devices enumeration accepts
    pub device_capacity: u8,
    /// Power-cycle and enumerate attempts during init
    pub init_retries: u8,
    pub nvm_poll: PollBudget,
    pub mac_poll: PollBudget,
    pub ecc_poll: PollBudget,
    pub lsc_poll: PollBudget,
    /// Unconditional delay before polling in fixed-wait ECC mode
    pub ecc_fixed_wait_us: u32,
    /// Time allowed for an interrupt pulse
    pub interrupt_timeout_us: u32,
    pub host_auth: HostAuthTiming,
}

impl Default for SwiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SwiConfig {
    pub fn new() -> Self {
        let mut interfaces = Vec::new();
        let _ = interfaces.push(InterfaceConfig::default());

        Self {
            interfaces,
            active_interface: 0,
            power_mode: PowerMode::Direct,
            search_mode: SearchMode::Multi,
            device_capacity: 4,
            init_retries: 20,
            nvm_poll: PollBudget::new(50, 1_000),
            mac_poll: PollBudget::new(100, 1_000),
            ecc_poll: PollBudget::new(200, 1_000),
            lsc_poll: PollBudget::new(50, 1_000),
            ecc_fixed_wait_us: 50_000,
            interrupt_timeout_us: 200_000,
            host_auth: HostAuthTiming::default(),
        }
    }

    /// Interface selected by `active_interface`
    pub fn active(&self) -> Option<&InterfaceConfig> {
        self.interfaces.get(self.active_interface as usize)
    }

    /// Check the configuration, returning timing warnings of the active wire
    pub fn validate(&self) -> Result<TimingWarnings, ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::NoInterface);
        }
        let active = self.active().ok_or(ConfigError::InvalidActiveInterface)?;

        for iface in self.interfaces.iter() {
            iface.timing.validate().map_err(ConfigError::Timing)?;
        }

        if self.device_capacity == 0 || self.device_capacity as usize > MAX_DEVICES {
            return Err(ConfigError::InvalidCapacity);
        }

        let budgets = [self.nvm_poll, self.mac_poll, self.ecc_poll, self.lsc_poll];
        if budgets.iter().any(|b| b.attempts == 0) {
            return Err(ConfigError::InvalidBudget);
        }

        active.timing.validate().map_err(ConfigError::Timing)
    }

    /// Serialize to postcard binary form
    #[cfg(feature = "serde")]
    pub fn to_bytes<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize from postcard binary form
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Serialize)
    }
}
