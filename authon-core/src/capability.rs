//! Per-wire device capabilities
//!
//! Filled in by `Session::init` from the configuration registers of the
//! selected device.

use heapless::Vec;

use crate::bus::Bus;
use crate::register::{device_cfg, DEVICE_CFG, ECC_KEY_COUNT, NVM_SIZE};
use crate::search::{Uid, MAX_DEVICES};
use crate::status::Error;
use crate::traits::phy::Phy;

/// Highest number of user NVM pages a device can report
pub const MAX_USER_PAGES: u8 = 64;

/// Optional features a device reports in `DEVICE_CFG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceFeatures {
    pub host_auth: bool,
    pub kill: bool,
    pub auto_kill: bool,
    pub nvm_unlock: bool,
}

impl DeviceFeatures {
    pub fn from_u8(value: u8) -> Self {
        Self {
            host_auth: value & device_cfg::HOST_AUTH != 0,
            kill: value & device_cfg::KILL != 0,
            auto_kill: value & device_cfg::AUTO_KILL != 0,
            nvm_unlock: value & device_cfg::NVM_UNLOCK != 0,
        }
    }

    pub fn as_u8(&self) -> u8 {
        let mut value = 0;
        if self.host_auth {
            value |= device_cfg::HOST_AUTH;
        }
        if self.kill {
            value |= device_cfg::KILL;
        }
        if self.auto_kill {
            value |= device_cfg::AUTO_KILL;
        }
        if self.nvm_unlock {
            value |= device_cfg::NVM_UNLOCK;
        }
        value
    }
}

/// What the devices on one wire offer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capability {
    /// Enumerated devices in ascending order
    pub uids: Vec<Uid, MAX_DEVICES>,
    /// User NVM pages
    pub nvm_pages: u8,
    /// ECC key pairs
    pub ecc_key_count: u8,
    pub features: DeviceFeatures,
}

impl Capability {
    /// Read the configuration registers of the addressed device
    pub fn read<P: Phy>(bus: &mut Bus<P>, uids: Vec<Uid, MAX_DEVICES>) -> Result<Self, Error> {
        let nvm_pages = bus.read_u8(NVM_SIZE)?.min(MAX_USER_PAGES);
        let ecc_key_count = bus.read_u8(ECC_KEY_COUNT)?;
        let features = DeviceFeatures::from_u8(bus.read_u8(DEVICE_CFG)?);

        Ok(Self {
            uids,
            nvm_pages,
            ecc_key_count,
            features,
        })
    }

    /// First device on the wire
    pub fn primary(&self) -> Option<&Uid> {
        self.uids.first()
    }
}
