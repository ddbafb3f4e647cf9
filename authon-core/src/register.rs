//! Register map and register access
//!
//! The device address space is split at [`REGISTER_SPACE_START`]:
//!
//! - Below it is NVM space. Reads prime the burst length with RBL and may
//!   return up to 256 bytes per transaction.
//! - From it upwards are special function registers, transferred one byte
//!   per transaction.

use authon_protocol::{MAX_BURST, MAX_WRITE};

use crate::bus::Bus;
use crate::status::{Error, ExecutionError};
use crate::traits::phy::Phy;

/// First register-space address
pub const REGISTER_SPACE_START: u16 = 0x4000;

/// Busy flags
pub const BUSY_STS: u16 = 0x4000;
/// Interrupt status, cleared by reading
pub const INT_STS: u16 = 0x4001;
/// Interrupt enable
pub const INT_EN: u16 = 0x4002;
/// ECC key slot for the next computation
pub const KEY_SLOT: u16 = 0x4003;
/// Write a user page index to lock it
pub const NVM_LOCK_SET: u16 = 0x4010;
/// First of the eight user page lock status registers
pub const USER_NVM_LOCK_STS: u16 = 0x4020;
/// Number of user page lock status registers
pub const USER_NVM_LOCK_REGS: usize = 8;
/// Life-span counter enabled/locked flags
pub const LSC_FEAT_STS: u16 = 0x4028;
/// Kill status
pub const LSC_KILL_ACT_STS: u16 = 0x4029;
/// Life-span counter decrement control; a bit stays set while active
pub const LSC_CTRL: u16 = 0x402A;
/// Device feature configuration
pub const DEVICE_CFG: u16 = 0x4030;
/// Number of user NVM pages
pub const NVM_SIZE: u16 = 0x4031;
/// Number of ECC key pairs
pub const ECC_KEY_COUNT: u16 = 0x4032;
/// Session device address, high byte
pub const DEVICE_ADDRESS_HI: u16 = 0x4034;
/// Session device address, low byte
pub const DEVICE_ADDRESS_LO: u16 = 0x4035;
/// First of the twelve UID registers
pub const UID_REG: u16 = 0x4050;

/// `BUSY_STS` bits
pub mod busy {
    pub const NVM: u8 = 1 << 0;
    pub const AUTH_MAC: u8 = 1 << 1;
    pub const RANDOM_NUMBER: u8 = 1 << 2;
    pub const ECC: u8 = 1 << 3;
}

/// `INT_STS` / `INT_EN` bits
pub mod int {
    pub const ECC_DONE: u8 = 1 << 0;
}

/// `DEVICE_CFG` bits
pub mod device_cfg {
    pub const HOST_AUTH: u8 = 1 << 0;
    pub const KILL: u8 = 1 << 1;
    pub const AUTO_KILL: u8 = 1 << 2;
    pub const NVM_UNLOCK: u8 = 1 << 3;
}

/// Session address every device answers to after reset
pub const DEFAULT_DEVICE_ADDRESS: u16 = 0x0000;

/// Check that `[address, address + len)` is a valid transfer
fn check_range(address: u16, len: usize) -> Result<(), Error> {
    if len == 0 {
        return Err(ExecutionError::InvalidParameter.into());
    }
    let end = address as usize + len;
    let limit = if address < REGISTER_SPACE_START {
        REGISTER_SPACE_START as usize
    } else {
        u16::MAX as usize + 1
    };
    if end > limit {
        return Err(ExecutionError::InvalidParameter.into());
    }
    Ok(())
}

impl<P: Phy> Bus<P> {
    /// Read `buf.len()` bytes starting at `address`
    pub fn read_register(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Error> {
        check_range(address, buf.len())?;

        if address >= REGISTER_SPACE_START {
            for (i, byte) in buf.iter_mut().enumerate() {
                self.set_register_address(address + i as u16)?;
                self.read_data(core::slice::from_mut(byte))?;
            }
            return Ok(());
        }

        let mut offset = 0;
        for chunk in buf.chunks_mut(MAX_BURST) {
            self.set_register_address(address + offset as u16)?;
            self.set_burst_length(chunk.len())?;
            self.read_data(chunk)?;
            offset += chunk.len();
        }
        Ok(())
    }

    /// Read a single register
    pub fn read_u8(&mut self, address: u16) -> Result<u8, Error> {
        let mut value = 0u8;
        self.read_register(address, core::slice::from_mut(&mut value))?;
        Ok(value)
    }

    /// Write `data` starting at `address`
    ///
    /// NVM-space writes go out as one transaction per block of up to
    /// [`MAX_WRITE`] bytes; completion polling is the caller's job.
    pub fn write_register(&mut self, address: u16, data: &[u8]) -> Result<(), Error> {
        check_range(address, data.len())?;

        if address >= REGISTER_SPACE_START {
            for (i, &byte) in data.iter().enumerate() {
                self.set_register_address(address + i as u16)?;
                self.write_data(&[byte])?;
            }
            return Ok(());
        }

        let mut offset = 0;
        for chunk in data.chunks(MAX_WRITE) {
            self.set_register_address(address + offset as u16)?;
            self.write_data(chunk)?;
            offset += chunk.len();
        }
        Ok(())
    }

    /// Write a single register
    pub fn write_u8(&mut self, address: u16, value: u8) -> Result<(), Error> {
        self.write_register(address, &[value])
    }

    /// Whether any of `mask` is set in `BUSY_STS`
    pub fn is_busy(&mut self, mask: u8) -> Result<bool, Error> {
        Ok(self.read_u8(BUSY_STS)? & mask != 0)
    }
}
