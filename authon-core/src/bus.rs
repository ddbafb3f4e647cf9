//! Bus command layer
//!
//! Named primitives over [`Phy`]: each builds a [`Transaction`], exchanges
//! it and checks the CRC trailer of the response.

use authon_protocol::command::{ECC_CHALLENGE_LEN, ECC_RESPONSE_LEN, HOST_AUTH_LEN, MAC_LEN};
use authon_protocol::{Opcode, Transaction, CRC_LEN, MAX_BURST};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::status::{Error, ExecutionError};
use crate::traits::phy::{Interrupt, Phy, WaitMode};

/// Largest register address that fits a short address word
pub const SHORT_ADDRESS_MAX: u16 = 0xFF;

/// Operation selector of a MAC-protected maintenance command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MacOperation {
    /// Clear every user NVM lock bit
    NvmUnlock = 0x01,
    /// Permanently disable the device
    Kill = 0x02,
}

/// MACR result meaning the device accepted the MAC
pub const MAC_ACCEPTED: u8 = 0x00;

/// Bound on a busy poll
///
/// A poll stops after `attempts` checks or once the time slept between
/// checks reaches `attempts * interval_us` on the monotonic clock,
/// whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PollBudget {
    pub attempts: u16,
    pub interval_us: u32,
}

impl PollBudget {
    pub const fn new(attempts: u16, interval_us: u32) -> Self {
        Self {
            attempts,
            interval_us,
        }
    }

    /// Total time the poll may sleep
    pub fn deadline_us(&self) -> u64 {
        self.attempts as u64 * self.interval_us as u64
    }
}

/// Command primitives over one wire
pub struct Bus<P: Phy> {
    phy: P,
}

impl<P: Phy> Bus<P> {
    pub fn new(phy: P) -> Self {
        Self { phy }
    }

    /// Direct access to the physical layer
    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Give the physical layer back
    pub fn into_inner(self) -> P {
        self.phy
    }

    /// Exchange a transaction, copying the checked response into `out`
    fn transact(&mut self, tx: Transaction, out: &mut [u8]) -> Result<(), Error> {
        let tx = tx.finish()?;
        let len = tx.response_len();
        let expected = len.saturating_sub(CRC_LEN);
        let mut buf = [0u8; MAX_BURST + CRC_LEN];
        if len > buf.len() || out.len() != expected {
            return Err(ExecutionError::InvalidParameter.into());
        }

        self.phy.exchange(tx.words(), &mut buf[..len])?;
        let payload = tx.check_response(&buf[..len]).map_err(|e| {
            warn!("crc mismatch on opcode {=u8:#x}", tx.words()[0].payload);
            Error::from(e)
        })?;
        out.copy_from_slice(payload);
        Ok(())
    }

    fn command(&mut self, opcode: Opcode) -> Result<(), Error> {
        self.transact(Transaction::new(opcode), &mut [])
    }

    /// Bus reset; every device becomes addressed
    pub fn bus_reset(&mut self) -> Result<(), Error> {
        self.command(Opcode::Bres)
    }

    /// Power down the bus and hold the line low
    pub fn power_down(&mut self, hold_us: u32) -> Result<(), Error> {
        let result = self.command(Opcode::Pdwn);
        self.phy.power_down(hold_us);
        result
    }

    /// Release the line and let devices power up
    pub fn power_up(&mut self, hold_us: u32) {
        self.phy.power_up(hold_us);
    }

    /// Start a search; every device becomes a candidate
    pub fn start_search(&mut self) -> Result<(), Error> {
        self.command(Opcode::Diss)
    }

    /// Ask whether any candidate has `bit` at the current position
    pub fn probe(&mut self, bit: bool) -> Result<bool, Error> {
        self.command(Opcode::probe(bit))?;
        Ok(self.phy.wait_interrupt(WaitMode::Immediate) == Interrupt::Received)
    }

    /// Keep only candidates with `bit` at the current position
    pub fn enter(&mut self, bit: bool) -> Result<(), Error> {
        self.command(Opcode::enter(bit))
    }

    /// Address the device with this session address
    pub fn select_address(&mut self, address: u16) -> Result<(), Error> {
        let [hi, lo] = address.to_be_bytes();
        let tx = if address <= SHORT_ADDRESS_MAX {
            Transaction::new(Opcode::Sda).address(lo)?
        } else {
            Transaction::new(Opcode::Eda).address(hi)?.address(lo)?
        };
        self.transact(tx, &mut [])
    }

    /// Point the addressed device at a register
    pub fn set_register_address(&mut self, address: u16) -> Result<(), Error> {
        let [hi, lo] = address.to_be_bytes();
        let tx = if address <= SHORT_ADDRESS_MAX {
            Transaction::new(Opcode::Sra).address(lo)?
        } else {
            Transaction::new(Opcode::Era).address(hi)?.address(lo)?
        };
        self.transact(tx, &mut [])
    }

    /// Set the burst length for reads from NVM space
    pub fn set_burst_length(&mut self, len: usize) -> Result<(), Error> {
        if len == 0 || len > MAX_BURST {
            return Err(ExecutionError::InvalidParameter.into());
        }
        // 256 wraps to 0 on the wire
        let tx = Transaction::new(Opcode::Rbl).data(&[len as u8])?;
        self.transact(tx, &mut [])
    }

    /// Read `buf.len()` bytes from the current register address
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() || buf.len() > MAX_BURST {
            return Err(ExecutionError::InvalidParameter.into());
        }
        self.transact(Transaction::new(Opcode::Rd).read(buf.len()), buf)
    }

    /// Write bytes at the current register address
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(ExecutionError::InvalidParameter.into());
        }
        let tx = Transaction::new(Opcode::Wd).data(data)?;
        self.transact(tx, &mut [])
    }

    /// Start a MAC-protected maintenance operation
    pub fn mac_start(&mut self, op: MacOperation, mac: &[u8; MAC_LEN]) -> Result<(), Error> {
        let tx = Transaction::new(Opcode::Macs).data(&[op as u8])?.data(mac)?;
        self.transact(tx, &mut [])
    }

    /// Result of the last maintenance operation
    pub fn mac_result(&mut self) -> Result<u8, Error> {
        let mut result = [0u8; 1];
        self.transact(Transaction::new(Opcode::Macr).read(1), &mut result)?;
        Ok(result[0])
    }

    /// Start an ECC computation over `challenge`
    pub fn ecc_start(&mut self, challenge: &[u8; ECC_CHALLENGE_LEN]) -> Result<(), Error> {
        let tx = Transaction::new(Opcode::Eccs).data(challenge)?;
        self.transact(tx, &mut [])
    }

    /// Read the ECC response
    pub fn ecc_result(&mut self) -> Result<[u8; ECC_RESPONSE_LEN], Error> {
        let mut response = [0u8; ECC_RESPONSE_LEN];
        self.transact(
            Transaction::new(Opcode::Eccr).read(ECC_RESPONSE_LEN),
            &mut response,
        )?;
        Ok(response)
    }

    /// Read the device nonce of a host authentication
    pub fn host_auth_nonce_a(&mut self) -> Result<[u8; HOST_AUTH_LEN], Error> {
        let mut nonce = [0u8; HOST_AUTH_LEN];
        self.transact(Transaction::new(Opcode::Hana).read(HOST_AUTH_LEN), &mut nonce)?;
        Ok(nonce)
    }

    /// Send the host nonce
    pub fn host_auth_nonce_b(&mut self, nonce: &[u8; HOST_AUTH_LEN]) -> Result<(), Error> {
        let tx = Transaction::new(Opcode::Hanb).data(nonce)?;
        self.transact(tx, &mut [])
    }

    /// Send the host tag
    pub fn host_auth_tag_a(&mut self, tag: &[u8; HOST_AUTH_LEN]) -> Result<(), Error> {
        let tx = Transaction::new(Opcode::Hata).data(tag)?;
        self.transact(tx, &mut [])
    }

    /// Read the device tag
    pub fn host_auth_tag_b(&mut self) -> Result<[u8; HOST_AUTH_LEN], Error> {
        let mut tag = [0u8; HOST_AUTH_LEN];
        self.transact(Transaction::new(Opcode::Hatb).read(HOST_AUTH_LEN), &mut tag)?;
        Ok(tag)
    }

    /// Look for a device interrupt pulse
    pub fn wait_interrupt(&mut self, mode: WaitMode) -> Interrupt {
        self.phy.wait_interrupt(mode)
    }

    /// Abort a device's interrupt wait
    pub fn abort_interrupt(&mut self) {
        self.phy.abort_interrupt();
    }

    pub fn delay_us(&mut self, us: u32) {
        self.phy.delay_us(us);
    }

    /// Repeat `ready` until it reports true or the budget runs out
    ///
    /// Returns `false` on exhaustion. A failed check counts as not ready.
    /// Time spent inside `ready` is not charged to the deadline, so the
    /// attempt count stays the binding limit while sleeps keep to schedule.
    pub fn poll_until<F>(&mut self, budget: PollBudget, mut ready: F) -> bool
    where
        F: FnMut(&mut Self) -> Result<bool, Error>,
    {
        let start = self.phy.now_us();
        let mut checking_us = 0u64;

        for attempt in 0..budget.attempts {
            let before = self.phy.now_us();
            let result = ready(self);
            checking_us += self.phy.now_us().saturating_sub(before);
            match result {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    trace!("poll read failed: {}", e);
                }
            }

            let slept_us = self.phy.now_us().saturating_sub(start + checking_us);
            if attempt + 1 == budget.attempts || slept_us >= budget.deadline_us() {
                break;
            }
            self.phy.delay_us(budget.interval_us);
        }

        debug!("poll budget exhausted after {=u16} attempts", budget.attempts);
        false
    }
}
