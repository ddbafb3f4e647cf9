//! Life-span counters
//!
//! Two decrement-only 32-bit counters live in reserved system pages. The
//! device decrements a counter when its bit is written to `LSC_CTRL`; the
//! bit reads back set until the decrement has been committed.

use crate::bus::{Bus, PollBudget};
use crate::nvm::{page_address, LSC_PAGES, PAGE_SIZE};
use crate::register::{busy, LSC_CTRL, LSC_FEAT_STS};
use crate::status::{Error, LscError};
use crate::traits::phy::Phy;

/// One of the two counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LscCounter {
    First,
    Second,
}

impl LscCounter {
    /// Counter from its index (0 or 1)
    pub fn from_index(index: u8) -> Result<Self, LscError> {
        match index {
            0 => Ok(LscCounter::First),
            1 => Ok(LscCounter::Second),
            _ => Err(LscError::InvalidCounter),
        }
    }

    pub fn index(self) -> usize {
        match self {
            LscCounter::First => 0,
            LscCounter::Second => 1,
        }
    }

    /// Bit in `LSC_CTRL` and `LSC_FEAT_STS`
    pub fn bit(self) -> u8 {
        1 << self.index()
    }

    /// System page holding the counter value
    pub fn page(self) -> u8 {
        LSC_PAGES[self.index()]
    }
}

/// Counter operations on the addressed device
pub struct Lsc<'a, P: Phy> {
    bus: &'a mut Bus<P>,
    nvm_poll: PollBudget,
    lsc_poll: PollBudget,
}

impl<'a, P: Phy> Lsc<'a, P> {
    pub fn new(bus: &'a mut Bus<P>, nvm_poll: PollBudget, lsc_poll: PollBudget) -> Self {
        Self {
            bus,
            nvm_poll,
            lsc_poll,
        }
    }

    /// Current counter value
    pub fn value(&mut self, counter: LscCounter) -> Result<u32, Error> {
        let mut raw = [0u8; PAGE_SIZE];
        self.bus.read_register(page_address(counter.page()), &mut raw)?;
        Ok(u32::from_be_bytes(raw))
    }

    /// Whether the counter is enabled and locked against re-programming
    pub fn is_locked(&mut self, counter: LscCounter) -> Result<bool, Error> {
        Ok(self.bus.read_u8(LSC_FEAT_STS)? & counter.bit() != 0)
    }

    /// Decrement by one and wait for the device to commit it
    pub fn decrement(&mut self, counter: LscCounter) -> Result<(), Error> {
        let bit = counter.bit();
        self.bus.write_u8(LSC_CTRL, bit)?;
        if self
            .bus
            .poll_until(self.lsc_poll, |bus| Ok(bus.read_u8(LSC_CTRL)? & bit == 0))
        {
            Ok(())
        } else {
            Err(LscError::Timeout.into())
        }
    }

    /// Program a new counter value
    ///
    /// Refused while the counter is enabled/locked.
    pub fn program(&mut self, counter: LscCounter, value: u32) -> Result<(), Error> {
        if self.is_locked(counter)? {
            warn!("counter {} is locked", counter);
            return Err(LscError::Locked.into());
        }

        self.bus
            .write_register(page_address(counter.page()), &value.to_be_bytes())?;
        if self
            .bus
            .poll_until(self.nvm_poll, |bus| Ok(!bus.is_busy(busy::NVM)?))
        {
            Ok(())
        } else {
            Err(LscError::Timeout.into())
        }
    }
}
