//! Page-oriented NVM access
//!
//! NVM is addressed in 4-byte pages. User pages `0..nvm_pages` carry a
//! lock bit each; system pages from [`SYSTEM_PAGE_START`] hold the ECC
//! certificates and the life-span counters and have no lock bit.
//!
//! A write checks every target user page for a lock before touching
//! anything. Programming then proceeds block by block with a busy poll
//! after each block, so a timeout mid-way leaves the earlier blocks
//! written.
//!
//! For read-modify-write use, [`Nvm::load_buffer`] caches the user pages
//! in a [`PageBuffer`] and [`Nvm::sync`] writes back the dirty ones.

use authon_protocol::command::MAC_LEN;

use crate::bus::{Bus, MacOperation, PollBudget, MAC_ACCEPTED};
use crate::capability::DeviceFeatures;
use crate::page_buffer::{PageBuffer, SyncReport, SyncStatus};
use crate::register::{
    busy, LSC_FEAT_STS, LSC_KILL_ACT_STS, NVM_LOCK_SET, USER_NVM_LOCK_REGS, USER_NVM_LOCK_STS,
};
use crate::status::{Error, NvmError};
use crate::traits::phy::Phy;

/// Bytes per page
pub const PAGE_SIZE: usize = 4;

/// Bytes per user-page program block
pub const BLOCK_SIZE: usize = 16;

/// First reserved system page
pub const SYSTEM_PAGE_START: u8 = 0x80;

/// One past the last system page
pub const SYSTEM_PAGE_END: u8 = 0xA6;

/// Attempts per register read when taking a [`LockStatus`] snapshot
pub const LOCK_STATUS_RETRIES: u8 = 10;

/// Life-span counter pages
pub const LSC_PAGES: [u8; 2] = [0xA4, 0xA5];

/// Byte address of a page
pub fn page_address(page: u8) -> u16 {
    page as u16 * PAGE_SIZE as u16
}

/// Lock and counter state of the addressed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LockStatus {
    /// One bit per user page, eight pages per register
    pub user_locks: [u8; USER_NVM_LOCK_REGS],
    /// Life-span counter enabled/locked flags
    pub lsc_features: u8,
    pub kill: u8,
    pub counters: [u32; 2],
}

impl LockStatus {
    pub fn is_page_locked(&self, page: u8) -> bool {
        let reg = page as usize / 8;
        reg < USER_NVM_LOCK_REGS && self.user_locks[reg] & (1 << (page % 8)) != 0
    }

    pub fn locked_pages(&self) -> u32 {
        self.user_locks.iter().map(|r| r.count_ones()).sum()
    }
}

/// NVM operations on the addressed device
pub struct Nvm<'a, P: Phy> {
    bus: &'a mut Bus<P>,
    user_pages: u8,
    features: DeviceFeatures,
    nvm_poll: PollBudget,
    mac_poll: PollBudget,
}

impl<'a, P: Phy> Nvm<'a, P> {
    pub fn new(
        bus: &'a mut Bus<P>,
        user_pages: u8,
        features: DeviceFeatures,
        nvm_poll: PollBudget,
        mac_poll: PollBudget,
    ) -> Self {
        Self {
            bus,
            user_pages,
            features,
            nvm_poll,
            mac_poll,
        }
    }

    /// Validate a page range, returning the page count
    fn check_pages(&self, page: u8, len: usize) -> Result<usize, Error> {
        if len == 0 || len % PAGE_SIZE != 0 {
            return Err(NvmError::InvalidLength.into());
        }
        let pages = len / PAGE_SIZE;
        let limit = if page >= SYSTEM_PAGE_START {
            SYSTEM_PAGE_END
        } else {
            self.user_pages
        };
        if page as usize + pages > limit as usize {
            return Err(NvmError::OutOfRange.into());
        }
        Ok(pages)
    }

    /// Read whole pages starting at `page`
    pub fn read(&mut self, page: u8, buf: &mut [u8]) -> Result<(), Error> {
        self.check_pages(page, buf.len())?;
        self.bus.read_register(page_address(page), buf)
    }

    /// Whether a user page is locked
    pub fn is_locked(&mut self, page: u8) -> Result<bool, Error> {
        if page >= self.user_pages {
            return Err(NvmError::OutOfRange.into());
        }
        let reg = self.bus.read_u8(USER_NVM_LOCK_STS + page as u16 / 8)?;
        Ok(reg & (1 << (page % 8)) != 0)
    }

    /// First locked page in `[page, page + count)`, reading each lock
    /// register once
    fn first_locked(&mut self, page: u8, count: usize) -> Result<Option<u8>, Error> {
        let end = page as usize + count;
        let mut reg_index = usize::MAX;
        let mut reg = 0u8;
        for p in page as usize..end {
            if p / 8 != reg_index {
                reg_index = p / 8;
                reg = self.bus.read_u8(USER_NVM_LOCK_STS + reg_index as u16)?;
            }
            if reg & (1 << (p % 8)) != 0 {
                return Ok(Some(p as u8));
            }
        }
        Ok(None)
    }

    fn wait_ready(&mut self) -> Result<(), Error> {
        if self
            .bus
            .poll_until(self.nvm_poll, |bus| Ok(!bus.is_busy(busy::NVM)?))
        {
            Ok(())
        } else {
            Err(NvmError::Timeout.into())
        }
    }

    /// Write whole pages starting at `page`
    ///
    /// Fails with [`NvmError::PageLocked`] without writing anything if any
    /// target user page is locked. A [`NvmError::Timeout`] leaves the
    /// blocks before it programmed.
    pub fn write(&mut self, page: u8, data: &[u8]) -> Result<(), Error> {
        let pages = self.check_pages(page, data.len())?;
        let user = page < SYSTEM_PAGE_START;

        if user {
            if let Some(locked) = self.first_locked(page, pages)? {
                warn!("write refused, page {=u8} is locked", locked);
                return Err(NvmError::PageLocked.into());
            }
        }

        let base = page_address(page);
        let mut offset = 0;
        while offset < data.len() {
            let remaining = data.len() - offset;
            let block = if user && remaining >= BLOCK_SIZE {
                BLOCK_SIZE
            } else {
                PAGE_SIZE
            };

            self.bus
                .write_register(base + offset as u16, &data[offset..offset + block])?;
            self.wait_ready().map_err(|e| {
                error!("programming stalled at offset {=usize}", offset);
                e
            })?;
            offset += block;
        }
        Ok(())
    }

    /// Fill `buffer` with every user page of the device
    pub fn load_buffer(&mut self, buffer: &mut PageBuffer) -> Result<(), Error> {
        let pages = self.user_pages;
        let result = self.bus.read_register(0, buffer.fill(pages));
        if result.is_err() {
            buffer.clear();
        }
        result
    }

    /// Program the dirty pages of `buffer`, in page order
    ///
    /// Locked pages are logged, dropped from the dirty set and counted in
    /// the report. Any other failure stops the sync with
    /// [`SyncStatus::Failure`], keeping the dirty bits of the pages not yet
    /// written.
    pub fn sync(&mut self, buffer: &mut PageBuffer) -> Result<SyncReport, Error> {
        if !buffer.is_loaded() {
            return Err(NvmError::BufferNotLoaded.into());
        }
        buffer.set_status(SyncStatus::InProgress);

        let mut report = SyncReport::default();
        for page in 0..buffer.pages().min(self.user_pages) {
            if !buffer.is_dirty(page) {
                continue;
            }
            let result = match self.first_locked(page, 1) {
                Ok(Some(_)) => {
                    warn!("sync skipped locked page {=u8}", page);
                    buffer.mark_clean(page);
                    report.skipped_locked += 1;
                    continue;
                }
                Ok(None) => self.write(page, buffer.page(page)),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!("sync failed at page {=u8}: {}", page, e);
                buffer.set_status(SyncStatus::Failure);
                return Err(e);
            }
            buffer.mark_clean(page);
            report.written += 1;
        }

        debug!(
            "sync wrote {=u8} page(s), skipped {=u8} locked",
            report.written,
            report.skipped_locked
        );
        buffer.set_status(SyncStatus::Success);
        Ok(report)
    }

    /// Permanently lock a user page
    pub fn lock_page(&mut self, page: u8) -> Result<(), Error> {
        if page >= self.user_pages {
            return Err(NvmError::OutOfRange.into());
        }
        self.bus.write_u8(NVM_LOCK_SET, page)?;
        self.wait_ready()
    }

    /// Clear every user page lock with the reset-password MAC
    pub fn unlock(&mut self, mac: &[u8; MAC_LEN]) -> Result<(), Error> {
        if !self.features.nvm_unlock {
            return Err(NvmError::FeatureDisabled.into());
        }

        self.bus.mac_start(MacOperation::NvmUnlock, mac)?;
        if !self
            .bus
            .poll_until(self.mac_poll, |bus| Ok(!bus.is_busy(busy::AUTH_MAC)?))
        {
            return Err(NvmError::Timeout.into());
        }
        if self.bus.mac_result()? != MAC_ACCEPTED {
            return Err(NvmError::UnlockRejected.into());
        }

        for i in 0..USER_NVM_LOCK_REGS {
            if self.bus.read_u8(USER_NVM_LOCK_STS + i as u16)? != 0 {
                warn!("lock register {=usize} still set after unlock", i);
                return Err(NvmError::PartialUnlock.into());
            }
        }
        info!("nvm unlocked");
        Ok(())
    }

    fn read_retry(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Error> {
        let mut last = Ok(());
        for _ in 0..LOCK_STATUS_RETRIES {
            last = self.bus.read_register(address, buf);
            if last.is_ok() {
                break;
            }
        }
        last
    }

    /// Snapshot of lock bits, counter flags and counters
    pub fn lock_status(&mut self) -> Result<LockStatus, Error> {
        let mut status = LockStatus::default();

        for i in 0..USER_NVM_LOCK_REGS {
            let mut reg = [0u8; 1];
            self.read_retry(USER_NVM_LOCK_STS + i as u16, &mut reg)?;
            status.user_locks[i] = reg[0];
        }

        let mut reg = [0u8; 1];
        self.read_retry(LSC_FEAT_STS, &mut reg)?;
        status.lsc_features = reg[0];
        self.read_retry(LSC_KILL_ACT_STS, &mut reg)?;
        status.kill = reg[0];

        for (counter, &page) in status.counters.iter_mut().zip(LSC_PAGES.iter()) {
            let mut raw = [0u8; PAGE_SIZE];
            self.read_retry(page_address(page), &mut raw)?;
            *counter = u32::from_be_bytes(raw);
        }

        Ok(status)
    }
}
