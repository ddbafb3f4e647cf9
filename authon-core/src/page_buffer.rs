//! Host-side copy of user NVM
//!
//! A [`PageBuffer`] is filled once from the device with
//! [`Nvm::load_buffer`](crate::nvm::Nvm::load_buffer). Writes then land in
//! the buffer and mark the pages they touch dirty, and
//! [`Nvm::sync`](crate::nvm::Nvm::sync) programs only the dirty pages.
//! Locked pages are skipped and reported, not treated as failures.

use crate::capability::MAX_USER_PAGES;
use crate::nvm::PAGE_SIZE;
use crate::status::{Error, NvmError};

const BUFFER_LEN: usize = MAX_USER_PAGES as usize * PAGE_SIZE;

/// Outcome of the last sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncStatus {
    /// No sync since the buffer was loaded
    #[default]
    Idle,
    /// A sync started and has not finished
    InProgress,
    Success,
    /// A page failed to program; its dirty bit and later ones are kept
    Failure,
}

/// Pages a sync programmed or passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncReport {
    pub written: u8,
    /// Dirty pages dropped because the device has them locked
    pub skipped_locked: u8,
}

/// Cached user pages with one dirty bit each
pub struct PageBuffer {
    data: [u8; BUFFER_LEN],
    dirty: u64,
    pages: u8,
    status: SyncStatus,
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBuffer {
    /// An empty buffer; reads and writes fail until it is loaded
    pub const fn new() -> Self {
        Self {
            data: [0; BUFFER_LEN],
            dirty: 0,
            pages: 0,
            status: SyncStatus::Idle,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.pages > 0
    }

    /// Number of cached pages
    pub fn pages(&self) -> u8 {
        self.pages
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_dirty(&self, page: u8) -> bool {
        page < MAX_USER_PAGES && self.dirty & (1 << page) != 0
    }

    pub fn has_dirty(&self) -> bool {
        self.dirty != 0
    }

    /// Byte range for `len` bytes at `offset` within `page`
    fn span(&self, page: u8, offset: usize, len: usize) -> Result<(usize, usize), Error> {
        if !self.is_loaded() {
            return Err(NvmError::BufferNotLoaded.into());
        }
        let start = page as usize * PAGE_SIZE + offset;
        let end = start + len;
        if page >= self.pages || end > self.pages as usize * PAGE_SIZE {
            return Err(NvmError::OutOfRange.into());
        }
        Ok((start, end))
    }

    /// Copy cached bytes starting `offset` bytes into `page`
    pub fn read(&self, page: u8, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        let (start, end) = self.span(page, offset, buf.len())?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    /// Update cached bytes starting `offset` bytes into `page`
    ///
    /// The write may cross page boundaries; every page it touches is
    /// marked dirty.
    pub fn write(&mut self, page: u8, offset: usize, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(NvmError::InvalidLength.into());
        }
        let (start, end) = self.span(page, offset, data.len())?;
        self.data[start..end].copy_from_slice(data);
        for p in start / PAGE_SIZE..=(end - 1) / PAGE_SIZE {
            self.dirty |= 1 << p;
        }
        Ok(())
    }

    /// Replace the contents with `pages` pages freshly read from the device
    pub(crate) fn fill(&mut self, pages: u8) -> &mut [u8] {
        self.pages = pages.min(MAX_USER_PAGES);
        self.dirty = 0;
        self.status = SyncStatus::Idle;
        &mut self.data[..self.pages as usize * PAGE_SIZE]
    }

    /// Forget the contents after a failed load
    pub(crate) fn clear(&mut self) {
        self.pages = 0;
        self.dirty = 0;
    }

    pub(crate) fn page(&self, page: u8) -> &[u8] {
        let start = page as usize * PAGE_SIZE;
        &self.data[start..start + PAGE_SIZE]
    }

    pub(crate) fn mark_clean(&mut self, page: u8) {
        self.dirty &= !(1 << page);
    }

    pub(crate) fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
    }
}
