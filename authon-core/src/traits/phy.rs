//! Physical layer trait

use authon_protocol::{TimingError, WireWord, WordError};

/// Errors from one exchange on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyError {
    /// No edge within the response or edge timeout
    Timeout,
    /// Training intervals did not decode as `0`,`1`
    Training,
    /// Parity check failed
    Parity,
    /// Device data arrived without ACK (raw byte kept for diagnostics)
    Acknowledge(u8),
    /// Training bits missing from a decoded word
    Framing,
    /// An interval fell outside both bit buckets
    Timing,
}

impl PhyError {
    pub fn code(self) -> u8 {
        match self {
            PhyError::Timeout => 0x01,
            PhyError::Training => 0x02,
            PhyError::Parity => 0x03,
            PhyError::Acknowledge(_) => 0x04,
            PhyError::Framing => 0x05,
            PhyError::Timing => 0x06,
        }
    }
}

impl From<WordError> for PhyError {
    fn from(e: WordError) -> Self {
        match e {
            WordError::Framing => PhyError::Framing,
            WordError::Parity => PhyError::Parity,
            WordError::Acknowledge(byte) => PhyError::Acknowledge(byte),
        }
    }
}

impl From<TimingError> for PhyError {
    fn from(e: TimingError) -> Self {
        match e {
            TimingError::Training => PhyError::Training,
            TimingError::OutOfBucket(_) | TimingError::Degenerate => PhyError::Timing,
        }
    }
}

/// How to look for a device interrupt pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    /// Keep sampling until a pulse or the timeout
    Poll { timeout_us: u32 },
    /// Check once
    Immediate,
}

/// Outcome of an interrupt wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    Received,
    None,
}

/// Bit-level access to one single-wire bus
///
/// Implementations own the line and a time source. Every exchange must run
/// with interrupts and preemption disabled from the first edge to the last.
pub trait Phy {
    /// Send `tx` and then receive `rx.len()` device words
    ///
    /// Each received word must decode with the ACK class; its payload is
    /// stored in `rx`. Any fault fails the whole exchange.
    fn exchange(&mut self, tx: &[WireWord], rx: &mut [u8]) -> Result<(), PhyError>;

    /// Look for an interrupt pulse from the device
    fn wait_interrupt(&mut self, mode: WaitMode) -> Interrupt;

    /// Terminate a device's interrupt wait with an abort pulse
    fn abort_interrupt(&mut self);

    /// Drive the line low and hold it for `hold_us`
    fn power_down(&mut self, hold_us: u32);

    /// Release the line high and hold it for `hold_us`
    fn power_up(&mut self, hold_us: u32);

    /// Block for `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Monotonic time in microseconds
    fn now_us(&mut self) -> u64;
}
