//! Layered status codes
//!
//! Every failure maps to a 16-bit status: the layer in the top nibble and a
//! condition in the low byte. `0x0000` is success in every layer.
//!
//! | Layer | Nibble |
//! |-------|--------|
//! | SDK | 1 |
//! | Execution | 2 |
//! | Host authentication | 3 |
//! | ECC | 4 |
//! | Life-span counter | 5 |
//! | NVM | 6 |
//! | CRC | 7 |
//! | Search | 8 |
//! | Physical layer | 9 |

use authon_protocol::FrameError;

pub use crate::traits::phy::PhyError;

/// Status value for success
pub const STATUS_OK: u16 = 0x0000;

/// Layer that produced a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Layer {
    Sdk = 1,
    Execution = 2,
    HostAuth = 3,
    Ecc = 4,
    Lsc = 5,
    Nvm = 6,
    Crc = 7,
    Search = 8,
    Phy = 9,
}

impl Layer {
    /// Layer from the top nibble of a status
    pub fn from_status(status: u16) -> Option<Self> {
        match status >> 12 {
            1 => Some(Layer::Sdk),
            2 => Some(Layer::Execution),
            3 => Some(Layer::HostAuth),
            4 => Some(Layer::Ecc),
            5 => Some(Layer::Lsc),
            6 => Some(Layer::Nvm),
            7 => Some(Layer::Crc),
            8 => Some(Layer::Search),
            9 => Some(Layer::Phy),
            _ => None,
        }
    }
}

/// Session lifecycle and configuration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdkError {
    /// Operation needs a successful `init` first
    NotInitialized,
    /// Enumeration failed on every init attempt
    InitFailed,
    /// Configuration rejected
    Config,
}

impl SdkError {
    pub fn code(self) -> u8 {
        match self {
            SdkError::NotInitialized => 0x01,
            SdkError::InitFailed => 0x02,
            SdkError::Config => 0x03,
        }
    }
}

/// Argument and maintenance command failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecutionError {
    /// Empty buffer, bad address range or oversize transfer
    InvalidParameter,
    /// Device rejected a MAC-protected operation
    MacRejected,
    /// Device does not support the requested feature
    FeatureDisabled,
}

impl ExecutionError {
    pub fn code(self) -> u8 {
        match self {
            ExecutionError::InvalidParameter => 0x01,
            ExecutionError::MacRejected => 0x02,
            ExecutionError::FeatureDisabled => 0x03,
        }
    }
}

/// Host authentication failures, one per step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostAuthError {
    GetNonceA,
    SendNonceB,
    SendTagA,
    GetTagB,
    /// Step called out of order or after a failed step
    OutOfSequence,
    /// Device does not support host authentication
    NotSupported,
    /// Device tag differs from the expected tag
    TagMismatch,
}

impl HostAuthError {
    pub fn code(self) -> u8 {
        match self {
            HostAuthError::GetNonceA => 0x01,
            HostAuthError::SendNonceB => 0x02,
            HostAuthError::SendTagA => 0x03,
            HostAuthError::GetTagB => 0x04,
            HostAuthError::OutOfSequence => 0x05,
            HostAuthError::NotSupported => 0x06,
            HostAuthError::TagMismatch => 0x07,
        }
    }
}

/// ECC challenge/response and kill failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EccError {
    /// Key slot beyond the device's key count
    InvalidKeySlot,
    /// Computation did not finish within its budget
    Timeout,
    /// No done interrupt and no done flag
    NoInterrupt,
    /// Device does not support the kill operation
    KillDisabled,
    /// Host-side verification of the response failed
    VerifyFailed,
}

impl EccError {
    pub fn code(self) -> u8 {
        match self {
            EccError::InvalidKeySlot => 0x01,
            EccError::Timeout => 0x02,
            EccError::NoInterrupt => 0x03,
            EccError::KillDisabled => 0x04,
            EccError::VerifyFailed => 0x05,
        }
    }
}

/// Life-span counter failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LscError {
    /// Counter index other than 0 or 1
    InvalidCounter,
    /// Counter is enabled/locked and cannot be re-programmed
    Locked,
    /// Decrement did not complete within its budget
    Timeout,
}

impl LscError {
    pub fn code(self) -> u8 {
        match self {
            LscError::InvalidCounter => 0x01,
            LscError::Locked => 0x02,
            LscError::Timeout => 0x03,
        }
    }
}

/// NVM failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvmError {
    /// Page range beyond the device's pages
    OutOfRange,
    /// A target page is locked; nothing was written
    PageLocked,
    /// Programming did not complete within its budget
    Timeout,
    /// Global unlock not enabled on this device
    FeatureDisabled,
    /// Unlock accepted but some lock bits remain set
    PartialUnlock,
    /// Unlock MAC rejected
    UnlockRejected,
    /// Length is zero or not a whole number of pages
    InvalidLength,
    /// Page buffer used before it was loaded from the device
    BufferNotLoaded,
}

impl NvmError {
    pub fn code(self) -> u8 {
        match self {
            NvmError::OutOfRange => 0x01,
            NvmError::PageLocked => 0x02,
            NvmError::Timeout => 0x03,
            NvmError::FeatureDisabled => 0x04,
            NvmError::PartialUnlock => 0x05,
            NvmError::UnlockRejected => 0x06,
            NvmError::InvalidLength => 0x07,
            NvmError::BufferNotLoaded => 0x08,
        }
    }
}

/// Enumeration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchError {
    /// No device answered a probe
    NoDevice,
    /// More devices than the configured capacity
    Overflow,
}

impl SearchError {
    pub fn code(self) -> u8 {
        match self {
            SearchError::NoDevice => 0x01,
            SearchError::Overflow => 0x02,
        }
    }
}

/// Any failure of a protocol operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Sdk(SdkError),
    Execution(ExecutionError),
    HostAuth(HostAuthError),
    Ecc(EccError),
    Lsc(LscError),
    Nvm(NvmError),
    /// Received CRC trailer did not match
    Crc,
    Search(SearchError),
    Phy(PhyError),
}

impl Error {
    /// Layer that produced this error
    pub fn layer(&self) -> Layer {
        match self {
            Error::Sdk(_) => Layer::Sdk,
            Error::Execution(_) => Layer::Execution,
            Error::HostAuth(_) => Layer::HostAuth,
            Error::Ecc(_) => Layer::Ecc,
            Error::Lsc(_) => Layer::Lsc,
            Error::Nvm(_) => Layer::Nvm,
            Error::Crc => Layer::Crc,
            Error::Search(_) => Layer::Search,
            Error::Phy(_) => Layer::Phy,
        }
    }

    /// Condition byte within the layer
    pub fn condition(&self) -> u8 {
        match *self {
            Error::Sdk(e) => e.code(),
            Error::Execution(e) => e.code(),
            Error::HostAuth(e) => e.code(),
            Error::Ecc(e) => e.code(),
            Error::Lsc(e) => e.code(),
            Error::Nvm(e) => e.code(),
            Error::Crc => 0x01,
            Error::Search(e) => e.code(),
            Error::Phy(e) => e.code(),
        }
    }

    /// 16-bit status code
    pub fn status(&self) -> u16 {
        ((self.layer() as u16) << 12) | self.condition() as u16
    }
}

/// Status code of an operation result
pub fn status_of<T>(result: &Result<T, Error>) -> u16 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status(),
    }
}

impl From<PhyError> for Error {
    fn from(e: PhyError) -> Self {
        Error::Phy(e)
    }
}

impl From<SearchError> for Error {
    fn from(e: SearchError) -> Self {
        Error::Search(e)
    }
}

impl From<NvmError> for Error {
    fn from(e: NvmError) -> Self {
        Error::Nvm(e)
    }
}

impl From<LscError> for Error {
    fn from(e: LscError) -> Self {
        Error::Lsc(e)
    }
}

impl From<EccError> for Error {
    fn from(e: EccError) -> Self {
        Error::Ecc(e)
    }
}

impl From<HostAuthError> for Error {
    fn from(e: HostAuthError) -> Self {
        Error::HostAuth(e)
    }
}

impl From<ExecutionError> for Error {
    fn from(e: ExecutionError) -> Self {
        Error::Execution(e)
    }
}

impl From<SdkError> for Error {
    fn from(e: SdkError) -> Self {
        Error::Sdk(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::CrcMismatch => Error::Crc,
            FrameError::TooLong | FrameError::LengthMismatch => {
                Error::Execution(ExecutionError::InvalidParameter)
            }
        }
    }
}
