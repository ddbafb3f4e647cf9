//! ECC certificate retrieval and challenge/response
//!
//! Each key slot has an origin data certificate (ODC) and a public key in
//! the system pages. The certificate handed to the verifier is the UID,
//! the public key and the ODC, concatenated in that order.

use authon_protocol::command::{ECC_CHALLENGE_LEN, ECC_RESPONSE_LEN, MAC_LEN};

use crate::bus::{Bus, MacOperation, PollBudget, MAC_ACCEPTED};
use crate::capability::DeviceFeatures;
use crate::nvm::page_address;
use crate::register::{busy, int, INT_EN, INT_STS, KEY_SLOT, UID_REG};
use crate::search::UID_LEN;
use crate::status::{EccError, Error, ExecutionError};
use crate::traits::phy::{Interrupt, Phy, WaitMode};

/// Bytes of an ECC public key
pub const PUBLIC_KEY_LEN: usize = 24;

/// Bytes of an origin data certificate
pub const ODC_LEN: usize = 48;

/// Bytes of a certificate blob
pub const CERTIFICATE_LEN: usize = UID_LEN + PUBLIC_KEY_LEN + ODC_LEN;

/// Key slots a device can hold
pub const MAX_KEY_SLOTS: u8 = 2;

/// First ODC page per key slot
const ODC_PAGES: [u8; 2] = [0x80, 0x92];

/// First public key page per key slot
const PUBLIC_KEY_PAGES: [u8; 2] = [0x8C, 0x9E];

/// UID, public key and ODC of one key slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certificate([u8; CERTIFICATE_LEN]);

impl Certificate {
    pub fn from_bytes(bytes: [u8; CERTIFICATE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CERTIFICATE_LEN] {
        &self.0
    }

    pub fn uid(&self) -> &[u8] {
        &self.0[..UID_LEN]
    }

    pub fn public_key(&self) -> &[u8] {
        &self.0[UID_LEN..UID_LEN + PUBLIC_KEY_LEN]
    }

    pub fn odc(&self) -> &[u8] {
        &self.0[UID_LEN + PUBLIC_KEY_LEN..]
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Certificate {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Certificate {{ uid: {=[u8]:02x} }}", self.uid());
    }
}

/// How to wait for the ECC computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EccWait {
    /// Unconditional delay, then a busy poll
    FixedWait,
    /// Busy poll only
    Polling,
    /// Arm the done interrupt and wait for its pulse
    Interrupt,
}

/// Timing for ECC and MAC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccTiming {
    pub ecc_poll: PollBudget,
    pub mac_poll: PollBudget,
    pub fixed_wait_us: u32,
    pub interrupt_timeout_us: u32,
}

/// ECC operations on the addressed device
pub struct Ecc<'a, P: Phy> {
    bus: &'a mut Bus<P>,
    key_count: u8,
    features: DeviceFeatures,
    timing: EccTiming,
}

impl<'a, P: Phy> Ecc<'a, P> {
    pub fn new(
        bus: &'a mut Bus<P>,
        key_count: u8,
        features: DeviceFeatures,
        timing: EccTiming,
    ) -> Self {
        Self {
            bus,
            key_count,
            features,
            timing,
        }
    }

    fn check_slot(&self, slot: u8) -> Result<usize, Error> {
        if slot >= self.key_count.min(MAX_KEY_SLOTS) {
            return Err(EccError::InvalidKeySlot.into());
        }
        Ok(slot as usize)
    }

    /// Assemble the certificate of a key slot
    pub fn certificate(&mut self, slot: u8) -> Result<Certificate, Error> {
        let index = self.check_slot(slot)?;
        let mut blob = [0u8; CERTIFICATE_LEN];
        let (uid, rest) = blob.split_at_mut(UID_LEN);
        let (key, odc) = rest.split_at_mut(PUBLIC_KEY_LEN);

        self.bus.read_register(UID_REG, uid)?;
        self.bus
            .read_register(page_address(PUBLIC_KEY_PAGES[index]), key)?;
        self.bus.read_register(page_address(ODC_PAGES[index]), odc)?;

        Ok(Certificate(blob))
    }

    fn wait_not_busy(&mut self) -> Result<(), Error> {
        if self
            .bus
            .poll_until(self.timing.ecc_poll, |bus| Ok(!bus.is_busy(busy::ECC)?))
        {
            Ok(())
        } else {
            Err(EccError::Timeout.into())
        }
    }

    fn wait_interrupt(&mut self) -> Result<(), Error> {
        let pulse = self.bus.wait_interrupt(WaitMode::Poll {
            timeout_us: self.timing.interrupt_timeout_us,
        });
        if pulse == Interrupt::None {
            warn!("no ECC done interrupt, aborting device wait");
            self.bus.abort_interrupt();
        }

        // Read-and-clear happens whatever the pulse outcome
        let status = self.bus.read_u8(INT_STS)?;
        self.bus.write_u8(INT_EN, 0)?;

        if pulse == Interrupt::None && status & int::ECC_DONE == 0 {
            return Err(EccError::NoInterrupt.into());
        }
        Ok(())
    }

    /// Sign `challenge` with a key slot and return the response
    pub fn challenge_response(
        &mut self,
        challenge: &[u8; ECC_CHALLENGE_LEN],
        slot: u8,
        wait: EccWait,
    ) -> Result<[u8; ECC_RESPONSE_LEN], Error> {
        self.check_slot(slot)?;
        self.bus.write_u8(KEY_SLOT, slot)?;
        if wait == EccWait::Interrupt {
            self.bus.write_u8(INT_EN, int::ECC_DONE)?;
        }

        self.bus.ecc_start(challenge)?;

        match wait {
            EccWait::FixedWait => {
                self.bus.delay_us(self.timing.fixed_wait_us);
                self.wait_not_busy()?;
            }
            EccWait::Polling => self.wait_not_busy()?,
            EccWait::Interrupt => self.wait_interrupt()?,
        }

        self.bus.ecc_result()
    }

    /// Permanently disable the device with the kill MAC
    pub fn kill(&mut self, mac: &[u8; MAC_LEN]) -> Result<(), Error> {
        if !self.features.kill {
            return Err(EccError::KillDisabled.into());
        }

        self.bus.mac_start(MacOperation::Kill, mac)?;
        if !self
            .bus
            .poll_until(self.timing.mac_poll, |bus| Ok(!bus.is_busy(busy::AUTH_MAC)?))
        {
            return Err(EccError::Timeout.into());
        }
        if self.bus.mac_result()? != MAC_ACCEPTED {
            return Err(ExecutionError::MacRejected.into());
        }
        info!("device killed");
        Ok(())
    }
}
