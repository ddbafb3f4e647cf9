//! The handle that owns one wire
//!
//! A [`Session`] bundles the bus, the configuration, the capability
//! object read at [`Session::init`], the host-auth handshake state and the
//! host crypto strategy. Subsystem handles ([`Nvm`], [`Lsc`], [`Ecc`])
//! borrow the bus from it for the duration of one operation.

use heapless::Vec;

use authon_protocol::command::{ECC_CHALLENGE_LEN, HOST_AUTH_LEN};

use crate::bus::Bus;
use crate::capability::Capability;
use crate::config::SwiConfig;
use crate::ecc::{Ecc, EccTiming, EccWait};
use crate::host_auth::{tags_match, HostAuthSession};
use crate::lsc::Lsc;
use crate::nvm::Nvm;
use crate::register::{DEFAULT_DEVICE_ADDRESS, DEVICE_ADDRESS_HI, DEVICE_ADDRESS_LO};
use crate::search::{self, Uid, MAX_DEVICES};
use crate::status::{EccError, Error, HostAuthError, SdkError};
use crate::traits::crypto::HostCrypto;
use crate::traits::phy::Phy;

pub struct Session<P: Phy, H: HostCrypto> {
    bus: Bus<P>,
    crypto: H,
    config: SwiConfig,
    capability: Option<Capability>,
    host_auth: HostAuthSession,
    selected: Option<Uid>,
}

impl<P: Phy, H: HostCrypto> Session<P, H> {
    /// Wrap a physical layer after checking the configuration
    pub fn new(phy: P, crypto: H, config: SwiConfig) -> Result<Self, Error> {
        let warnings = config.validate().map_err(|e| {
            error!("invalid configuration: {}", e);
            SdkError::Config
        })?;
        if warnings.any() {
            warn!("pulse widths above recommended limits: {}", warnings);
        }

        Ok(Self {
            bus: Bus::new(phy),
            crypto,
            config,
            capability: None,
            host_auth: HostAuthSession::new(),
            selected: None,
        })
    }

    pub fn config(&self) -> &SwiConfig {
        &self.config
    }

    /// Capability read by the last successful [`init`](Self::init)
    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_ref()
    }

    pub fn selected(&self) -> Option<&Uid> {
        self.selected.as_ref()
    }

    pub fn bus_mut(&mut self) -> &mut Bus<P> {
        &mut self.bus
    }

    pub fn crypto_mut(&mut self) -> &mut H {
        &mut self.crypto
    }

    fn power_cycle(&mut self) -> Result<(), Error> {
        let mode = self.config.power_mode;
        self.bus.power_down(mode.power_down_us())?;
        self.bus.power_up(mode.power_up_us());
        Ok(())
    }

    /// Power-cycle, enumerate and read the capability of the first device
    pub fn init(&mut self) -> Result<&Capability, Error> {
        self.capability = None;
        self.selected = None;
        self.host_auth.reset();

        let mut uids = None;
        for attempt in 0..self.config.init_retries.max(1) {
            self.power_cycle()?;
            match self.enumerate() {
                Ok(found) => {
                    uids = Some(found);
                    break;
                }
                Err(e) => debug!("init attempt {=u8} failed: {}", attempt, e),
            }
        }
        let Some(uids) = uids else {
            error!("no device answered after {=u8} attempts", self.config.init_retries);
            return Err(SdkError::InitFailed.into());
        };

        let first = uids.first().copied().ok_or(SdkError::InitFailed)?;
        self.select(&first)?;
        let capability = Capability::read(&mut self.bus, uids)?;
        info!(
            "{=usize} device(s), {=u8} user pages, {=u8} key(s)",
            capability.uids.len(),
            capability.nvm_pages,
            capability.ecc_key_count
        );
        Ok(self.capability.insert(capability))
    }

    /// Enumerate the wire with the configured search mode
    pub fn enumerate(&mut self) -> Result<Vec<Uid, MAX_DEVICES>, Error> {
        search::enumerate(
            &mut self.bus,
            self.config.search_mode,
            self.config.device_capacity as usize,
        )
    }

    /// Reset every device and re-address the default one
    pub fn reset_device(&mut self) -> Result<(), Error> {
        self.bus.bus_reset()?;
        self.power_cycle()?;
        self.selected = None;
        self.host_auth.reset();
        self.bus.select_address(DEFAULT_DEVICE_ADDRESS)
    }

    /// Address the device with `uid` alone
    pub fn select(&mut self, uid: &Uid) -> Result<(), Error> {
        search::select(&mut self.bus, uid)?;
        self.selected = Some(*uid);
        self.host_auth.reset();
        Ok(())
    }

    /// Give the device with `uid` a session address and address it by it
    pub fn assign_address(&mut self, uid: &Uid, address: u16) -> Result<(), Error> {
        self.select(uid)?;
        let [hi, lo] = address.to_be_bytes();
        self.bus.write_u8(DEVICE_ADDRESS_HI, hi)?;
        self.bus.write_u8(DEVICE_ADDRESS_LO, lo)?;
        self.bus.select_address(address)
    }

    /// Address whichever device holds `address`
    pub fn select_address(&mut self, address: u16) -> Result<(), Error> {
        self.selected = None;
        self.host_auth.reset();
        self.bus.select_address(address)
    }

    fn initialized(&self) -> Result<&Capability, Error> {
        self.capability
            .as_ref()
            .ok_or(Error::Sdk(SdkError::NotInitialized))
    }

    pub fn nvm(&mut self) -> Result<Nvm<'_, P>, Error> {
        let cap = self.initialized()?;
        let (pages, features) = (cap.nvm_pages, cap.features);
        Ok(Nvm::new(
            &mut self.bus,
            pages,
            features,
            self.config.nvm_poll,
            self.config.mac_poll,
        ))
    }

    pub fn lsc(&mut self) -> Result<Lsc<'_, P>, Error> {
        self.initialized()?;
        Ok(Lsc::new(
            &mut self.bus,
            self.config.nvm_poll,
            self.config.lsc_poll,
        ))
    }

    pub fn ecc(&mut self) -> Result<Ecc<'_, P>, Error> {
        let cap = self.initialized()?;
        let (keys, features) = (cap.ecc_key_count, cap.features);
        let timing = EccTiming {
            ecc_poll: self.config.ecc_poll,
            mac_poll: self.config.mac_poll,
            fixed_wait_us: self.config.ecc_fixed_wait_us,
            interrupt_timeout_us: self.config.interrupt_timeout_us,
        };
        Ok(Ecc::new(&mut self.bus, keys, features, timing))
    }

    /// Run the host-auth handshake against the selected device
    pub fn host_authenticate(&mut self) -> Result<(), Error> {
        if !self.initialized()?.features.host_auth {
            return Err(HostAuthError::NotSupported.into());
        }
        let uid = self.selected.ok_or(SdkError::NotInitialized)?;
        let timing = self.config.host_auth;

        let mut nonce_b = [0u8; HOST_AUTH_LEN];
        self.crypto.random(&mut nonce_b);

        self.host_auth.reset();
        let nonce_a = self.host_auth.get_nonce_a(&mut self.bus, &timing)?;
        self.host_auth
            .send_nonce_b(&mut self.bus, &timing, &nonce_b)?;
        let tag_a = self.crypto.host_tag(&uid, &nonce_a, &nonce_b);
        self.host_auth
            .send_tag_a(&mut self.bus, &timing, self.config.mac_poll, &tag_a)?;
        let tag_b = self.host_auth.get_tag_b(&mut self.bus, &timing)?;

        let expected = self.crypto.expected_device_tag(&uid, &nonce_a, &nonce_b);
        if !tags_match(&tag_b, &expected) {
            warn!("device tag mismatch");
            return Err(HostAuthError::TagMismatch.into());
        }
        Ok(())
    }

    /// Verify the selected device against the certificate in `slot`
    pub fn ecc_authenticate(&mut self, slot: u8, wait: EccWait) -> Result<(), Error> {
        let mut challenge = [0u8; ECC_CHALLENGE_LEN];
        self.crypto.random(&mut challenge);

        let mut ecc = self.ecc()?;
        let certificate = ecc.certificate(slot)?;
        let response = ecc.challenge_response(&challenge, slot, wait)?;

        if !self.crypto.verify_ecc(&certificate, &challenge, &response) {
            warn!("ECC response rejected for slot {=u8}", slot);
            return Err(EccError::VerifyFailed.into());
        }
        Ok(())
    }

    /// Power the wire down and hand back the physical layer
    pub fn shutdown(mut self) -> P {
        if let Err(e) = self.bus.power_down(self.config.power_mode.power_down_us()) {
            warn!("power down failed: {}", e);
        }
        self.bus.into_inner()
    }
}
