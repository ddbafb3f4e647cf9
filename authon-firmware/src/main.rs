//! Authon - Battery authentication demo firmware
//!
//! Loads the embedded SWI configuration, enumerates the secure elements on
//! the active wire and reports what it finds over RTT: UIDs, capability,
//! lock status, life-span counters, certificates and a raw ECC
//! challenge/response for off-board verification.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::Flex;
use embassy_rp::Peripherals;
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use authon_core::config::{parse_config, SwiConfig};
use authon_core::ecc::EccWait;
use authon_core::lsc::LscCounter;
use authon_core::traits::crypto::HostCrypto;
use authon_core::traits::phy::Phy;
use authon_core::{Error, Session, Uid};
use authon_drivers::SwiPhy;
use authon_hal_rp2040::{EmbassyClock, FlexSwiPin, InterruptFree};
use authon_protocol::command::ECC_CHALLENGE_LEN;

mod crypto;

use crate::crypto::BoardCrypto;

/// Embedded configuration (compiled into firmware)
/// Edit authon.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../authon.toml");

/// Time between survey passes
const SURVEY_INTERVAL: Duration = Duration::from_secs(10);

/// Take a GPIO by number from the peripherals
macro_rules! flex_by_number {
    ($p:ident, $gpio:expr, $($n:literal => $pin:ident),* $(,)?) => {
        match $gpio {
            $( $n => Some(Flex::new($p.$pin)), )*
            _ => None,
        }
    };
}

fn swi_flex(p: Peripherals, gpio: u8) -> Option<Flex<'static>> {
    flex_by_number!(p, gpio,
        0 => PIN_0, 1 => PIN_1, 2 => PIN_2, 3 => PIN_3, 4 => PIN_4,
        5 => PIN_5, 6 => PIN_6, 7 => PIN_7, 8 => PIN_8, 9 => PIN_9,
        10 => PIN_10, 11 => PIN_11, 12 => PIN_12, 13 => PIN_13, 14 => PIN_14,
        15 => PIN_15, 16 => PIN_16, 17 => PIN_17, 18 => PIN_18, 19 => PIN_19,
        20 => PIN_20, 21 => PIN_21, 22 => PIN_22, 23 => PIN_23, 24 => PIN_24,
        25 => PIN_25, 26 => PIN_26, 27 => PIN_27, 28 => PIN_28, 29 => PIN_29,
    )
}

fn load_config() -> SwiConfig {
    match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => {
            info!("Configuration loaded");
            config
        }
        Err(e) => {
            warn!("Config parse error: {}, using defaults", e);
            SwiConfig::new()
        }
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Authon firmware starting...");

    let p = embassy_rp::init(Default::default());
    let config = load_config();

    let Some(interface) = config.active().cloned() else {
        error!("No active interface configured");
        return;
    };
    let Some(flex) = swi_flex(p, interface.gpio) else {
        error!("GPIO {} is not usable for SWI", interface.gpio);
        return;
    };
    info!(
        "SWI on GPIO {}, tau {}/{}/{} us",
        interface.gpio,
        interface.timing.tau_low_us,
        interface.timing.tau_high_us,
        interface.timing.tau_stop_us
    );

    let phy = SwiPhy::new(
        FlexSwiPin::new(flex),
        EmbassyClock,
        InterruptFree,
        &interface,
    );
    let mut session = match Session::new(phy, BoardCrypto::new(), config) {
        Ok(session) => session,
        Err(e) => {
            error!("Session rejected configuration: {:04x}", e.status());
            return;
        }
    };

    loop {
        if let Err(e) = survey(&mut session) {
            warn!("Survey failed: {} (status {:04x})", e, e.status());
        }
        Timer::after(SURVEY_INTERVAL).await;
    }
}

/// Enumerate the wire and report every device
fn survey<P: Phy>(session: &mut Session<P, BoardCrypto>) -> Result<(), Error> {
    let capability = session.init()?;
    let uids = capability.uids.clone();
    info!(
        "{} device(s): {} user pages, {} ECC key(s), features {}",
        uids.len(),
        capability.nvm_pages,
        capability.ecc_key_count,
        capability.features
    );

    for uid in uids.iter() {
        if let Err(e) = report_device(session, uid) {
            warn!("Device {} failed: {:04x}", uid, e.status());
        }
    }
    Ok(())
}

fn report_device<P: Phy>(session: &mut Session<P, BoardCrypto>, uid: &Uid) -> Result<(), Error> {
    session.select(uid)?;
    info!("Device {}", uid);

    let status = session.nvm()?.lock_status()?;
    info!(
        "  {} locked page(s), counters {}/{}, kill {:02x}",
        status.locked_pages(),
        status.counters[0],
        status.counters[1],
        status.kill
    );

    let mut lsc = session.lsc()?;
    for counter in [LscCounter::First, LscCounter::Second] {
        if lsc.is_locked(counter)? {
            info!("  counter {} locked", counter);
        }
    }

    let mut challenge = [0u8; ECC_CHALLENGE_LEN];
    session.crypto_mut().random(&mut challenge);

    let mut ecc = session.ecc()?;
    let certificate = ecc.certificate(0)?;
    info!("  {}", certificate);
    info!("  public key {=[u8]:02x}", certificate.public_key());

    let response = ecc.challenge_response(&challenge, 0, EccWait::Interrupt)?;
    info!("  challenge {=[u8]:02x}", challenge);
    info!("  response {=[u8]:02x}", response);
    Ok(())
}
