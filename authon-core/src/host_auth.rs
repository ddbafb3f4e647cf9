//! Host authentication handshake
//!
//! Four host-driven steps against the addressed device:
//!
//! ```text
//! Idle ──GetNonceA──▶ NonceA ──SendNonceB──▶ NonceB ──SendTagA──▶ TagA ──GetTagB──▶ Complete
//!   │                   │                      │                   │
//!   └───────────────────┴──── any failure or out-of-order call ────┴──────────▶ Failed
//! ```
//!
//! Each step fails with its own status code. Once failed, the session
//! refuses every step until [`HostAuthSession::reset`].

use authon_protocol::command::HOST_AUTH_LEN;

use crate::bus::{Bus, PollBudget};
use crate::config::HostAuthTiming;
use crate::register::busy;
use crate::status::{Error, HostAuthError};
use crate::traits::crypto::AuthBlock;
use crate::traits::phy::Phy;

/// Handshake phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostAuthPhase {
    Idle,
    /// Device nonce received
    NonceA,
    /// Host nonce sent
    NonceB,
    /// Host tag sent and processed
    TagA,
    /// Device tag received
    Complete,
    Failed,
}

/// Host-side state of one handshake
#[derive(Debug, Clone)]
pub struct HostAuthSession {
    phase: HostAuthPhase,
}

impl Default for HostAuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAuthSession {
    pub const fn new() -> Self {
        Self {
            phase: HostAuthPhase::Idle,
        }
    }

    pub fn phase(&self) -> HostAuthPhase {
        self.phase
    }

    /// Forget any previous handshake
    pub fn reset(&mut self) {
        self.phase = HostAuthPhase::Idle;
    }

    /// Run one step if the phase allows it
    fn step<T, F>(
        &mut self,
        allowed: &[HostAuthPhase],
        next: HostAuthPhase,
        failure: HostAuthError,
        op: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if !allowed.contains(&self.phase) {
            warn!("host auth step {} refused in phase {}", failure, self.phase);
            self.phase = HostAuthPhase::Failed;
            return Err(HostAuthError::OutOfSequence.into());
        }

        match op() {
            Ok(value) => {
                self.phase = next;
                Ok(value)
            }
            Err(e) => {
                warn!("host auth step {} failed: {}", failure, e);
                self.phase = HostAuthPhase::Failed;
                Err(failure.into())
            }
        }
    }

    /// Step 1: read the device nonce
    pub fn get_nonce_a<P: Phy>(
        &mut self,
        bus: &mut Bus<P>,
        timing: &HostAuthTiming,
    ) -> Result<AuthBlock, Error> {
        self.step(
            &[HostAuthPhase::Idle, HostAuthPhase::Complete],
            HostAuthPhase::NonceA,
            HostAuthError::GetNonceA,
            || {
                let nonce = bus.host_auth_nonce_a()?;
                bus.delay_us(timing.nonce_a_settle_us);
                Ok(nonce)
            },
        )
    }

    /// Step 2: send the host nonce
    pub fn send_nonce_b<P: Phy>(
        &mut self,
        bus: &mut Bus<P>,
        timing: &HostAuthTiming,
        nonce_b: &AuthBlock,
    ) -> Result<(), Error> {
        self.step(
            &[HostAuthPhase::NonceA],
            HostAuthPhase::NonceB,
            HostAuthError::SendNonceB,
            || {
                bus.host_auth_nonce_b(nonce_b)?;
                bus.delay_us(timing.nonce_b_settle_us);
                Ok(())
            },
        )
    }

    /// Step 3: send the host tag and wait for the device MAC engine
    pub fn send_tag_a<P: Phy>(
        &mut self,
        bus: &mut Bus<P>,
        timing: &HostAuthTiming,
        mac_poll: PollBudget,
        tag_a: &AuthBlock,
    ) -> Result<(), Error> {
        self.step(
            &[HostAuthPhase::NonceB],
            HostAuthPhase::TagA,
            HostAuthError::SendTagA,
            || {
                bus.host_auth_tag_a(tag_a)?;
                bus.delay_us(timing.tag_a_settle_us);
                if bus.poll_until(mac_poll, |bus| Ok(!bus.is_busy(busy::AUTH_MAC)?)) {
                    Ok(())
                } else {
                    Err(HostAuthError::SendTagA.into())
                }
            },
        )
    }

    /// Step 4: read the device tag
    ///
    /// Comparing it with the expected tag is up to the caller.
    pub fn get_tag_b<P: Phy>(
        &mut self,
        bus: &mut Bus<P>,
        timing: &HostAuthTiming,
    ) -> Result<AuthBlock, Error> {
        self.step(
            &[HostAuthPhase::TagA],
            HostAuthPhase::Complete,
            HostAuthError::GetTagB,
            || {
                let tag = bus.host_auth_tag_b()?;
                bus.delay_us(timing.tag_b_settle_us);
                Ok(tag)
            },
        )
    }
}

/// Whether two tags match, without an early exit
pub fn tags_match(a: &AuthBlock, b: &AuthBlock) -> bool {
    let mut diff = 0u8;
    for i in 0..HOST_AUTH_LEN {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sim_tag, SimBus, SimDevice};
    use crate::traits::phy::PhyError;
    use crate::Uid;
    use authon_protocol::Opcode;

    const UID: Uid = Uid([0x42; 12]);
    const MAC_POLL: PollBudget = PollBudget::new(5, 100);

    /// Run all four steps, returning the first error
    fn run(session: &mut HostAuthSession, bus: &mut Bus<SimBus>) -> [Result<(), Error>; 4] {
        let timing = HostAuthTiming::default();
        let nonce_b = [0x77; HOST_AUTH_LEN];
        let nonce_a = session.get_nonce_a(bus, &timing);
        let a = nonce_a.unwrap_or([0; HOST_AUTH_LEN]);
        let tag_a = sim_tag(0xA, &UID, &a, &nonce_b);
        [
            nonce_a.map(|_| ()),
            session.send_nonce_b(bus, &timing, &nonce_b),
            session.send_tag_a(bus, &timing, MAC_POLL, &tag_a),
            session.get_tag_b(bus, &timing).map(|_| ()),
        ]
    }

    #[test]
    fn test_full_handshake() {
        let mut bus = Bus::new(SimBus::new().with_device(SimDevice::new(UID)));
        let mut session = HostAuthSession::new();
        let timing = HostAuthTiming::default();
        let nonce_b = [0x31; HOST_AUTH_LEN];

        let a = session.get_nonce_a(&mut bus, &timing).unwrap();
        session.send_nonce_b(&mut bus, &timing, &nonce_b).unwrap();
        let tag_a = sim_tag(0xA, &UID, &a, &nonce_b);
        session.send_tag_a(&mut bus, &timing, MAC_POLL, &tag_a).unwrap();
        let tag_b = session.get_tag_b(&mut bus, &timing).unwrap();

        assert!(tags_match(&tag_b, &sim_tag(0xB, &UID, &a, &nonce_b)));
        assert_eq!(session.phase(), HostAuthPhase::Complete);
    }

    #[test]
    fn test_out_of_sequence() {
        let mut bus = Bus::new(SimBus::new().with_device(SimDevice::new(UID)));
        let mut session = HostAuthSession::new();
        let timing = HostAuthTiming::default();
        assert_eq!(
            session.get_tag_b(&mut bus, &timing),
            Err(HostAuthError::OutOfSequence.into())
        );
        assert_eq!(session.phase(), HostAuthPhase::Failed);
        assert_eq!(
            session.get_nonce_a(&mut bus, &timing),
            Err(HostAuthError::OutOfSequence.into())
        );
        session.reset();
        assert!(session.get_nonce_a(&mut bus, &timing).is_ok());
    }

    #[test]
    fn test_step_isolation() {
        let steps = [
            (Opcode::Hana, HostAuthError::GetNonceA),
            (Opcode::Hanb, HostAuthError::SendNonceB),
            (Opcode::Hata, HostAuthError::SendTagA),
            (Opcode::Hatb, HostAuthError::GetTagB),
        ];

        for (failing, (opcode, code)) in steps.iter().enumerate() {
            let mut sim = SimBus::new().with_device(SimDevice::new(UID));
            sim.fault = Some((*opcode, PhyError::Parity));
            let mut bus = Bus::new(sim);
            let mut session = HostAuthSession::new();

            let results = run(&mut session, &mut bus);
            for (i, result) in results.iter().enumerate() {
                if i < failing {
                    assert!(result.is_ok(), "step {} before fault", i);
                } else if i == failing {
                    assert_eq!(*result, Err(Error::HostAuth(*code)));
                } else {
                    assert_eq!(*result, Err(HostAuthError::OutOfSequence.into()));
                }
            }
            assert_eq!(session.phase(), HostAuthPhase::Failed);
        }
    }

    #[test]
    fn test_mac_busy_timeout_is_tag_a_failure() {
        let mut device = SimDevice::new(UID);
        device.mac_busy_polls = MAC_POLL.attempts as u32;
        let mut bus = Bus::new(SimBus::new().with_device(device));
        let mut session = HostAuthSession::new();
        let results = run(&mut session, &mut bus);
        assert_eq!(results[2], Err(HostAuthError::SendTagA.into()));
        assert_eq!(results[3], Err(HostAuthError::OutOfSequence.into()));
    }

    #[test]
    fn test_tags_match() {
        assert!(tags_match(&[1; HOST_AUTH_LEN], &[1; HOST_AUTH_LEN]));
        let mut other = [1; HOST_AUTH_LEN];
        other[9] = 2;
        assert!(!tags_match(&[1; HOST_AUTH_LEN], &other));
    }
}
