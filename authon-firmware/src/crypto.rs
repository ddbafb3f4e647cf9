//! Host crypto for boards without provisioned keys
//!
//! Nonces and challenges come from the ring oscillator RNG. Without the
//! shared secret no tag can be computed, so tags are random and every
//! handshake fails closed.

use authon_core::ecc::Certificate;
use authon_core::traits::crypto::{AuthBlock, HostCrypto};
use authon_core::Uid;
use authon_protocol::command::{ECC_CHALLENGE_LEN, ECC_RESPONSE_LEN, HOST_AUTH_LEN};
use embassy_rp::clocks::RoscRng;
use rand_core::RngCore;

pub struct BoardCrypto {
    rng: RoscRng,
}

impl BoardCrypto {
    pub fn new() -> Self {
        Self { rng: RoscRng }
    }

    fn random_block(&mut self) -> AuthBlock {
        let mut block = [0u8; HOST_AUTH_LEN];
        self.random(&mut block);
        block
    }
}

impl HostCrypto for BoardCrypto {
    fn random(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }

    fn host_tag(&mut self, _uid: &Uid, _nonce_a: &AuthBlock, _nonce_b: &AuthBlock) -> AuthBlock {
        self.random_block()
    }

    fn expected_device_tag(
        &mut self,
        _uid: &Uid,
        _nonce_a: &AuthBlock,
        _nonce_b: &AuthBlock,
    ) -> AuthBlock {
        self.random_block()
    }

    fn verify_ecc(
        &mut self,
        _certificate: &Certificate,
        _challenge: &[u8; ECC_CHALLENGE_LEN],
        _response: &[u8; ECC_RESPONSE_LEN],
    ) -> bool {
        false
    }
}
