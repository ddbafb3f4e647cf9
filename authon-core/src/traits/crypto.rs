//! Host cryptography strategy

use authon_protocol::command::{ECC_CHALLENGE_LEN, ECC_RESPONSE_LEN, HOST_AUTH_LEN};

use crate::ecc::Certificate;
use crate::search::Uid;

/// Nonce or tag of the host authentication handshake
pub type AuthBlock = [u8; HOST_AUTH_LEN];

/// Cryptographic hooks supplied by the host
///
/// The protocol layer only moves bytes. Random numbers, MACs and signature
/// verification come from here so a session can swap implementations
/// (hardware RNG, software SHA, a secure enclave) without changes.
pub trait HostCrypto {
    /// Fill `buf` with random bytes
    fn random(&mut self, buf: &mut [u8]);

    /// Tag A the host sends to prove it knows the shared secret
    fn host_tag(&mut self, uid: &Uid, nonce_a: &AuthBlock, nonce_b: &AuthBlock) -> AuthBlock;

    /// Tag B the device is expected to answer with
    fn expected_device_tag(
        &mut self,
        uid: &Uid,
        nonce_a: &AuthBlock,
        nonce_b: &AuthBlock,
    ) -> AuthBlock;

    /// Verify an ECC response against the device certificate
    fn verify_ecc(
        &mut self,
        certificate: &Certificate,
        challenge: &[u8; ECC_CHALLENGE_LEN],
        response: &[u8; ECC_RESPONSE_LEN],
    ) -> bool;
}
