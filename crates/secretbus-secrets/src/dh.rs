//! Finite-field Diffie-Hellman over the RFC 2409 Second Oakley Group.
//!
//! This exchange is unauthenticated. It keeps secret payloads unreadable to
//! passive observers of the bus and nothing more: it offers no protection
//! against an active peer, is malleable, and is not CCA2-secure.

use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

use crate::error::{Result, SecretError};

/// Generator of the Second Oakley Group.
const GENERATOR: u32 = 2;

/// The 1024-bit MODP prime of the Second Oakley Group (RFC 2409 §6.2).
const PRIME: [u8; 128] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68, 0xC2, 0x34,
    0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74,
    0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37,
    0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6,
    0xF4, 0x4C, 0x42, 0xE9, 0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11, 0x7C, 0x4B, 0x1F, 0xE6,
    0x49, 0x28, 0x66, 0x51, 0xEC, 0xE6, 0x53, 0x81, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// The process-wide Second Oakley Group.
pub static OAKLEY_GROUP_2: Lazy<DhGroup> = Lazy::new(DhGroup::rfc2409_second_oakley);

/// A multiplicative group modulo a safe prime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhGroup {
    generator: BigUint,
    modulus: BigUint,
    modulus_minus_one: BigUint,
}

impl DhGroup {
    fn rfc2409_second_oakley() -> Self {
        let modulus = BigUint::from_bytes_be(&PRIME);
        let modulus_minus_one = &modulus - 1u32;
        Self {
            generator: BigUint::from(GENERATOR),
            modulus,
            modulus_minus_one,
        }
    }

    /// The group generator.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// The prime modulus.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Draw a fresh keypair.
    ///
    /// The private exponent is uniform in `[1, p - 2]`.
    pub fn generate_keypair(&self) -> KeyPair {
        let private = OsRng.gen_biguint_range(&BigUint::from(1u32), &self.modulus_minus_one);
        let public = self.generator.modpow(&private, &self.modulus);
        KeyPair { private, public }
    }

    /// Compute `peer_public ^ own_private mod p`.
    ///
    /// Rejects peer values outside `(1, p - 1)`, which would confine the
    /// shared secret to a trivial subgroup.
    pub fn compute_shared_secret(
        &self,
        peer_public: &BigUint,
        own_private: &BigUint,
    ) -> Result<BigUint> {
        self.check_public(peer_public)?;
        Ok(peer_public.modpow(own_private, &self.modulus))
    }

    /// Range check for a public value.
    pub fn check_public(&self, public: &BigUint) -> Result<()> {
        if *public <= BigUint::from(1u32) || *public >= self.modulus_minus_one {
            return Err(SecretError::OutOfRange);
        }
        Ok(())
    }
}

/// A DH keypair. Lives for one session.
pub struct KeyPair {
    private: BigUint,
    public: BigUint,
}

impl KeyPair {
    /// The private exponent.
    pub fn private(&self) -> &BigUint {
        &self.private
    }

    /// The public value `g ^ private mod p`.
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Big-endian encoding of the public value, as sent to the peer.
    pub fn public_bytes(&self) -> Vec<u8> {
        self.public.to_bytes_be()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}
