//! The cryptographic envelope around Fast-Path PDUs.
//!
//! The primitives themselves (MAC, salted MAC, HMAC, RC4, 3DES) are an
//! external collaborator behind [`SecurityInterface`]; this module owns the
//! session-wide lock, the signature slots and the FIPS padding rules.

use core::fmt;
use std::sync::Mutex;

use crate::{SessionError, SessionErrorExt as _, SessionResult};

/// Length of the `dataSignature` slot preceding every encrypted region.
pub const SIGNATURE_SIZE: usize = 8;

/// FIPS 3DES block size; encrypted regions are padded up to a multiple of it.
pub const FIPS_BLOCK_SIZE: usize = 8;

/// Error reported by an external cryptographic primitive.
#[derive(Debug)]
pub struct SecurityError(pub &'static str);

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "security primitive failed: {}", self.0)
    }
}

impl std::error::Error for SecurityError {}

pub type SecurityResult = Result<(), SecurityError>;

/// The narrow interface to the session's cryptographic primitives.
///
/// Implementations own the session keys and update counters (RC4 state,
/// encryption counts, key refreshes); every method may mutate that state,
/// which is why all calls are serialized by [`SecurityLayer`].
pub trait SecurityInterface {
    /// Plain MAC signature over `data`.
    fn mac(&mut self, data: &[u8], signature: &mut [u8; SIGNATURE_SIZE]) -> SecurityResult;

    /// Salted MAC signature; `encrypting` selects the direction salt.
    fn salted_mac(&mut self, data: &[u8], encrypting: bool, signature: &mut [u8; SIGNATURE_SIZE]) -> SecurityResult;

    /// FIPS HMAC-SHA1 signature, truncated to the slot size.
    fn hmac(&mut self, data: &[u8], signature: &mut [u8; SIGNATURE_SIZE]) -> SecurityResult;

    fn encrypt(&mut self, data: &mut [u8]) -> SecurityResult;

    fn decrypt(&mut self, data: &mut [u8]) -> SecurityResult;

    fn fips_encrypt(&mut self, data: &mut [u8]) -> SecurityResult;

    fn fips_decrypt(&mut self, data: &mut [u8]) -> SecurityResult;
}

/// Pad needed to grow `payload_len` to a multiple of the FIPS block size.
pub fn fips_pad_length(payload_len: usize) -> usize {
    (FIPS_BLOCK_SIZE - payload_len % FIPS_BLOCK_SIZE) % FIPS_BLOCK_SIZE
}

/// Serializes envelope operations on the session's cryptographic state.
///
/// The send and receive paths both go through this layer; each seal/open is
/// one lock scope, and the `MutexGuard` guarantees the release on every
/// exit, including failures.
pub struct SecurityLayer {
    primitives: Mutex<Box<dyn SecurityInterface + Send>>,
}

impl SecurityLayer {
    pub fn new(primitives: Box<dyn SecurityInterface + Send>) -> Self {
        Self {
            primitives: Mutex::new(primitives),
        }
    }

    fn lock(&self) -> SessionResult<std::sync::MutexGuard<'_, Box<dyn SecurityInterface + Send>>> {
        self.primitives
            .lock()
            .map_err(|_| crypto_err!("security lock", "poisoned"))
    }

    /// Signs and encrypts the protected region of an outgoing PDU in place.
    ///
    /// `protected_from` is the index where the encrypted region begins; the
    /// 8-byte signature slot is the bytes just before it. Under FIPS, the
    /// trailing `pad` bytes of the region must already be zero, and the
    /// signature covers the region minus the pad; otherwise `pad` must be 0
    /// and the (salted) MAC covers the whole region.
    pub fn seal(&self, frame: &mut [u8], protected_from: usize, pad: usize, salted: bool, fips: bool) -> SessionResult<()> {
        debug_assert!(protected_from >= SIGNATURE_SIZE);
        debug_assert!(protected_from + pad <= frame.len());

        let mut primitives = self.lock()?;

        let mut signature = [0u8; SIGNATURE_SIZE];

        if fips {
            let unpadded_end = frame.len() - pad;
            primitives
                .hmac(&frame[protected_from..unpadded_end], &mut signature)
                .map_err(|e| SessionError::crypto("seal", "sign failure").with_source(e))?;
            frame[protected_from - SIGNATURE_SIZE..protected_from].copy_from_slice(&signature);

            primitives
                .fips_encrypt(&mut frame[protected_from..])
                .map_err(|e| SessionError::crypto("seal", "encrypt failure").with_source(e))?;
        } else {
            debug_assert_eq!(pad, 0);

            let sign = if salted {
                primitives.salted_mac(&frame[protected_from..], true, &mut signature)
            } else {
                primitives.mac(&frame[protected_from..], &mut signature)
            };
            sign.map_err(|e| SessionError::crypto("seal", "sign failure").with_source(e))?;
            frame[protected_from - SIGNATURE_SIZE..protected_from].copy_from_slice(&signature);

            primitives
                .encrypt(&mut frame[protected_from..])
                .map_err(|e| SessionError::crypto("seal", "encrypt failure").with_source(e))?;
        }

        Ok(())
    }

    /// Decrypts and verifies the protected region of an incoming PDU in
    /// place, returning the payload length (pad stripped).
    ///
    /// The signature slot is read from the bytes just before
    /// `protected_from`; a mismatch is a crypto failure.
    pub fn open(&self, frame: &mut [u8], protected_from: usize, pad: usize, salted: bool, fips: bool) -> SessionResult<usize> {
        debug_assert!(protected_from >= SIGNATURE_SIZE);

        if protected_from + pad > frame.len() {
            return Err(crypto_err!("open", "protected region shorter than its padding"));
        }

        let mut primitives = self.lock()?;

        let mut expected = [0u8; SIGNATURE_SIZE];
        expected.copy_from_slice(&frame[protected_from - SIGNATURE_SIZE..protected_from]);

        let mut signature = [0u8; SIGNATURE_SIZE];

        if fips {
            primitives
                .fips_decrypt(&mut frame[protected_from..])
                .map_err(|e| SessionError::crypto("open", "decrypt failure").with_source(e))?;

            let unpadded_end = frame.len() - pad;
            primitives
                .hmac(&frame[protected_from..unpadded_end], &mut signature)
                .map_err(|e| SessionError::crypto("open", "sign failure").with_source(e))?;
        } else {
            debug_assert_eq!(pad, 0);

            primitives
                .decrypt(&mut frame[protected_from..])
                .map_err(|e| SessionError::crypto("open", "decrypt failure").with_source(e))?;

            let verify = if salted {
                primitives.salted_mac(&frame[protected_from..], false, &mut signature)
            } else {
                primitives.mac(&frame[protected_from..], &mut signature)
            };
            verify.map_err(|e| SessionError::crypto("open", "sign failure").with_source(e))?;
        }

        if signature != expected {
            return Err(crypto_err!("open", "signature mismatch"));
        }

        Ok(frame.len() - protected_from - pad)
    }
}
