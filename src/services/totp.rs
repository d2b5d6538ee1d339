// SPDX-License-Identifier: MIT

//! TOTP two-factor enrollment and verification.
//!
//! RFC 6238 defaults: SHA-1, 6 digits, 30-second step, one step of skew.
//! The secret is encrypted at rest and only ever decrypted transiently
//! for a verification check. Enrollment hands out the provisioning URI;
//! QR rendering is the client's job.

use crate::crypto::{self, EncryptedPayload};
use crate::error::{AppError, Result};
use totp_rs::{Algorithm, Secret, TOTP};

/// Result of starting enrollment: what the client needs to provision an
/// authenticator, plus the encrypted secret to persist once confirmed.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    pub secret_base32: String,
    pub otpauth_url: String,
    pub encrypted_secret: EncryptedPayload,
}

/// Generates and checks TOTP credentials.
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    crypto_secret: String,
}

impl TotpService {
    pub fn new(issuer: String, crypto_secret: String) -> Self {
        Self {
            issuer,
            crypto_secret,
        }
    }

    fn build(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("TOTP init failed: {e}")))
    }

    /// Generate a fresh secret for `email` and encrypt it for storage.
    pub fn begin_enrollment(&self, email: &str) -> Result<TotpEnrollment> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("TOTP secret generation failed: {e}")))?;

        let totp = self.build(secret_bytes, email)?;
        let secret_base32 = totp.get_secret_base32();

        let encrypted_secret = crypto::cipher(secret_base32.as_bytes(), &self.crypto_secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("TOTP secret encrypt failed: {e}")))?;

        Ok(TotpEnrollment {
            otpauth_url: totp.get_url(),
            secret_base32,
            encrypted_secret,
        })
    }

    /// Check `code` against the stored encrypted secret.
    pub fn verify(&self, encrypted_secret: &EncryptedPayload, code: &str) -> Result<bool> {
        let secret_base32 = String::from_utf8(crypto::decipher(encrypted_secret, &self.crypto_secret)?)
            .map_err(|_| AppError::session_expired())?;

        let secret_bytes = Secret::Encoded(secret_base32)
            .to_bytes()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("TOTP secret decode failed: {e}")))?;

        // Label is irrelevant for checking.
        let totp = self.build(secret_bytes, "account")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }
}
