// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of forecourt.
//
// forecourt is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// forecourt is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with forecourt.  If not,
// see <http://www.gnu.org/licenses/>.

//! # crypto
//!
//! Value encryption for sensitive environment variables.
//!
//! The protocol matters more than the cipher: ciphertext is wrapped in a recognizable envelope
//! (the [PREAMBLE], then URL-safe base64 of nonce & ciphertext), and [Cipher::decrypt] of anything
//! *without* the preamble returns its input unchanged. That makes decryption idempotent & safe to
//! apply to legacy plaintext values-- the stored `encrypted` flag, not the content, decides
//! whether a value was ever encrypted, and the envelope is just a second line of defense against
//! double decryption.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use secrecy::{ExposeSecret, SecretSlice};
use snafu::{prelude::*, Backtrace};
use uuid::Uuid;

/// Marks a value as ciphertext. Anything without this prefix is passed through [Cipher::decrypt]
/// untouched.
pub const PREAMBLE: &str = "__ENCRYPTED__";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Bad ciphertext envelope: {source}"))]
    Base64 {
        source: base64::DecodeError,
        backtrace: Backtrace,
    },
    #[snafu(display("Encryption keys must be 32 bytes; got {length}"))]
    BadKeyLength { length: usize, backtrace: Backtrace },
    #[snafu(display("The ciphertext did not authenticate"))]
    Decrypt { backtrace: Backtrace },
    #[snafu(display("Failed to encrypt a value"))]
    Encrypt { backtrace: Backtrace },
    #[snafu(display("Ciphertext envelope too short"))]
    Truncated { backtrace: Backtrace },
    #[snafu(display("Decrypted text isn't valid UTF-8: {source}"))]
    Utf8 {
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// An opaque encrypt/decrypt capability. `decrypt(encrypt(x)) == x` for all `x`, and
/// `decrypt(y) == y` for any `y` lacking the [PREAMBLE].
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, text: &str) -> Result<String>;
}

/// AES-256-GCM behind the envelope convention. The nonce rides along in the envelope; it's drawn
/// from a v4 UUID, which is plenty of entropy for the volume of env-var writes we'll ever see.
pub struct EnvelopeCipher {
    key: SecretSlice<u8>,
}

impl EnvelopeCipher {
    pub fn new(key: SecretSlice<u8>) -> Result<EnvelopeCipher> {
        let length = key.expose_secret().len();
        ensure!(length == 32, BadKeyLengthSnafu { length });
        Ok(EnvelopeCipher { key })
    }

    fn aead(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.expose_secret()).map_err(|_| {
            BadKeyLengthSnafu {
                length: self.key.expose_secret().len(),
            }
            .build()
        })
    }
}

impl Cipher for EnvelopeCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_source = Uuid::new_v4().into_bytes();
        let nonce = Nonce::from_slice(&nonce_source[..12]);
        let ciphertext = self
            .aead()?
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptSnafu.build())?;
        let mut payload = Vec::with_capacity(12 + ciphertext.len());
        payload.extend_from_slice(&nonce_source[..12]);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", PREAMBLE, URL_SAFE_NO_PAD.encode(payload)))
    }

    fn decrypt(&self, text: &str) -> Result<String> {
        let Some(encoded) = text.strip_prefix(PREAMBLE) else {
            // Not ours; hand it back. See the module docs.
            return Ok(text.to_owned());
        };
        let payload = URL_SAFE_NO_PAD.decode(encoded).context(Base64Snafu)?;
        ensure!(payload.len() > 12, TruncatedSnafu);
        let (nonce, ciphertext) = payload.split_at(12);
        let plaintext = self
            .aead()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecryptSnafu.build())?;
        String::from_utf8(plaintext).context(Utf8Snafu)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cipher() -> EnvelopeCipher {
        EnvelopeCipher::new(SecretSlice::from(vec![0x2au8; 32])).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = cipher();
        let ct = cipher.encrypt("connection_string").unwrap();
        assert!(ct.starts_with(PREAMBLE));
        assert_eq!(cipher.decrypt(&ct).unwrap(), "connection_string");
    }

    #[test]
    fn unmarked_text_passes_through() {
        let cipher = cipher();
        assert_eq!(cipher.decrypt("plaintext").unwrap(), "plaintext");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn fresh_nonce_every_time() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt("x").unwrap(), cipher.encrypt("x").unwrap());
    }

    #[test]
    fn tampering_is_detected() {
        let cipher = cipher();
        let mut ct = cipher.encrypt("secret").unwrap();
        ct.pop();
        ct.push('A');
        assert!(cipher.decrypt(&ct).is_err());
    }

    #[test]
    fn keys_must_be_32_bytes() {
        assert!(EnvelopeCipher::new(SecretSlice::from(vec![0u8; 16])).is_err());
    }
}
