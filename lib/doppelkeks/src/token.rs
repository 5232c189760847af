//! Token codec
//!
//! A token is the 64 byte concatenation of an authenticator and a nonce:
//!
//! ```text
//! authenticator      nonce
//! ^-----------------^-----------------^
//!      32 bytes           32 bytes
//! ```
//!
//! The authenticator is `HMAC-SHA256(secret, nonce)`. Only the nonce is stored in the cookie,
//! the authenticator is recomputed on every request.

use crate::error::{Error, TokenError};
use hex_simd::AsciiCase;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of both the authenticator and the nonce
pub const TOKEN_LEN: usize = 32;

/// Length of a full token
pub const FULL_TOKEN_LEN: usize = TOKEN_LEN * 2;

/// Key used to authenticate nonces
///
/// Has to be at least as long as the authenticator it produces.
/// The key is expanded into the HMAC state once on construction.
#[derive(Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Secret {
    mac: HmacSha256,
}

impl Secret {
    pub fn new<K>(key: K) -> Result<Self, Error>
    where
        K: AsRef<[u8]>,
    {
        let key = key.as_ref();
        if key.len() < TOKEN_LEN {
            return Err(Error::config(format!(
                "secret has to be at least {TOKEN_LEN} bytes long (got {})",
                key.len()
            )));
        }

        let mac = HmacSha256::new_from_slice(key).map_err(|_| Error::config("invalid HMAC key"))?;
        Ok(Self { mac })
    }

    fn keyed_hash(&self, nonce: &[u8; TOKEN_LEN]) -> [u8; TOKEN_LEN] {
        let mut mac = self.mac.clone();
        mac.update(nonce);

        let mut out = [0; TOKEN_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl TryFrom<String> for Secret {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Secret {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

fn decode_hex<const N: usize>(value: &[u8]) -> Result<[u8; N], TokenError> {
    let decoded = hex_simd::decode_to_vec(value).map_err(|_| TokenError::Encoding)?;
    <[u8; N]>::try_from(decoded.as_slice()).map_err(|_| TokenError::BadLength {
        expected: N,
        actual: decoded.len(),
    })
}

/// Raw half of a token, the part that lives inside the cookie
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; TOKEN_LEN]);

impl Nonce {
    #[must_use]
    pub fn random() -> Self {
        let mut buf = [0; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut buf);
        Self(buf)
    }

    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }

    pub fn from_hex<T>(value: T) -> Result<Self, TokenError>
    where
        T: AsRef<[u8]>,
    {
        decode_hex(value.as_ref()).map(Self)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex_simd::encode_to_string(self.0, AsciiCase::Lower)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Nonce").field(&self.to_hex()).finish()
    }
}

/// Authenticated token (authenticator followed by nonce)
#[derive(Clone, Copy)]
pub struct Token([u8; FULL_TOKEN_LEN]);

impl Token {
    fn assemble(authenticator: &[u8; TOKEN_LEN], nonce: &Nonce) -> Self {
        let mut buf = [0; FULL_TOKEN_LEN];
        buf[..TOKEN_LEN].copy_from_slice(authenticator);
        buf[TOKEN_LEN..].copy_from_slice(nonce.as_bytes());
        Self(buf)
    }

    /// Interpret arbitrary bytes as a token
    ///
    /// Only the length is checked here. Use [`verify`] to check the authenticator.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TokenError> {
        <[u8; FULL_TOKEN_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| TokenError::BadLength {
                expected: FULL_TOKEN_LEN,
                actual: bytes.len(),
            })
    }

    pub fn from_hex<T>(value: T) -> Result<Self, TokenError>
    where
        T: AsRef<[u8]>,
    {
        decode_hex(value.as_ref()).map(Self)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex_simd::encode_to_string(self.0, AsciiCase::Lower)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FULL_TOKEN_LEN] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn authenticator(&self) -> &[u8] {
        &self.0[..TOKEN_LEN]
    }

    #[must_use]
    pub fn nonce(&self) -> Nonce {
        let mut buf = [0; TOKEN_LEN];
        buf.copy_from_slice(&self.0[TOKEN_LEN..]);
        Nonce(buf)
    }
}

impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for Token {}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.to_hex()).finish()
    }
}

/// Generate a fresh token from a random nonce
#[must_use]
pub fn generate(secret: &Secret) -> Token {
    derive_from_nonce(&Nonce::random(), secret)
}

/// Recompute the full token for a nonce recovered from a cookie
#[must_use]
pub fn derive_from_nonce(nonce: &Nonce, secret: &Secret) -> Token {
    let authenticator = secret.keyed_hash(nonce.as_bytes());
    Token::assemble(&authenticator, nonce)
}

/// Check that the token could have been produced with this secret
///
/// This says nothing about whether the token belongs to the current session.
pub fn verify(token: &[u8], secret: &Secret) -> Result<(), TokenError> {
    let token = Token::from_slice(token)?;
    let expected = secret.keyed_hash(token.nonce().as_bytes());

    if bool::from(expected[..].ct_eq(token.authenticator())) {
        Ok(())
    } else {
        Err(TokenError::Mismatch)
    }
}

#[cfg(test)]
mod test {
    use super::{FULL_TOKEN_LEN, Nonce, Secret, Token, derive_from_nonce, generate, verify};
    use crate::error::{Error, TokenError};

    const SECRET: &str = "super-duper-secret-value-for-csrf";

    fn secret() -> Secret {
        Secret::new(SECRET).unwrap()
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = Secret::new("secret");
        assert!(matches!(result, Err(Error::Config(..))));
    }

    #[test]
    fn generated_token_has_full_length() {
        let token = generate(&secret());
        assert_eq!(token.as_bytes().len(), FULL_TOKEN_LEN);
        assert_eq!(token.to_hex().len(), FULL_TOKEN_LEN * 2);
    }

    #[test]
    fn generated_token_verifies() {
        let secret = secret();
        let token = generate(&secret);
        assert_eq!(verify(token.as_bytes(), &secret), Ok(()));
    }

    #[test]
    fn different_secret_does_not_verify() {
        let token = generate(&secret());
        let other = Secret::new("a-completely-different-secret-value").unwrap();

        assert_eq!(verify(token.as_bytes(), &other), Err(TokenError::Mismatch));
    }

    #[test]
    fn derive_matches_generate() {
        let secret = secret();
        let token = generate(&secret);
        let derived = derive_from_nonce(&token.nonce(), &secret);

        assert_eq!(token, derived);
        assert_eq!(token.to_hex(), derived.to_hex());
    }

    #[test]
    fn derive_with_different_secret_differs() {
        let token = generate(&secret());
        let other = Secret::new("a-completely-different-secret-value").unwrap();
        let derived = derive_from_nonce(&token.nonce(), &other);

        assert_ne!(token, derived);
    }

    #[test]
    fn hex_roundtrip() {
        let token = generate(&secret());
        let decoded = Token::from_hex(token.to_hex()).unwrap();
        assert_eq!(token, decoded);

        let nonce = Nonce::from_hex(token.nonce().to_hex()).unwrap();
        assert_eq!(nonce, token.nonce());
    }

    #[test]
    fn bad_hex_is_encoding_error() {
        assert_eq!(Nonce::from_hex("zz").unwrap_err(), TokenError::Encoding);
        assert_eq!(Token::from_hex("abc").unwrap_err(), TokenError::Encoding);
    }

    #[test]
    fn short_hex_is_length_error() {
        assert_eq!(
            Nonce::from_hex("abcd").unwrap_err(),
            TokenError::BadLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", secret()), "Secret([redacted])");
    }
}
