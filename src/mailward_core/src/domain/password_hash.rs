//! Codec for the five legacy password hash encodings found in the
//! directory. Every stored credential is an ASCII string of the form
//! `{TAG}payload`; the tag is matched case-insensitively and parsed once
//! at the storage boundary into a closed [`PasswordHash`] variant.
//!
//! New hashes are always produced in the primary `{SSHA256}` scheme.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest as _, Md5};
use rand::Rng;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashParseError {
    #[error("missing or unknown hash tag")]
    UnknownTag,
    #[error("malformed hash payload")]
    MalformedPayload,
}

/// A parsed stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordHash {
    /// Salted SHA-256: base64 of `digest(32) || salt`.
    SSha256 { digest: Vec<u8>, salt: Vec<u8> },
    /// Salted SHA-512: base64 of `digest(64) || salt`.
    SSha512 { digest: Vec<u8>, salt: Vec<u8> },
    /// Unsalted hex MD5. Legacy only, compared as a plain string.
    PlainMd5(String),
    /// crypt(3) SHA-512, the full `$6$salt$hash` fragment.
    Sha512Crypt(String),
    /// Historical tag kept for compatibility; the stored value is a bcrypt
    /// hash, not raw MD5.
    Md5Crypt(String),
}

impl PasswordHash {
    /// Splits the `{TAG}` prefix and parses the payload. Tags are mutually
    /// exclusive by construction, so the first match wins.
    pub fn parse(encoded: &str) -> Result<Self, HashParseError> {
        let rest = encoded.strip_prefix('{').ok_or(HashParseError::UnknownTag)?;
        let (tag, payload) = rest.split_once('}').ok_or(HashParseError::UnknownTag)?;
        match tag.to_ascii_uppercase().as_str() {
            "SSHA256" => parse_salted(payload, 32)
                .map(|(digest, salt)| PasswordHash::SSha256 { digest, salt }),
            "SSHA512" => parse_salted(payload, 64)
                .map(|(digest, salt)| PasswordHash::SSha512 { digest, salt }),
            "PLAIN-MD5" => Ok(PasswordHash::PlainMd5(payload.to_string())),
            "SHA512-CRYPT" => parse_sha512_crypt(payload),
            "MD5-CRYPT" => Ok(PasswordHash::Md5Crypt(payload.to_string())),
            _ => Err(HashParseError::UnknownTag),
        }
    }

    /// Checks a candidate password against this hash. Digest comparisons
    /// are constant time; the plain MD5 scheme is a legacy string compare.
    pub fn verify(&self, password: &str) -> bool {
        match self {
            PasswordHash::SSha256 { digest, salt } => {
                let mut hasher = Sha256::new();
                hasher.update(password.as_bytes());
                hasher.update(salt);
                bool::from(hasher.finalize().as_slice().ct_eq(digest))
            }
            PasswordHash::SSha512 { digest, salt } => {
                let mut hasher = Sha512::new();
                hasher.update(password.as_bytes());
                hasher.update(salt);
                bool::from(hasher.finalize().as_slice().ct_eq(digest))
            }
            PasswordHash::PlainMd5(stored) => {
                let computed = hex::encode(Md5::digest(password.as_bytes()));
                computed.eq_ignore_ascii_case(stored)
            }
            PasswordHash::Sha512Crypt(full) => sha_crypt::sha512_check(password, full).is_ok(),
            PasswordHash::Md5Crypt(stored) => bcrypt::verify(password, stored).unwrap_or(false),
        }
    }
}

/// Hashes a password in the primary scheme: an 8-byte random salt rendered
/// as 16 hex characters, appended to the password, digested with SHA-256,
/// then `base64(digest || salt_hex)` behind the `{SSHA256}` tag.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 8] = rand::rng().random();
    let salt_hex = hex::encode(salt);
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt_hex.as_bytes());
    let mut blob = hasher.finalize().to_vec();
    blob.extend_from_slice(salt_hex.as_bytes());
    format!("{{SSHA256}}{}", BASE64.encode(blob))
}

/// Parse-then-verify convenience for callers holding the raw stored
/// string. Unknown or malformed hashes fail closed.
pub fn verify_hash(encoded: &str, password: &str) -> bool {
    PasswordHash::parse(encoded)
        .map(|hash| hash.verify(password))
        .unwrap_or(false)
}

fn parse_salted(payload: &str, digest_len: usize) -> Result<(Vec<u8>, Vec<u8>), HashParseError> {
    let decoded = BASE64
        .decode(payload)
        .map_err(|_| HashParseError::MalformedPayload)?;
    if decoded.len() <= digest_len {
        return Err(HashParseError::MalformedPayload);
    }
    let (digest, salt) = decoded.split_at(digest_len);
    Ok((digest.to_vec(), salt.to_vec()))
}

fn parse_sha512_crypt(payload: &str) -> Result<PasswordHash, HashParseError> {
    // Expect a `$6$salt$hash` fragment with non-empty salt and hash.
    let body = payload
        .strip_prefix("$6$")
        .ok_or(HashParseError::MalformedPayload)?;
    match body.split_once('$') {
        Some((salt, hash)) if !salt.is_empty() && !hash.is_empty() => {
            Ok(PasswordHash::Sha512Crypt(payload.to_string()))
        }
        _ => Err(HashParseError::MalformedPayload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn make_ssha(password: &str, salt: &str, wide: bool) -> String {
        let (digest, tag): (Vec<u8>, &str) = if wide {
            let mut h = Sha512::new();
            h.update(password.as_bytes());
            h.update(salt.as_bytes());
            (h.finalize().to_vec(), "{SSHA512}")
        } else {
            let mut h = Sha256::new();
            h.update(password.as_bytes());
            h.update(salt.as_bytes());
            (h.finalize().to_vec(), "{SSHA256}")
        };
        let mut blob = digest;
        blob.extend_from_slice(salt.as_bytes());
        format!("{tag}{}", BASE64.encode(blob))
    }

    #[test]
    fn primary_scheme_round_trip() {
        let encoded = hash_password("moohoo");
        assert!(encoded.starts_with("{SSHA256}"));
        assert!(verify_hash(&encoded, "moohoo"));
        assert!(!verify_hash(&encoded, "moohoo "));
    }

    #[quickcheck]
    fn any_password_round_trips(password: String) -> bool {
        verify_hash(&hash_password(&password), &password)
    }

    #[quickcheck]
    fn different_password_fails(password: String, other: String) -> bool {
        password == other || !verify_hash(&hash_password(&password), &other)
    }

    #[test]
    fn ssha256_hand_built() {
        let encoded = make_ssha("password", "0123456789abcdef", false);
        assert!(verify_hash(&encoded, "password"));
        assert!(!verify_hash(&encoded, "Password"));
    }

    #[test]
    fn ssha512_hand_built() {
        let encoded = make_ssha("password", "fedcba9876543210", true);
        assert!(verify_hash(&encoded, "password"));
        assert!(!verify_hash(&encoded, "passw0rd"));
    }

    #[test]
    fn tag_is_case_insensitive() {
        let encoded = make_ssha("password", "0123456789abcdef", false)
            .replace("{SSHA256}", "{ssha256}");
        assert!(verify_hash(&encoded, "password"));
    }

    #[test]
    fn plain_md5_legacy() {
        // md5("password")
        let encoded = "{PLAIN-MD5}5f4dcc3b5aa765d61d8327deb882cf99";
        assert!(verify_hash(encoded, "password"));
        assert!(!verify_hash(encoded, "passwort"));
    }

    #[test]
    fn sha512_crypt_reference_vector() {
        // Reference vector from the crypt(3) SHA-512 specification.
        let encoded = "{SHA512-CRYPT}$6$saltstring$svn8UoSVapNtMuq1ukKS4tPQd8iKwSMHWjl/O817G3uBnIFNjnQJuesI68u4OTLiBFdcbYEdFCoEOfaS35inz1";
        assert!(verify_hash(encoded, "Hello world!"));
        assert!(!verify_hash(encoded, "Hello world"));
    }

    #[test]
    fn md5_crypt_is_actually_bcrypt() {
        let stored = bcrypt::hash("password", 4).unwrap();
        let encoded = format!("{{MD5-CRYPT}}{stored}");
        assert!(verify_hash(&encoded, "password"));
        assert!(!verify_hash(&encoded, "password1"));
    }

    #[test]
    fn unknown_or_missing_tag_fails_closed() {
        assert!(!verify_hash("password", "password"));
        assert!(!verify_hash("{ARGON2}whatever", "password"));
        assert!(!verify_hash("", "password"));
        assert!(!verify_hash("{SSHA256}!!!notbase64!!!", "password"));
        assert!(!verify_hash("{SHA512-CRYPT}$1$bad$format", "password"));
    }
}
