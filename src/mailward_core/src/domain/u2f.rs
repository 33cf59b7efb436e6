//! Raw U2F registration and authentication message handling.
//!
//! The panel speaks the raw U2F wire format: websafe-base64 payloads,
//! `navigator.id.*` client data, and ECDSA P-256 signatures over the raw
//! message layouts. Challenges are issued into the session context and
//! consumed exactly once.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const U2F_VERSION: &str = "U2F_V2";

const REGISTER_TYP: &str = "navigator.id.finishEnrollment";
const SIGN_TYP: &str = "navigator.id.getAssertion";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum U2fError {
    #[error("client data is not valid JSON")]
    InvalidClientData,
    #[error("unexpected client data type {0:?}")]
    WrongClientDataType(String),
    #[error("challenge does not match the issued request")]
    ChallengeMismatch,
    #[error("malformed response payload")]
    MalformedResponse,
    #[error("attestation certificate could not be parsed")]
    BadAttestationCertificate,
    #[error("signature verification failed")]
    BadSignature,
    #[error("key handle is not registered for this user")]
    UnknownKeyHandle,
    #[error("user presence flag not set")]
    UserPresenceRequired,
    #[error("signature counter did not advance (got {got}, stored {stored})")]
    CounterReplayed { got: u32, stored: u32 },
}

/// A registration challenge previously issued to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct U2fRegisterRequest {
    pub version: &'static str,
    pub app_id: String,
    pub challenge: String,
}

impl U2fRegisterRequest {
    pub fn new(app_id: &str) -> Self {
        Self {
            version: U2F_VERSION,
            app_id: app_id.to_string(),
            challenge: random_challenge(),
        }
    }
}

/// An authentication challenge previously issued to the client, carrying
/// the key handles registered for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct U2fSignRequest {
    pub version: &'static str,
    pub app_id: String,
    pub challenge: String,
    pub key_handles: Vec<String>,
}

impl U2fSignRequest {
    pub fn new(app_id: &str, key_handles: Vec<String>) -> Self {
        Self {
            version: U2F_VERSION,
            app_id: app_id.to_string(),
            challenge: random_challenge(),
            key_handles,
        }
    }
}

/// The token's attestation response to a registration challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct U2fRegisterResponse {
    #[serde(rename = "registrationData")]
    pub registration_data: String,
    #[serde(rename = "clientData")]
    pub client_data: String,
}

/// The token's signed response to an authentication challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct U2fSignResponse {
    #[serde(rename = "keyHandle")]
    pub key_handle: String,
    #[serde(rename = "signatureData")]
    pub signature_data: String,
    #[serde(rename = "clientData")]
    pub client_data: String,
}

/// Persisted key material for one registered authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct U2fRegistration {
    pub key_handle: Vec<u8>,
    pub public_key: Vec<u8>,
    pub certificate: Vec<u8>,
    pub counter: u32,
}

impl U2fRegistration {
    pub fn key_handle_websafe(&self) -> String {
        B64URL.encode(&self.key_handle)
    }
}

/// Result of a successful authentication: which stored factor matched and
/// the counter value to persist for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct U2fAuthOutcome {
    pub factor_id: i64,
    pub counter: u32,
}

#[derive(Debug, Deserialize)]
struct ClientData {
    typ: String,
    challenge: String,
}

/// Validates an attestation response against the issued registration
/// request and extracts the material to persist. The attestation
/// signature is checked with the certificate's embedded public key; chain
/// validation against vendor roots is not performed.
pub fn verify_registration(
    request: &U2fRegisterRequest,
    response: &U2fRegisterResponse,
) -> Result<U2fRegistration, U2fError> {
    let client_data_raw = decode_client_data(&response.client_data, REGISTER_TYP, &request.challenge)?;

    let blob = B64URL
        .decode(&response.registration_data)
        .map_err(|_| U2fError::MalformedResponse)?;
    // Layout: 0x05 | pubkey(65) | khLen(1) | keyHandle | attestation cert | signature
    if blob.len() < 67 || blob[0] != 0x05 {
        return Err(U2fError::MalformedResponse);
    }
    let public_key = blob[1..66].to_vec();
    let kh_len = blob[66] as usize;
    if blob.len() < 67 + kh_len {
        return Err(U2fError::MalformedResponse);
    }
    let key_handle = blob[67..67 + kh_len].to_vec();
    let cert_and_sig = &blob[67 + kh_len..];

    let (remainder, cert) = x509_parser::parse_x509_certificate(cert_and_sig)
        .map_err(|_| U2fError::BadAttestationCertificate)?;
    let certificate = cert_and_sig[..cert_and_sig.len() - remainder.len()].to_vec();
    let attestation_key =
        VerifyingKey::from_sec1_bytes(cert.public_key().subject_public_key.data.as_ref())
            .map_err(|_| U2fError::BadAttestationCertificate)?;

    let signature = Signature::from_der(remainder).map_err(|_| U2fError::MalformedResponse)?;

    // Signed message: 0x00 | sha256(appId) | sha256(clientData) | keyHandle | pubkey
    let mut message = Vec::with_capacity(1 + 32 + 32 + key_handle.len() + 65);
    message.push(0x00);
    message.extend_from_slice(&Sha256::digest(request.app_id.as_bytes()));
    message.extend_from_slice(&Sha256::digest(&client_data_raw));
    message.extend_from_slice(&key_handle);
    message.extend_from_slice(&public_key);

    attestation_key
        .verify(&message, &signature)
        .map_err(|_| U2fError::BadSignature)?;

    Ok(U2fRegistration {
        key_handle,
        public_key,
        certificate,
        counter: 0,
    })
}

/// Validates a signed authentication response against the issued sign
/// request, matching it to one of the user's stored registrations.
/// Enforces the strictly-increasing signature counter.
pub fn verify_authentication(
    request: &U2fSignRequest,
    response: &U2fSignResponse,
    registrations: &[(i64, U2fRegistration)],
) -> Result<U2fAuthOutcome, U2fError> {
    let client_data_raw = decode_client_data(&response.client_data, SIGN_TYP, &request.challenge)?;

    let key_handle = B64URL
        .decode(&response.key_handle)
        .map_err(|_| U2fError::MalformedResponse)?;
    let (factor_id, registration) = registrations
        .iter()
        .find(|(_, reg)| reg.key_handle == key_handle)
        .ok_or(U2fError::UnknownKeyHandle)?;

    let signature_data = B64URL
        .decode(&response.signature_data)
        .map_err(|_| U2fError::MalformedResponse)?;
    // Layout: presence(1) | counter(4, BE) | signature
    if signature_data.len() < 6 {
        return Err(U2fError::MalformedResponse);
    }
    let presence = signature_data[0];
    if presence & 0x01 == 0 {
        return Err(U2fError::UserPresenceRequired);
    }
    let counter = u32::from_be_bytes([
        signature_data[1],
        signature_data[2],
        signature_data[3],
        signature_data[4],
    ]);
    let signature =
        Signature::from_der(&signature_data[5..]).map_err(|_| U2fError::MalformedResponse)?;

    let public_key = VerifyingKey::from_sec1_bytes(&registration.public_key)
        .map_err(|_| U2fError::MalformedResponse)?;

    // Signed message: sha256(appId) | presence | counter | sha256(clientData)
    let mut message = Vec::with_capacity(32 + 1 + 4 + 32);
    message.extend_from_slice(&Sha256::digest(request.app_id.as_bytes()));
    message.push(presence);
    message.extend_from_slice(&counter.to_be_bytes());
    message.extend_from_slice(&Sha256::digest(&client_data_raw));

    public_key
        .verify(&message, &signature)
        .map_err(|_| U2fError::BadSignature)?;

    if counter <= registration.counter {
        return Err(U2fError::CounterReplayed {
            got: counter,
            stored: registration.counter,
        });
    }

    Ok(U2fAuthOutcome {
        factor_id: *factor_id,
        counter,
    })
}

fn decode_client_data(
    encoded: &str,
    expected_typ: &str,
    expected_challenge: &str,
) -> Result<Vec<u8>, U2fError> {
    let raw = B64URL
        .decode(encoded)
        .map_err(|_| U2fError::InvalidClientData)?;
    let parsed: ClientData =
        serde_json::from_slice(&raw).map_err(|_| U2fError::InvalidClientData)?;
    if parsed.typ != expected_typ {
        return Err(U2fError::WrongClientDataType(parsed.typ));
    }
    if parsed.challenge != expected_challenge {
        return Err(U2fError::ChallengeMismatch);
    }
    Ok(raw)
}

fn random_challenge() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    B64URL.encode(bytes)
}
