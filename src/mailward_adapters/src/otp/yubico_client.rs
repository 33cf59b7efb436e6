use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, Secret};
use sha1::Sha1;

use mailward_core::{OtpValidationClient, OtpValidationError};

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_API_URL: &str = "https://api.yubico.com/wsapi/2.0/verify";

/// Client for the Yubico OTP validation web service. Requests and
/// responses are HMAC-SHA1 signed with the shared API key; a response
/// that echoes the wrong OTP or nonce, or carries a bad signature, is
/// treated as a transport failure rather than a rejection.
#[derive(Clone)]
pub struct YubicoHttpClient {
    http: reqwest::Client,
    api_url: String,
}

impl YubicoHttpClient {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl OtpValidationClient for YubicoHttpClient {
    async fn verify(
        &self,
        client_id: &str,
        api_key: &Secret<String>,
        otp: &str,
    ) -> Result<(), OtpValidationError> {
        let key = BASE64
            .decode(api_key.expose_secret())
            .map_err(|_| OtpValidationError::Transport("API key is not valid base64".into()))?;

        let nonce = hex::encode(rand::rng().random::<[u8; 16]>());
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), client_id.to_string());
        params.insert("otp".to_string(), otp.to_string());
        params.insert("nonce".to_string(), nonce.clone());
        let signature = sign(&key, &params)?;
        params.insert("h".to_string(), signature);

        let response = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| OtpValidationError::Transport(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| OtpValidationError::Transport(e.to_string()))?;

        let fields = parse_response(&body);
        verify_response_signature(&key, &fields)?;
        if fields.get("otp").map(String::as_str) != Some(otp) {
            return Err(OtpValidationError::Transport("OTP echo mismatch".into()));
        }
        if fields.get("nonce").map(String::as_str) != Some(nonce.as_str()) {
            return Err(OtpValidationError::Transport("nonce echo mismatch".into()));
        }

        match fields.get("status").map(String::as_str) {
            Some("OK") => Ok(()),
            Some(status) => Err(OtpValidationError::Rejected(status.to_string())),
            None => Err(OtpValidationError::Transport("no status in response".into())),
        }
    }
}

/// HMAC-SHA1 over the parameters in alphabetical order, base64-encoded.
fn sign(key: &[u8], params: &BTreeMap<String, String>) -> Result<String, OtpValidationError> {
    let payload = params
        .iter()
        .filter(|(name, _)| name.as_str() != "h")
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|_| OtpValidationError::Transport("unusable API key".into()))?;
    mac.update(payload.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn verify_response_signature(
    key: &[u8],
    fields: &BTreeMap<String, String>,
) -> Result<(), OtpValidationError> {
    let Some(claimed) = fields.get("h") else {
        return Err(OtpValidationError::Transport("unsigned response".into()));
    };
    let expected = sign(key, fields)?;
    if *claimed == expected {
        Ok(())
    } else {
        Err(OtpValidationError::Transport(
            "response signature mismatch".into(),
        ))
    }
}

/// The service answers `name=value` lines; values may contain `=`.
fn parse_response(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (name, value) = line.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
