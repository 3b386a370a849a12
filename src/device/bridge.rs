//! Connect-bridge transport adapter
//!
//! Talks JSON over HTTP to the vendor's local connect bridge, which owns the
//! USB session with the device. PIN and passphrase challenges come back as
//! structured refusals and are answered through the operator prompt port.

use crate::device::prompt::OperatorPrompt;
use crate::device::transport::DeviceTransport;
use crate::device::wire::{PreparedInput, PreparedOutput, SignedTx};
use crate::error::{HwsignError, HwsignResult};
use crate::{log_debug, log_warn};
use bitcoin::bip32::Xpub;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Challenge codes the bridge answers with instead of a payload
const CODE_PIN_NEEDED: &str = "pin-needed";
const CODE_PASSPHRASE_NEEDED: &str = "passphrase-needed";

/// One challenge each for PIN and passphrase, then give up.
const MAX_CHALLENGE_ROUNDS: u32 = 3;

/// Transport-level failures, separated from the central error type so the
/// connect-specific handling stays in this file.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Could not reach the connect bridge: {0}")]
    Unreachable(reqwest::Error),

    #[error("Bridge request failed: {0}")]
    Http(reqwest::Error),

    #[error("{0}")]
    Device(String),

    #[error("Malformed bridge response: {0}")]
    Protocol(String),
}

impl From<BridgeError> for HwsignError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Unreachable(inner) => {
                HwsignError::disconnected("Device bridge unreachable")
                    .with_details(inner.to_string())
            }
            BridgeError::Http(inner) => HwsignError::device(inner.to_string()),
            BridgeError::Device(msg) => HwsignError::device(msg),
            BridgeError::Protocol(msg) => HwsignError::device("Bridge protocol error")
                .with_details(msg),
        }
    }
}

#[derive(Serialize)]
struct XpubRequest<'a> {
    path: &'a [u32],
    coin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passphrase: Option<&'a str>,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    inputs: &'a [PreparedInput],
    outputs: &'a [PreparedOutput],
    coin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passphrase: Option<&'a str>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    payload: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
struct XpubPayload {
    xpub: String,
}

/// HTTP client for the local connect bridge.
pub struct BridgeTransport {
    base_url: String,
    client: reqwest::blocking::Client,
    prompt: Box<dyn OperatorPrompt>,
}

impl BridgeTransport {
    pub fn new(base_url: &str, prompt: Box<dyn OperatorPrompt>) -> HwsignResult<Self> {
        let client = reqwest::blocking::Client::builder()
            // The device waits on a human; only connecting gets a deadline.
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HwsignError::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            prompt,
        })
    }

    fn exchange<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<Envelope<T>, BridgeError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        log_debug!("device", "bridge call", endpoint = endpoint);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    BridgeError::Unreachable(e)
                } else {
                    BridgeError::Http(e)
                }
            })?;

        response
            .json::<Envelope<T>>()
            .map_err(|e| BridgeError::Protocol(e.to_string()))
    }

    /// Issue a call, answering PIN/passphrase challenges through the
    /// operator prompt. `default_failure` is used when the device reports
    /// failure without a message.
    fn call_with_challenges<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        build: impl Fn(Option<&str>, Option<&str>) -> serde_json::Value,
        default_failure: &str,
    ) -> HwsignResult<T> {
        let mut pin: Option<String> = None;
        let mut passphrase: Option<String> = None;

        for _ in 0..MAX_CHALLENGE_ROUNDS {
            let body = build(pin.as_deref(), passphrase.as_deref());
            let envelope: Envelope<T> = self.exchange(endpoint, &body)?;

            if envelope.success {
                return envelope.payload.ok_or_else(|| {
                    HwsignError::device("Bridge reported success without a payload")
                });
            }

            match envelope.code.as_deref() {
                Some(CODE_PIN_NEEDED) => {
                    pin = Some(self.prompt.pin()?);
                }
                Some(CODE_PASSPHRASE_NEEDED) => {
                    passphrase = Some(self.prompt.passphrase()?);
                }
                _ => {
                    let message = envelope
                        .error
                        .unwrap_or_else(|| default_failure.to_string());
                    log_warn!("device", "device reported failure", endpoint = endpoint);
                    return Err(BridgeError::Device(message).into());
                }
            }
        }

        Err(HwsignError::device("Too many PIN/passphrase challenges from device"))
    }
}

impl DeviceTransport for BridgeTransport {
    fn get_xpub(&self, path: &[u32], coin: &str) -> HwsignResult<Xpub> {
        let payload: XpubPayload = self.call_with_challenges(
            "xpub",
            |pin, passphrase| {
                serde_json::to_value(XpubRequest { path, coin, pin, passphrase })
                    .expect("xpub request serializes")
            },
            "Failed to load public key from device",
        )?;

        log_debug!("device", "xpub received", xpub = payload.xpub);
        Xpub::from_str(&payload.xpub)
            .map_err(|e| HwsignError::device("Bridge returned an invalid xpub")
                .with_details(e.to_string()))
    }

    fn sign_transaction(
        &self,
        inputs: &[PreparedInput],
        outputs: &[PreparedOutput],
        coin: &str,
    ) -> HwsignResult<SignedTx> {
        self.call_with_challenges(
            "sign",
            |pin, passphrase| {
                serde_json::to_value(SignRequest { inputs, outputs, coin, pin, passphrase })
                    .expect("sign request serializes")
            },
            "Failed to sign transaction on device",
        )
    }
}
