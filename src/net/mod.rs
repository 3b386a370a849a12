//! Network layer
//!
//! Fetches referenced transactions, UTXO sets and fee rates, and submits
//! raw transactions. Public networks go through an esplora-style HTTP API;
//! regtest goes through bitcoind JSON-RPC with basic auth.
//!
//! Freshly built transactions can be tracked before confirmation so the
//! next step of a preorder/register sequence can spend their outputs.

use crate::error::{HwsignError, HwsignResult};
use crate::log_debug;
use crate::types::NetworkContext;
use base64::Engine;
use bitcoin::consensus::encode;
use bitcoin::{Address, Transaction};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spendable output as reported by the UTXO API (or the local overlay)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
}

pub struct NetworkClient {
    client: reqwest::blocking::Client,
    /// Raw transactions tracked locally, in broadcast order.
    tracked: Vec<Transaction>,
}

impl NetworkClient {
    pub fn new() -> HwsignResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HwsignError::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            tracked: Vec::new(),
        })
    }

    /// Fetch a raw transaction by id, consulting tracked transactions first.
    pub fn get_raw_transaction(&self, ctx: &NetworkContext, txid: &str) -> HwsignResult<Vec<u8>> {
        for tx in &self.tracked {
            if tx.compute_txid().to_string() == txid {
                return Ok(encode::serialize(tx));
            }
        }

        if ctx.is_regtest() {
            let raw: String = self.bitcoind_call(ctx, "getrawtransaction", vec![txid.into()])?;
            return Ok(hex::decode(raw)?);
        }

        let url = format!("{}/tx/{}/hex", ctx.esplora_base, txid);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(HwsignError::network_error(format!(
                "Failed to get raw transaction {}: HTTP {}",
                txid,
                response.status()
            )));
        }
        Ok(hex::decode(response.text()?.trim())?)
    }

    /// Submit a raw transaction; returns the accepted txid.
    pub fn broadcast(&self, ctx: &NetworkContext, raw_hex: &str) -> HwsignResult<String> {
        log_debug!("net", "broadcasting transaction", bytes = raw_hex.len() / 2);

        if ctx.is_regtest() {
            let txid: String =
                self.bitcoind_call(ctx, "sendrawtransaction", vec![raw_hex.into()])?;
            return Ok(txid);
        }

        let url = format!("{}/tx", ctx.esplora_base);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(raw_hex.to_string())
            .send()?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if status.is_success() {
            Ok(body.trim().to_string())
        } else {
            Err(HwsignError::broadcast_failed(format!(
                "Broadcast rejected: {}",
                body.trim()
            )))
        }
    }

    /// Recommended fee rate in sat/vB.
    pub fn get_fee_rate(&self, ctx: &NetworkContext) -> HwsignResult<u64> {
        if let Some(rate) = ctx.fixed_fee_rate {
            return Ok(rate);
        }

        #[derive(Deserialize)]
        struct RecommendedFees {
            #[serde(rename = "halfHourFee")]
            half_hour_fee: u64,
        }

        let url = format!("{}/v1/fees/recommended", ctx.esplora_base);
        let fees: RecommendedFees = self.client.get(&url).send()?.json()?;
        Ok(fees.half_hour_fee)
    }

    /// Confirmed+mempool UTXOs for an address, with the tracked-transaction
    /// overlay applied on top.
    pub fn get_utxos(&self, ctx: &NetworkContext, address: &Address) -> HwsignResult<Vec<Utxo>> {
        #[derive(Deserialize)]
        struct RawUtxo {
            txid: String,
            vout: u32,
            value: u64,
        }

        let url = format!("{}/address/{}/utxo", ctx.esplora_base, address);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(HwsignError::network_error(format!(
                "UTXO fetch failed: HTTP {}",
                response.status()
            )));
        }
        let raw: Vec<RawUtxo> = response.json()?;
        let base = raw
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
            })
            .collect();

        Ok(apply_overlay(base, address, &self.tracked))
    }

    /// Remember a raw transaction so its outputs become spendable (and its
    /// inputs unspendable) before it confirms. Returns the txid.
    pub fn track_transaction(&mut self, raw_hex: &str) -> HwsignResult<String> {
        let tx: Transaction = encode::deserialize(&hex::decode(raw_hex)?)?;
        let txid = tx.compute_txid().to_string();
        self.tracked.push(tx);
        Ok(txid)
    }

    fn bitcoind_call<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &NetworkContext,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> HwsignResult<T> {
        #[derive(Serialize)]
        struct RpcRequest<'a> {
            jsonrpc: &'static str,
            method: &'a str,
            params: Vec<serde_json::Value>,
        }

        #[derive(Deserialize)]
        struct RpcResponse<T> {
            result: Option<T>,
            error: Option<RpcError>,
        }

        #[derive(Deserialize)]
        struct RpcError {
            message: String,
        }

        let config = ctx
            .bitcoind
            .as_ref()
            .ok_or_else(|| HwsignError::internal("No bitcoind configured for this network"))?;

        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", config.username, config.password));

        let response: RpcResponse<T> = self
            .client
            .post(&config.url)
            .header("Authorization", format!("Basic {}", auth))
            .json(&RpcRequest {
                jsonrpc: "1.0",
                method,
                params,
            })
            .send()?
            .json()?;

        if let Some(error) = response.error {
            return Err(match method {
                "sendrawtransaction" => HwsignError::broadcast_failed(error.message),
                _ => HwsignError::network_error(error.message),
            });
        }

        response
            .result
            .ok_or_else(|| HwsignError::network_error("Empty bitcoind response"))
    }
}

/// Apply tracked transactions to an API-reported UTXO set: outpoints they
/// consume disappear, outputs they pay to `address` appear.
fn apply_overlay(mut base: Vec<Utxo>, address: &Address, tracked: &[Transaction]) -> Vec<Utxo> {
    let script = address.script_pubkey();

    for tx in tracked {
        for input in &tx.input {
            let spent_txid = input.previous_output.txid.to_string();
            let spent_vout = input.previous_output.vout;
            base.retain(|u| !(u.txid == spent_txid && u.vout == spent_vout));
        }

        let txid = tx.compute_txid().to_string();
        for (vout, output) in tx.output.iter().enumerate() {
            if output.script_pubkey == script {
                base.push(Utxo {
                    txid: txid.clone(),
                    vout: vout as u32,
                    value: output.value.to_sat(),
                });
            }
        }
    }

    base
}
