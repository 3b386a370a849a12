//! Shared types for hwsign
//!
//! The network context is an explicit value handed to every function that
//! encodes an address, picks a coin name, or talks to a chain API. Nothing
//! in this crate reads network parameters from process-global state.

use crate::error::{HwsignError, HwsignResult};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Connection details for a bitcoind JSON-RPC endpoint (regtest flows)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Explicit network selection plus the endpoints that go with it.
///
/// Constructed once at startup (or by `set-reg-test`) and passed by
/// reference through the sign/broadcast call chain.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub network: Network,
    pub esplora_base: String,
    pub bitcoind: Option<BitcoindConfig>,
    /// When set, skip the fee API and use this rate (sat/vB).
    pub fixed_fee_rate: Option<u64>,
}

impl NetworkContext {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Bitcoin,
            esplora_base: "https://mempool.space/api".to_string(),
            bitcoind: None,
            fixed_fee_rate: None,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            esplora_base: "https://mempool.space/testnet/api".to_string(),
            bitcoind: None,
            fixed_fee_rate: None,
        }
    }

    /// Regtest against a local node. Fee rate is pinned to 1 sat/vB so test
    /// flows do not depend on a fee estimator.
    pub fn regtest(host: &str) -> Self {
        Self {
            network: Network::Regtest,
            esplora_base: format!("http://{}:3002", host),
            bitcoind: Some(BitcoindConfig {
                url: format!("http://{}:18443", host),
                username: "rpcuser".to_string(),
                password: "rpcpass".to_string(),
            }),
            fixed_fee_rate: Some(1),
        }
    }

    /// Coin name in the form the device bridge expects.
    pub fn coin_name(&self) -> HwsignResult<&'static str> {
        match self.network {
            Network::Bitcoin => Ok("bitcoin"),
            Network::Testnet => Ok("testnet"),
            Network::Regtest => Ok("regtest"),
            other => Err(HwsignError::internal(format!(
                "Unsupported network: {:?}",
                other
            ))),
        }
    }

    pub fn is_regtest(&self) -> bool {
        self.network == Network::Regtest
    }
}
