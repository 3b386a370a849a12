//! Wire shapes for the connect bridge
//!
//! These structs serialize 1:1 into the JSON the vendor bridge expects. The
//! device must see the whole transaction shape to compute signature hashes,
//! but only the input carrying `address_n` is signed in a given call.

use crate::error::{HwsignError, HwsignResult};
use bitcoin::key::PublicKey;
use bitcoin::{base58, Network};
use serde::{Deserialize, Serialize};

/// Script type tag for the input being multisig-signed
pub const SCRIPT_TYPE_SPEND_MULTISIG: &str = "SPENDMULTISIG";

/// Output script type tags
pub const SCRIPT_TYPE_PAY_TO_ADDRESS: &str = "PAYTOADDRESS";
pub const SCRIPT_TYPE_PAY_TO_OP_RETURN: &str = "PAYTOOPRETURN";

/// One transaction input in device form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedInput {
    /// Previous transaction hash, byte-reversed from the internal
    /// representation (i.e. the usual display txid).
    pub prev_hash: String,
    pub prev_index: u32,
    pub sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_sig: Option<String>,
    /// Present only on the input this call signs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_n: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisig: Option<MultisigDescriptor>,
}

/// Multisig metadata attached to the input being signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigDescriptor {
    pub pubkeys: Vec<MultisigPubkey>,
    pub m: u32,
    /// One slot per cosigner, hex signature or empty string, index-aligned
    /// with `pubkeys`.
    pub signatures: Vec<String>,
}

/// Cosigner key in device-native node form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigPubkey {
    pub node: String,
    pub address_n: Vec<u32>,
}

/// One transaction output in device form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub amount: String,
    pub script_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data: Option<String>,
}

impl PreparedOutput {
    pub fn pay_to_address(address: String, amount: u64) -> Self {
        Self {
            address: Some(address),
            amount: amount.to_string(),
            script_type: SCRIPT_TYPE_PAY_TO_ADDRESS.to_string(),
            op_return_data: None,
        }
    }

    pub fn null_data(payload_hex: String) -> Self {
        Self {
            address: None,
            amount: "0".to_string(),
            script_type: SCRIPT_TYPE_PAY_TO_OP_RETURN.to_string(),
            op_return_data: Some(payload_hex),
        }
    }
}

/// Device signing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTx {
    pub serialized_tx: String,
    #[serde(default)]
    pub signatures: Vec<String>,
}

// BIP-32 serialization version bytes for public nodes
const XPUB_VERSION_MAIN: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const XPUB_VERSION_TEST: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

/// Build a device-native node descriptor from a raw public key.
///
/// The chain code is zeroed: only the key material matters for signing, not
/// derivation continuity.
pub fn fabricate_node(pubkey: &PublicKey, network: Network) -> String {
    let mut data = Vec::with_capacity(78);
    let version = if network == Network::Bitcoin {
        XPUB_VERSION_MAIN
    } else {
        XPUB_VERSION_TEST
    };
    data.extend_from_slice(&version);
    data.push(0); // depth
    data.extend_from_slice(&[0u8; 4]); // parent fingerprint
    data.extend_from_slice(&[0u8; 4]); // child number
    data.extend_from_slice(&[0u8; 32]); // chain code
    data.extend_from_slice(&pubkey.inner.serialize());
    base58::encode_check(&data)
}

/// Recover the raw public key from a node descriptor.
pub fn node_public_key(node: &str) -> HwsignResult<PublicKey> {
    let data = base58::decode_check(node)
        .map_err(|e| HwsignError::parse_error(format!("Invalid node descriptor: {}", e)))?;
    if data.len() != 78 {
        return Err(HwsignError::parse_error(format!(
            "Node descriptor has {} bytes, expected 78",
            data.len()
        )));
    }
    PublicKey::from_slice(&data[45..78])
        .map_err(|e| HwsignError::parse_error(format!("Invalid node public key: {}", e)))
}
