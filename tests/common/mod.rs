//! Scripted software device for end-to-end signing tests
//!
//! Implements the transport seam with local keys and deterministic ECDSA,
//! mirroring what the hardware does with the prepared wire data: rebuild
//! the transaction, compute the legacy sighash for the one input carrying
//! `address_n`, and assemble that input's script.

use bitcoin::absolute::LockTime;
use bitcoin::bip32::Xpub;
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::hashes::Hash;
use bitcoin::key::PublicKey;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHBYTES_0, OP_RETURN};
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    base58, Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use hwsign::device::{node_public_key, DeviceTransport, PreparedInput, PreparedOutput, SignedTx};
use hwsign::{HwsignError, HwsignResult};
use std::str::FromStr;

pub struct ScriptedDevice {
    secp: Secp256k1<All>,
    keys: Vec<(Vec<u32>, SecretKey)>,
    network: Network,
}

impl ScriptedDevice {
    pub fn new(network: Network) -> Self {
        Self {
            secp: Secp256k1::new(),
            keys: Vec::new(),
            network,
        }
    }

    /// Install a deterministic key at a path.
    pub fn add_key(&mut self, path: Vec<u32>, seed: u8) -> PublicKey {
        let secret = SecretKey::from_slice(&[seed; 32]).expect("non-zero seed");
        let pubkey = PublicKey::new(secret.public_key(&self.secp));
        self.keys.push((path, secret));
        pubkey
    }

    pub fn pubkey_at(&self, path: &[u32]) -> PublicKey {
        let secret = self.secret_at(path).expect("known path");
        PublicKey::new(secret.public_key(&self.secp))
    }

    pub fn address_at(&self, path: &[u32]) -> Address {
        Address::p2pkh(&self.pubkey_at(path), self.network)
    }

    fn secret_at(&self, path: &[u32]) -> Option<&SecretKey> {
        self.keys
            .iter()
            .find(|(known, _)| known.as_slice() == path)
            .map(|(_, secret)| secret)
    }

    fn rebuild_transaction(
        &self,
        inputs: &[PreparedInput],
        outputs: &[PreparedOutput],
    ) -> HwsignResult<Transaction> {
        let tx_inputs = inputs
            .iter()
            .map(|input| {
                Ok(TxIn {
                    previous_output: OutPoint::new(
                        input
                            .prev_hash
                            .parse()
                            .map_err(|_| HwsignError::parse_error("bad prev_hash"))?,
                        input.prev_index,
                    ),
                    script_sig: match &input.script_sig {
                        Some(hex_script) => ScriptBuf::from_bytes(hex::decode(hex_script)?),
                        None => ScriptBuf::new(),
                    },
                    sequence: Sequence(input.sequence),
                    witness: Witness::default(),
                })
            })
            .collect::<HwsignResult<Vec<_>>>()?;

        let tx_outputs = outputs
            .iter()
            .map(|output| {
                if output.script_type == "PAYTOOPRETURN" {
                    let data = hex::decode(
                        output
                            .op_return_data
                            .as_deref()
                            .ok_or_else(|| HwsignError::parse_error("missing op_return_data"))?,
                    )?;
                    let push = PushBytesBuf::try_from(data)
                        .map_err(|_| HwsignError::parse_error("op_return too large"))?;
                    Ok(TxOut {
                        value: Amount::ZERO,
                        script_pubkey: Builder::new()
                            .push_opcode(OP_RETURN)
                            .push_slice(push)
                            .into_script(),
                    })
                } else {
                    let address = output
                        .address
                        .as_deref()
                        .ok_or_else(|| HwsignError::parse_error("missing address"))?;
                    let amount: u64 = output
                        .amount
                        .parse()
                        .map_err(|_| HwsignError::parse_error("bad amount"))?;
                    Ok(TxOut {
                        value: Amount::from_sat(amount),
                        script_pubkey: Address::from_str(address)?
                            .require_network(self.network)
                            .map_err(|e| HwsignError::parse_error(e.to_string()))?
                            .script_pubkey(),
                    })
                }
            })
            .collect::<HwsignResult<Vec<_>>>()?;

        Ok(Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: tx_inputs,
            output: tx_outputs,
        })
    }
}

impl DeviceTransport for ScriptedDevice {
    fn get_xpub(&self, path: &[u32], _coin: &str) -> HwsignResult<Xpub> {
        let secret = self
            .secret_at(path)
            .ok_or_else(|| HwsignError::device("Unknown derivation path"))?;
        let pubkey = secret.public_key(&self.secp);

        let mut data = Vec::with_capacity(78);
        let version: [u8; 4] = if self.network == Network::Bitcoin {
            [0x04, 0x88, 0xB2, 0x1E]
        } else {
            [0x04, 0x35, 0x87, 0xCF]
        };
        data.extend_from_slice(&version);
        data.push(0);
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&[1u8; 32]); // fixed chain code for derive_pub
        data.extend_from_slice(&pubkey.serialize());

        Xpub::from_str(&base58::encode_check(&data))
            .map_err(|e| HwsignError::device(format!("xpub assembly failed: {}", e)))
    }

    fn sign_transaction(
        &self,
        inputs: &[PreparedInput],
        outputs: &[PreparedOutput],
        _coin: &str,
    ) -> HwsignResult<SignedTx> {
        let sign_index = inputs
            .iter()
            .position(|input| input.address_n.is_some())
            .ok_or_else(|| HwsignError::device("No input carries address_n"))?;
        let target = &inputs[sign_index];
        let path = target.address_n.as_deref().unwrap_or_default();
        let secret = self
            .secret_at(path)
            .ok_or_else(|| HwsignError::device("Unknown derivation path"))?;
        let own_pubkey = PublicKey::new(secret.public_key(&self.secp));

        let mut tx = self.rebuild_transaction(inputs, outputs)?;

        // script_code: the redeem script for multisig, the spent P2PKH
        // script otherwise.
        let script_code = match &target.multisig {
            Some(descriptor) => {
                let mut builder = Builder::new().push_int(descriptor.m as i64);
                let mut pubkeys = Vec::with_capacity(descriptor.pubkeys.len());
                for entry in &descriptor.pubkeys {
                    let pubkey = node_public_key(&entry.node)?;
                    builder = builder.push_key(&pubkey);
                    pubkeys.push(pubkey);
                }
                let redeem = builder
                    .push_int(descriptor.pubkeys.len() as i64)
                    .push_opcode(OP_CHECKMULTISIG)
                    .into_script();

                let own_slot = pubkeys
                    .iter()
                    .position(|candidate| *candidate == own_pubkey)
                    .ok_or_else(|| HwsignError::device("Own key not among cosigners"))?;

                let sighash = SighashCache::new(&tx)
                    .legacy_signature_hash(sign_index, &redeem, EcdsaSighashType::All.to_u32())
                    .map_err(|e| HwsignError::device(e.to_string()))?;
                let message = Message::from_digest_slice(sighash.as_byte_array())
                    .map_err(|e| HwsignError::device(e.to_string()))?;
                let signature = self.secp.sign_ecdsa(&message, secret);

                let mut slots = descriptor.signatures.clone();
                slots[own_slot] = hex::encode(signature.serialize_der());

                let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
                for slot in &slots {
                    if slot.is_empty() {
                        continue;
                    }
                    let mut sig = hex::decode(slot)?;
                    sig.push(EcdsaSighashType::All as u8);
                    builder = builder.push_slice(
                        PushBytesBuf::try_from(sig)
                            .map_err(|_| HwsignError::device("oversized signature"))?,
                    );
                }
                let script_sig = builder
                    .push_slice(
                        PushBytesBuf::try_from(redeem.to_bytes())
                            .map_err(|_| HwsignError::device("oversized redeem script"))?,
                    )
                    .into_script();

                tx.input[sign_index].script_sig = script_sig;
                None
            }
            None => Some(Address::p2pkh(&own_pubkey, self.network).script_pubkey()),
        };

        if let Some(script_code) = script_code {
            let sighash = SighashCache::new(&tx)
                .legacy_signature_hash(sign_index, &script_code, EcdsaSighashType::All.to_u32())
                .map_err(|e| HwsignError::device(e.to_string()))?;
            let message = Message::from_digest_slice(sighash.as_byte_array())
                .map_err(|e| HwsignError::device(e.to_string()))?;
            let signature = self.secp.sign_ecdsa(&message, secret);

            let mut sig = signature.serialize_der().to_vec();
            sig.push(EcdsaSighashType::All as u8);
            let script_sig = Builder::new()
                .push_slice(
                    PushBytesBuf::try_from(sig)
                        .map_err(|_| HwsignError::device("oversized signature"))?,
                )
                .push_key(&own_pubkey)
                .into_script();
            tx.input[sign_index].script_sig = script_sig;
        }

        Ok(SignedTx {
            serialized_tx: hex::encode(bitcoin::consensus::encode::serialize(&tx)),
            signatures: Vec::new(),
        })
    }
}
