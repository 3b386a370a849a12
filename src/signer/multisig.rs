//! Multisig co-signer
//!
//! Holds this device's position among an ordered set of cosigner keys and
//! the threshold they agreed on. The shared redeem script and P2SH address
//! derive deterministically from (threshold, ordered keys), so two cosigners
//! running independently agree on where funds live without exchanging
//! anything but the redeem script itself.

use crate::device::{
    fabricate_node, DeviceTransport, MultisigDescriptor, MultisigPubkey, PreparedInput,
    SCRIPT_TYPE_SPEND_MULTISIG,
};
use crate::error::{HwsignError, HwsignResult};
use crate::signer::{splice_signed_input, translate_input, SignatureVector, Signer};
use crate::tx::PartialTransaction;
use crate::types::NetworkContext;
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::key::PublicKey;
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::{Address, Script, ScriptBuf, Transaction};

/// Most cosigners a canonical CHECKMULTISIG script can carry.
const MAX_COSIGNERS: usize = 15;

/// Canonical m-of-n redeem script and its P2SH address.
///
/// Identical (threshold, ordered keys) input always yields byte-identical
/// output; multisig address agreement depends on it.
pub fn multisig_info(
    pubkeys: &[PublicKey],
    threshold: usize,
    ctx: &NetworkContext,
) -> HwsignResult<(ScriptBuf, Address)> {
    if pubkeys.is_empty() || pubkeys.len() > MAX_COSIGNERS {
        return Err(HwsignError::internal(format!(
            "Multisig needs 1..={} cosigner keys, got {}",
            MAX_COSIGNERS,
            pubkeys.len()
        )));
    }
    if threshold == 0 || threshold > pubkeys.len() {
        return Err(HwsignError::internal(format!(
            "Invalid threshold {} for {} cosigners",
            threshold,
            pubkeys.len()
        )));
    }

    let mut builder = Builder::new().push_int(threshold as i64);
    for pubkey in pubkeys {
        builder = builder.push_key(pubkey);
    }
    let redeem = builder
        .push_int(pubkeys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();

    let address = Address::p2sh(&redeem, ctx.network)
        .map_err(|e| HwsignError::internal(format!("Redeem script unhashable: {}", e)))?;
    Ok((redeem, address))
}

/// Recover (threshold, ordered keys) from a canonical redeem script.
pub fn parse_redeem_script(script: &Script) -> HwsignResult<(usize, Vec<PublicKey>)> {
    let mut threshold: Option<usize> = None;
    let mut pubkeys: Vec<PublicKey> = Vec::new();
    let mut total: Option<usize> = None;
    let mut saw_checkmultisig = false;

    for instruction in script.instructions() {
        let instruction = instruction.map_err(|e| {
            HwsignError::script_format(format!("Undecodable redeem script: {}", e))
        })?;
        match instruction {
            Instruction::Op(op) if op == OP_CHECKMULTISIG => {
                saw_checkmultisig = true;
            }
            Instruction::Op(op) => {
                let value = op.to_u8();
                if !(0x51..=0x60).contains(&value) {
                    return Err(HwsignError::script_format(format!(
                        "Unexpected opcode {} in redeem script",
                        op
                    )));
                }
                let number = (value - 0x50) as usize;
                if threshold.is_none() {
                    threshold = Some(number);
                } else if total.is_none() {
                    total = Some(number);
                } else {
                    return Err(HwsignError::script_format(
                        "Redeem script carries more than two counters",
                    ));
                }
            }
            Instruction::PushBytes(bytes) => {
                let key = PublicKey::from_slice(bytes.as_bytes()).map_err(|e| {
                    HwsignError::script_format(format!("Invalid pubkey in redeem script: {}", e))
                })?;
                pubkeys.push(key);
            }
        }
    }

    let threshold = threshold
        .ok_or_else(|| HwsignError::script_format("Redeem script missing threshold"))?;
    let total =
        total.ok_or_else(|| HwsignError::script_format("Redeem script missing key count"))?;

    if !saw_checkmultisig || total != pubkeys.len() || threshold > total || pubkeys.is_empty() {
        return Err(HwsignError::script_format(
            "Redeem script is not a canonical m-of-n multisig",
        ));
    }
    Ok((threshold, pubkeys))
}

pub struct MultisigSigner {
    path: Vec<u32>,
    pubkeys: Vec<PublicKey>,
    threshold: usize,
    redeem_script: ScriptBuf,
    address: Address,
    vector: SignatureVector,
}

impl MultisigSigner {
    /// Build a cosigner from the ordered cosigner paths, fetching each key
    /// from the device. `vector` resumes a partially-signed flow; `None`
    /// starts the chain.
    pub fn create(
        transport: &dyn DeviceTransport,
        ctx: &NetworkContext,
        path: Vec<u32>,
        cosigner_paths: &[Vec<u32>],
        threshold: usize,
        vector: Option<SignatureVector>,
    ) -> HwsignResult<Self> {
        let coin = ctx.coin_name()?;
        let mut pubkeys = Vec::with_capacity(cosigner_paths.len());
        for cosigner_path in cosigner_paths {
            let xpub = transport.get_xpub(cosigner_path, coin)?;
            pubkeys.push(PublicKey::new(xpub.public_key));
        }
        Self::with_pubkeys(ctx, path, pubkeys, threshold, vector)
    }

    /// Build a cosigner from precomputed keys (no device round-trips).
    pub fn with_pubkeys(
        ctx: &NetworkContext,
        path: Vec<u32>,
        pubkeys: Vec<PublicKey>,
        threshold: usize,
        vector: Option<SignatureVector>,
    ) -> HwsignResult<Self> {
        let (redeem_script, address) = multisig_info(&pubkeys, threshold, ctx)?;
        let vector = match vector {
            Some(vector) => {
                if vector.len() != pubkeys.len() {
                    return Err(HwsignError::internal(format!(
                        "Signature vector has {} slots for {} cosigners",
                        vector.len(),
                        pubkeys.len()
                    )));
                }
                vector
            }
            None => SignatureVector::empty(pubkeys.len()),
        };
        Ok(Self {
            path,
            pubkeys,
            threshold,
            redeem_script,
            address,
            vector,
        })
    }

    /// Build a cosigner from a shared redeem script, the only thing two
    /// cosigning machines need to exchange.
    pub fn from_redeem_script(
        ctx: &NetworkContext,
        path: Vec<u32>,
        redeem_script: &Script,
        vector: Option<SignatureVector>,
    ) -> HwsignResult<Self> {
        let (threshold, pubkeys) = parse_redeem_script(redeem_script)?;
        Self::with_pubkeys(ctx, path, pubkeys, threshold, vector)
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn descriptor(&self, ctx: &NetworkContext, vector: &SignatureVector) -> MultisigDescriptor {
        MultisigDescriptor {
            pubkeys: self
                .pubkeys
                .iter()
                .map(|pubkey| MultisigPubkey {
                    node: fabricate_node(pubkey, ctx.network),
                    address_n: Vec::new(),
                })
                .collect(),
            m: self.threshold as u32,
            signatures: vector.slots().to_vec(),
        }
    }

    fn prepare_inputs_with(
        &self,
        tx: &Transaction,
        ctx: &NetworkContext,
        sign_index: usize,
        vector: &SignatureVector,
    ) -> Vec<PreparedInput> {
        tx.input
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let mut translated = translate_input(input);
                if index == sign_index {
                    translated.address_n = Some(self.path.clone());
                    translated.multisig = Some(self.descriptor(ctx, vector));
                    translated.script_type = Some(SCRIPT_TYPE_SPEND_MULTISIG.to_string());
                }
                translated
            })
            .collect()
    }
}

impl Signer for MultisigSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    fn prepare_inputs(
        &self,
        tx: &Transaction,
        ctx: &NetworkContext,
        sign_index: usize,
    ) -> Vec<PreparedInput> {
        self.prepare_inputs_with(tx, ctx, sign_index, &self.vector)
    }

    fn sign(
        &self,
        transport: &dyn DeviceTransport,
        ctx: &NetworkContext,
        ptx: &PartialTransaction,
        sign_index: usize,
    ) -> HwsignResult<PartialTransaction> {
        // The transaction is ground truth for signatures collected so far;
        // rebuild the vector from its input script before every call.
        let vector = self
            .vector
            .reconstruct_from_script(ptx.input_script(sign_index)?)?;

        let inputs = self.prepare_inputs_with(ptx.transaction(), ctx, sign_index, &vector);
        let outputs = self.prepare_outputs(ptx.transaction(), ctx)?;
        let signed = transport.sign_transaction(&inputs, &outputs, ctx.coin_name()?)?;
        splice_signed_input(ptx, &signed.serialized_tx, sign_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::node_public_key;
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, Sequence, TxIn, TxOut, Witness};

    fn test_pubkeys(n: usize) -> Vec<PublicKey> {
        let secp = Secp256k1::new();
        (0..n)
            .map(|i| {
                let sk = SecretKey::from_slice(&[(i + 1) as u8; 32]).unwrap();
                PublicKey::new(sk.public_key(&secp))
            })
            .collect()
    }

    #[test]
    fn test_multisig_info_is_deterministic() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(4);

        let (redeem_a, address_a) = multisig_info(&pubkeys, 2, &ctx).unwrap();
        let (redeem_b, address_b) = multisig_info(&pubkeys, 2, &ctx).unwrap();

        assert_eq!(redeem_a.as_bytes(), redeem_b.as_bytes());
        assert_eq!(address_a.to_string(), address_b.to_string());
    }

    #[test]
    fn test_key_order_changes_address() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(3);
        let mut reversed = pubkeys.clone();
        reversed.reverse();

        let (_, address) = multisig_info(&pubkeys, 2, &ctx).unwrap();
        let (_, address_reversed) = multisig_info(&reversed, 2, &ctx).unwrap();
        assert_ne!(address.to_string(), address_reversed.to_string());
    }

    #[test]
    fn test_redeem_script_round_trip() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(3);
        let (redeem, _) = multisig_info(&pubkeys, 2, &ctx).unwrap();

        let (threshold, parsed) = parse_redeem_script(&redeem).unwrap();
        assert_eq!(threshold, 2);
        assert_eq!(parsed, pubkeys);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(3);
        assert!(multisig_info(&pubkeys, 0, &ctx).is_err());
        assert!(multisig_info(&pubkeys, 4, &ctx).is_err());
        assert!(multisig_info(&[], 1, &ctx).is_err());
    }

    #[test]
    fn test_from_redeem_script_agrees_with_pubkey_construction() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(4);
        let (redeem, address) = multisig_info(&pubkeys, 2, &ctx).unwrap();

        let signer = MultisigSigner::from_redeem_script(
            &ctx,
            vec![0x8000002c, 0, 3],
            &redeem,
            None,
        )
        .unwrap();
        assert_eq!(signer.address().to_string(), address.to_string());
        assert_eq!(signer.threshold(), 2);
    }

    #[test]
    fn test_signed_input_carries_descriptor() {
        let ctx = NetworkContext::testnet();
        let pubkeys = test_pubkeys(4);
        let signer = MultisigSigner::with_pubkeys(
            &ctx,
            vec![0x8000002c, 0, 3],
            pubkeys.clone(),
            2,
            None,
        )
        .unwrap();

        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![
                TxIn {
                    previous_output: OutPoint::new(
                        "d683232fee795fb7ba282bff0a8dbe508f4e47ae57030d4ffb40a13e7ad9842d"
                            .parse()
                            .unwrap(),
                        0,
                    ),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                },
                TxIn {
                    previous_output: OutPoint::new(
                        "d683232fee795fb7ba282bff0a8dbe508f4e47ae57030d4ffb40a13e7ad9842d"
                            .parse()
                            .unwrap(),
                        1,
                    ),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                },
            ],
            output: vec![TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: ScriptBuf::new(),
            }],
        };

        let prepared = signer.prepare_inputs(&tx, &ctx, 0);

        let descriptor = prepared[0].multisig.as_ref().unwrap();
        assert_eq!(descriptor.m, 2);
        assert_eq!(descriptor.signatures, vec![String::new(); 4]);
        let recovered: Vec<PublicKey> = descriptor
            .pubkeys
            .iter()
            .map(|p| node_public_key(&p.node).unwrap())
            .collect();
        assert_eq!(recovered, pubkeys);
        assert_eq!(
            prepared[0].script_type.as_deref(),
            Some(SCRIPT_TYPE_SPEND_MULTISIG)
        );

        // The untargeted input stays plain.
        assert!(prepared[1].multisig.is_none());
        assert!(prepared[1].address_n.is_none());
    }
}
