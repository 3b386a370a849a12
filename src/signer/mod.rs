//! Signer Module
//!
//! The signer capability and its two variants. A signer translates a
//! transaction into the device wire shape, drives one signing call, and
//! splices the device's answer back into the transaction under
//! construction, touching exactly one input per call.

mod merge;
mod multisig;
mod single;

pub use merge::*;
pub use multisig::*;
pub use single::*;

use crate::device::{DeviceTransport, PreparedInput, PreparedOutput};
use crate::error::{HwsignError, HwsignResult};
use crate::tx::PartialTransaction;
use crate::types::NetworkContext;
use bitcoin::blockdata::script::Instruction;
use bitcoin::{Address, Script, Transaction, TxIn};

/// Capability set shared by the single-sig and multisig variants.
///
/// Variants are selected at construction time and carry no shared mutable
/// state; the transport and network context arrive as call parameters.
pub trait Signer {
    /// The address this signer spends from.
    fn address(&self) -> &Address;

    /// Translate every input into device form. Only the input at
    /// `sign_index` carries this signer's derivation path; the device needs
    /// the whole transaction shape to compute the signature hash but signs
    /// one input per call.
    fn prepare_inputs(
        &self,
        tx: &Transaction,
        ctx: &NetworkContext,
        sign_index: usize,
    ) -> Vec<PreparedInput>;

    /// Translate every output into device form.
    fn prepare_outputs(
        &self,
        tx: &Transaction,
        ctx: &NetworkContext,
    ) -> HwsignResult<Vec<PreparedOutput>> {
        translate_outputs(tx, ctx)
    }

    /// Run one device signing call and return a new transaction value with
    /// only the input at `sign_index` replaced.
    fn sign(
        &self,
        transport: &dyn DeviceTransport,
        ctx: &NetworkContext,
        ptx: &PartialTransaction,
        sign_index: usize,
    ) -> HwsignResult<PartialTransaction>;

    /// Signer protocol version.
    fn version(&self) -> u32 {
        1
    }
}

/// Generic input translation shared by both signer variants.
pub(crate) fn translate_input(input: &TxIn) -> PreparedInput {
    let script_sig = if input.script_sig.is_empty() {
        None
    } else {
        Some(hex::encode(input.script_sig.as_bytes()))
    };
    PreparedInput {
        prev_hash: input.previous_output.txid.to_string(),
        prev_index: input.previous_output.vout,
        sequence: input.sequence.0,
        script_sig,
        address_n: None,
        script_type: None,
        multisig: None,
    }
}

/// Output translation: OP_RETURN outputs become null-data entries, anything
/// else must decode to an address under the active network.
pub(crate) fn translate_outputs(
    tx: &Transaction,
    ctx: &NetworkContext,
) -> HwsignResult<Vec<PreparedOutput>> {
    tx.output
        .iter()
        .map(|output| {
            if output.script_pubkey.is_op_return() {
                let payload = op_return_payload(&output.script_pubkey)?;
                Ok(PreparedOutput::null_data(hex::encode(payload)))
            } else {
                let address = Address::from_script(&output.script_pubkey, ctx.network)
                    .map_err(|e| {
                        HwsignError::parse_error(format!(
                            "Output script does not decode to an address: {}",
                            e
                        ))
                    })?;
                Ok(PreparedOutput::pay_to_address(
                    address.to_string(),
                    output.value.to_sat(),
                ))
            }
        })
        .collect()
}

/// Extract the data push from an OP_RETURN script.
fn op_return_payload(script: &Script) -> HwsignResult<Vec<u8>> {
    for instruction in script.instructions() {
        match instruction {
            Ok(Instruction::PushBytes(bytes)) => return Ok(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(_)) => continue,
            Err(e) => {
                return Err(HwsignError::parse_error(format!(
                    "Undecodable OP_RETURN script: {}",
                    e
                )))
            }
        }
    }
    Err(HwsignError::parse_error("OP_RETURN script carries no data push"))
}

/// Parse the device's serialized transaction and graft its input at
/// `sign_index` onto the caller's transaction, leaving every other input
/// untouched.
pub(crate) fn splice_signed_input(
    ptx: &PartialTransaction,
    signed_tx_hex: &str,
    sign_index: usize,
) -> HwsignResult<PartialTransaction> {
    let signed = PartialTransaction::from_hex(signed_tx_hex)?;
    let replacement = signed
        .transaction()
        .input
        .get(sign_index)
        .cloned()
        .ok_or_else(|| {
            HwsignError::device(format!(
                "Device returned a transaction without input {}",
                sign_index
            ))
        })?;
    ptx.with_input(sign_index, replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::blockdata::script::{Builder, PushBytesBuf};
    use bitcoin::key::PublicKey;
    use bitcoin::opcodes::all::OP_RETURN;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Network, OutPoint, ScriptBuf, Sequence, TxOut, Witness};

    const PREV_TXID: &str = "d683232fee795fb7ba282bff0a8dbe508f4e47ae57030d4ffb40a13e7ad9842d";

    fn sample_tx() -> Transaction {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x21; 32]).unwrap();
        let address = Address::p2pkh(&PublicKey::new(sk.public_key(&secp)), Network::Testnet);

        let payload = PushBytesBuf::try_from(b"id+hello".to_vec()).unwrap();
        let op_return = Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(payload)
            .into_script();

        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(PREV_TXID.parse().unwrap(), 1),
                script_sig: ScriptBuf::from_bytes(vec![0x51]),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![
                TxOut {
                    value: Amount::from_sat(0),
                    script_pubkey: op_return,
                },
                TxOut {
                    value: Amount::from_sat(123456),
                    script_pubkey: address.script_pubkey(),
                },
            ],
        }
    }

    #[test]
    fn test_translate_input_reverses_hash() {
        let tx = sample_tx();
        let prepared = translate_input(&tx.input[0]);
        // Display txid is already the byte-reversed form the device expects.
        assert_eq!(prepared.prev_hash, PREV_TXID);
        assert_eq!(prepared.prev_index, 1);
        assert_eq!(prepared.sequence, 0xffffffff);
        assert_eq!(prepared.script_sig.as_deref(), Some("51"));
    }

    #[test]
    fn test_translate_input_empty_script_is_none() {
        let mut tx = sample_tx();
        tx.input[0].script_sig = ScriptBuf::new();
        let prepared = translate_input(&tx.input[0]);
        assert!(prepared.script_sig.is_none());
    }

    #[test]
    fn test_translate_outputs_shapes() {
        let ctx = NetworkContext::testnet();
        let outputs = translate_outputs(&sample_tx(), &ctx).unwrap();

        assert_eq!(outputs[0].script_type, "PAYTOOPRETURN");
        assert_eq!(outputs[0].op_return_data.as_deref(), Some(hex::encode(b"id+hello").as_str()));
        assert_eq!(outputs[0].amount, "0");

        assert_eq!(outputs[1].script_type, "PAYTOADDRESS");
        assert_eq!(outputs[1].amount, "123456");
        assert!(outputs[1].address.is_some());
    }

    #[test]
    fn test_splice_replaces_only_target() {
        let tx = sample_tx();
        let ptx = PartialTransaction::new(tx.clone());

        let mut signed = tx;
        signed.input[0].script_sig = ScriptBuf::from_bytes(vec![0x52, 0x52]);
        let signed_hex = hex::encode(bitcoin::consensus::encode::serialize(&signed));

        let next = splice_signed_input(&ptx, &signed_hex, 0).unwrap();
        assert_eq!(
            next.transaction().input[0].script_sig.as_bytes(),
            &[0x52, 0x52]
        );
        assert_eq!(next.transaction().output, ptx.transaction().output);
    }
}
