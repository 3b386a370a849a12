//! Partial-signature merge protocol
//!
//! A multisig input script does not say which cosigner produced which
//! signature once the P2SH push order flattens them. The signature vector
//! keeps that attribution: one slot per cosigner in redeem-script key order,
//! and a caller-tracked mask of who has signed so far. Every invocation
//! rebuilds the vector from whatever signatures already sit in the input
//! script, so independent invocations (different machines, different times)
//! can each contribute their one slot.

use crate::error::{HwsignError, HwsignResult};
use bitcoin::blockdata::script::Instruction;
use bitcoin::Script;

/// Ordered signature slots for an m-of-n multisig input.
///
/// Always exactly n slots regardless of the threshold. Slots hold hex
/// signatures (sighash byte stripped) or the empty string. Slots are never
/// reordered; only individual slots change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVector {
    slots: Vec<String>,
    signed: Vec<bool>,
}

impl SignatureVector {
    /// All-empty vector: the first signer in a chain starts here.
    pub fn empty(n: usize) -> Self {
        Self {
            slots: vec![String::new(); n],
            signed: vec![false; n],
        }
    }

    /// Resume a partially-signed flow: the caller knows which cosigner
    /// indices have signed so far, the signatures themselves are recovered
    /// from the transaction when signing.
    pub fn resume(n: usize, signed_indices: &[usize]) -> HwsignResult<Self> {
        let mut vector = Self::empty(n);
        for &index in signed_indices {
            if index >= n {
                return Err(HwsignError::internal(format!(
                    "Cosigner index {} out of range for {} cosigners",
                    index, n
                )));
            }
            vector.signed[index] = true;
        }
        Ok(vector)
    }

    /// Build from explicit slot contents; non-empty slots count as signed.
    pub fn from_slots(slots: Vec<String>) -> Self {
        let signed = slots.iter().map(|s| !s.is_empty()).collect();
        Self { slots, signed }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn signed_count(&self) -> usize {
        self.signed.iter().filter(|s| **s).count()
    }

    /// Rebuild the vector from an input's existing script-sig.
    ///
    /// The expected shape is the multisig spend form: an OP_0 dummy push,
    /// then one signature push per collected signature (trailing sighash
    /// byte included), then the serialized redeem script. Signatures are
    /// assigned in script order to the slots marked signed, ascending.
    pub fn reconstruct_from_script(&self, script_sig: &Script) -> HwsignResult<Self> {
        if script_sig.is_empty() {
            return Ok(Self::empty(self.slots.len()));
        }

        let mut pushes: Vec<Vec<u8>> = Vec::new();
        for instruction in script_sig.instructions() {
            match instruction {
                Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes().to_vec()),
                Ok(Instruction::Op(op)) => {
                    return Err(HwsignError::script_format(format!(
                        "Unexpected opcode {} in multisig input script",
                        op
                    )))
                }
                Err(e) => {
                    return Err(HwsignError::script_format(format!(
                        "Undecodable multisig input script: {}",
                        e
                    )))
                }
            }
        }

        if pushes.len() < 2 {
            return Err(HwsignError::script_format(
                "Multisig input script too short: expected dummy and redeem script",
            ));
        }
        if !pushes[0].is_empty() {
            return Err(HwsignError::script_format(
                "Multisig input script does not start with the OP_0 placeholder",
            ));
        }

        // Everything between the dummy and the redeem script is a signature
        // with its trailing sighash-type byte.
        let signatures = &pushes[1..pushes.len() - 1];

        let expected = self.signed_count();
        if signatures.len() != expected {
            return Err(HwsignError::script_format(format!(
                "Input script carries {} signatures but {} cosigner slots are marked signed",
                signatures.len(),
                expected
            )));
        }

        let mut sighash_type: Option<u8> = None;
        let mut stripped: Vec<String> = Vec::with_capacity(signatures.len());
        for sig in signatures {
            if sig.len() < 2 {
                return Err(HwsignError::script_format(
                    "Signature push too short to carry a sighash type",
                ));
            }
            let (body, marker) = sig.split_at(sig.len() - 1);
            match sighash_type {
                None => sighash_type = Some(marker[0]),
                Some(existing) if existing != marker[0] => {
                    return Err(HwsignError::sighash_mismatch(format!(
                        "Extracted signatures disagree on sighash type: {:#04x} vs {:#04x}",
                        existing, marker[0]
                    )))
                }
                Some(_) => {}
            }
            stripped.push(hex::encode(body));
        }

        let mut rebuilt = Self {
            slots: vec![String::new(); self.slots.len()],
            signed: self.signed.clone(),
        };
        let mut next = stripped.into_iter();
        for (slot, signed) in rebuilt.slots.iter_mut().zip(rebuilt.signed.iter()) {
            if *signed {
                // signed_count() == signature count was checked above
                *slot = next.next().unwrap_or_default();
            }
        }
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::script::{Builder, PushBytesBuf};
    use bitcoin::opcodes::all::OP_PUSHBYTES_0;
    use bitcoin::ScriptBuf;

    fn fake_sig(seed: u8, sighash: u8) -> Vec<u8> {
        let mut sig = vec![0x30, 0x44, 0x02, 0x20];
        sig.extend(std::iter::repeat(seed).take(32));
        sig.push(sighash);
        sig
    }

    fn multisig_script(sigs: &[Vec<u8>]) -> ScriptBuf {
        let redeem = vec![0x52, 0xae]; // stand-in redeem bytes
        let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
        for sig in sigs {
            builder = builder.push_slice(PushBytesBuf::try_from(sig.clone()).unwrap());
        }
        builder
            .push_slice(PushBytesBuf::try_from(redeem).unwrap())
            .into_script()
    }

    #[test]
    fn test_empty_script_yields_all_empty_vector() {
        let vector = SignatureVector::resume(3, &[0, 2]).unwrap();
        let empty = ScriptBuf::new();
        let rebuilt = vector.reconstruct_from_script(&empty).unwrap();
        assert_eq!(rebuilt, SignatureVector::empty(3));
    }

    #[test]
    fn test_extraction_places_signatures_by_mask() {
        // Cosigners 1 and 3 of {0,1,2,3} signed; slot 0 and 2 stay empty.
        let sig_b = fake_sig(0xbb, 0x01);
        let sig_d = fake_sig(0xdd, 0x01);
        let script = multisig_script(&[sig_b.clone(), sig_d.clone()]);

        let vector = SignatureVector::resume(4, &[1, 3]).unwrap();
        let rebuilt = vector.reconstruct_from_script(&script).unwrap();

        assert_eq!(rebuilt.slots()[0], "");
        assert_eq!(rebuilt.slots()[1], hex::encode(&sig_b[..sig_b.len() - 1]));
        assert_eq!(rebuilt.slots()[2], "");
        assert_eq!(rebuilt.slots()[3], hex::encode(&sig_d[..sig_d.len() - 1]));
    }

    #[test]
    fn test_missing_dummy_is_script_format_error() {
        // P2PKH-style script: sig push then pubkey push, no OP_0 dummy.
        let script = Builder::new()
            .push_slice(PushBytesBuf::try_from(fake_sig(0xaa, 0x01)).unwrap())
            .push_slice(PushBytesBuf::try_from(vec![0x02; 33]).unwrap())
            .into_script();

        let vector = SignatureVector::resume(3, &[0]).unwrap();
        let err = vector.reconstruct_from_script(&script).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnexpectedScriptFormat);
    }

    #[test]
    fn test_signature_count_mismatch_is_script_format_error() {
        let script = multisig_script(&[fake_sig(0xaa, 0x01)]);
        let vector = SignatureVector::resume(3, &[0, 1]).unwrap();
        let err = vector.reconstruct_from_script(&script).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnexpectedScriptFormat);
    }

    #[test]
    fn test_inconsistent_sighash_types_rejected() {
        let script = multisig_script(&[fake_sig(0xaa, 0x01), fake_sig(0xbb, 0x03)]);
        let vector = SignatureVector::resume(3, &[0, 1]).unwrap();
        let err = vector.reconstruct_from_script(&script).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InconsistentSighashType);
    }

    #[test]
    fn test_vector_length_invariant() {
        // n slots regardless of threshold, and resume() checks bounds.
        assert_eq!(SignatureVector::empty(4).len(), 4);
        assert!(SignatureVector::resume(3, &[3]).is_err());

        let from_slots =
            SignatureVector::from_slots(vec!["".into(), "aa".into(), "".into()]);
        assert_eq!(from_slots.len(), 3);
        assert_eq!(from_slots.signed_count(), 1);
    }
}
