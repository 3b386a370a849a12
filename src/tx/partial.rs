//! Partially-signed transaction value
//!
//! Signing never mutates a shared builder. Each signer consumes a
//! `PartialTransaction` and produces a new one with exactly one input
//! replaced, so sequential cosigners cannot clobber each other's inputs.

use crate::error::{HwsignError, HwsignResult};
use bitcoin::consensus::encode;
use bitcoin::{ScriptBuf, Transaction, TxIn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTransaction {
    tx: Transaction,
}

impl PartialTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self { tx }
    }

    pub fn from_hex(raw: &str) -> HwsignResult<Self> {
        let bytes = hex::decode(raw)?;
        let tx: Transaction = encode::deserialize(&bytes)?;
        Ok(Self { tx })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_transaction(self) -> Transaction {
        self.tx
    }

    pub fn to_hex(&self) -> String {
        hex::encode(encode::serialize(&self.tx))
    }

    pub fn input_count(&self) -> usize {
        self.tx.input.len()
    }

    /// Script currently sitting on an input (empty until someone signs it).
    pub fn input_script(&self, index: usize) -> HwsignResult<&ScriptBuf> {
        self.tx
            .input
            .get(index)
            .map(|i| &i.script_sig)
            .ok_or_else(|| {
                HwsignError::internal(format!("Input index {} out of range", index))
            })
    }

    /// Produce a new value with only the input at `index` replaced.
    pub fn with_input(&self, index: usize, input: TxIn) -> HwsignResult<Self> {
        if index >= self.tx.input.len() {
            return Err(HwsignError::internal(format!(
                "Input index {} out of range ({} inputs)",
                index,
                self.tx.input.len()
            )));
        }
        let mut tx = self.tx.clone();
        tx.input[index] = input;
        Ok(Self { tx })
    }
}
