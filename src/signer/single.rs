//! Single-signature signer
//!
//! Wraps one derivation path and the P2PKH address resolved for it. The
//! device sees every input, signs the one carrying the path, and returns a
//! serialized transaction we splice the signed input out of.

use crate::device::{DeviceTransport, PreparedInput};
use crate::error::HwsignResult;
use crate::signer::{splice_signed_input, translate_input, Signer};
use crate::tx::PartialTransaction;
use crate::types::NetworkContext;
use bitcoin::key::PublicKey;
use bitcoin::{Address, Transaction};

pub struct SingleSigner {
    path: Vec<u32>,
    address: Address,
}

impl SingleSigner {
    /// Resolve the path to an address through the device.
    pub fn create(
        transport: &dyn DeviceTransport,
        ctx: &NetworkContext,
        path: Vec<u32>,
    ) -> HwsignResult<Self> {
        let xpub = transport.get_xpub(&path, ctx.coin_name()?)?;
        let address = Address::p2pkh(&PublicKey::new(xpub.public_key), ctx.network);
        Ok(Self { path, address })
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }
}

impl Signer for SingleSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    fn prepare_inputs(
        &self,
        tx: &Transaction,
        _ctx: &NetworkContext,
        sign_index: usize,
    ) -> Vec<PreparedInput> {
        tx.input
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let mut translated = translate_input(input);
                if index == sign_index {
                    translated.address_n = Some(self.path.clone());
                }
                translated
            })
            .collect()
    }

    fn sign(
        &self,
        transport: &dyn DeviceTransport,
        ctx: &NetworkContext,
        ptx: &PartialTransaction,
        sign_index: usize,
    ) -> HwsignResult<PartialTransaction> {
        let inputs = self.prepare_inputs(ptx.transaction(), ctx, sign_index);
        let outputs = self.prepare_outputs(ptx.transaction(), ctx)?;
        let signed = transport.sign_transaction(&inputs, &outputs, ctx.coin_name()?)?;
        splice_signed_input(ptx, &signed.serialized_tx, sign_index)
    }
}
