//! Transaction dispatcher
//!
//! Sequences the naming workflow (preorder, then register once the
//! preorder is tracked; update standalone) and plain payments. Signing is
//! delegated entirely to the signer variants, broadcast and UTXO tracking
//! to the network layer; errors pass through untouched.

use crate::device::DeviceTransport;
use crate::error::HwsignResult;
use crate::log_info;
use crate::net::NetworkClient;
use crate::signer::Signer;
use crate::tx::{
    build_funded, build_spend, null_data_output, preorder_payload, register_payload,
    update_payload, PartialTransaction, REGISTRATION_OUTPUT_SATS,
};
use crate::types::NetworkContext;
use bitcoin::{Address, Amount, TxOut};
use rand::RngCore;

pub struct Dispatcher<'a> {
    transport: &'a dyn DeviceTransport,
    net: &'a mut NetworkClient,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: &'a dyn DeviceTransport, net: &'a mut NetworkClient) -> Self {
        Self { transport, net }
    }

    /// Sign every input in sequence (one device call per input) and
    /// broadcast. Returns the accepted txid.
    fn sign_and_broadcast(
        &mut self,
        ctx: &NetworkContext,
        signer: &dyn Signer,
        mut ptx: PartialTransaction,
    ) -> HwsignResult<String> {
        for index in 0..ptx.input_count() {
            ptx = signer.sign(self.transport, ctx, &ptx, index)?;
        }
        let raw = ptx.to_hex();
        let txid = self.net.broadcast(ctx, &raw)?;
        self.net.track_transaction(&raw)?;
        log_info!("dispatch", "transaction accepted", txid = txid);
        Ok(txid)
    }

    /// Plain spend from the signer's address. `amount` of `None` sweeps the
    /// whole balance.
    pub fn send_payment(
        &mut self,
        ctx: &NetworkContext,
        signer: &dyn Signer,
        to: &Address,
        amount: Option<u64>,
    ) -> HwsignResult<String> {
        let fee_rate = self.net.get_fee_rate(ctx)?;
        let utxos = self.net.get_utxos(ctx, signer.address())?;
        let ptx = build_spend(&utxos, signer.address(), to, amount, fee_rate)?;
        self.sign_and_broadcast(ctx, signer, ptx)
    }

    /// Preorder then register a name. The register step spends the
    /// preorder's change through the tracked-transaction overlay, so the
    /// sequence does not wait for confirmation.
    pub fn register_name(
        &mut self,
        ctx: &NetworkContext,
        signer: &dyn Signer,
        name: &str,
        destination: &Address,
    ) -> HwsignResult<(String, String)> {
        let fee_rate = self.net.get_fee_rate(ctx)?;

        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let utxos = self.net.get_utxos(ctx, signer.address())?;
        let preorder = build_funded(
            &utxos,
            signer.address(),
            vec![null_data_output(preorder_payload(name, &salt)?)?],
            fee_rate,
        )?;
        let preorder_txid = self.sign_and_broadcast(ctx, signer, preorder)?;

        let utxos = self.net.get_utxos(ctx, signer.address())?;
        let register = build_funded(
            &utxos,
            signer.address(),
            vec![
                null_data_output(register_payload(name)?)?,
                TxOut {
                    value: Amount::from_sat(REGISTRATION_OUTPUT_SATS),
                    script_pubkey: destination.script_pubkey(),
                },
            ],
            fee_rate,
        )?;
        let register_txid = self.sign_and_broadcast(ctx, signer, register)?;

        Ok((preorder_txid, register_txid))
    }

    /// Publish a zonefile update for a registered name.
    pub fn update_name(
        &mut self,
        ctx: &NetworkContext,
        signer: &dyn Signer,
        name: &str,
        zonefile: &str,
    ) -> HwsignResult<String> {
        let fee_rate = self.net.get_fee_rate(ctx)?;
        let utxos = self.net.get_utxos(ctx, signer.address())?;
        let update = build_funded(
            &utxos,
            signer.address(),
            vec![null_data_output(update_payload(name, zonefile)?)?],
            fee_rate,
        )?;
        self.sign_and_broadcast(ctx, signer, update)
    }
}
