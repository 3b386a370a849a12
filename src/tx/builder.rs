//! Unsigned transaction skeletons
//!
//! FIFO input selection over the payer's UTXO set, legacy-size fee
//! estimation, and change back to the payer when it clears the dust limit.

use crate::error::{HwsignError, HwsignResult};
use crate::net::Utxo;
use crate::tx::PartialTransaction;
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::str::FromStr;

/// Outputs below this are not worth creating
pub const DUST_LIMIT: u64 = 546;

// Legacy size approximation: 148 bytes per P2PKH-ish input, 34 per output,
// 10 overhead.
fn estimate_fee(input_count: usize, output_count: usize, fee_rate: u64) -> u64 {
    let vsize = (10 + input_count * 148 + output_count * 34) as u64;
    vsize * fee_rate
}

fn to_tx_input(utxo: &Utxo) -> HwsignResult<TxIn> {
    Ok(TxIn {
        previous_output: OutPoint::new(
            bitcoin::Txid::from_str(&utxo.txid)
                .map_err(|e| HwsignError::parse_error(format!("Invalid UTXO txid: {}", e)))?,
            utxo.vout,
        ),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::default(),
    })
}

/// Fund `outputs` from the payer's UTXO set; change above dust returns to
/// the payer.
pub fn build_funded(
    utxos: &[Utxo],
    payer: &Address,
    outputs: Vec<TxOut>,
    fee_rate: u64,
) -> HwsignResult<PartialTransaction> {
    let target: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
    let available: u64 = utxos.iter().map(|u| u.value).sum();
    if available < target {
        return Err(HwsignError::insufficient_funds(format!(
            "Send amount {} sats exceeds available balance {} sats",
            target, available
        )));
    }

    // FIFO selection, fee recomputed as inputs accumulate (+1 output slot
    // reserved for change).
    let mut selected: Vec<&Utxo> = Vec::new();
    let mut total: u64 = 0;
    for utxo in utxos {
        if total >= target + estimate_fee(selected.len(), outputs.len() + 1, fee_rate) {
            break;
        }
        total += utxo.value;
        selected.push(utxo);
    }

    let fee = estimate_fee(selected.len(), outputs.len() + 1, fee_rate);
    if total < target + fee {
        return Err(HwsignError::insufficient_funds(format!(
            "Insufficient funds for amount + fee: have {}, need {}",
            total,
            target + fee
        )));
    }

    let mut tx_outputs = outputs;
    let change = total - target - fee;
    if change > DUST_LIMIT {
        tx_outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: payer.script_pubkey(),
        });
    }

    let inputs = selected
        .iter()
        .copied()
        .map(to_tx_input)
        .collect::<HwsignResult<Vec<_>>>()?;

    Ok(PartialTransaction::new(Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: tx_outputs,
    }))
}

/// Simple spend to one address. With no amount, sweeps the whole balance
/// minus fee to the destination (no change output).
pub fn build_spend(
    utxos: &[Utxo],
    payer: &Address,
    to: &Address,
    amount: Option<u64>,
    fee_rate: u64,
) -> HwsignResult<PartialTransaction> {
    if utxos.is_empty() {
        return Err(HwsignError::insufficient_funds("No spendable outputs"));
    }

    match amount {
        Some(amount) => build_funded(
            utxos,
            payer,
            vec![TxOut {
                value: Amount::from_sat(amount),
                script_pubkey: to.script_pubkey(),
            }],
            fee_rate,
        ),
        None => {
            let total: u64 = utxos.iter().map(|u| u.value).sum();
            let fee = estimate_fee(utxos.len(), 1, fee_rate);
            if total <= fee + DUST_LIMIT {
                return Err(HwsignError::insufficient_funds(format!(
                    "Balance {} sats does not cover the fee {} sats",
                    total, fee
                )));
            }

            let inputs = utxos
                .iter()
                .map(to_tx_input)
                .collect::<HwsignResult<Vec<_>>>()?;

            Ok(PartialTransaction::new(Transaction {
                version: Version::ONE,
                lock_time: LockTime::ZERO,
                input: inputs,
                output: vec![TxOut {
                    value: Amount::from_sat(total - fee),
                    script_pubkey: to.script_pubkey(),
                }],
            }))
        }
    }
}
