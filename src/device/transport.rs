//! Transport seam between signers and the physical device
//!
//! Signers never talk HTTP or USB; they hand prepared inputs/outputs to a
//! `DeviceTransport` and get back signatures or a serialized transaction.
//! Production uses the connect-bridge adapter; tests substitute a scripted
//! software device.

use crate::device::wire::{PreparedInput, PreparedOutput, SignedTx};
use crate::error::HwsignResult;
use bitcoin::bip32::Xpub;

/// Capability set the signing core needs from a hardware device.
///
/// Both calls are one-shot, user-present operations: no retry logic lives
/// behind this trait, and a hung device hangs the calling flow.
pub trait DeviceTransport {
    /// Fetch the extended public key at a derivation path.
    fn get_xpub(&self, path: &[u32], coin: &str) -> HwsignResult<Xpub>;

    /// Sign the prepared transaction; exactly one input carries `address_n`.
    fn sign_transaction(
        &self,
        inputs: &[PreparedInput],
        outputs: &[PreparedOutput],
        coin: &str,
    ) -> HwsignResult<SignedTx>;
}
