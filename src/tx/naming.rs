//! Name-operation payloads
//!
//! The naming system records operations as OP_RETURN payloads tagged with
//! the `id` magic: `id?` preorder, `id:` register, `id+` update. Preorders
//! commit to a salted name hash; updates commit to name and zonefile
//! digests.

use crate::error::{HwsignError, HwsignResult};
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::{Amount, TxOut};

/// Magic prefix shared by every name operation
pub const NAME_MAGIC: &[u8; 2] = b"id";

/// Value carried on the owner output of a register transaction
pub const REGISTRATION_OUTPUT_SATS: u64 = 5500;

/// Longest name the OP_RETURN budget accommodates
pub const MAX_NAME_LEN: usize = 37;

fn check_name(name: &str) -> HwsignResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(HwsignError::parse_error(format!(
            "Name must be 1..={} characters",
            MAX_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
    {
        return Err(HwsignError::parse_error(
            "Name may only contain lowercase letters, digits, '.', '-' and '_'",
        ));
    }
    Ok(())
}

/// `id?` + hash160(name || salt): commits to the name without revealing it.
pub fn preorder_payload(name: &str, salt: &[u8; 16]) -> HwsignResult<Vec<u8>> {
    check_name(name)?;
    let mut committed = name.as_bytes().to_vec();
    committed.extend_from_slice(salt);
    let digest = hash160::Hash::hash(&committed);

    let mut payload = NAME_MAGIC.to_vec();
    payload.push(b'?');
    payload.extend_from_slice(digest.as_byte_array());
    Ok(payload)
}

/// `id:` + the plain name, revealed once the preorder settles.
pub fn register_payload(name: &str) -> HwsignResult<Vec<u8>> {
    check_name(name)?;
    let mut payload = NAME_MAGIC.to_vec();
    payload.push(b':');
    payload.extend_from_slice(name.as_bytes());
    Ok(payload)
}

/// `id+` + truncated name digest + zonefile digest.
pub fn update_payload(name: &str, zonefile: &str) -> HwsignResult<Vec<u8>> {
    check_name(name)?;
    let name_digest = hash160::Hash::hash(name.as_bytes());
    let zonefile_digest = hash160::Hash::hash(zonefile.as_bytes());

    let mut payload = NAME_MAGIC.to_vec();
    payload.push(b'+');
    payload.extend_from_slice(&name_digest.as_byte_array()[..16]);
    payload.extend_from_slice(zonefile_digest.as_byte_array());
    Ok(payload)
}

/// Wrap a payload as a zero-value OP_RETURN output.
pub fn null_data_output(payload: Vec<u8>) -> HwsignResult<TxOut> {
    let push = PushBytesBuf::try_from(payload)
        .map_err(|_| HwsignError::internal("Name payload exceeds push limit"))?;
    Ok(TxOut {
        value: Amount::ZERO,
        script_pubkey: Builder::new().push_opcode(OP_RETURN).push_slice(push).into_script(),
    })
}
