//! Derivation path resolution
//!
//! Turns operator input into a BIP-32 index sequence. Three input shapes are
//! accepted: a full `m/...` path, a bare address index (expanded to the
//! default account), or a previously loaded address.

use crate::error::{HwsignError, HwsignResult};
use crate::types::NetworkContext;
use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::key::PublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Address;
use std::collections::HashMap;

/// Hardened offset for BIP-32 derivation
pub const HARDENED: u32 = 0x8000_0000;

/// Account root the bare-index shorthand expands under
pub const DEFAULT_ACCOUNT_ROOT: &str = "m/44'/60'/0'/0";

/// Parse a full `m/...` path string into hardened-bit-encoded indices.
///
/// The first component must be the literal root marker `m`; anything else is
/// a hard failure, not a recoverable default.
pub fn parse_path(path: &str) -> HwsignResult<Vec<u32>> {
    let pieces: Vec<&str> = path.trim().split('/').collect();
    if pieces.len() == 1 || pieces[0] != "m" {
        return Err(HwsignError::invalid_path(format!("Invalid path {}", path)));
    }

    pieces[1..]
        .iter()
        .map(|piece| {
            let (number, hardened) = match piece.strip_suffix('\'') {
                Some(stripped) => (stripped, true),
                None => (*piece, false),
            };
            let index: u32 = number.parse().map_err(|_| {
                HwsignError::invalid_path(format!("Invalid path component '{}' in {}", piece, path))
            })?;
            if index >= HARDENED {
                return Err(HwsignError::invalid_path(format!(
                    "Path component {} exceeds maximum value",
                    index
                )));
            }
            Ok(if hardened { index | HARDENED } else { index })
        })
        .collect()
}

/// Render an index sequence back into `m/...` form.
pub fn format_path(indices: &[u32]) -> String {
    let mut out = String::from("m");
    for index in indices {
        if index & HARDENED != 0 {
            out.push_str(&format!("/{}'", index & !HARDENED));
        } else {
            out.push_str(&format!("/{}", index));
        }
    }
    out
}

/// Resolve operator input (path, bare index, or loaded address) to a path.
pub fn resolve_path(input: &str, book: &AddressBook) -> HwsignResult<Vec<u32>> {
    let trimmed = input.trim();

    if trimmed.contains('/') {
        return parse_path(trimmed);
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
        return parse_path(&format!("{}/{}", DEFAULT_ACCOUNT_ROOT, trimmed));
    }

    match book.path_for(trimmed) {
        Some(path) => parse_path(path),
        None => Err(HwsignError::unknown_address(format!(
            "Could not find {} in the address book. Have you run \"loadaddrs\"?",
            trimmed
        ))),
    }
}

/// Address-to-path lookup table populated by `loadaddrs`.
///
/// One device xpub fetch at the account root, then local non-hardened child
/// derivation; no further device round-trips per address.
#[derive(Debug, Default)]
pub struct AddressBook {
    entries: HashMap<String, String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_for(&self, address: &str) -> Option<&str> {
        self.entries.get(address).map(String::as_str)
    }

    pub fn insert(&mut self, address: String, path: String) {
        self.entries.insert(address, path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill the book with child addresses `start..start+count` of the
    /// account root xpub. Returns how many were derived.
    pub fn populate(
        &mut self,
        account_xpub: &Xpub,
        ctx: &NetworkContext,
        start: u32,
        count: u32,
    ) -> HwsignResult<u32> {
        let secp = Secp256k1::verification_only();
        for index in start..start + count {
            let child = account_xpub
                .derive_pub(&secp, &[ChildNumber::from_normal_idx(index)?])?;
            let address = Address::p2pkh(&PublicKey::new(child.public_key), ctx.network);
            self.insert(
                address.to_string(),
                format!("{}/{}", DEFAULT_ACCOUNT_ROOT, index),
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_path() {
        let parsed = parse_path("m/44'/60'/0'/0/5").unwrap();
        assert_eq!(
            parsed,
            vec![44 | HARDENED, 60 | HARDENED, HARDENED, 0, 5]
        );
    }

    #[test]
    fn test_hardened_components_have_top_bit() {
        let parsed = parse_path("m/44'/0'/0'/0/0").unwrap();
        assert!(parsed[0] >= HARDENED);
        assert!(parsed[1] >= HARDENED);
        assert!(parsed[2] >= HARDENED);
        assert!(parsed[3] < HARDENED);
        assert!(parsed[4] < HARDENED);
    }

    #[test]
    fn test_missing_root_marker_fails() {
        assert!(parse_path("44'/60'/0'/0/0").is_err());
        assert!(parse_path("m").is_err());
        assert!(parse_path("n/44'/0").is_err());
    }

    #[test]
    fn test_non_numeric_component_fails() {
        assert!(parse_path("m/44'/abc/0").is_err());
        assert!(parse_path("m/44'//0").is_err());
    }

    #[test]
    fn test_component_overflow_fails() {
        assert!(parse_path("m/2147483648").is_err());
        assert!(parse_path("m/2147483647").is_ok());
    }

    #[test]
    fn test_format_round_trip() {
        let path = "m/44'/60'/0'/0/17";
        assert_eq!(format_path(&parse_path(path).unwrap()), path);
    }

    #[test]
    fn test_bare_index_shorthand() {
        let book = AddressBook::new();
        let parsed = resolve_path("7", &book).unwrap();
        assert_eq!(parsed, parse_path("m/44'/60'/0'/0/7").unwrap());
    }

    #[test]
    fn test_address_lookup() {
        let mut book = AddressBook::new();
        book.insert(
            "1BoatSLRHtKNngkdXEeobR76b53LETtpyT".to_string(),
            "m/44'/60'/0'/0/3".to_string(),
        );

        let parsed = resolve_path("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", &book).unwrap();
        assert_eq!(parsed, parse_path("m/44'/60'/0'/0/3").unwrap());

        let err = resolve_path("1CounterpartyXXXXXXXXXXXXXXXUWLpVr", &book).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnknownAddress);
    }
}
