//! Wallet Module
//!
//! Derivation-path resolution and the address book used by path shortcuts.

mod path;

pub use path::*;
