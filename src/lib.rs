//! hwsign library
//!
//! Drives a hardware signing device through its local connect bridge to
//! authorize Bitcoin-style transactions: plain spends, m-of-n P2SH multisig
//! co-signing across independent invocations, and a name-registration
//! workflow recorded in OP_RETURN outputs.
//!
//! # Architecture
//!
//! - **wallet**: derivation-path resolution and the loadaddrs address book
//! - **device**: wire shapes, the transport seam, the connect-bridge
//!   adapter, and the operator prompt port
//! - **signer**: single-sig and multisig signers plus the partial-signature
//!   merge protocol
//! - **tx**: transaction skeletons, the immutable partially-signed value,
//!   name-operation payloads, and the dispatcher
//! - **net**: UTXO/fee/broadcast HTTP layer with a tracked-transaction
//!   overlay
//! - **cli**: the interactive command shell
//!
//! Network parameters travel as an explicit [`types::NetworkContext`]
//! value; nothing reads chain configuration from globals.

pub mod cli;
pub mod device;
pub mod error;
pub mod net;
pub mod signer;
pub mod tx;
pub mod types;
pub mod utils;
pub mod wallet;

// Re-export key types for convenience
pub use error::{ErrorCode, HwsignError, HwsignResult};
pub use types::NetworkContext;

pub use device::{BridgeTransport, DeviceTransport, OperatorPrompt, TerminalPrompt};
pub use signer::{multisig_info, MultisigSigner, SignatureVector, Signer, SingleSigner};
pub use tx::{Dispatcher, PartialTransaction};
pub use wallet::{parse_path, resolve_path, AddressBook};
