//! Device Module
//!
//! Everything the hardware signing device needs to see, and nothing more:
//! the wire shapes a prepared transaction is translated into, the transport
//! seam the signers call through, and the operator prompt port for PIN and
//! passphrase challenges.

mod bridge;
mod prompt;
mod transport;
mod wire;

pub use bridge::*;
pub use prompt::*;
pub use transport::*;
pub use wire::*;
