//! Transaction Module
//!
//! Building unsigned skeletons, the immutable partially-signed transaction
//! value the signers pass around, name-operation payloads, and the
//! dispatcher that sequences the naming workflow.

mod builder;
mod dispatcher;
mod naming;
mod partial;

pub use builder::*;
pub use dispatcher::*;
pub use naming::*;
pub use partial::*;
