//! APPGRAPH Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable with stable, deterministic encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod error;
pub mod hash;
pub mod id;

// Re-exports
pub use capability::{Access, Capability, KindSupport, ResourceKind};
pub use error::{CoreError, CoreResult};
pub use hash::{Fingerprint, FingerprintError};
pub use id::{ResourceId, UnitId};
