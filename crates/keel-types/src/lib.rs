//! Foundation types for the Keel log-structured database core.
//!
//! Keel derives all database state from a totally-ordered shared log. This
//! crate provides the vocabulary shared by every other Keel crate: log
//! positions and tokens, recorded transaction operations, and the intention
//! and after-image entry bodies.

pub mod image;
pub mod intention;
pub mod op;

pub use image::AfterImageBody;
pub use intention::IntentionBody;
pub use op::TxOp;

/// A slot number in the shared log. Positions are assigned by the log at
/// append time, are monotonically increasing, and are never embedded in
/// entry bodies — they are a property of the slot.
pub type Position = u64;

/// Opaque client-supplied correlation id attached to an intention.
pub type Token = u64;
