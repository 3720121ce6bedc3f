//! Wire format for Keel shared-log entries.
//!
//! Every slot in the shared log holds one framed [`LogEntry`]: a proposed
//! transaction or the serialized post-commit tree state that follows it.
//! [`EntryCodec`] owns the framing: a length prefix, a CRC32 of the tagged
//! payload, a one-byte type tag, and a bincode-encoded body.

pub mod codec;
pub mod entry;
pub mod error;

pub use codec::EntryCodec;
pub use entry::LogEntry;
pub use error::{WireError, WireResult};
