use serde::{Deserialize, Serialize};

use keel_types::{AfterImageBody, IntentionBody};

/// Reserved tag meaning "no message type was set". Never valid on the wire.
pub const TAG_UNSET: u8 = 0;
/// Tag for a proposed transaction.
pub const TAG_INTENTION: u8 = 1;
/// Tag for a post-commit tree image.
pub const TAG_AFTER_IMAGE: u8 = 2;

/// One shared-log slot's content. Entries are self-contained: the position
/// identifying an entry is a property of the slot, never of the body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    Intention(IntentionBody),
    AfterImage(AfterImageBody),
}

impl LogEntry {
    /// The wire tag byte for this entry.
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Intention(_) => TAG_INTENTION,
            Self::AfterImage(_) => TAG_AFTER_IMAGE,
        }
    }

    /// Human-readable variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Intention(_) => "Intention",
            Self::AfterImage(_) => "AfterImage",
        }
    }
}
