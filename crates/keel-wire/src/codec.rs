use keel_types::{AfterImageBody, IntentionBody};

use crate::entry::{LogEntry, TAG_AFTER_IMAGE, TAG_INTENTION};
use crate::error::{WireError, WireResult};

/// Frame header size: 4 bytes length + 4 bytes CRC32.
const HEADER_SIZE: usize = 8;

/// Codec for shared-log entries. Frame layout:
///
/// ```text
/// [4 bytes: frame length = 1 + payload length (little-endian u32)]
/// [4 bytes: CRC32 of tag byte + payload (little-endian u32)]
/// [1 byte:  entry type tag]
/// [N bytes: payload (bincode-serialized entry body)]
/// ```
pub struct EntryCodec;

impl EntryCodec {
    /// Encode an entry into a framed byte blob ready to append to the log.
    pub fn encode(entry: &LogEntry) -> WireResult<Vec<u8>> {
        let payload = match entry {
            LogEntry::Intention(body) => bincode::serialize(body),
            LogEntry::AfterImage(body) => bincode::serialize(body),
        }
        .map_err(|e| WireError::Serialization(e.to_string()))?;

        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(HEADER_SIZE + 1 + payload.len());
        buf.extend_from_slice(&len.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[entry.type_tag()]);
        hasher.update(&payload);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());

        buf.push(entry.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one framed entry occupying the whole of `data`.
    pub fn decode(data: &[u8]) -> WireResult<LogEntry> {
        if data.len() < HEADER_SIZE + 1 {
            return Err(WireError::Framing(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let len = u32::from_le_bytes(data[0..4].try_into().expect("4-byte slice")) as usize;
        let expected_crc = u32::from_le_bytes(data[4..8].try_into().expect("4-byte slice"));

        if len == 0 || HEADER_SIZE + len != data.len() {
            return Err(WireError::Framing(format!(
                "frame length {} disagrees with slot size {}",
                len,
                data.len()
            )));
        }

        let tagged = &data[HEADER_SIZE..];
        let actual_crc = crc32fast::hash(tagged);
        if actual_crc != expected_crc {
            return Err(WireError::CrcMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let tag = tagged[0];
        let payload = &tagged[1..];
        match tag {
            TAG_INTENTION => {
                let body: IntentionBody = bincode::deserialize(payload)
                    .map_err(|e| WireError::Deserialization(e.to_string()))?;
                Ok(LogEntry::Intention(body))
            }
            TAG_AFTER_IMAGE => {
                let body: AfterImageBody = bincode::deserialize(payload)
                    .map_err(|e| WireError::Deserialization(e.to_string()))?;
                Ok(LogEntry::AfterImage(body))
            }
            // TAG_UNSET and anything unrecognized: corruption or a
            // misbehaving log writer.
            _ => Err(WireError::MalformedEntry { tag }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TAG_UNSET;

    fn intention_entry() -> LogEntry {
        let mut body = IntentionBody::new(5, 11);
        body.record_get(b"read-key");
        body.record_put(b"write-key", b"value");
        LogEntry::Intention(body)
    }

    #[test]
    fn intention_roundtrip() {
        let entry = intention_entry();
        let blob = EntryCodec::encode(&entry).unwrap();
        let decoded = EntryCodec::decode(&blob).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn after_image_roundtrip() {
        let entry = LogEntry::AfterImage(AfterImageBody::new(3, vec![9, 8, 7]));
        let blob = EntryCodec::encode(&entry).unwrap();
        let decoded = EntryCodec::decode(&blob).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn unset_tag_is_malformed() {
        let mut blob = EntryCodec::encode(&intention_entry()).unwrap();
        blob[HEADER_SIZE] = TAG_UNSET;
        // Re-stamp the CRC so only the tag is at fault.
        let crc = crc32fast::hash(&blob[HEADER_SIZE..]);
        blob[4..8].copy_from_slice(&crc.to_le_bytes());

        let err = EntryCodec::decode(&blob).unwrap_err();
        assert_eq!(err, WireError::MalformedEntry { tag: TAG_UNSET });
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let mut blob = EntryCodec::encode(&intention_entry()).unwrap();
        blob[HEADER_SIZE] = 0x7F;
        let crc = crc32fast::hash(&blob[HEADER_SIZE..]);
        blob[4..8].copy_from_slice(&crc.to_le_bytes());

        let err = EntryCodec::decode(&blob).unwrap_err();
        assert_eq!(err, WireError::MalformedEntry { tag: 0x7F });
    }

    #[test]
    fn corruption_fails_crc() {
        let mut blob = EntryCodec::encode(&intention_entry()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;

        let err = EntryCodec::decode(&blob).unwrap_err();
        assert!(matches!(err, WireError::CrcMismatch { .. }));
    }

    #[test]
    fn truncated_frame_rejected() {
        let blob = EntryCodec::encode(&intention_entry()).unwrap();
        let err = EntryCodec::decode(&blob[..blob.len() - 2]).unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));

        let err = EntryCodec::decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));
    }
}
