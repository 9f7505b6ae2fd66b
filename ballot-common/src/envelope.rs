//! The unit of transit between a producer and the collector.

use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Globally unique envelope identifier
///
/// A ULID generated by the producer at submit time. ULIDs sort
/// lexicographically by creation time and are collision resistant, so
/// producers never need to coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId {
    id: ulid::Ulid,
}

impl EnvelopeId {
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Milliseconds since the Unix epoch at which this id was generated
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::str::FromStr for EnvelopeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self::new)
    }
}

impl Display for EnvelopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Serialize for EnvelopeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> Deserialize<'de> for EnvelopeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Where an envelope sits in its delivery lifecycle
///
/// Only `Pending` envelopes are ever persisted. Acknowledgement is terminal
/// and simply removes the envelope from the awaiting-ack set, so it has no
/// variant of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Durably stored, not yet handed to the transport
    #[default]
    Pending,
    /// Handed to the transport, waiting for the destination's ack
    AwaitingAck,
}

impl Display for DeliveryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::AwaitingAck => "AwaitingAck",
        })
    }
}

/// An opaque payload wrapped with delivery metadata
///
/// Equality and hashing consider the id only: two envelopes with the same id
/// are the same envelope, whatever state they were captured in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    /// Per-producer counter, informational only
    sequence: u64,
    state: DeliveryState,
    payload: Arc<[u8]>,
}

impl Envelope {
    /// Wrap `payload` in a new `Pending` envelope with a fresh id
    pub fn new(sequence: u64, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: EnvelopeId::generate(),
            sequence,
            state: DeliveryState::Pending,
            payload: payload.into(),
        }
    }

    /// Rebuild an envelope from previously captured parts
    pub fn from_parts(
        id: EnvelopeId,
        sequence: u64,
        state: DeliveryState,
        payload: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            id,
            sequence,
            state,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> EnvelopeId {
        self.id
    }

    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub const fn state(&self) -> DeliveryState {
        self.state
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The same envelope in another lifecycle state
    #[must_use]
    pub fn with_state(self, state: DeliveryState) -> Self {
        Self { state, ..self }
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Envelope {}

impl Hash for Envelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Largest encoded envelope or payload the codec will decode (16 MiB)
pub const MAX_ENCODED_SIZE: usize = 16 * 1024 * 1024;

type CodecConfig = bincode::config::Configuration<
    bincode::config::LittleEndian,
    bincode::config::Fixint,
    bincode::config::Limit<MAX_ENCODED_SIZE>,
>;

/// bincode configuration shared by envelopes and payloads
///
/// The limit turns a corrupt length prefix into a decode error instead of an
/// enormous allocation.
pub(crate) fn codec_config() -> CodecConfig {
    bincode::config::legacy().with_limit::<MAX_ENCODED_SIZE>()
}

/// Encode an envelope into its wire/storage representation
///
/// # Errors
/// If bincode fails to encode the envelope
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serde::encode_to_vec(envelope, codec_config())?)
}

/// Decode an envelope previously produced by [`encode`]
///
/// # Errors
/// If the bytes are not a complete, well-formed envelope
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let (envelope, read): (Envelope, usize) =
        bincode::serde::decode_from_slice(bytes, codec_config())?;

    if read != bytes.len() {
        return Err(CodecError::TrailingBytes {
            expected: read,
            actual: bytes.len(),
        });
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_identity_is_by_id() {
        let envelope = Envelope::new(3, b"payload".as_slice());
        let moved = envelope.clone().with_state(DeliveryState::AwaitingAck);

        assert_eq!(envelope, moved);
        assert_eq!(moved.state(), DeliveryState::AwaitingAck);
        assert_eq!(moved.payload(), b"payload");

        let other = Envelope::new(3, b"payload".as_slice());
        assert_ne!(envelope, other);

        let set: HashSet<_> = [envelope, moved, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_new_envelopes_are_pending_with_unique_ids() {
        let ids: HashSet<_> = (0..1000)
            .map(|seq| Envelope::new(seq, Vec::<u8>::new()).id())
            .collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(
            Envelope::new(0, Vec::<u8>::new()).state(),
            DeliveryState::Pending
        );
    }

    #[test]
    fn test_codec_preserves_every_field() {
        let envelope = Envelope::new(42, vec![0u8, 159, 146, 150, 255]);
        let bytes = encode(&envelope).expect("encode");
        let decoded = decode(&bytes).expect("decode");

        assert_eq!(decoded.id(), envelope.id());
        assert_eq!(decoded.sequence(), 42);
        assert_eq!(decoded.state(), DeliveryState::Pending);
        assert_eq!(decoded.payload(), envelope.payload());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not an envelope").is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_length_prefix() {
        // An id length of u64::MAX must fail rather than allocate
        assert!(decode(&[0xff; 16]).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&Envelope::new(1, b"x".as_slice())).expect("encode");
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn test_id_string_round_trip() {
        let id = EnvelopeId::generate();
        let parsed: EnvelopeId = id.to_string().parse().expect("parse");
        assert_eq!(id, parsed);
        assert!("../etc/passwd".parse::<EnvelopeId>().is_err());
    }
}
