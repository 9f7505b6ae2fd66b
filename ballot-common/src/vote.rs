//! The vote record carried as an envelope payload.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{envelope::codec_config, error::CodecError};

/// A single vote cast on a voting machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub election: String,
    pub candidate: String,
    /// Name of the machine the vote was cast on
    pub machine: String,
    /// Milliseconds since the Unix epoch
    pub cast_at_ms: u64,
}

impl Vote {
    /// A vote cast now
    pub fn new(
        election: impl Into<String>,
        candidate: impl Into<String>,
        machine: impl Into<String>,
    ) -> Self {
        let cast_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        Self {
            election: election.into(),
            candidate: candidate.into(),
            machine: machine.into(),
            cast_at_ms: u64::try_from(cast_at_ms).unwrap_or(u64::MAX),
        }
    }

    /// Encode as an envelope payload
    ///
    /// # Errors
    /// If bincode fails to encode the vote
    pub fn to_payload(&self) -> Result<Arc<[u8]>, CodecError> {
        let bytes = bincode::serde::encode_to_vec(self, codec_config())?;
        Ok(Arc::from(bytes))
    }

    /// Decode from an envelope payload
    ///
    /// # Errors
    /// If the payload is not a well-formed vote
    pub fn from_payload(payload: &[u8]) -> Result<Self, CodecError> {
        let (vote, read): (Self, usize) =
            bincode::serde::decode_from_slice(payload, codec_config())?;

        if read == payload.len() {
            Ok(vote)
        } else {
            Err(CodecError::TrailingBytes {
                expected: read,
                actual: payload.len(),
            })
        }
    }
}
