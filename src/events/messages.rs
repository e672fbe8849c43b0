//! Match-formed message envelope and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::Match;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing key carried by every match-formed envelope
pub const MATCH_FORMED_ROUTING_KEY: &str = "match.formed";

/// Match payload with delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFormedEnvelope {
    pub payload: Match,
    /// Equal to the match id, so consumers can deduplicate redeliveries
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub routing_key: String,
}

impl MatchFormedEnvelope {
    pub fn new(payload: Match) -> Self {
        Self {
            correlation_id: payload.match_id.to_string(),
            payload,
            timestamp: Utc::now(),
            routing_key: MATCH_FORMED_ROUTING_KEY.to_string(),
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize match envelope: {}", e),
            }
            .into()
        })
    }

    /// Deserialize an envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to deserialize match envelope: {}", e),
            }
            .into()
        })
    }
}
