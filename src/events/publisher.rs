//! Match-formed handlers

use crate::error::{MatchmakingError, Result};
use crate::events::messages::MatchFormedEnvelope;
use crate::types::Match;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// Receives every committed match exactly once
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchFormedHandler: Send + Sync {
    /// Called after the members have been removed from the waiting pool.
    /// An error is logged by the caller; the match is not rolled back.
    async fn on_match_formed(&self, formed: Match) -> Result<()>;
}

/// Emits each match as a structured log line carrying the serialized envelope
#[derive(Debug, Default)]
pub struct LoggingMatchHandler;

impl LoggingMatchHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MatchFormedHandler for LoggingMatchHandler {
    async fn on_match_formed(&self, formed: Match) -> Result<()> {
        let envelope = MatchFormedEnvelope::new(formed);
        let payload = serde_json::to_string(&envelope).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize match envelope: {}", e),
            }
        })?;

        info!(
            routing_key = %envelope.routing_key,
            correlation_id = %envelope.correlation_id,
            "Match formed in {}: {}",
            envelope.payload.category,
            payload
        );
        Ok(())
    }
}

/// Keeps every delivered match in memory
#[derive(Debug, Default)]
pub struct RecordingMatchHandler {
    delivered: Mutex<Vec<Match>>,
}

impl RecordingMatchHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All matches delivered so far, in delivery order
    pub fn delivered(&self) -> Vec<Match> {
        self.delivered
            .lock()
            .map(|matches| matches.clone())
            .unwrap_or_default()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered
            .lock()
            .map(|matches| matches.len())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut matches) = self.delivered.lock() {
            matches.clear();
        }
    }
}

#[async_trait]
impl MatchFormedHandler for RecordingMatchHandler {
    async fn on_match_formed(&self, formed: Match) -> Result<()> {
        self.delivered
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("delivered matches"))?
            .push(formed);
        Ok(())
    }
}
