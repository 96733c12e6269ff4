//! Read side: current blocking status for a provider
//!
//! Answers the question API middleware and admin screens ask on every
//! request, from the stored active episode only. No external calls, no
//! side effects.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BlockingResult;
use crate::models::{BlockingLevel, ProviderBlocking};
use crate::store::EpisodeStore;

#[derive(Debug, Clone, Serialize)]
pub struct BlockingStatus {
    pub provider_id: Uuid,
    pub is_blocked: bool,
    pub level: i16,
    pub reasons: Vec<String>,
    pub blocked_at: Option<OffsetDateTime>,
}

impl BlockingStatus {
    fn unblocked(provider_id: Uuid) -> Self {
        Self {
            provider_id,
            is_blocked: false,
            level: 0,
            reasons: Vec::new(),
            blocked_at: None,
        }
    }

    fn from_episode(episode: &ProviderBlocking) -> Self {
        Self {
            provider_id: episode.provider_id,
            is_blocked: true,
            level: episode.level,
            reasons: vec![episode.notes.clone()],
            blocked_at: Some(episode.blocked_at),
        }
    }

    pub fn blocking_level(&self) -> BlockingLevel {
        BlockingLevel::from_i16(self.level).unwrap_or(BlockingLevel::None)
    }
}

pub struct StatusService {
    episodes: EpisodeStore,
}

impl StatusService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            episodes: EpisodeStore::new(pool),
        }
    }

    /// Status from the active episode; resolved and overridden episodes
    /// report the provider as unblocked.
    pub async fn get(&self, provider_id: Uuid) -> BlockingResult<BlockingStatus> {
        let status = match self.episodes.active_for_provider(provider_id).await? {
            Some(episode) => BlockingStatus::from_episode(&episode),
            None => BlockingStatus::unblocked(provider_id),
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reflects_active_episode() {
        let episode = ProviderBlocking {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            blocking_rule_id: None,
            status: "active".into(),
            level: 2,
            debt_amount_cents: 80_000,
            overdue_days: 20,
            currency: "EUR".into(),
            blocked_at: OffsetDateTime::UNIX_EPOCH,
            resolved_at: None,
            resolved_by: None,
            notes: "automatic blocking level 2: overdue debt".into(),
        };
        let status = BlockingStatus::from_episode(&episode);
        assert!(status.is_blocked);
        assert_eq!(status.blocking_level(), BlockingLevel::SearchExcluded);
        assert_eq!(status.reasons.len(), 1);
        assert_eq!(status.blocked_at, Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn test_unblocked_status_is_empty() {
        let provider_id = Uuid::new_v4();
        let status = BlockingStatus::unblocked(provider_id);
        assert!(!status.is_blocked);
        assert_eq!(status.level, 0);
        assert!(status.reasons.is_empty());
        assert!(status.blocked_at.is_none());
    }
}
