//! Contribution aggregator interface for guildhall.
//!
//! The accrual side (experience points, leveling curves) lives outside the
//! core; the core only reads windowed per-guild credit sums from whatever
//! implements [`CreditSource`]. Implementations must be pure functions of
//! stored history: calling `sum_credits` repeatedly with identical
//! arguments returns identical results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use guildhall_storage::GuildId;

/// Error type for credit lookups.
#[derive(Debug, Error)]
pub enum CreditError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Read-only view of per-guild earned credits.
#[async_trait]
pub trait CreditSource: Send + Sync {
    /// Total credits earned by a guild over the half-open window
    /// `[from, to)`.
    async fn sum_credits(
        &self,
        guild_id: &GuildId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, CreditError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FixedCredits(HashMap<GuildId, i64>);

    #[async_trait]
    impl CreditSource for FixedCredits {
        async fn sum_credits(
            &self,
            guild_id: &GuildId,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<i64, CreditError> {
            Ok(self.0.get(guild_id).copied().unwrap_or(0))
        }
    }

    #[tokio::test]
    async fn sum_is_stable_across_calls() {
        let guild = GuildId(Uuid::new_v4());
        let source = FixedCredits(HashMap::from([(guild, 1200)]));
        let from = Utc::now();
        let to = from;
        let a = source.sum_credits(&guild, from, to).await.unwrap();
        let b = source.sum_credits(&guild, from, to).await.unwrap();
        assert_eq!(a, 1200);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn unknown_guild_sums_to_zero() {
        let source = FixedCredits(HashMap::new());
        let now = Utc::now();
        let sum = source
            .sum_credits(&GuildId(Uuid::new_v4()), now, now)
            .await
            .unwrap();
        assert_eq!(sum, 0);
    }
}
