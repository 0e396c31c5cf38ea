//! Quest enforcement ledger types.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::GuildId;

/// Derived running counter of quest successes for a guild, incremented at
/// most once per hour bucket. Reconstructible by replaying the success log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestStats {
    pub guild_id: GuildId,
    pub success_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Truncate a timestamp to the containing hour boundary.
///
/// Hour buckets are always stored truncated so that replayed and concurrent
/// enforcement runs agree on the ledger key.
pub fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    // TimeDelta::hours(1) is non-zero, so truncation cannot fail.
    at.duration_trunc(TimeDelta::hours(1))
        .expect("truncating to the hour is infallible")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_bucket_truncates() {
        let t = Utc.with_ymd_and_hms(2024, 5, 4, 13, 37, 59).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 4, 13, 0, 0).unwrap();
        assert_eq!(hour_bucket(t), expected);
    }

    #[test]
    fn hour_bucket_is_idempotent() {
        let t = Utc.with_ymd_and_hms(2024, 5, 4, 13, 12, 0).unwrap();
        assert_eq!(hour_bucket(hour_bucket(t)), hour_bucket(t));
    }
}
