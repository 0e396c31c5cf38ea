//! Guild domain service.
//!
//! `GuildService` owns every guild operation: membership moves, the
//! join-request/invitation workflow, leadership and lifecycle, and the
//! hourly quest enforcement pass. It is transport-free; callers (an admin
//! CLI, a game server) construct it over a [`Store`] backend and a
//! [`CreditSource`] and call methods directly.
//!
//! Authorization happens here, against the [`Caller`] identity. Multi-row
//! invariants (capacity, one guild per user, ledger uniqueness) are *not*
//! sequenced here; the store runs them transactionally and this layer maps
//! the outcomes onto the domain error taxonomy.

use std::sync::Arc;

use guildhall_credits::CreditSource;
use guildhall_storage::Store;

mod caller;
mod error;
mod guard;
mod lifecycle;
mod membership;
mod quests;
mod requests;

pub use caller::Caller;
pub use error::GuildError;
pub use guard::MemberView;
pub use quests::{EnforcementReport, QUEST_SUCCESS_THRESHOLD};

pub struct GuildService<S, C> {
    store: Arc<S>,
    credits: Arc<C>,
}

impl<S: Store, C: CreditSource> GuildService<S, C> {
    pub fn new(store: Arc<S>, credits: Arc<C>) -> Self {
        Self { store, credits }
    }
}

#[cfg(test)]
mod testutil {
    use super::*;
    use chrono::{DateTime, Utc};
    use guildhall_credits::CreditError;
    use guildhall_storage::{Guild, GuildId, GuildKind, MockStore, UserId};
    use uuid::Uuid;

    /// Credit source that reports zero for every guild; used by tests that
    /// never reach the credit window.
    pub struct NoCredits;

    #[async_trait::async_trait]
    impl CreditSource for NoCredits {
        async fn sum_credits(
            &self,
            _guild_id: &GuildId,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<i64, CreditError> {
            Ok(0)
        }
    }

    pub fn svc(store: MockStore) -> GuildService<MockStore, NoCredits> {
        GuildService::new(Arc::new(store), Arc::new(NoCredits))
    }

    pub fn guild(leader: Option<UserId>, kind: GuildKind, disbanded: bool) -> Guild {
        Guild {
            id: GuildId(Uuid::new_v4()),
            name: "test-guild".into(),
            leader_id: leader,
            kind,
            disbanded,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
