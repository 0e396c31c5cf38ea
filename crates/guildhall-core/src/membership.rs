//! Voluntary leaves, kicks, and leadership transfer.

use guildhall_credits::CreditSource;
use guildhall_storage::{GuildId, LeaveReason, MemberRole, Store, StoreError, UserId};

use crate::{Caller, GuildError, GuildService};

impl<S: Store, C: CreditSource> GuildService<S, C> {
    /// A non-leader member removes their own membership.
    ///
    /// The leader may not walk out through this path; leadership has to be
    /// settled first, via [`GuildService::leader_leave`] or
    /// [`GuildService::disband`].
    pub async fn leave(&self, caller: &Caller, guild_id: &GuildId) -> Result<(), GuildError> {
        let user = caller.require_user()?;
        self.active_guild(guild_id).await?;

        let membership = self
            .store
            .get_membership(&user)
            .await?
            .filter(|m| m.guild_id == *guild_id)
            .ok_or(GuildError::NotFound)?;
        if membership.role == MemberRole::Leader {
            return Err(GuildError::NotAuthorized);
        }

        self.store
            .remove_member(guild_id, &user, LeaveReason::Leave)
            .await?;
        tracing::info!(guild = %guild_id, user = %user, "member left guild");
        Ok(())
    }

    /// Leader removes another member. Self-removal is not a kick.
    pub async fn kick(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
        target: &UserId,
    ) -> Result<(), GuildError> {
        let (_, leader) = self.require_leader(caller, guild_id).await?;
        if *target == leader {
            return Err(GuildError::NotAuthorized);
        }
        if !self.store.is_member(guild_id, target).await? {
            return Err(GuildError::NotFound);
        }

        self.store
            .remove_member(guild_id, target, LeaveReason::Kick)
            .await?;
        tracing::info!(guild = %guild_id, user = %target, by = %leader, "member kicked");
        Ok(())
    }

    /// Leader hands leadership to another current member and stays on as an
    /// ordinary member.
    pub async fn transfer_leadership(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
        to: &UserId,
    ) -> Result<(), GuildError> {
        let (_, leader) = self.require_leader(caller, guild_id).await?;
        self.store
            .transfer_leadership(guild_id, &leader, to)
            .await
            .map_err(|e| match e {
                // Lost a race with another leadership change.
                StoreError::Conflict => GuildError::NotAuthorized,
                StoreError::NotFound => GuildError::NotFound,
                other => GuildError::Store(other),
            })?;
        tracing::info!(guild = %guild_id, from = %leader, to = %to, "leadership transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{guild, svc};
    use chrono::Utc;
    use guildhall_storage::{GuildKind, Membership, MockStore};
    use uuid::Uuid;

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn membership_in(guild_id: GuildId, user_id: UserId, role: MemberRole) -> Membership {
        Membership {
            guild_id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn leader_cannot_plain_leave() {
        let leader = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store.expect_get_membership().returning(move |_| {
            Ok(Some(membership_in(gid, leader, MemberRole::Leader)))
        });
        let svc = svc(store);

        let err = svc.leave(&Caller::User(leader), &gid).await.unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));
    }

    #[tokio::test]
    async fn leave_requires_membership_in_that_guild() {
        let u = user();
        let g = guild(Some(user()), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        // Member of a different guild.
        store.expect_get_membership().returning(move |_| {
            Ok(Some(membership_in(
                GuildId(Uuid::new_v4()),
                u,
                MemberRole::Member,
            )))
        });
        let svc = svc(store);

        let err = svc.leave(&Caller::User(u), &gid).await.unwrap_err();
        assert!(matches!(err, GuildError::NotFound));
    }

    #[tokio::test]
    async fn member_leave_records_reason() {
        let leader = user();
        let member = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store.expect_get_membership().returning(move |_| {
            Ok(Some(membership_in(gid, member, MemberRole::Member)))
        });
        store
            .expect_remove_member()
            .withf(move |_, u, reason| *u == member && *reason == LeaveReason::Leave)
            .returning(|_, _, _| Ok(()));
        let svc = svc(store);

        svc.leave(&Caller::User(member), &gid).await.unwrap();
    }

    #[tokio::test]
    async fn kick_is_leader_only_and_never_self() {
        let leader = user();
        let member = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store.expect_is_member().returning(|_, _| Ok(true));
        store
            .expect_remove_member()
            .withf(|_, _, reason| *reason == LeaveReason::Kick)
            .returning(|_, _, _| Ok(()));
        let svc = svc(store);

        let err = svc
            .kick(&Caller::User(member), &gid, &leader)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));

        let err = svc
            .kick(&Caller::User(leader), &gid, &leader)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));

        svc.kick(&Caller::User(leader), &gid, &member).await.unwrap();
    }

    #[tokio::test]
    async fn kick_of_non_member_is_notfound() {
        let leader = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store.expect_is_member().returning(|_, _| Ok(false));
        let svc = svc(store);

        let err = svc
            .kick(&Caller::User(leader), &gid, &user())
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotFound));
    }

    #[tokio::test]
    async fn transfer_rejects_non_leader_caller() {
        let leader = user();
        let member = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        let svc = svc(store);

        let err = svc
            .transfer_leadership(&Caller::User(member), &gid, &member)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));

        let err = svc
            .transfer_leadership(&Caller::Anonymous, &gid, &member)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::AuthRequired));
    }
}
