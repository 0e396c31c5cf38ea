//! Join request and invitation workflow.
//!
//! Both tracks end in the same conversion: the store inserts the
//! membership under its own transaction, re-checking capacity and the
//! one-guild-per-user rule, and invalidates whatever pending paperwork the
//! new membership makes moot. This module only decides who may move a
//! request between states.

use guildhall_credits::CreditSource;
use guildhall_storage::{
    GuildId, Invitation, InvitationId, InvitationStatus, JoinRequest, Membership, RequestId,
    RequestStatus, Store, StoreError, UserId, MAX_MEMBERS,
};

use crate::{Caller, GuildError, GuildService};

fn convert_err(e: StoreError) -> GuildError {
    match e {
        StoreError::Conflict => GuildError::GuildFull,
        StoreError::AlreadyExists => GuildError::AlreadyMember,
        StoreError::NotFound => GuildError::NotFound,
        other => GuildError::Store(other),
    }
}

impl<S: Store, C: CreditSource> GuildService<S, C> {
    /// Ask to join a guild. Re-submitting returns the existing pending
    /// request rather than erroring.
    pub async fn submit_join_request(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<JoinRequest, GuildError> {
        let user = caller.require_user()?;
        if self.store.get_membership(&user).await?.is_some() {
            return Err(GuildError::AlreadyMember);
        }
        self.active_guild(guild_id).await?;
        // Courtesy check; approval re-checks transactionally.
        if self.store.member_count(guild_id).await? >= MAX_MEMBERS as i64 {
            return Err(GuildError::GuildFull);
        }

        let request = self.store.create_join_request(guild_id, &user).await?;
        tracing::debug!(guild = %guild_id, user = %user, request = %request.id, "join request submitted");
        Ok(request)
    }

    /// Requester withdraws their own pending request. A request that
    /// already reached a terminal state is `NotFound`.
    pub async fn cancel_join_request(
        &self,
        caller: &Caller,
        request_id: &RequestId,
    ) -> Result<(), GuildError> {
        let user = caller.require_user()?;
        let request = self.store.get_join_request(request_id).await?;
        if request.requester_id != user {
            return Err(GuildError::NotAuthorized);
        }
        Ok(self.store.cancel_join_request(request_id).await?)
    }

    /// Leader approves a pending request, converting it into a membership.
    pub async fn approve_join_request(
        &self,
        caller: &Caller,
        request_id: &RequestId,
    ) -> Result<Membership, GuildError> {
        let request = self.store.get_join_request(request_id).await?;
        self.require_leader(caller, &request.guild_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(GuildError::NotFound);
        }

        let membership = self
            .store
            .approve_join_request(request_id)
            .await
            .map_err(convert_err)?;
        tracing::info!(
            guild = %request.guild_id,
            user = %request.requester_id,
            "join request approved"
        );
        Ok(membership)
    }

    /// Pending requests for a guild, oldest first. Leader only.
    pub async fn list_join_requests(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<Vec<JoinRequest>, GuildError> {
        self.require_leader(caller, guild_id).await?;
        Ok(self.store.list_pending_join_requests(guild_id).await?)
    }

    /// Leader invites a user. Idempotent on an existing pending invitation.
    pub async fn invite(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
        invitee: &UserId,
    ) -> Result<Invitation, GuildError> {
        let (_, leader) = self.require_leader(caller, guild_id).await?;
        if self.store.get_membership(invitee).await?.is_some() {
            return Err(GuildError::AlreadyMember);
        }
        if self.store.member_count(guild_id).await? >= MAX_MEMBERS as i64 {
            return Err(GuildError::GuildFull);
        }

        let invitation = self.store.create_invitation(guild_id, invitee).await?;
        tracing::debug!(guild = %guild_id, invitee = %invitee, by = %leader, "invitation created");
        Ok(invitation)
    }

    /// Cancel a pending invitation. Allowed for the guild's current leader
    /// and for the invitee; `System` may always cancel.
    pub async fn cancel_invitation(
        &self,
        caller: &Caller,
        invitation_id: &InvitationId,
    ) -> Result<(), GuildError> {
        let invitation = self.store.get_invitation(invitation_id).await?;
        if !caller.is_system() {
            let user = caller.require_user()?;
            if user != invitation.invitee_id {
                let guild = self.active_guild(&invitation.guild_id).await?;
                if guild.leader_id != Some(user) {
                    return Err(GuildError::NotAuthorized);
                }
            }
        }
        Ok(self.store.cancel_invitation(invitation_id).await?)
    }

    /// Invitee accepts, converting the invitation into a membership.
    pub async fn accept_invitation(
        &self,
        caller: &Caller,
        invitation_id: &InvitationId,
    ) -> Result<Membership, GuildError> {
        let user = caller.require_user()?;
        let invitation = self.store.get_invitation(invitation_id).await?;
        if invitation.invitee_id != user {
            return Err(GuildError::NotAuthorized);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(GuildError::NotFound);
        }
        if self.store.get_membership(&user).await?.is_some() {
            return Err(GuildError::AlreadyMember);
        }

        let membership = self
            .store
            .accept_invitation(invitation_id)
            .await
            .map_err(convert_err)?;
        tracing::info!(guild = %invitation.guild_id, user = %user, "invitation accepted");
        Ok(membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{guild, svc};
    use chrono::Utc;
    use guildhall_storage::{GuildKind, MemberRole, MockStore};
    use uuid::Uuid;

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn pending_request(guild_id: GuildId, requester: UserId) -> JoinRequest {
        JoinRequest {
            id: RequestId(Uuid::new_v4()),
            guild_id,
            requester_id: requester,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pending_invitation(guild_id: GuildId, invitee: UserId) -> Invitation {
        Invitation {
            id: InvitationId(Uuid::new_v4()),
            guild_id,
            invitee_id: invitee,
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submit_rejects_existing_member() {
        let u = user();
        let g = guild(Some(user()), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_membership().returning(move |_| {
            Ok(Some(guildhall_storage::Membership {
                guild_id: GuildId(Uuid::new_v4()),
                user_id: u,
                role: MemberRole::Member,
                joined_at: Utc::now(),
            }))
        });
        let svc = svc(store);

        let err = svc
            .submit_join_request(&Caller::User(u), &gid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::AlreadyMember));
    }

    #[tokio::test]
    async fn submit_rejects_full_guild() {
        let g = guild(Some(user()), GuildKind::Casual, false);
        let gid = g.id;

        let mut store = MockStore::new();
        store.expect_get_membership().returning(|_| Ok(None));
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store
            .expect_member_count()
            .returning(|_| Ok(MAX_MEMBERS as i64));
        let svc = svc(store);

        let err = svc
            .submit_join_request(&Caller::User(user()), &gid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::GuildFull));
    }

    #[tokio::test]
    async fn submit_requires_authentication() {
        let svc = svc(MockStore::new());
        let err = svc
            .submit_join_request(&Caller::Anonymous, &GuildId(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::AuthRequired));
    }

    #[tokio::test]
    async fn only_requester_may_cancel() {
        let requester = user();
        let stranger = user();
        let req = pending_request(GuildId(Uuid::new_v4()), requester);
        let rid = req.id;

        let mut store = MockStore::new();
        store
            .expect_get_join_request()
            .returning(move |_| Ok(req.clone()));
        store
            .expect_cancel_join_request()
            .returning(|_| Ok(()));
        let svc = svc(store);

        let err = svc
            .cancel_join_request(&Caller::User(stranger), &rid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));

        svc.cancel_join_request(&Caller::User(requester), &rid)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn approve_is_leader_only() {
        let leader = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let req = pending_request(g.id, user());
        let rid = req.id;

        let mut store = MockStore::new();
        store
            .expect_get_join_request()
            .returning(move |_| Ok(req.clone()));
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        let svc = svc(store);

        let err = svc
            .approve_join_request(&Caller::User(user()), &rid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));
    }

    #[tokio::test]
    async fn approve_maps_capacity_conflict_to_guildfull() {
        let leader = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let req = pending_request(g.id, user());
        let rid = req.id;

        let mut store = MockStore::new();
        store
            .expect_get_join_request()
            .returning(move |_| Ok(req.clone()));
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store
            .expect_approve_join_request()
            .returning(|_| Err(StoreError::Conflict));
        let svc = svc(store);

        let err = svc
            .approve_join_request(&Caller::User(leader), &rid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::GuildFull));
    }

    #[tokio::test]
    async fn invitation_cancellable_by_leader_and_invitee_only() {
        let leader = user();
        let invitee = user();
        let g = guild(Some(leader), GuildKind::Casual, false);
        let invite = pending_invitation(g.id, invitee);
        let iid = invite.id;

        let mut store = MockStore::new();
        store
            .expect_get_invitation()
            .returning(move |_| Ok(invite.clone()));
        store.expect_get_guild().returning(move |_| Ok(g.clone()));
        store.expect_cancel_invitation().returning(|_| Ok(()));
        let svc = svc(store);

        let err = svc
            .cancel_invitation(&Caller::User(user()), &iid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));

        svc.cancel_invitation(&Caller::User(invitee), &iid)
            .await
            .unwrap();
        svc.cancel_invitation(&Caller::User(leader), &iid)
            .await
            .unwrap();
        svc.cancel_invitation(&Caller::System, &iid).await.unwrap();
    }

    #[tokio::test]
    async fn accept_is_invitee_only() {
        let invitee = user();
        let invite = pending_invitation(GuildId(Uuid::new_v4()), invitee);
        let iid = invite.id;

        let mut store = MockStore::new();
        store
            .expect_get_invitation()
            .returning(move |_| Ok(invite.clone()));
        let svc = svc(store);

        let err = svc
            .accept_invitation(&Caller::User(user()), &iid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotAuthorized));
    }

    #[tokio::test]
    async fn accept_of_settled_invitation_is_notfound() {
        let invitee = user();
        let mut invite = pending_invitation(GuildId(Uuid::new_v4()), invitee);
        invite.status = InvitationStatus::Cancelled;
        let iid = invite.id;

        let mut store = MockStore::new();
        store
            .expect_get_invitation()
            .returning(move |_| Ok(invite.clone()));
        let svc = svc(store);

        let err = svc
            .accept_invitation(&Caller::User(invitee), &iid)
            .await
            .unwrap_err();
        assert!(matches!(err, GuildError::NotFound));
    }
}
