//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait `guildhall-core` depends on.
///
/// Operations that touch more than one row to uphold an invariant
/// (capacity re-checks, request invalidation, tombstoning) are modelled as
/// single methods so a backend can run them inside one transaction; the
/// core never sequences multi-row invariants itself.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Guilds ─────────────────────────────────────────

    /// Create a guild together with its founder's leader membership.
    ///
    /// Fails with `AlreadyExists` if an active guild already uses the name,
    /// or if the founder already belongs to a guild.
    async fn create_guild(&self, params: &CreateGuildParams) -> Result<GuildId, StoreError>;

    /// Get a guild by ID (disbanded guilds included; callers filter).
    async fn get_guild(&self, guild_id: &GuildId) -> Result<Guild, StoreError>;

    /// Get an active (non-disbanded) guild by its display name.
    async fn get_guild_by_name(&self, name: &str) -> Result<Guild, StoreError>;

    /// List active guilds, optionally restricted to one kind.
    async fn list_active_guilds(&self, kind: Option<GuildKind>) -> Result<Vec<Guild>, StoreError>;

    /// Change a guild's display name. `AlreadyExists` on an active-name
    /// collision, `NotFound` if the guild is absent or disbanded.
    async fn rename_guild(&self, guild_id: &GuildId, new_name: &str) -> Result<(), StoreError>;

    /// Atomically reassign leadership from `from` to `to`.
    ///
    /// `Conflict` if `from` does not currently hold leadership, `NotFound`
    /// if `to` is not a member of the guild.
    async fn transfer_leadership(
        &self,
        guild_id: &GuildId,
        from: &UserId,
        to: &UserId,
    ) -> Result<(), StoreError>;

    /// Claim leadership of a leaderless guild. `Conflict` if the guild
    /// currently has a leader, `NotFound` if `to` is not a member.
    async fn claim_leadership(&self, guild_id: &GuildId, to: &UserId) -> Result<(), StoreError>;

    /// Irreversibly disband: set the terminal flag, rewrite the name to the
    /// caller-derived tombstone, null the leader, log and delete every
    /// membership, all in one transaction. `NotFound` if already disbanded.
    async fn disband_guild(&self, guild_id: &GuildId, tombstone: &str) -> Result<(), StoreError>;

    // ─────────────────────────────────── Memberships ──────────────────────────────────────

    /// A user's membership, if any (at most one exists).
    async fn get_membership(&self, user_id: &UserId) -> Result<Option<Membership>, StoreError>;

    /// Privileged membership test used by the access guard. Must not be
    /// routed back through any visibility policy.
    async fn is_member(&self, guild_id: &GuildId, user_id: &UserId) -> Result<bool, StoreError>;

    /// Members ordered by join time (earliest first, user id tiebreak);
    /// leader succession relies on this order.
    async fn list_members(&self, guild_id: &GuildId) -> Result<Vec<Membership>, StoreError>;

    /// Current member count.
    async fn member_count(&self, guild_id: &GuildId) -> Result<i64, StoreError>;

    /// Remove a membership, appending the leave-log entry in the same
    /// transaction. `NotFound` if the membership does not exist.
    async fn remove_member(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        reason: LeaveReason,
    ) -> Result<(), StoreError>;

    /// Leadership succession: reassign to `successor`, then remove the
    /// departing leader's membership (leave-log reason `leave`), in one
    /// transaction. `Conflict` if `departing` is not the current leader.
    async fn succeed_leader(
        &self,
        guild_id: &GuildId,
        departing: &UserId,
        successor: &UserId,
    ) -> Result<(), StoreError>;

    // ────────────────────────────────── Join requests ─────────────────────────────────────

    /// Create a pending join request, or return the existing pending one
    /// for the same (guild, requester) pair.
    async fn create_join_request(
        &self,
        guild_id: &GuildId,
        requester: &UserId,
    ) -> Result<JoinRequest, StoreError>;

    async fn get_join_request(&self, request_id: &RequestId) -> Result<JoinRequest, StoreError>;

    async fn list_pending_join_requests(
        &self,
        guild_id: &GuildId,
    ) -> Result<Vec<JoinRequest>, StoreError>;

    /// `pending → cancelled`. `NotFound` if the request is absent or no
    /// longer pending.
    async fn cancel_join_request(&self, request_id: &RequestId) -> Result<(), StoreError>;

    /// `pending → approved`, converting the request into a membership.
    ///
    /// One transaction: re-checks capacity (`Conflict` when full) and the
    /// one-guild-per-user rule (`AlreadyExists`), inserts the membership,
    /// cancels the requester's other pending requests, and, if the guild
    /// is now at capacity, cancels every remaining pending request for it.
    async fn approve_join_request(&self, request_id: &RequestId)
        -> Result<Membership, StoreError>;

    // ─────────────────────────────────── Invitations ──────────────────────────────────────

    /// Create a pending invitation, or return the existing pending one for
    /// the same (guild, invitee) pair.
    async fn create_invitation(
        &self,
        guild_id: &GuildId,
        invitee: &UserId,
    ) -> Result<Invitation, StoreError>;

    async fn get_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Invitation, StoreError>;

    async fn list_pending_invitations(
        &self,
        guild_id: &GuildId,
    ) -> Result<Vec<Invitation>, StoreError>;

    /// `pending → cancelled`. `NotFound` if absent or no longer pending.
    async fn cancel_invitation(&self, invitation_id: &InvitationId) -> Result<(), StoreError>;

    /// `pending → accepted`, converting the invitation into a membership
    /// with the same transactional side effects as
    /// [`Store::approve_join_request`].
    async fn accept_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Membership, StoreError>;

    // ─────────────────────────────────── Quest ledger ─────────────────────────────────────

    /// Append one success-ledger row for (guild, hour bucket).
    ///
    /// Returns `true` only if the row was actually inserted; the running
    /// stats counter is incremented in the same transaction, and only then.
    /// The ledger key is unique at the storage layer, so a duplicate run is
    /// a no-op returning `false`.
    async fn record_quest_success(
        &self,
        guild_id: &GuildId,
        hour: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Running success counter. `NotFound` until the first success.
    async fn get_quest_stats(&self, guild_id: &GuildId) -> Result<QuestStats, StoreError>;

    // ──────────────────────────────────── Leave log ───────────────────────────────────────

    /// Leave-log entries for a user, newest first. Read by external
    /// reporting collaborators and tests; the core only writes.
    async fn list_leave_log(&self, user_id: &UserId) -> Result<Vec<LeaveLogEntry>, StoreError>;
}
