//! Caller visibility: who may see what about a guild.
//!
//! The membership test used here is the privileged [`Store::is_member`]
//! lookup; it must never route back through these visibility checks, or
//! answering "can this caller see the member list" would require the
//! member list.

use guildhall_credits::CreditSource;
use guildhall_storage::{Guild, GuildId, Membership, QuestStats, Store, UserId};

use crate::{Caller, GuildError, GuildService};

/// What a caller gets to see of a guild's roster. The count is public;
/// the member detail is `None` unless the caller passed the guard.
#[derive(Debug)]
pub struct MemberView {
    pub member_count: i64,
    pub members: Option<Vec<Membership>>,
}

impl<S: Store, C: CreditSource> GuildService<S, C> {
    /// Load a guild that is visible to ordinary callers. Disbanded guilds
    /// are reported as absent.
    pub(crate) async fn active_guild(&self, guild_id: &GuildId) -> Result<Guild, GuildError> {
        let guild = self.store.get_guild(guild_id).await?;
        if guild.disbanded {
            return Err(GuildError::NotFound);
        }
        Ok(guild)
    }

    /// Resolve the caller as the current leader of an active guild.
    pub(crate) async fn require_leader(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<(Guild, UserId), GuildError> {
        let guild = self.active_guild(guild_id).await?;
        let user = caller.require_user()?;
        if guild.leader_id != Some(user) {
            return Err(GuildError::NotAuthorized);
        }
        Ok((guild, user))
    }

    /// Whether the caller may see member detail for this guild.
    ///
    /// `System` sees everything, including disbanded guilds. For everyone
    /// else a disbanded guild is `NotFound`, and detail requires current
    /// membership.
    pub async fn can_view_members(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<bool, GuildError> {
        if caller.is_system() {
            self.store.get_guild(guild_id).await?;
            return Ok(true);
        }
        self.active_guild(guild_id).await?;
        match caller.user_id() {
            None => Ok(false),
            Some(user) => Ok(self.store.is_member(guild_id, &user).await?),
        }
    }

    /// Quest detail follows the same member-only rule as the roster.
    pub async fn can_view_quest_stats(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<bool, GuildError> {
        self.can_view_members(caller, guild_id).await
    }

    /// Roster as visible to the caller: everyone gets the count, members
    /// (and `System`) get the detail.
    pub async fn view_members(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<MemberView, GuildError> {
        let detailed = self.can_view_members(caller, guild_id).await?;
        let member_count = self.store.member_count(guild_id).await?;
        let members = if detailed {
            Some(self.store.list_members(guild_id).await?)
        } else {
            None
        };
        Ok(MemberView {
            member_count,
            members,
        })
    }

    /// Quest stats for members only; `NotAuthorized` otherwise.
    /// `NotFound` until the guild's first recorded success.
    pub async fn view_quest_stats(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<QuestStats, GuildError> {
        if !self.can_view_quest_stats(caller, guild_id).await? {
            return Err(GuildError::NotAuthorized);
        }
        Ok(self.store.get_quest_stats(guild_id).await?)
    }
}
