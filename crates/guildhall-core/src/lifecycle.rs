//! Guild creation, renaming, leader departure, disband, and recovery of a
//! leaderless guild.

use chrono::Utc;
use guildhall_credits::CreditSource;
use guildhall_storage::{CreateGuildParams, Guild, GuildId, GuildKind, Store, StoreError};
use uuid::Uuid;

use crate::{Caller, GuildError, GuildService};

/// Tombstone the display name so the original becomes reusable the instant
/// the disband commits. Timestamp plus a random suffix keeps repeated
/// disbands of same-named guilds collision-free.
fn tombstone_name(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}#disbanded-{}-{}", name, Utc::now().timestamp(), &suffix[..8])
}

impl<S: Store, C: CreditSource> GuildService<S, C> {
    /// Found a guild; the caller becomes its sole member and leader.
    pub async fn create_guild(
        &self,
        caller: &Caller,
        name: &str,
        kind: GuildKind,
    ) -> Result<Guild, GuildError> {
        let founder = caller.require_user()?;
        if self.store.get_membership(&founder).await?.is_some() {
            return Err(GuildError::AlreadyMember);
        }

        let params = CreateGuildParams {
            name: name.to_owned(),
            kind,
            founder,
        };
        // Membership was checked above, so a constraint violation here is
        // the name index (or a creation race, which reads the same).
        let guild_id = self
            .store
            .create_guild(&params)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => GuildError::NameTaken,
                other => other.into(),
            })?;
        tracing::info!(guild = %guild_id, name, founder = %founder, "guild created");
        Ok(self.store.get_guild(&guild_id).await?)
    }

    /// Active guilds, optionally restricted to one kind. Public listing.
    pub async fn list_guilds(&self, kind: Option<GuildKind>) -> Result<Vec<Guild>, GuildError> {
        Ok(self.store.list_active_guilds(kind).await?)
    }

    /// A guild by its current display name.
    pub async fn guild_by_name(&self, name: &str) -> Result<Guild, GuildError> {
        Ok(self.store.get_guild_by_name(name).await?)
    }

    /// Leader changes the display name.
    pub async fn rename_guild(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
        new_name: &str,
    ) -> Result<(), GuildError> {
        self.require_leader(caller, guild_id).await?;
        self.store
            .rename_guild(guild_id, new_name)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => GuildError::NameTaken,
                other => other.into(),
            })?;
        tracing::info!(guild = %guild_id, name = new_name, "guild renamed");
        Ok(())
    }

    /// Leader departs; leadership passes to the longest-standing remaining
    /// member (earliest join, user-id tiebreak). A sole leader cannot leave
    /// this way, only disband.
    pub async fn leader_leave(
        &self,
        caller: &Caller,
        guild_id: &GuildId,
    ) -> Result<(), GuildError> {
        let (_, leader) = self.require_leader(caller, guild_id).await?;

        let members = self.store.list_members(guild_id).await?;
        let successor = members
            .iter()
            .find(|m| m.user_id != leader)
            .map(|m| m.user_id)
            .ok_or(GuildError::NoSuccessor)?;

        self.store
            .succeed_leader(guild_id, &leader, &successor)
            .await
            .map_err(|e| match e {
                StoreError::Conflict => GuildError::NotAuthorized,
                other => other.into(),
            })?;
        tracing::info!(
            guild = %guild_id,
            departing = %leader,
            successor = %successor,
            "leadership succession"
        );
        Ok(())
    }

    /// Irreversibly disband a guild. Leader or `System` only.
    ///
    /// The stored name becomes a tombstone, every membership is removed
    /// with a `disband` leave-log entry, and the guild row stays behind as
    /// a terminal record.
    pub async fn disband(&self, caller: &Caller, guild_id: &GuildId) -> Result<(), GuildError> {
        let guild = self.active_guild(guild_id).await?;
        if !caller.is_system() {
            let user = caller.require_user()?;
            if guild.leader_id != Some(user) {
                return Err(GuildError::NotAuthorized);
            }
        }

        self.store
            .disband_guild(guild_id, &tombstone_name(&guild.name))
            .await?;
        tracing::info!(guild = %guild_id, name = %guild.name, "guild disbanded");
        Ok(())
    }

    /// Claim leadership of a guild that currently has none (the leader's
    /// identity was deleted out from under it). Any current member may
    /// adopt; first claim wins.
    pub async fn adopt_guild(&self, caller: &Caller, guild_id: &GuildId) -> Result<(), GuildError> {
        let user = caller.require_user()?;
        let guild = self.active_guild(guild_id).await?;
        if guild.leader_id.is_some() {
            return Err(GuildError::NotAuthorized);
        }
        if !self.store.is_member(guild_id, &user).await? {
            return Err(GuildError::NotAuthorized);
        }

        self.store
            .claim_leadership(guild_id, &user)
            .await
            .map_err(|e| match e {
                // Another member claimed first.
                StoreError::Conflict => GuildError::NotAuthorized,
                other => other.into(),
            })?;
        tracing::info!(guild = %guild_id, user = %user, "leaderless guild adopted");
        Ok(())
    }
}
