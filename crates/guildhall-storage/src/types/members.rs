//! Membership and leave-audit record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GuildId, UserId};

/// Role a membership row carries. Exactly one non-disbanded guild membership
/// holds `Leader` outside the transactional window of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Leader,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Leader => "leader",
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(MemberRole::Member),
            "leader" => Ok(MemberRole::Leader),
            _ => Err(format!("unknown member role: {}", s)),
        }
    }
}

/// Membership record binding a user to a guild. A user belongs to at most
/// one guild at a time (schema-enforced).
#[derive(Clone, Debug)]
pub struct Membership {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// Why a membership row was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Leave,
    Kick,
    Disband,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Leave => "leave",
            LeaveReason::Kick => "kick",
            LeaveReason::Disband => "disband",
        }
    }
}

impl std::str::FromStr for LeaveReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave" => Ok(LeaveReason::Leave),
            "kick" => Ok(LeaveReason::Kick),
            "disband" => Ok(LeaveReason::Disband),
            _ => Err(format!("unknown leave reason: {}", s)),
        }
    }
}

/// Audit trail entry written in the same transaction that deletes a
/// membership row. Snapshots the guild name so it survives disband.
#[derive(Clone, Debug)]
pub struct LeaveLogEntry {
    pub user_id: UserId,
    pub guild_name: String,
    pub reason: LeaveReason,
    pub created_at: DateTime<Utc>,
}
