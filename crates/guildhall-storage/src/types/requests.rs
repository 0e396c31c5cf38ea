//! Join request and invitation records.
//!
//! Both are pending-state entities with the same shape and mirrored roles:
//! a join request is initiated by the prospective member, an invitation by
//! the guild. `pending` transitions once, to a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GuildId, InvitationId, RequestId, UserId};

/// Join request state. `Approved` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "cancelled" => Ok(RequestStatus::Cancelled),
            _ => Err(format!("unknown request status: {}", s)),
        }
    }
}

/// Invitation state. `Accepted` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Cancelled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "cancelled" => Ok(InvitationStatus::Cancelled),
            _ => Err(format!("unknown invitation status: {}", s)),
        }
    }
}

/// A prospective member's request to join a guild. At most one pending
/// request per (guild, requester) pair (schema-enforced).
#[derive(Clone, Debug)]
pub struct JoinRequest {
    pub id: RequestId,
    pub guild_id: GuildId,
    pub requester_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A guild's proposal to a prospective member. Same shape as [`JoinRequest`]
/// with the initiating role reversed.
#[derive(Clone, Debug)]
pub struct Invitation {
    pub id: InvitationId,
    pub guild_id: GuildId,
    pub invitee_id: UserId,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
