//! Guild record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GuildId, UserId};

/// Hard ceiling on concurrent memberships per guild.
pub const MAX_MEMBERS: usize = 5;

/// Guild type tag. Only `Challenge` guilds participate in quest enforcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuildKind {
    Casual,
    Challenge,
}

impl GuildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuildKind::Casual => "casual",
            GuildKind::Challenge => "challenge",
        }
    }
}

impl std::fmt::Display for GuildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GuildKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(GuildKind::Casual),
            "challenge" => Ok(GuildKind::Challenge),
            _ => Err(format!("unknown guild kind: {}", s)),
        }
    }
}

/// Guild record.
///
/// `leader_id` is nullable: a guild may transiently have no leader (set-null
/// on identity deletion, or mid-disband). `disbanded` is terminal; the name
/// of a disbanded guild is a tombstone string, never the original.
#[derive(Clone, Debug)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub leader_id: Option<UserId>,
    pub kind: GuildKind,
    pub disbanded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a guild. The founder becomes sole leader/member
/// atomically with the guild row.
#[derive(Clone, Debug)]
pub struct CreateGuildParams {
    pub name: String,
    pub kind: GuildKind,
    pub founder: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_kind_roundtrip() {
        for kind in [GuildKind::Casual, GuildKind::Challenge] {
            let parsed: GuildKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("raid".parse::<GuildKind>().is_err());
    }
}
