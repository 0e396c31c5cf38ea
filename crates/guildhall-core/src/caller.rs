//! Caller identity attached to every operation.

use guildhall_storage::UserId;

use crate::GuildError;

/// Who is invoking an operation.
///
/// `System` is reserved for in-process callers like the enforcement pass;
/// it bypasses membership-based visibility but is never accepted where a
/// specific user must act (leaving, accepting an invitation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    User(UserId),
    System,
    Anonymous,
}

impl Caller {
    /// The acting user, or `AuthRequired` for `Anonymous` and `System`.
    pub fn require_user(&self) -> Result<UserId, GuildError> {
        match self {
            Caller::User(id) => Ok(*id),
            Caller::System | Caller::Anonymous => Err(GuildError::AuthRequired),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Caller::System)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Caller::User(id) => Some(*id),
            _ => None,
        }
    }
}
