//! Domain error taxonomy.

use guildhall_credits::CreditError;
use guildhall_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuildError {
    /// The operation needs an authenticated user and the caller has none.
    #[error("authentication required")]
    AuthRequired,
    /// Guild, request, or invitation absent, disbanded, or otherwise
    /// invisible to the caller.
    #[error("not found")]
    NotFound,
    /// The caller exists but may not perform this operation.
    #[error("not authorized")]
    NotAuthorized,
    /// The affected user already belongs to a guild.
    #[error("already a member of a guild")]
    AlreadyMember,
    /// The guild is at its member capacity.
    #[error("guild is full")]
    GuildFull,
    /// A departing leader has no member to hand leadership to.
    #[error("no successor available")]
    NoSuccessor,
    /// An active guild already uses the requested name.
    #[error("guild name already taken")]
    NameTaken,
    /// Storage failure that does not map to a domain outcome.
    #[error("storage error: {0}")]
    Store(StoreError),
    #[error("credit source error: {0}")]
    Credit(#[from] CreditError),
}

/// Default mapping for store outcomes. Call sites where a constraint
/// violation means something more specific (a name collision, a leadership
/// race) override this with an explicit `map_err`.
impl From<StoreError> for GuildError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => GuildError::NotFound,
            StoreError::AlreadyExists => GuildError::AlreadyMember,
            StoreError::Conflict => GuildError::GuildFull,
            StoreError::Backend(_) => GuildError::Store(e),
        }
    }
}
