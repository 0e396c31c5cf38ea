//! SQLite storage backend for guildhall.
//!
//! All composite operations run inside a single sqlx transaction on a
//! single-connection pool; SQLite's single-writer discipline plus the
//! in-transaction re-checks close the check-then-act races the capacity
//! invariant is exposed to. Uniqueness-based invariants (one guild per
//! user, one ledger row per hour bucket, one pending request per pair)
//! are enforced by the schema itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use guildhall_credits::{CreditError, CreditSource};
use guildhall_storage::{
    hour_bucket, CreateGuildParams, Guild, GuildId, GuildKind, Invitation, InvitationId,
    InvitationStatus, JoinRequest, LeaveLogEntry, LeaveReason, MemberRole, Membership, QuestStats,
    RequestId, RequestStatus, Store, StoreError, UserId, MAX_MEMBERS,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map constraint violations onto `AlreadyExists` like every other backend.
fn map_unique(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend)
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

type GuildRow = (String, String, Option<String>, String, i64, i64, i64);

fn guild_from_row(row: GuildRow) -> Result<Guild, StoreError> {
    let (id, name, leader, kind, disbanded, created_at, updated_at) = row;
    let leader_id = match leader {
        Some(s) => Some(UserId(parse_uuid(&s)?)),
        None => None,
    };
    Ok(Guild {
        id: GuildId(parse_uuid(&id)?),
        name,
        leader_id,
        kind: kind.parse().map_err(StoreError::Backend)?,
        disbanded: disbanded != 0,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

const GUILD_COLS: &str = "id, name, leader_id, kind, disbanded, created_at, updated_at";

impl SqliteStore {
    /// `~/.guildhall/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".guildhall");
        std::fs::create_dir_all(&dir).map_err(backend)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(backend)?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(backend)?;

        Ok(Self { pool })
    }

    /// Write path for the external contribution accrual collaborator (and
    /// tests). The core never calls this; it reads via [`CreditSource`].
    pub async fn record_contribution(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        amount: i64,
        earned_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO guild_contributions(id, guild_id, user_id, amount, earned_at)
             VALUES(?,?,?,?,?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(guild_id.0.to_string())
        .bind(user_id.0.to_string())
        .bind(amount)
        .bind(millis(earned_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    /// Membership insert shared by approval and acceptance paths. Runs the
    /// capacity re-check inside the caller's transaction and applies the
    /// request-invalidation side effects.
    async fn insert_member_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        guild_id: &GuildId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Membership, StoreError> {
        let active: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM guilds WHERE id=? AND disbanded=0")
                .bind(guild_id.0.to_string())
                .fetch_optional(&mut **tx)
                .await
                .map_err(backend)?;
        if active.is_none() {
            return Err(StoreError::NotFound);
        }

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM memberships WHERE guild_id=?")
                .bind(guild_id.0.to_string())
                .fetch_one(&mut **tx)
                .await
                .map_err(backend)?;
        if count >= MAX_MEMBERS as i64 {
            return Err(StoreError::Conflict);
        }

        sqlx::query("INSERT INTO memberships(guild_id, user_id, role, joined_at) VALUES(?,?,?,?)")
            .bind(guild_id.0.to_string())
            .bind(user_id.0.to_string())
            .bind(MemberRole::Member.as_str())
            .bind(millis(now))
            .execute(&mut **tx)
            .await
            .map_err(map_unique)?;

        // The new member's other pending requests can never be approved now.
        sqlx::query(
            "UPDATE join_requests SET status='cancelled', updated_at=?
             WHERE requester_id=? AND status='pending'",
        )
        .bind(millis(now))
        .bind(user_id.0.to_string())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        // At capacity, no remaining request for this guild can be approved.
        if count + 1 >= MAX_MEMBERS as i64 {
            sqlx::query(
                "UPDATE join_requests SET status='cancelled', updated_at=?
                 WHERE guild_id=? AND status='pending'",
            )
            .bind(millis(now))
            .bind(guild_id.0.to_string())
            .execute(&mut **tx)
            .await
            .map_err(backend)?;
        }

        Ok(Membership {
            guild_id: *guild_id,
            user_id: *user_id,
            role: MemberRole::Member,
            joined_at: now,
        })
    }

    /// Leave-log append; must run before the membership delete in the same
    /// transaction.
    async fn append_leave_log_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        user_id: &UserId,
        guild_name: &str,
        reason: LeaveReason,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO guild_leave_log(id, user_id, guild_name, reason, created_at)
             VALUES(?,?,?,?,?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(user_id.0.to_string())
        .bind(guild_name)
        .bind(reason.as_str())
        .bind(millis(now))
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn active_guild_name_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        guild_id: &GuildId,
    ) -> Result<String, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM guilds WHERE id=? AND disbanded=0")
                .bind(guild_id.0.to_string())
                .fetch_optional(&mut **tx)
                .await
                .map_err(backend)?;
        row.map(|(name,)| name).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Guilds ─────────────────────────────

    async fn create_guild(&self, params: &CreateGuildParams) -> Result<GuildId, StoreError> {
        let guild_id = Uuid::now_v7();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO guilds(id, name, leader_id, kind, disbanded, created_at, updated_at)
             VALUES(?,?,?,?,0,?,?)",
        )
        .bind(guild_id.to_string())
        .bind(&params.name)
        .bind(params.founder.0.to_string())
        .bind(params.kind.as_str())
        .bind(millis(now))
        .bind(millis(now))
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("INSERT INTO memberships(guild_id, user_id, role, joined_at) VALUES(?,?,?,?)")
            .bind(guild_id.to_string())
            .bind(params.founder.0.to_string())
            .bind(MemberRole::Leader.as_str())
            .bind(millis(now))
            .execute(&mut *tx)
            .await
            .map_err(map_unique)?;

        tx.commit().await.map_err(backend)?;
        Ok(GuildId(guild_id))
    }

    async fn get_guild(&self, guild_id: &GuildId) -> Result<Guild, StoreError> {
        let row: Option<GuildRow> =
            sqlx::query_as(&format!("SELECT {} FROM guilds WHERE id=?", GUILD_COLS))
                .bind(guild_id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        guild_from_row(row.ok_or(StoreError::NotFound)?)
    }

    async fn get_guild_by_name(&self, name: &str) -> Result<Guild, StoreError> {
        let row: Option<GuildRow> = sqlx::query_as(&format!(
            "SELECT {} FROM guilds WHERE name=? AND disbanded=0",
            GUILD_COLS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        guild_from_row(row.ok_or(StoreError::NotFound)?)
    }

    async fn list_active_guilds(&self, kind: Option<GuildKind>) -> Result<Vec<Guild>, StoreError> {
        let rows: Vec<GuildRow> = match kind {
            Some(kind) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM guilds WHERE disbanded=0 AND kind=? ORDER BY created_at",
                    GUILD_COLS
                ))
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM guilds WHERE disbanded=0 ORDER BY created_at",
                    GUILD_COLS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend)?;
        rows.into_iter().map(guild_from_row).collect()
    }

    async fn rename_guild(&self, guild_id: &GuildId, new_name: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE guilds SET name=?, updated_at=? WHERE id=? AND disbanded=0")
            .bind(new_name)
            .bind(millis(Utc::now()))
            .bind(guild_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_unique)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn transfer_leadership(
        &self,
        guild_id: &GuildId,
        from: &UserId,
        to: &UserId,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let res = sqlx::query(
            "UPDATE guilds SET leader_id=?, updated_at=?
             WHERE id=? AND leader_id=? AND disbanded=0",
        )
        .bind(to.0.to_string())
        .bind(millis(now))
        .bind(guild_id.0.to_string())
        .bind(from.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        let res = sqlx::query("UPDATE memberships SET role=? WHERE guild_id=? AND user_id=?")
            .bind(MemberRole::Leader.as_str())
            .bind(guild_id.0.to_string())
            .bind(to.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            // Target is not a member; dropping the transaction rolls back
            // the leader reference change.
            return Err(StoreError::NotFound);
        }

        sqlx::query("UPDATE memberships SET role=? WHERE guild_id=? AND user_id=?")
            .bind(MemberRole::Member.as_str())
            .bind(guild_id.0.to_string())
            .bind(from.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn claim_leadership(&self, guild_id: &GuildId, to: &UserId) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let res = sqlx::query(
            "UPDATE guilds SET leader_id=?, updated_at=?
             WHERE id=? AND leader_id IS NULL AND disbanded=0",
        )
        .bind(to.0.to_string())
        .bind(millis(now))
        .bind(guild_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        let res = sqlx::query("UPDATE memberships SET role=? WHERE guild_id=? AND user_id=?")
            .bind(MemberRole::Leader.as_str())
            .bind(guild_id.0.to_string())
            .bind(to.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn disband_guild(&self, guild_id: &GuildId, tombstone: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let name = self.active_guild_name_tx(&mut tx, guild_id).await?;

        let members: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM memberships WHERE guild_id=?")
                .bind(guild_id.0.to_string())
                .fetch_all(&mut *tx)
                .await
                .map_err(backend)?;
        for (user,) in &members {
            let user_id = UserId(parse_uuid(user)?);
            self.append_leave_log_tx(&mut tx, &user_id, &name, LeaveReason::Disband, now)
                .await?;
        }

        sqlx::query(
            "UPDATE guilds SET disbanded=1, name=?, leader_id=NULL, updated_at=?
             WHERE id=? AND disbanded=0",
        )
        .bind(tombstone)
        .bind(millis(now))
        .bind(guild_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("DELETE FROM memberships WHERE guild_id=?")
            .bind(guild_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    // ─────────────────────────── Memberships ──────────────────────────

    async fn get_membership(&self, user_id: &UserId) -> Result<Option<Membership>, StoreError> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT guild_id, role, joined_at FROM memberships WHERE user_id=?")
                .bind(user_id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        match row {
            None => Ok(None),
            Some((guild, role, joined_at)) => Ok(Some(Membership {
                guild_id: GuildId(parse_uuid(&guild)?),
                user_id: *user_id,
                role: role.parse().map_err(StoreError::Backend)?,
                joined_at: from_millis(joined_at)?,
            })),
        }
    }

    async fn is_member(&self, guild_id: &GuildId, user_id: &UserId) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM memberships WHERE guild_id=? AND user_id=?")
                .bind(guild_id.0.to_string())
                .bind(user_id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.is_some())
    }

    async fn list_members(&self, guild_id: &GuildId) -> Result<Vec<Membership>, StoreError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT user_id, role, joined_at FROM memberships
             WHERE guild_id=? ORDER BY joined_at, user_id",
        )
        .bind(guild_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (user, role, joined_at) in rows {
            out.push(Membership {
                guild_id: *guild_id,
                user_id: UserId(parse_uuid(&user)?),
                role: role.parse().map_err(StoreError::Backend)?,
                joined_at: from_millis(joined_at)?,
            });
        }
        Ok(out)
    }

    async fn member_count(&self, guild_id: &GuildId) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM memberships WHERE guild_id=?")
                .bind(guild_id.0.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(count)
    }

    async fn remove_member(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        reason: LeaveReason,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let name = self.active_guild_name_tx(&mut tx, guild_id).await?;

        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM memberships WHERE guild_id=? AND user_id=?")
                .bind(guild_id.0.to_string())
                .bind(user_id.0.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        self.append_leave_log_tx(&mut tx, user_id, &name, reason, now)
            .await?;

        sqlx::query("DELETE FROM memberships WHERE guild_id=? AND user_id=?")
            .bind(guild_id.0.to_string())
            .bind(user_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn succeed_leader(
        &self,
        guild_id: &GuildId,
        departing: &UserId,
        successor: &UserId,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let name = self.active_guild_name_tx(&mut tx, guild_id).await?;

        let res = sqlx::query(
            "UPDATE guilds SET leader_id=?, updated_at=?
             WHERE id=? AND leader_id=? AND disbanded=0",
        )
        .bind(successor.0.to_string())
        .bind(millis(now))
        .bind(guild_id.0.to_string())
        .bind(departing.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        let res = sqlx::query("UPDATE memberships SET role=? WHERE guild_id=? AND user_id=?")
            .bind(MemberRole::Leader.as_str())
            .bind(guild_id.0.to_string())
            .bind(successor.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        self.append_leave_log_tx(&mut tx, departing, &name, LeaveReason::Leave, now)
            .await?;

        let res = sqlx::query("DELETE FROM memberships WHERE guild_id=? AND user_id=?")
            .bind(guild_id.0.to_string())
            .bind(departing.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    // ────────────────────────── Join requests ─────────────────────────

    async fn create_join_request(
        &self,
        guild_id: &GuildId,
        requester: &UserId,
    ) -> Result<JoinRequest, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Idempotent re-request: hand back the existing pending row.
        let existing: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT id, created_at, updated_at FROM join_requests
             WHERE guild_id=? AND requester_id=? AND status='pending'",
        )
        .bind(guild_id.0.to_string())
        .bind(requester.0.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if let Some((id, created_at, updated_at)) = existing {
            tx.commit().await.map_err(backend)?;
            return Ok(JoinRequest {
                id: RequestId(parse_uuid(&id)?),
                guild_id: *guild_id,
                requester_id: *requester,
                status: RequestStatus::Pending,
                created_at: from_millis(created_at)?,
                updated_at: from_millis(updated_at)?,
            });
        }

        self.active_guild_name_tx(&mut tx, guild_id).await?;

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO join_requests(id, guild_id, requester_id, status, created_at, updated_at)
             VALUES(?,?,?,'pending',?,?)",
        )
        .bind(id.to_string())
        .bind(guild_id.0.to_string())
        .bind(requester.0.to_string())
        .bind(millis(now))
        .bind(millis(now))
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await.map_err(backend)?;
        Ok(JoinRequest {
            id: RequestId(id),
            guild_id: *guild_id,
            requester_id: *requester,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_join_request(&self, request_id: &RequestId) -> Result<JoinRequest, StoreError> {
        let row: Option<(String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT guild_id, requester_id, status, created_at, updated_at
             FROM join_requests WHERE id=?",
        )
        .bind(request_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let (guild, requester, status, created_at, updated_at) =
            row.ok_or(StoreError::NotFound)?;
        Ok(JoinRequest {
            id: *request_id,
            guild_id: GuildId(parse_uuid(&guild)?),
            requester_id: UserId(parse_uuid(&requester)?),
            status: status.parse().map_err(StoreError::Backend)?,
            created_at: from_millis(created_at)?,
            updated_at: from_millis(updated_at)?,
        })
    }

    async fn list_pending_join_requests(
        &self,
        guild_id: &GuildId,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT id, requester_id, created_at, updated_at FROM join_requests
             WHERE guild_id=? AND status='pending' ORDER BY created_at",
        )
        .bind(guild_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, requester, created_at, updated_at) in rows {
            out.push(JoinRequest {
                id: RequestId(parse_uuid(&id)?),
                guild_id: *guild_id,
                requester_id: UserId(parse_uuid(&requester)?),
                status: RequestStatus::Pending,
                created_at: from_millis(created_at)?,
                updated_at: from_millis(updated_at)?,
            });
        }
        Ok(out)
    }

    async fn cancel_join_request(&self, request_id: &RequestId) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE join_requests SET status='cancelled', updated_at=?
             WHERE id=? AND status='pending'",
        )
        .bind(millis(Utc::now()))
        .bind(request_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 0 {
            // Absent, or already in a terminal state.
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn approve_join_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Membership, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT guild_id, requester_id FROM join_requests WHERE id=? AND status='pending'",
        )
        .bind(request_id.0.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let (guild, requester) = row.ok_or(StoreError::NotFound)?;
        let guild_id = GuildId(parse_uuid(&guild)?);
        let requester_id = UserId(parse_uuid(&requester)?);

        // Flip to approved before the insert cancels the requester's other
        // pendings; the blanket cancel must not touch this row.
        sqlx::query(
            "UPDATE join_requests SET status='approved', updated_at=?
             WHERE id=? AND status='pending'",
        )
        .bind(millis(now))
        .bind(request_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let membership = self
            .insert_member_tx(&mut tx, &guild_id, &requester_id, now)
            .await?;

        tx.commit().await.map_err(backend)?;
        Ok(membership)
    }

    // ─────────────────────────── Invitations ──────────────────────────

    async fn create_invitation(
        &self,
        guild_id: &GuildId,
        invitee: &UserId,
    ) -> Result<Invitation, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let existing: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT id, created_at, updated_at FROM invitations
             WHERE guild_id=? AND invitee_id=? AND status='pending'",
        )
        .bind(guild_id.0.to_string())
        .bind(invitee.0.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if let Some((id, created_at, updated_at)) = existing {
            tx.commit().await.map_err(backend)?;
            return Ok(Invitation {
                id: InvitationId(parse_uuid(&id)?),
                guild_id: *guild_id,
                invitee_id: *invitee,
                status: InvitationStatus::Pending,
                created_at: from_millis(created_at)?,
                updated_at: from_millis(updated_at)?,
            });
        }

        self.active_guild_name_tx(&mut tx, guild_id).await?;

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO invitations(id, guild_id, invitee_id, status, created_at, updated_at)
             VALUES(?,?,?,'pending',?,?)",
        )
        .bind(id.to_string())
        .bind(guild_id.0.to_string())
        .bind(invitee.0.to_string())
        .bind(millis(now))
        .bind(millis(now))
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await.map_err(backend)?;
        Ok(Invitation {
            id: InvitationId(id),
            guild_id: *guild_id,
            invitee_id: *invitee,
            status: InvitationStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Invitation, StoreError> {
        let row: Option<(String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT guild_id, invitee_id, status, created_at, updated_at
             FROM invitations WHERE id=?",
        )
        .bind(invitation_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let (guild, invitee, status, created_at, updated_at) = row.ok_or(StoreError::NotFound)?;
        Ok(Invitation {
            id: *invitation_id,
            guild_id: GuildId(parse_uuid(&guild)?),
            invitee_id: UserId(parse_uuid(&invitee)?),
            status: status.parse().map_err(StoreError::Backend)?,
            created_at: from_millis(created_at)?,
            updated_at: from_millis(updated_at)?,
        })
    }

    async fn list_pending_invitations(
        &self,
        guild_id: &GuildId,
    ) -> Result<Vec<Invitation>, StoreError> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT id, invitee_id, created_at, updated_at FROM invitations
             WHERE guild_id=? AND status='pending' ORDER BY created_at",
        )
        .bind(guild_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, invitee, created_at, updated_at) in rows {
            out.push(Invitation {
                id: InvitationId(parse_uuid(&id)?),
                guild_id: *guild_id,
                invitee_id: UserId(parse_uuid(&invitee)?),
                status: InvitationStatus::Pending,
                created_at: from_millis(created_at)?,
                updated_at: from_millis(updated_at)?,
            });
        }
        Ok(out)
    }

    async fn cancel_invitation(&self, invitation_id: &InvitationId) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE invitations SET status='cancelled', updated_at=?
             WHERE id=? AND status='pending'",
        )
        .bind(millis(Utc::now()))
        .bind(invitation_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn accept_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Membership, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT guild_id, invitee_id FROM invitations WHERE id=? AND status='pending'",
        )
        .bind(invitation_id.0.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let (guild, invitee) = row.ok_or(StoreError::NotFound)?;
        let guild_id = GuildId(parse_uuid(&guild)?);
        let invitee_id = UserId(parse_uuid(&invitee)?);

        sqlx::query(
            "UPDATE invitations SET status='accepted', updated_at=?
             WHERE id=? AND status='pending'",
        )
        .bind(millis(now))
        .bind(invitation_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let membership = self
            .insert_member_tx(&mut tx, &guild_id, &invitee_id, now)
            .await?;

        tx.commit().await.map_err(backend)?;
        Ok(membership)
    }

    // ─────────────────────────── Quest ledger ─────────────────────────

    async fn record_quest_success(
        &self,
        guild_id: &GuildId,
        hour: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let bucket = hour_bucket(hour).timestamp();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let res = sqlx::query(
            "INSERT OR IGNORE INTO quest_success_log(guild_id, hour_bucket, created_at)
             VALUES(?,?,?)",
        )
        .bind(guild_id.0.to_string())
        .bind(bucket)
        .bind(millis(now))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // Only a run that actually appended the ledger row may bump the
        // counter; this is the whole double-credit guard.
        let inserted = res.rows_affected() == 1;
        if inserted {
            sqlx::query(
                "INSERT INTO quest_stats(guild_id, success_count, updated_at) VALUES(?,1,?)
                 ON CONFLICT(guild_id)
                 DO UPDATE SET success_count=success_count+1, updated_at=excluded.updated_at",
            )
            .bind(guild_id.0.to_string())
            .bind(millis(now))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(inserted)
    }

    async fn get_quest_stats(&self, guild_id: &GuildId) -> Result<QuestStats, StoreError> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT success_count, updated_at FROM quest_stats WHERE guild_id=?")
                .bind(guild_id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        let (success_count, updated_at) = row.ok_or(StoreError::NotFound)?;
        Ok(QuestStats {
            guild_id: *guild_id,
            success_count,
            updated_at: from_millis(updated_at)?,
        })
    }

    // ──────────────────────────── Leave log ───────────────────────────

    async fn list_leave_log(&self, user_id: &UserId) -> Result<Vec<LeaveLogEntry>, StoreError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT guild_name, reason, created_at FROM guild_leave_log
             WHERE user_id=? ORDER BY created_at DESC",
        )
        .bind(user_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (guild_name, reason, created_at) in rows {
            out.push(LeaveLogEntry {
                user_id: *user_id,
                guild_name,
                reason: reason.parse().map_err(StoreError::Backend)?,
                created_at: from_millis(created_at)?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CreditSource for SqliteStore {
    async fn sum_credits(
        &self,
        guild_id: &GuildId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, CreditError> {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM guild_contributions
             WHERE guild_id=? AND earned_at >= ? AND earned_at < ?",
        )
        .bind(guild_id.0.to_string())
        .bind(millis(from))
        .bind(millis(to))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CreditError::Backend(e.to_string()))?;
        Ok(sum)
    }
}
