//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{ChatIdentity, User};
use crate::onboarding::state::RegistrationStage;
use crate::posting::model::{ButtonType, Material, PostSession};
use crate::posting::state::SessionStatus;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// Session writes are serialized through `write_lock` so the
/// cancel-then-insert transaction never interleaves with another writer on
/// the shared connection.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn sortable_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const USER_COLUMNS: &str = "id, email, chat_id, username, first_name, last_name, channel_url, channel_username, is_bot_admin, registration_stage, post_count, last_activity, created_at";

const SESSION_COLUMNS: &str = "id, user_id, chat_id, status, answers, materials, generated_post, button_type, button_url, button_text, generation_started_at, created_at, updated_at";

/// `status NOT IN (...)` predicate for live sessions.
const LIVE_SESSION: &str = "status NOT IN ('completed', 'cancelled')";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("row_to_user: {e}"));

    let id_str: String = row.get(0).map_err(map)?;
    let stage_str: String = row.get(9).map_err(map)?;
    let last_activity: Option<String> = row.get(11).ok();
    let created_str: String = row.get(12).map_err(map)?;

    Ok(User {
        id: id_str
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("user id {id_str}: {e}")))?,
        email: row.get(1).map_err(map)?,
        chat_id: row.get::<i64>(2).ok(),
        username: row.get(3).ok(),
        first_name: row.get(4).ok(),
        last_name: row.get(5).ok(),
        channel_url: row.get(6).ok(),
        channel_username: row.get(7).ok(),
        is_bot_admin: row.get::<i64>(8).unwrap_or(0) != 0,
        registration_stage: stage_str.parse().unwrap_or_default(),
        post_count: row.get::<i64>(10).unwrap_or(0),
        last_activity: parse_optional_datetime(&last_activity),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_session(row: &libsql::Row) -> Result<PostSession, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("row_to_session: {e}"));

    let id_str: String = row.get(0).map_err(map)?;
    let user_id_str: String = row.get(1).map_err(map)?;
    let status_str: String = row.get(3).map_err(map)?;
    let answers_str: String = row.get::<String>(4).unwrap_or_else(|_| "[]".into());
    let materials_str: String = row.get::<String>(5).unwrap_or_else(|_| "[]".into());
    let button_type_str: Option<String> = row.get(7).ok();
    let started_str: Option<String> = row.get(10).ok();
    let created_str: String = row.get(11).map_err(map)?;
    let updated_str: String = row.get(12).map_err(map)?;

    let answers: Vec<String> = serde_json::from_str(&answers_str)
        .map_err(|e| DatabaseError::Serialization(format!("session {id_str} answers: {e}")))?;
    let materials: Vec<Material> = serde_json::from_str(&materials_str)
        .map_err(|e| DatabaseError::Serialization(format!("session {id_str} materials: {e}")))?;

    Ok(PostSession {
        id: id_str
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("session id {id_str}: {e}")))?,
        user_id: user_id_str
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("user id {user_id_str}: {e}")))?,
        chat_id: row.get(2).map_err(map)?,
        status: status_str
            .parse::<SessionStatus>()
            .map_err(DatabaseError::Serialization)?,
        answers,
        materials,
        generated_post: row.get(6).ok(),
        button_type: button_type_str.and_then(|s| s.parse::<ButtonType>().ok()),
        button_url: row.get(8).ok(),
        button_text: row.get(9).ok(),
        generation_started_at: parse_optional_datetime(&started_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

impl LibSqlBackend {
    async fn query_one_user(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn query_sessions(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<PostSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut sessions = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => sessions.push(row_to_session(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(sessions)
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    user.id.to_string(),
                    user.email.to_lowercase(),
                    match user.chat_id {
                        Some(id) => libsql::Value::Integer(id),
                        None => libsql::Value::Null,
                    },
                    opt_text(user.username.as_deref()),
                    opt_text(user.first_name.as_deref()),
                    opt_text(user.last_name.as_deref()),
                    opt_text(user.channel_url.as_deref()),
                    opt_text(user.channel_username.as_deref()),
                    user.is_bot_admin as i64,
                    user.registration_stage.to_string(),
                    user.post_count,
                    opt_text_owned(user.last_activity.map(|t| t.to_rfc3339())),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("insert_user: {msg}"))
                } else {
                    DatabaseError::Query(format!("insert_user: {msg}"))
                }
            })?;

        debug!(user_id = %user.id, "User inserted");
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.query_one_user(
            "get_user",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.query_one_user(
            "get_user_by_email",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email.trim().to_lowercase()],
        )
        .await
    }

    async fn get_user_by_chat(&self, chat_id: i64) -> Result<Option<User>, DatabaseError> {
        self.query_one_user(
            "get_user_by_chat",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?1"),
            params![chat_id],
        )
        .await
    }

    async fn bind_chat_identity(
        &self,
        user_id: Uuid,
        identity: &ChatIdentity,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE users SET chat_id = ?1, username = ?2, first_name = ?3, last_name = ?4,
                    registration_stage = ?5, last_activity = ?6
                 WHERE id = ?7 AND registration_stage = ?8",
                params![
                    identity.chat_id,
                    opt_text(identity.username.as_deref()),
                    opt_text(identity.first_name.as_deref()),
                    opt_text(identity.last_name.as_deref()),
                    RegistrationStage::EmailConfirmed.to_string(),
                    now,
                    user_id.to_string(),
                    RegistrationStage::Unverified.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("bind_chat_identity: {e}")))?;

        debug!(user_id = %user_id, chat_id = identity.chat_id, bound = count > 0, "Chat identity bound");
        Ok(count > 0)
    }

    async fn update_channel(
        &self,
        user_id: Uuid,
        channel_url: &str,
        channel_username: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET channel_url = ?1, channel_username = ?2, is_bot_admin = 0,
                    registration_stage = ?3
                 WHERE id = ?4",
                params![
                    channel_url,
                    channel_username,
                    RegistrationStage::ChannelAdded.to_string(),
                    user_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_channel: {e}")))?;
        Ok(())
    }

    async fn set_admin_verified(&self, user_id: Uuid, is_admin: bool) -> Result<(), DatabaseError> {
        // Only a user waiting on the admin check advances; completed users stay completed.
        self.conn()
            .execute(
                "UPDATE users SET is_bot_admin = ?1,
                    registration_stage = CASE
                        WHEN ?1 = 1 AND registration_stage = ?2 THEN ?3
                        ELSE registration_stage
                    END
                 WHERE id = ?4",
                params![
                    is_admin as i64,
                    RegistrationStage::ChannelAdded.to_string(),
                    RegistrationStage::Completed.to_string(),
                    user_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_admin_verified: {e}")))?;
        Ok(())
    }

    async fn increment_post_count(&self, user_id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET post_count = post_count + 1 WHERE id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_post_count: {e}")))?;
        Ok(())
    }

    async fn touch_user(&self, identity: &ChatIdentity) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE users SET last_activity = ?1,
                    username = COALESCE(?2, username),
                    first_name = COALESCE(?3, first_name),
                    last_name = COALESCE(?4, last_name)
                 WHERE chat_id = ?5",
                params![
                    now,
                    opt_text(identity.username.as_deref()),
                    opt_text(identity.first_name.as_deref()),
                    opt_text(identity.last_name.as_deref()),
                    identity.chat_id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_user: {e}")))?;
        Ok(())
    }

    // ── Post sessions ───────────────────────────────────────────────

    async fn create_session(&self, user_id: Uuid, chat_id: i64) -> Result<PostSession, DatabaseError> {
        let session = PostSession::new(user_id, chat_id);
        let now = session.created_at.to_rfc3339();

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_session: begin: {e}")))?;

        let cancelled = match tx
            .execute(
                &format!(
                    "UPDATE post_sessions SET status = 'cancelled', updated_at = ?1
                     WHERE user_id = ?2 AND {LIVE_SESSION}"
                ),
                params![now.clone(), user_id.to_string()],
            )
            .await
        {
            Ok(count) => count,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(DatabaseError::Query(format!("create_session: cancel: {e}")));
            }
        };

        if let Err(e) = tx
            .execute(
                &format!(
                    "INSERT INTO post_sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, '[]', '[]', NULL, NULL, NULL, NULL, NULL, ?5, ?5)"
                ),
                params![
                    session.id.to_string(),
                    user_id.to_string(),
                    chat_id,
                    session.status.to_string(),
                    now,
                ],
            )
            .await
        {
            let _ = tx.rollback().await;
            return Err(DatabaseError::Query(format!("create_session: insert: {e}")));
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_session: commit: {e}")))?;

        debug!(session_id = %session.id, chat_id, cancelled, "Post session created");
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<PostSession>, DatabaseError> {
        let mut sessions = self
            .query_sessions(
                "get_session",
                &format!("SELECT {SESSION_COLUMNS} FROM post_sessions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(sessions.pop())
    }

    async fn find_active_session(&self, chat_id: i64) -> Result<Option<PostSession>, DatabaseError> {
        let mut sessions = self
            .query_sessions(
                "find_active_session",
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM post_sessions
                     WHERE chat_id = ?1 AND {LIVE_SESSION}
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![chat_id],
            )
            .await?;
        Ok(sessions.pop())
    }

    async fn save_session(
        &self,
        session: &PostSession,
        expected: SessionStatus,
    ) -> Result<bool, DatabaseError> {
        let answers = serde_json::to_string(&session.answers)
            .map_err(|e| DatabaseError::Serialization(format!("save_session answers: {e}")))?;
        let materials = serde_json::to_string(&session.materials)
            .map_err(|e| DatabaseError::Serialization(format!("save_session materials: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE post_sessions SET status = ?1, answers = ?2, materials = ?3,
                    generated_post = ?4, button_type = ?5, button_url = ?6, button_text = ?7,
                    generation_started_at = ?8, updated_at = ?9
                 WHERE id = ?10 AND status = ?11",
                params![
                    session.status.to_string(),
                    answers,
                    materials,
                    opt_text(session.generated_post.as_deref()),
                    opt_text_owned(session.button_type.map(|t| t.to_string())),
                    opt_text(session.button_url.as_deref()),
                    opt_text(session.button_text.as_deref()),
                    opt_text_owned(session.generation_started_at.map(sortable_timestamp)),
                    now,
                    session.id.to_string(),
                    expected.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;

        debug!(
            session_id = %session.id,
            from = %expected,
            to = %session.status,
            applied = count > 0,
            "Session saved"
        );
        Ok(count > 0)
    }

    async fn list_overdue_generating(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PostSession>, DatabaseError> {
        self.query_sessions(
            "list_overdue_generating",
            &format!(
                "SELECT {SESSION_COLUMNS} FROM post_sessions
                 WHERE status = 'generating' AND generation_started_at IS NOT NULL
                   AND generation_started_at <= ?1
                 ORDER BY generation_started_at ASC"
            ),
            params![sortable_timestamp(cutoff)],
        )
        .await
    }

    async fn count_active_sessions(&self, user_id: Uuid) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT COUNT(*) FROM post_sessions WHERE user_id = ?1 AND {LIVE_SESSION}"),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_active_sessions: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_active_sessions: {e}")))?
            .ok_or_else(|| DatabaseError::Query("count_active_sessions: no row".into()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("count_active_sessions: {e}")))?;
        Ok(count as usize)
    }
}
