//! `Database` trait: single async interface for users and post sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{ChatIdentity, User};
use crate::posting::model::PostSession;
use crate::posting::state::SessionStatus;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a pre-provisioned user.
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Look up a user by email (case-insensitive).
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Look up the user bound to a chat identity.
    async fn get_user_by_chat(&self, chat_id: i64) -> Result<Option<User>, DatabaseError>;

    /// Bind a chat identity to a user and advance them to `email_confirmed`.
    ///
    /// Only applies while the user is still `unverified`; returns whether the
    /// row changed.
    async fn bind_chat_identity(
        &self,
        user_id: Uuid,
        identity: &ChatIdentity,
    ) -> Result<bool, DatabaseError>;

    /// Record the user's channel and move them to `channel_added`.
    async fn update_channel(
        &self,
        user_id: Uuid,
        channel_url: &str,
        channel_username: &str,
    ) -> Result<(), DatabaseError>;

    /// Persist the last admin-check result. A positive result on a user at
    /// `channel_added` also completes registration.
    async fn set_admin_verified(&self, user_id: Uuid, is_admin: bool) -> Result<(), DatabaseError>;

    async fn increment_post_count(&self, user_id: Uuid) -> Result<(), DatabaseError>;

    /// Refresh profile fields and `last_activity` for a bound user.
    async fn touch_user(&self, identity: &ChatIdentity) -> Result<(), DatabaseError>;

    // ── Post sessions ───────────────────────────────────────────────

    /// Cancel any live session for the user and insert a fresh one, atomically.
    async fn create_session(&self, user_id: Uuid, chat_id: i64) -> Result<PostSession, DatabaseError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<PostSession>, DatabaseError>;

    /// The single non-terminal session for a chat, if any.
    async fn find_active_session(&self, chat_id: i64) -> Result<Option<PostSession>, DatabaseError>;

    /// Write `session` only if the stored status still equals `expected`.
    ///
    /// Returns `false` when another writer moved the session first.
    async fn save_session(
        &self,
        session: &PostSession,
        expected: SessionStatus,
    ) -> Result<bool, DatabaseError>;

    /// Sessions still `generating` that started before `cutoff`.
    async fn list_overdue_generating(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PostSession>, DatabaseError>;

    /// Number of non-terminal sessions for a user.
    async fn count_active_sessions(&self, user_id: Uuid) -> Result<usize, DatabaseError>;
}
