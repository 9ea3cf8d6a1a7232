//! Generation timeout supervision.
//!
//! Two paths expire a stuck `generating` session: a detached timer started
//! right after dispatch, and a periodic sweep over `generation_started_at`
//! that also recovers sessions left over from a restart. Both re-read the
//! session and reset it with a status check-then-set, so a callback that
//! lands first always wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{self, AlertSink};
use crate::channels::ChatGateway;
use crate::error::Error;
use crate::generation::{GenerationBackend, GenerationRequest, RequestType};
use crate::store::Database;

use super::prompts;
use super::state::SessionStatus;

pub struct TimeoutSupervisor {
    db: Arc<dyn Database>,
    gateway: Arc<dyn ChatGateway>,
    backend: Arc<dyn GenerationBackend>,
    alerts: Arc<dyn AlertSink>,
    timeout: Duration,
}

impl TimeoutSupervisor {
    pub fn new(
        db: Arc<dyn Database>,
        gateway: Arc<dyn ChatGateway>,
        backend: Arc<dyn GenerationBackend>,
        alerts: Arc<dyn AlertSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            backend,
            alerts,
            timeout,
        }
    }

    /// Arm a fire-and-forget timer for one session.
    pub fn watch(self: &Arc<Self>, session_id: Uuid) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.timeout).await;
            if let Err(e) = this.expire(session_id).await {
                error!(session_id = %session_id, error = %e, "Timeout check failed");
            }
        });
    }

    /// Reset every overdue `generating` session. Returns how many were reset.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let timeout =
            chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - timeout;
        let overdue = self.db.list_overdue_generating(cutoff).await?;

        let mut expired = 0;
        for session in overdue {
            match self.expire(session.id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => error!(session_id = %session.id, error = %e, "Timeout sweep failed"),
            }
        }
        if expired > 0 {
            info!(expired, "Timeout sweep reset overdue sessions");
        }
        Ok(expired)
    }

    /// Reset the session if it is still generating past its deadline.
    ///
    /// Returns `false` (and touches nothing) when the session moved on,
    /// was re-dispatched later, or another writer won the race.
    pub async fn expire(&self, session_id: Uuid) -> Result<bool, Error> {
        let Some(mut session) = self.db.get_session(session_id).await? else {
            return Ok(false);
        };
        if session.status != SessionStatus::Generating {
            debug!(session_id = %session_id, status = %session.status, "Session left generating");
            return Ok(false);
        }
        let overdue = session
            .generation_started_at
            .and_then(|started| (Utc::now() - started).to_std().ok())
            .is_none_or(|elapsed| elapsed >= self.timeout);
        if !overdue {
            return Ok(false);
        }

        let user = self.db.get_user(session.user_id).await?;
        let notice = user
            .as_ref()
            .map(|u| GenerationRequest::new(RequestType::TimeoutNotification, u, &session));

        session.reset();
        if !self.db.save_session(&session, SessionStatus::Generating).await? {
            debug!(session_id = %session_id, "Timeout lost the race to another writer");
            return Ok(false);
        }
        warn!(session_id = %session_id, chat_id = session.chat_id, "Generation timed out, session reset");

        if let Err(e) = self
            .gateway
            .send(&session.chat_id.to_string(), &prompts::generation_timeout())
            .await
        {
            error!(session_id = %session_id, error = %e, "Failed to send timeout notice");
        }

        let who = user
            .as_ref()
            .map(|u| u.summary())
            .unwrap_or_else(|| format!("chat {}", session.chat_id));
        alerts::raise(
            self.alerts.as_ref(),
            &format!(
                "⏰ Generation timeout\nUser: {who}\nSession: {session_id}\nWaited: {}s",
                self.timeout.as_secs()
            ),
        )
        .await;

        if let Some(notice) = notice {
            if let Err(e) = self.backend.submit(&notice).await {
                debug!(session_id = %session_id, error = %e, "Backend timeout notice not delivered");
            }
        }

        Ok(true)
    }
}

/// Run [`TimeoutSupervisor::sweep`] on a fixed interval. The first sweep
/// runs immediately to pick up sessions orphaned by a restart.
pub fn spawn_sweep(
    supervisor: Arc<TimeoutSupervisor>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = supervisor.sweep().await {
                error!(error = %e, "Timeout sweep failed");
            }
        }
    })
}
