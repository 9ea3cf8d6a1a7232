//! Event dispatch: routes incoming chat events to registration or the
//! post flow, one worker per chat so a user's events run in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::actions::CallbackAction;
use crate::channels::{ChatGateway, EventKind, EventStream, IncomingEvent};
use crate::error::Error;
use crate::onboarding::{RegistrationManager, RegistrationStage, User};
use crate::posting::{PostFlow, prompts};
use crate::store::Database;

/// Handles one event at a time; ordering is the caller's job.
pub struct Bot {
    db: Arc<dyn Database>,
    gateway: Arc<dyn ChatGateway>,
    registration: Arc<RegistrationManager>,
    flow: Arc<PostFlow>,
}

impl Bot {
    pub fn new(
        db: Arc<dyn Database>,
        gateway: Arc<dyn ChatGateway>,
        registration: Arc<RegistrationManager>,
        flow: Arc<PostFlow>,
    ) -> Self {
        Self {
            db,
            gateway,
            registration,
            flow,
        }
    }

    /// Process one event. Failures are logged and answered with a generic
    /// retry message; they never escape.
    pub async fn handle(&self, event: IncomingEvent) {
        let chat_id = event.chat_id();
        debug!(chat_id, kind = event.kind_label(), "Incoming event");

        if let Err(e) = self.db.touch_user(&event.from).await {
            error!(chat_id, error = %e, "Failed to record activity");
        }

        if let Err(e) = self.route(event).await {
            error!(chat_id, error = %e, "Event handling failed");
            if let Err(e) = self
                .gateway
                .send(&chat_id.to_string(), &prompts::try_again())
                .await
            {
                error!(chat_id, error = %e, "Failed to send error reply");
            }
        }
    }

    /// The bound user, if registration is complete.
    async fn registered_user(&self, chat_id: i64) -> Result<Option<User>, Error> {
        Ok(self
            .db
            .get_user_by_chat(chat_id)
            .await?
            .filter(|u| u.registration_stage == RegistrationStage::Completed))
    }

    async fn route(&self, event: IncomingEvent) -> Result<(), Error> {
        let chat_id = event.chat_id();
        let from = event.from;

        match event.kind {
            EventKind::Command { name, .. } => match name.as_str() {
                "start" => self.registration.handle_start(&from).await,
                other => {
                    debug!(chat_id, command = other, "Unknown command ignored");
                    Ok(())
                }
            },
            EventKind::Button { callback_id, data } => {
                if let Err(e) = self.gateway.acknowledge(&callback_id).await {
                    debug!(chat_id, error = %e, "Failed to acknowledge button");
                }
                let action = match data.parse::<CallbackAction>() {
                    Ok(action) => action,
                    Err(e) => {
                        debug!(chat_id, error = %e, "Unrecognised button ignored");
                        return Ok(());
                    }
                };
                match action {
                    CallbackAction::WritePost => self.flow.start(&from).await,
                    CallbackAction::AdminAdded => self.registration.handle_admin_added(&from).await,
                    action => match self.registered_user(chat_id).await? {
                        Some(user) => self.flow.handle_action(&user, chat_id, action).await,
                        None => self.registration.handle_start(&from).await,
                    },
                }
            }
            EventKind::Text(text) => {
                let user = self.db.get_user_by_chat(chat_id).await?;
                match user {
                    Some(user) if user.registration_stage == RegistrationStage::Completed => {
                        self.flow.handle_text(&user, chat_id, &text).await
                    }
                    user => self.registration.handle_text(user, &from, &text).await,
                }
            }
            EventKind::Voice { file_id, .. } => match self.registered_user(chat_id).await? {
                Some(user) => self.flow.handle_voice(&user, chat_id, &file_id).await,
                None => {
                    self.gateway
                        .send(&chat_id.to_string(), &prompts::voice_not_expected())
                        .await?;
                    Ok(())
                }
            },
        }
    }
}

/// How long a chat's worker may sit idle before it is dropped.
const WORKER_IDLE: Duration = Duration::from_secs(600);

/// Fan events out to per-chat workers. Returns when the stream ends or on Ctrl+C.
pub async fn run(bot: Arc<Bot>, events: EventStream) {
    run_with_idle(bot, events, WORKER_IDLE).await
}

struct Worker {
    tx: mpsc::UnboundedSender<IncomingEvent>,
    last_seen: Instant,
}

/// [`run`] with an explicit idle cutoff. Dropping a worker's sender lets it
/// finish what is queued and exit; the chat's next event spawns a new one.
pub async fn run_with_idle(bot: Arc<Bot>, mut events: EventStream, idle: Duration) {
    let mut workers: HashMap<i64, Worker> = HashMap::new();
    let mut prune = tokio::time::interval(idle);
    prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
                break;
            }
            _ = prune.tick() => {
                let before = workers.len();
                workers.retain(|_, w| !w.tx.is_closed() && w.last_seen.elapsed() < idle);
                if workers.len() < before {
                    debug!(dropped = before - workers.len(), live = workers.len(), "Pruned idle chat workers");
                }
                continue;
            }
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    info!("Event stream ended, shutting down...");
                    break;
                }
            },
        };

        let chat_id = event.chat_id();
        let now = Instant::now();
        let event = match workers.get_mut(&chat_id) {
            Some(worker) => match worker.tx.send(event) {
                Ok(()) => {
                    worker.last_seen = now;
                    continue;
                }
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let tx = spawn_worker(Arc::clone(&bot));
        // A fresh receiver cannot be closed yet.
        let _ = tx.send(event);
        workers.insert(chat_id, Worker { tx, last_seen: now });
    }
}

fn spawn_worker(bot: Arc<Bot>) -> mpsc::UnboundedSender<IncomingEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<IncomingEvent>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            bot.handle(event).await;
        }
    });
    tx
}
