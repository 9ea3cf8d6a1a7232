use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use post_assist::alerts::{AlertSink, LogAlerter, TelegramAlerter};
use post_assist::channels::{ChatGateway, TelegramGateway};
use post_assist::config::AppConfig;
use post_assist::dispatch::{self, Bot};
use post_assist::generation::{GenerationBackend, N8nClient};
use post_assist::onboarding::{AdminVerifier, RegistrationManager, User};
use post_assist::posting::{FlowDeps, PostFlow, spawn_sweep};
use post_assist::routes::{AppState, app_routes};
use post_assist::store::{Database, LibSqlBackend};
use post_assist::transcribe::{Transcriber, WhisperTranscriber};

/// Log to stderr, and to a daily file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "post-assist.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("loading configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    // `post-assist add-user <email>` provisions an account and exits.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, email] = args.as_slice() {
        if command == "add-user" {
            let user = User::new(email.as_str());
            db.insert_user(&user).await.context("adding user")?;
            eprintln!("Added user {} ({})", user.email, user.id);
            return Ok(());
        }
    }

    eprintln!("📝 Post Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Callback: http://0.0.0.0:{}/webhook/n8n", config.http_port);

    // ── Collaborators ────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramGateway::new(config.telegram_bot_token.clone()));
    let gateway: Arc<dyn ChatGateway> = telegram.clone();

    let alerts: Arc<dyn AlertSink> = match config.alerts.clone() {
        Some(alert_config) => {
            eprintln!("   Alerts: admin chat {}", alert_config.chat_id);
            Arc::new(TelegramAlerter::new(alert_config))
        }
        None => {
            eprintln!("   Alerts: log only");
            Arc::new(LogAlerter)
        }
    };

    if config.n8n_webhook_url.is_none() {
        tracing::warn!("N8N_WEBHOOK_URL is not set; post generation will fail");
    }
    let backend: Arc<dyn GenerationBackend> = Arc::new(N8nClient::new(config.n8n_webhook_url.clone()));

    let transcriber: Option<Arc<dyn Transcriber>> = config.transcription.clone().map(|t| {
        eprintln!("   Voice: enabled ({})", t.language);
        Arc::new(WhisperTranscriber::new(t)) as Arc<dyn Transcriber>
    });

    eprintln!(
        "   Flow: {} questions, links {}, buttons {}, timeout {}s\n",
        config.flow.question_count,
        if config.flow.collect_links { "on" } else { "off" },
        if config.flow.button_flow { "on" } else { "off" },
        config.flow.generation_timeout.as_secs(),
    );

    // ── Flows ────────────────────────────────────────────────────────────
    let verifier = Arc::new(AdminVerifier::new(Arc::clone(&db), Arc::clone(&gateway)));
    let registration = Arc::new(RegistrationManager::new(
        Arc::clone(&db),
        Arc::clone(&gateway),
        Arc::clone(&verifier),
    ));
    let flow = Arc::new(PostFlow::new(FlowDeps {
        db: Arc::clone(&db),
        gateway: Arc::clone(&gateway),
        backend,
        alerts,
        verifier,
        transcriber,
        config: config.flow.clone(),
    }));

    let _sweep_handle = spawn_sweep(flow.supervisor(), config.flow.sweep_interval);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = app_routes(AppState {
        flow: Arc::clone(&flow),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("binding port {}", config.http_port))?;
    tokio::spawn(async move {
        tracing::info!("HTTP server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    // ── Chat events ──────────────────────────────────────────────────────
    let bot = Arc::new(Bot::new(db, gateway, registration, flow));
    dispatch::run(bot, telegram.start()).await;

    Ok(())
}
