mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tasklane_api::{AppStateInner, router};
use tasklane_db::Database;
use tasklane_jobs::{ExpirySweep, ReminderDispatcher, Scheduler, SchedulerHandle};
use tasklane_push::{VapidSigner, WebPushClient};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane=debug,tasklane_jobs=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);

    let mut jobs: Vec<SchedulerHandle> = Vec::new();
    jobs.push(Scheduler::new(ExpirySweep::new(db.clone()), config.sweep_interval).start());

    let vapid_public_key = match &config.vapid {
        Some(vapid) => {
            let signer = VapidSigner::with_public_key(&vapid.private_key, &vapid.public_key, vapid.subject.clone())?;
            let client = WebPushClient::new(signer, config.push_ttl_secs, config.reminder.delivery_timeout)?;
            let public_key = client.public_key().to_string();

            let dispatcher = ReminderDispatcher::new(db.clone(), client, config.reminder.clone());
            jobs.push(Scheduler::new(dispatcher, config.reminder_interval).start());
            info!(
                "Reminders: {:?} mode, {}h lookahead",
                config.reminder.mode,
                config.reminder.lookahead.num_hours()
            );
            Some(public_key)
        }
        None => {
            warn!("VAPID_PUBLIC_KEY / VAPID_PRIVATE_KEY not set, reminder notifications disabled");
            None
        }
    };

    let app = router(Arc::new(AppStateInner { db, vapid_public_key }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tasklane server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for job in jobs {
        info!("Stopping {}", job.name());
        job.stop().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
