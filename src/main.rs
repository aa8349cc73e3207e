use std::sync::{Arc, Mutex};
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use petcare_scheduler::config::AppConfig;
use petcare_scheduler::db;
use petcare_scheduler::handlers;
use petcare_scheduler::services::clock::SystemClock;
use petcare_scheduler::services::effects::{
    spawn_effect_worker, DeadLetters, EffectQueue, EffectWorker, RetryPolicy,
};
use petcare_scheduler::services::ids::IdGenerator;
use petcare_scheduler::services::notifications::SqliteNotificationSink;
use petcare_scheduler::services::payments::{
    HttpPaymentCollaborator, LoggingPaymentCollaborator, PaymentCollaborator,
};
use petcare_scheduler::services::scheduler::Scheduler;
use petcare_scheduler::state::AppState;

const DEAD_LETTER_CAPACITY: usize = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db_with_timeout(&config.database_url, config.busy_timeout_ms)?;
    let db = Arc::new(Mutex::new(conn));

    let payments: Arc<dyn PaymentCollaborator> = if config.payments_url.is_empty() {
        tracing::warn!("PAYMENTS_URL not set, service-completed signals will be logged only");
        Arc::new(LoggingPaymentCollaborator)
    } else {
        tracing::info!("using payments service at {}", config.payments_url);
        Arc::new(HttpPaymentCollaborator::new(
            config.payments_url.clone(),
            config.payments_api_key.clone(),
        ))
    };

    let dead_letters = DeadLetters::new(DEAD_LETTER_CAPACITY);
    let (effects, effect_rx) = EffectQueue::new(config.effect_queue_capacity, dead_letters.clone());
    let worker = EffectWorker::new(
        Arc::new(SqliteNotificationSink::new(db.clone())),
        payments,
        RetryPolicy {
            max_attempts: config.effect_max_attempts,
            backoff: Duration::from_millis(config.effect_retry_backoff_ms),
        },
        dead_letters.clone(),
    );
    spawn_effect_worker(worker, effect_rx);

    let ids = match config.id_seed {
        Some(seed) => {
            tracing::info!(seed, "using seeded id generator");
            IdGenerator::seeded(seed)
        }
        None => IdGenerator::from_entropy(),
    };

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        scheduler: Scheduler::new(config.scheduling.clone(), effects, Arc::new(SystemClock), ids),
        dead_letters,
    });

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
