use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postguard::config::Config;
use postguard::counters::CounterStore;
use postguard::crypto::PiiCipher;
use postguard::db::create_pool;
use postguard::disclosure::DisclosureService;
use postguard::moderation::ModerationService;
use postguard::reputation::{SpurClient, StopForumSpamClient};
use postguard::retention::RetentionEngine;
use postguard::routes::{
    approve_disclosure, ban_media, check_ban, check_submission, create_ban, create_report,
    health_check, issue_captcha, list_pending_disclosures, list_reports, queue_disclosure,
    record_decision, reject_disclosure, run_retention, verify_captcha,
};
use postguard::spam::{CaptchaService, SpamEngine};
use postguard::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postguard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Postguard...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    // Create database connection pool
    let pool = create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations complete");

    // Ephemeral counter store
    let counters = CounterStore::connect(&config.redis_url).await?;

    // PII custody
    let cipher = Arc::new(PiiCipher::new(
        &config.pii_encryption_key,
        config.pii_encryption_key_previous.as_deref(),
    ));

    // External reputation clients
    let sfs = Arc::new(StopForumSpamClient::new(config.sfs.clone())?);
    let spur = Arc::new(SpurClient::new(config.spur.clone())?);

    // Core services
    let engine = Arc::new(SpamEngine::new(
        counters.clone(),
        sfs.clone(),
        spur,
        config.spam.clone(),
    ));
    let captcha = CaptchaService::new(counters.clone(), config.captcha.clone());
    let disclosure = Arc::new(DisclosureService::new(pool.clone(), cipher.clone(), sfs));
    let retention = Arc::new(RetentionEngine::new(pool.clone(), &config.retention));
    let moderation = Arc::new(ModerationService::new(
        pool.clone(),
        cipher,
        config.ip_hash_pepper.clone(),
    ));

    // Scheduled retention sweeps; idempotent, so overlap with the manual
    // endpoint is harmless
    let scheduled = retention.clone();
    let interval_secs = config.retention.interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let results = scheduled.run_all().await;
            tracing::info!(?results, "Scheduled retention sweep finished");
        }
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    // Create app state
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        engine,
        captcha,
        disclosure,
        retention,
        moderation,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/check", post(check_submission))
        .route("/api/captcha", post(issue_captcha))
        .route("/api/captcha/verify", post(verify_captcha))
        .route("/api/disclosure", post(queue_disclosure))
        .route("/api/disclosure/pending", get(list_pending_disclosures))
        .route("/api/disclosure/:id/approve", post(approve_disclosure))
        .route("/api/disclosure/:id/reject", post(reject_disclosure))
        .route("/api/reports", post(create_report).get(list_reports))
        .route("/api/reports/:id/decision", post(record_decision))
        .route("/api/bans", post(create_ban))
        .route("/api/bans/check", get(check_ban))
        .route("/api/media-bans", post(ban_media))
        .route("/api/retention/run", post(run_retention))
        .layer(cors)
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
