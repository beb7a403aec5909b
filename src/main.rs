use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use laptop_checkout::{
    AppState,
    config::Config,
    jobs::{EmailProcessor, EmailService, OverdueSweep, RedisTaskQueue, RetryPolicy, TaskQueue},
    lifecycle::{AssetLifecycleManager, Clock, Datastore, SystemClock, postgres::PgStore},
    middleware::RateLimiter,
    router,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = Arc::new(Config::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'laptop_checkout';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let redis = Arc::new(redis_client.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn Datastore> = Arc::new(PgStore::new(pool.clone()));

    let queue = Arc::new(RedisTaskQueue::new(redis_client, RetryPolicy::from_config(&config)));
    queue.recover_orphans().await?;
    let tasks: Arc<dyn TaskQueue> = queue.clone();

    let mailer = Arc::new(EmailService::new(&config)?);
    let processor = Arc::new(EmailProcessor::new(store.clone(), mailer, clock.clone()));
    tokio::spawn(queue.run(processor, config.email_queue_poll()));

    let sweep = Arc::new(OverdueSweep::new(
        store.clone(),
        tasks.clone(),
        clock.clone(),
        config.overdue_threshold_minutes,
    ));
    sweep.clone().spawn(config.overdue_sweep_interval());

    let lifecycle = Arc::new(AssetLifecycleManager::new(
        store.clone(),
        tasks.clone(),
        clock,
        config.admin_email.clone(),
    ));

    let state = AppState {
        pool,
        config: config.clone(),
        store,
        tasks,
        lifecycle,
        sweep,
    };

    let limiter = Arc::new(RateLimiter::new(redis, &config));
    let app = router::build(state, Some(limiter)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config)),
    );

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    #[cfg(debug_assertions)]
    if origins.is_empty() {
        tracing::debug!("No CORS origins configured, allowing any origin in debug mode");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
