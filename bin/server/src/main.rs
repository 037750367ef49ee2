use coursehub_catalog::{
    ChannelQueue, SideEffectDispatcher, SideEffectQueue, TemplateRenderer,
};
use coursehub_platform_access::{KeyValueCache, MemoryCache, TokenCodec};
use coursehub_server::{
    app::build_router,
    cache::RedisCache,
    config::ServerConfig,
    db::{CourseRepository, NotificationRepository, OrderRepository, UserRepository},
    mail::ResendMailer,
    payment::StripeClient,
    queue::NatsQueue,
    state::{AppState, Backends},
    video::VdoCipherClient,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let cache: Arc<dyn KeyValueCache> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(url)
                .await
                .expect("failed to connect to redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-process cache (single instance only)");
            Arc::new(MemoryCache::new())
        }
    };

    let http = reqwest::Client::new();
    let mailer = Arc::new(ResendMailer::new(
        http.clone(),
        &config.mail,
        TemplateRenderer::default(),
    ));
    let notifications = Arc::new(NotificationRepository::new(db_pool.clone()));
    let dispatcher = Arc::new(SideEffectDispatcher::new(mailer, notifications.clone()));
    let policy = config.side_effects.retry_policy();

    let (side_effects, worker): (Arc<dyn SideEffectQueue>, JoinHandle<()>) =
        match &config.side_effects.nats_url {
            Some(url) => {
                let queue = NatsQueue::connect(url, &config.side_effects)
                    .await
                    .expect("failed to set up side effect stream");
                let worker = queue
                    .spawn_worker(dispatcher, policy)
                    .await
                    .expect("failed to start side effect consumer");
                (Arc::new(queue), worker)
            }
            None => {
                tracing::warn!("NATS not configured, side effects run in-process");
                let (queue, worker) = ChannelQueue::spawn_with_capacity(
                    dispatcher,
                    policy,
                    config.side_effects.queue_capacity,
                );
                (Arc::new(queue), worker)
            }
        };

    let backends = Backends {
        cache,
        users: Arc::new(UserRepository::new(db_pool.clone())),
        courses: Arc::new(CourseRepository::new(db_pool.clone())),
        orders: Arc::new(OrderRepository::new(db_pool.clone())),
        notifications,
        payments: Arc::new(StripeClient::new(http.clone(), &config.payment)),
        side_effects,
        video: Arc::new(VdoCipherClient::new(http, &config.video)),
    };

    // Create application state
    let codec = TokenCodec::new(&config.tokens).expect("invalid token configuration");
    let app_state = Arc::new(AppState::new(
        backends,
        codec,
        config.cache.course_ttl(),
        config.payment.clone(),
        config.cookies.clone(),
    ));

    let app = build_router(app_state, &config.cors_origins, config.rate_limit.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    worker.abort();
    tracing::info!("server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
