use std::sync::Arc;

use axum::http::header;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dental_admin::{
    config::Config,
    db,
    events::EventBus,
    models::AppState,
    routes,
    store::{memory::MemoryStore, pg::PgStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => {
            let pool = db::connect_pg(url, cfg.db_max_connections).await?;
            db::run_migrations(&pool).await?;
            tracing::info!(max_connections = cfg.db_max_connections, "connected to postgres");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    let events = EventBus::new();
    let _event_log = events.subscribe(|event| {
        tracing::info!(?event, "domain event");
    });

    let state = AppState::new(store, events, cfg.clinic_offset);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(clinic_offset = %cfg.clinic_offset, "Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
