use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scamwatch_api::{router, AppState};
use scamwatch_common::Config;
use scamwatch_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new("scamwatch_api=info,scamwatch_store=info,tower_http=info")
    })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = Config::api_from_env()?;
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
        max_attempts: config.max_processing_attempts,
    });
    let app = router(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Scamwatch API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
