use anyhow::Context;
use stewdy::{AppState, app, config::Config, db, rooms::{RoomGateway, SqliteMessageStore}};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let db_pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("opening message store at {}", config.database_url))?;

    let gateway = RoomGateway::new(SqliteMessageStore::new(db_pool.clone()), config.history_limit);
    let app_state = AppState {
        db_pool,
        gateway,
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
