use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

const SCHEMA: [&str; 2] = [
    r#"CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        room_id TEXT NOT NULL,
        username TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )"#,
    // newest-first history scans per room
    "CREATE INDEX IF NOT EXISTS messages_room_created ON messages (room_id, created_at, seq)",
];

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;

    migrate(&db_pool).await?;
    info!(database_url, "message store ready");
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

/// Single-connection in-memory pool; every connection to `sqlite::memory:`
/// would otherwise get its own empty database.
pub async fn memory() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}
