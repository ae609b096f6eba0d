use axum::{Json, debug_handler, extract::State};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::AppResult;

#[derive(Debug, Serialize)]
pub struct Health {
    success: bool,
    message: &'static str,
}

#[debug_handler(state = crate::AppState)]
pub async fn index(State(db_pool): State<SqlitePool>) -> AppResult<Json<Health>> {
    sqlx::query("SELECT 1").execute(&db_pool).await?;

    Ok(Json(Health {
        success: true,
        message: "Study room realtime server is running",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn reports_healthy_store() {
        let Json(health) = index(State(db::memory().await.unwrap())).await.unwrap();
        assert!(health.success);
    }

    #[tokio::test]
    async fn closed_pool_is_an_error() {
        let db_pool = db::memory().await.unwrap();
        db_pool.close().await;
        assert!(index(State(db_pool)).await.is_err());
    }
}
