use crate::core::experience::{ExpRecord, ExpStore, ExperienceError, RankContext};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// SQLite-backed ledger storage. One `users` table, one integer total per
/// user, schema created lazily on first use.
pub struct SqliteExpStore {
    pool: Pool<Sqlite>,
}

impl SqliteExpStore {
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_path.trim_start_matches("sqlite://");
        if !database_path.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else {
            format!("sqlite://{}", database_path)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                exp INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ExpStore for SqliteExpStore {
    async fn add_exp(&self, user_id: u64, amount: u64) -> Result<u64, ExperienceError> {
        // Upsert and increment in one statement. Concurrent grants for the
        // same user serialize on this row instead of racing a read-then-write.
        let row = sqlx::query(
            r#"
            INSERT INTO users (user_id, exp)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
            exp = exp + excluded.exp
            RETURNING exp
            "#,
        )
        .bind(user_id as i64)
        .bind(amount as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ExperienceError::Storage(e.to_string()))?;

        let total = row.get::<i64, _>(0) as u64;
        Ok(total.saturating_sub(amount))
    }

    async fn get_exp(&self, user_id: u64) -> Result<u64, ExperienceError> {
        let result = sqlx::query("SELECT exp FROM users WHERE user_id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExperienceError::Storage(e.to_string()))?;

        Ok(result.map(|row| row.get::<i64, _>(0) as u64).unwrap_or(0))
    }

    async fn rank_context(&self, user_id: u64) -> Result<RankContext, ExperienceError> {
        let exp = self.get_exp(user_id).await?;

        let below = sqlx::query("SELECT COUNT(*) FROM users WHERE exp < ?")
            .bind(exp as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ExperienceError::Storage(e.to_string()))?
            .get::<i64, _>(0) as u64;

        let population = sqlx::query("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ExperienceError::Storage(e.to_string()))?
            .get::<i64, _>(0) as u64;

        Ok(RankContext {
            exp,
            below,
            population,
        })
    }

    async fn top(&self, limit: u32) -> Result<Vec<ExpRecord>, ExperienceError> {
        let rows = sqlx::query(
            "SELECT user_id, exp FROM users ORDER BY exp DESC, user_id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ExperienceError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ExpRecord {
                user_id: row.get::<i64, _>("user_id") as u64,
                exp: row.get::<i64, _>("exp") as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqliteExpStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp_system.db");
        let store = SqliteExpStore::new(path.to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_returns_the_previous_total() {
        let (_dir, store) = temp_store().await;

        assert_eq!(store.add_exp(1, 5).await.unwrap(), 0);
        assert_eq!(store.add_exp(1, 3).await.unwrap(), 5);
        assert_eq!(store.get_exp(1).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn missing_user_reads_as_zero() {
        let (_dir, store) = temp_store().await;
        assert_eq!(store.get_exp(404).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rank_context_counts_strictly_lower_records() {
        let (_dir, store) = temp_store().await;
        store.add_exp(1, 50).await.unwrap();
        store.add_exp(2, 10).await.unwrap();
        store.add_exp(3, 30).await.unwrap();

        let ctx = store.rank_context(3).await.unwrap();
        assert_eq!(ctx.exp, 30);
        assert_eq!(ctx.below, 1);
        assert_eq!(ctx.population, 3);

        // Absent user: nothing below zero, so rank resolves to last place.
        let ctx = store.rank_context(99).await.unwrap();
        assert_eq!(ctx.exp, 0);
        assert_eq!(ctx.below, 0);
        assert_eq!(ctx.population, 3);
    }

    #[tokio::test]
    async fn top_orders_descending_with_id_tiebreak() {
        let (_dir, store) = temp_store().await;
        store.add_exp(1, 50).await.unwrap();
        store.add_exp(2, 10).await.unwrap();
        store.add_exp(3, 30).await.unwrap();
        store.add_exp(4, 5).await.unwrap();
        store.add_exp(9, 30).await.unwrap();

        let top = store.top(4).await.unwrap();
        let order: Vec<(u64, u64)> = top.iter().map(|r| (r.user_id, r.exp)).collect();
        assert_eq!(order, vec![(1, 50), (3, 30), (9, 30), (2, 10)]);
    }

    #[tokio::test]
    async fn schema_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp_system.db");

        {
            let store = SqliteExpStore::new(path.to_str().unwrap()).await.unwrap();
            store.add_exp(7, 12).await.unwrap();
        }

        let store = SqliteExpStore::new(path.to_str().unwrap()).await.unwrap();
        assert_eq!(store.get_exp(7).await.unwrap(), 12);
    }
}
