//! Event log (§6) — append-only persistence for the typed events other
//! services raise. A thin insert-only repository; readers query
//! `event_log` directly by `event_type`/`occurred_at` rather than through
//! this type.

use sqlx::SqlitePool;

use crate::models::event::{Event, EventRecord};
use crate::utils::CoreResult;

pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends `event` to the log, serialized as JSON under its own
    /// discriminator (§6).
    pub async fn record(&self, event: &impl Event) -> CoreResult<EventRecord> {
        let record = EventRecord {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event.event_type().as_str().to_string(),
            payload: sqlx::types::Json(serde_json::to_value(event)?),
            occurred_at: chrono::Utc::now(),
        };

        sqlx::query("INSERT INTO event_log (event_id, event_type, payload, occurred_at) VALUES (?,?,?,?)")
            .bind(&record.event_id)
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.occurred_at)
            .execute(&self.pool)
            .await?;

        tracing::debug!(event_id = %record.event_id, event_type = %record.event_type, "recorded event");
        Ok(record)
    }

    pub async fn recent(&self, event_type: &str, limit: i64) -> CoreResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM event_log WHERE event_type = ? ORDER BY occurred_at DESC LIMIT ?",
        )
        .bind(event_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::TierCompleted;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE event_log (
                event_id TEXT PRIMARY KEY, event_type TEXT NOT NULL, payload TEXT NOT NULL, occurred_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn records_and_reads_back_an_event() {
        let pool = test_pool().await;
        let repo = EventRepository::new(pool);
        let event = TierCompleted { job_id: "job-1".into(), tier: 1, model_used: "standard".into(), tokens_used: 500, response_time_ms: 1200 };
        repo.record(&event).await.unwrap();

        let rows = repo.recent("tier_completed", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload.0["job_id"], "job-1");
    }

    #[tokio::test]
    async fn recent_filters_by_event_type() {
        let pool = test_pool().await;
        let repo = EventRepository::new(pool);
        repo.record(&TierCompleted { job_id: "job-1".into(), tier: 1, model_used: "standard".into(), tokens_used: 500, response_time_ms: 1200 }).await.unwrap();
        repo.record(&crate::models::event::BudgetExceeded { scope: "daily".into(), limit_usd: 10.0, spent_usd: 11.0 }).await.unwrap();

        let rows = repo.recent("budget_exceeded", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
