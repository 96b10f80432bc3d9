//! Analysis Queue (C7) — durable table-backed priority queue so restarts
//! don't lose in-flight analysis work.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::models::queue::{AnalysisQueueEntry, DispatchOutcome, Priority};
use crate::utils::CoreResult;

/// Attempts at which a retryable failure becomes permanent (§4.7/§7).
pub const MAX_ATTEMPTS: i32 = 5;

pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `enqueue(job_id, tier, priority)` — idempotent per (job_id, tier)
    /// while a non-terminal entry exists (§4.7).
    pub async fn enqueue(&self, job_id: &str, tier: i32, priority: Priority) -> CoreResult<()> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM analysis_queue WHERE job_id = ? AND tier_target = ? AND state IN ('pending','in_flight')",
        )
        .bind(job_id)
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO analysis_queue (job_id, priority, tier_target, state, attempts, last_error, not_before, lease_deadline, created_at)
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(job_id)
        .bind(priority.as_str())
        .bind(tier)
        .bind("pending")
        .bind(0i32)
        .bind(Option::<String>::None)
        .bind(now)
        .bind(Option::<DateTime<Utc>>::None)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id, tier, priority = priority.as_str(), "enqueued analysis tier");
        Ok(())
    }

    /// `lease(n, now) → [entries]` (§4.7). Single transaction claims the
    /// oldest-ordered matches and transitions them to in_flight so two
    /// workers never double-lease (§5).
    pub async fn lease(&self, n: i64, now: DateTime<Utc>, lease_duration: Duration) -> CoreResult<Vec<AnalysisQueueEntry>> {
        let mut tx = self.pool.begin().await?;

        let candidates: Vec<AnalysisQueueEntry> = sqlx::query_as(
            "SELECT * FROM analysis_queue WHERE state = 'pending' AND not_before <= ?
             ORDER BY
                CASE priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC,
                not_before ASC, created_at ASC
             LIMIT ?",
        )
        .bind(now)
        .bind(n)
        .fetch_all(&mut *tx)
        .await?;

        let deadline = now + lease_duration;
        for entry in &candidates {
            sqlx::query("UPDATE analysis_queue SET state = 'in_flight', lease_deadline = ? WHERE id = ?")
                .bind(deadline)
                .bind(entry.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(candidates
            .into_iter()
            .map(|mut e| {
                e.state = "in_flight".to_string();
                e.lease_deadline = Some(deadline);
                e
            })
            .collect())
    }

    /// `complete(entry, outcome)` (§4.7/§7). Retryable failures reset to
    /// pending with backoff; permanent at attempts ≥ `MAX_ATTEMPTS`.
    pub async fn complete(&self, entry_id: i64, outcome: DispatchOutcome) -> CoreResult<()> {
        match outcome {
            DispatchOutcome::Done => {
                sqlx::query("DELETE FROM analysis_queue WHERE id = ?").bind(entry_id).execute(&self.pool).await?;
            },
            DispatchOutcome::RetryableFailure { reason, backoff } => {
                let attempts: i32 =
                    sqlx::query_scalar("SELECT attempts FROM analysis_queue WHERE id = ?").bind(entry_id).fetch_one(&self.pool).await?;
                let next_attempts = attempts + 1;
                if next_attempts >= MAX_ATTEMPTS {
                    sqlx::query("UPDATE analysis_queue SET state = 'failed', attempts = ?, last_error = ? WHERE id = ?")
                        .bind(next_attempts)
                        .bind(&reason)
                        .bind(entry_id)
                        .execute(&self.pool)
                        .await?;
                } else {
                    let not_before = Utc::now() + Duration::from_std(backoff).unwrap_or(Duration::seconds(30));
                    sqlx::query(
                        "UPDATE analysis_queue SET state = 'pending', attempts = ?, last_error = ?, not_before = ?, lease_deadline = NULL WHERE id = ?",
                    )
                    .bind(next_attempts)
                    .bind(&reason)
                    .bind(not_before)
                    .bind(entry_id)
                    .execute(&self.pool)
                    .await?;
                }
            },
            DispatchOutcome::PermanentFailure { reason } => {
                sqlx::query("UPDATE analysis_queue SET state = 'failed', last_error = ? WHERE id = ?")
                    .bind(&reason)
                    .bind(entry_id)
                    .execute(&self.pool)
                    .await?;
            },
        }
        Ok(())
    }

    /// `expire_leases(now)` — in_flight entries past their lease deadline
    /// go back to pending (§4.7).
    pub async fn expire_leases(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE analysis_queue SET state = 'pending', lease_deadline = NULL
             WHERE state = 'in_flight' AND lease_deadline < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Holds a not-before date for a job re-requeued after budget
    /// exhaustion (§8 scenario 6): next UTC midnight.
    pub async fn postpone_to(&self, entry_id: i64, not_before: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE analysis_queue SET state = 'pending', not_before = ?, lease_deadline = NULL WHERE id = ?")
            .bind(not_before)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE analysis_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, priority TEXT NOT NULL,
                tier_target INTEGER NOT NULL, state TEXT NOT NULL, attempts INTEGER NOT NULL,
                last_error TEXT, not_before TEXT NOT NULL, lease_deadline TEXT, created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_job_tier() {
        let pool = test_pool().await;
        let repo = QueueRepository::new(pool.clone());
        repo.enqueue("job-1", 1, Priority::Normal).await.unwrap();
        repo.enqueue("job-1", 1, Priority::Normal).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_queue").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn lease_claims_and_hides_from_second_worker() {
        let pool = test_pool().await;
        let repo = QueueRepository::new(pool.clone());
        repo.enqueue("job-1", 1, Priority::High).await.unwrap();

        let leased = repo.lease(10, Utc::now(), Duration::minutes(5)).await.unwrap();
        assert_eq!(leased.len(), 1);

        let leased_again = repo.lease(10, Utc::now(), Duration::minutes(5)).await.unwrap();
        assert!(leased_again.is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_reaching_max_attempts_becomes_permanent() {
        let pool = test_pool().await;
        let repo = QueueRepository::new(pool.clone());
        repo.enqueue("job-1", 1, Priority::Normal).await.unwrap();
        let entry = repo.lease(1, Utc::now(), Duration::minutes(5)).await.unwrap().remove(0);

        for _ in 0..MAX_ATTEMPTS {
            repo.complete(entry.id, DispatchOutcome::RetryableFailure { reason: "timeout".into(), backoff: std::time::Duration::from_secs(1) })
                .await
                .unwrap();
        }

        let state: String = sqlx::query_scalar("SELECT state FROM analysis_queue WHERE id = ?").bind(entry.id).fetch_one(&pool).await.unwrap();
        assert_eq!(state, "failed");
    }

    #[tokio::test]
    async fn expired_leases_return_to_pending() {
        let pool = test_pool().await;
        let repo = QueueRepository::new(pool.clone());
        repo.enqueue("job-1", 1, Priority::Normal).await.unwrap();
        repo.lease(1, Utc::now(), Duration::seconds(-1)).await.unwrap();

        let expired = repo.expire_leases(Utc::now()).await.unwrap();
        assert_eq!(expired, 1);
    }
}
