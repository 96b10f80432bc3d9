//! Protected Transfer (C5) — moves cleaned records into the canonical job
//! store; refuses to overwrite a job whose analysis is complete.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::models::cleaned_scrape::CleanedScrape;
use crate::models::company::Company;
use crate::models::job::Job;
use crate::models::queue::Priority;
use crate::services::fuzzy;
use crate::services::queue_service::QueueRepository;
use crate::utils::{CoreError, CoreResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct TransferReport {
    pub created: u32,
    pub updated: u32,
    pub protected: u32,
    pub failed: u32,
}

pub struct TransferConfig {
    pub company_resolve_threshold: f64,
    pub title_threshold: f64,
    pub company_threshold: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { company_resolve_threshold: 0.92, title_threshold: 0.85, company_threshold: 0.90 }
    }
}

/// Per-cleaned_id advisory lock. Single-process only — the spec explicitly
/// scopes out distributed operation (§9), so an in-process keyed mutex is
/// sufficient to serialize two concurrent transfers of the same record (§5).
pub struct ProtectedTransfer {
    pool: SqlitePool,
    config: TransferConfig,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ProtectedTransfer {
    pub fn new(pool: SqlitePool, config: TransferConfig) -> Self {
        Self { pool, config, locks: Arc::new(DashMap::new()) }
    }

    fn lock_for(&self, cleaned_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(cleaned_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `transfer_to_jobs(batch_of_cleaned) → TransferReport` (§4.6).
    pub async fn transfer_to_jobs(&self, cleaned_records: &[CleanedScrape], queue: &QueueRepository) -> CoreResult<TransferReport> {
        let mut report = TransferReport::default();

        for cleaned in cleaned_records {
            let lock = self.lock_for(&cleaned.cleaned_id);
            let _guard = lock.lock().await;

            match self.transfer_one(cleaned, queue).await {
                Ok(outcome) => match outcome {
                    TransferOutcome::Created => report.created += 1,
                    TransferOutcome::Updated => report.updated += 1,
                    TransferOutcome::Protected => report.protected += 1,
                },
                Err(CoreError::AmbiguousMatch(reason)) => {
                    tracing::warn!(cleaned_id = %cleaned.cleaned_id, reason = %reason, "held for manual review: ambiguous company match");
                    report.failed += 1;
                },
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn transfer_one(&self, cleaned: &CleanedScrape, queue: &QueueRepository) -> CoreResult<TransferOutcome> {
        let company_id = self.resolve_company(cleaned).await?;

        let title = cleaned.job_title.as_deref().unwrap_or("");
        let company_name: String = sqlx::query_scalar("SELECT name FROM companies WHERE company_id = ?")
            .bind(&company_id)
            .fetch_one(&self.pool)
            .await?;

        if let Some(existing) = self.find_protected_match(title, &company_name).await? {
            self.touch_protected(&existing, cleaned).await?;
            tracing::info!(job_id = %existing.job_id, cleaned_id = %cleaned.cleaned_id, "protected job: identity fields untouched");
            return Ok(TransferOutcome::Protected);
        }

        let existing_unprotected = self.find_unprotected_by_external_id(cleaned).await?;
        match existing_unprotected {
            Some(existing) => {
                self.update_job(&existing.job_id, cleaned, &company_id).await?;
                Ok(TransferOutcome::Updated)
            },
            None => {
                let job_id = self.create_job(cleaned, &company_id).await?;
                queue.enqueue(&job_id, 1, Priority::Normal).await?;
                Ok(TransferOutcome::Created)
            },
        }
    }

    async fn resolve_company(&self, cleaned: &CleanedScrape) -> CoreResult<String> {
        let name = cleaned.company_name.as_deref().unwrap_or("").trim();

        if let Some(id) = sqlx::query_scalar::<_, String>("SELECT company_id FROM companies WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(id);
        }

        let all: Vec<Company> = sqlx::query_as("SELECT * FROM companies").fetch_all(&self.pool).await?;
        let mut scored: Vec<(f64, &Company)> =
            all.iter().map(|c| (fuzzy::similarity(&c.name, name), c)).filter(|(s, _)| *s >= self.config.company_resolve_threshold).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

        if scored.len() >= 2 && (scored[0].0 - scored[1].0).abs() < 1e-9 {
            return Err(CoreError::AmbiguousMatch(format!(
                "company resolution ambiguous for '{name}': {} and {} tie at {:.2}",
                scored[0].1.name, scored[1].1.name, scored[0].0
            )));
        }

        if let Some((_, company)) = scored.first() {
            return Ok(company.company_id.clone());
        }

        self.create_company(name).await
    }

    async fn create_company(&self, name: &str) -> CoreResult<String> {
        let company_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO companies (company_id, name, website, description, strategic_mission, strategic_values, recent_news, created_at, updated_at)
             VALUES (?,?,NULL,NULL,NULL,NULL,NULL,?,?)",
        )
        .bind(&company_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(company_id)
    }

    async fn find_protected_match(&self, title: &str, company_name: &str) -> CoreResult<Option<Job>> {
        let candidates: Vec<Job> = sqlx::query_as("SELECT * FROM jobs WHERE analysis_completed = TRUE").fetch_all(&self.pool).await?;
        Ok(candidates
            .into_iter()
            .find(|j| fuzzy::same_job(title, company_name, &j.job_title, &j.company_name, self.config.title_threshold, self.config.company_threshold)))
    }

    /// Updates only {last_seen_at, is_expired} on a protected job — identity
    /// and description fields are never touched (§4.6 invariant).
    async fn touch_protected(&self, existing: &Job, cleaned: &CleanedScrape) -> CoreResult<()> {
        sqlx::query("UPDATE jobs SET last_seen_at = ?, is_expired = ? WHERE job_id = ?")
            .bind(Utc::now())
            .bind(cleaned.is_expired)
            .bind(&existing.job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_unprotected_by_external_id(&self, cleaned: &CleanedScrape) -> CoreResult<Option<Job>> {
        if let Some(ext_id) = &cleaned.external_job_id {
            return Ok(sqlx::query_as("SELECT * FROM jobs WHERE external_job_id = ? AND source = ? AND analysis_completed = FALSE")
                .bind(ext_id)
                .bind(&cleaned.source)
                .fetch_optional(&self.pool)
                .await?);
        }
        Ok(None)
    }

    async fn update_job(&self, job_id: &str, cleaned: &CleanedScrape, company_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET company_id = ?, job_title = ?, company_name = ?, location = ?, work_arrangement = ?,
             salary = ?, description = ?, requirements = ?, benefits = ?, industry = ?, job_type = ?,
             experience_level = ?, posting_date = ?, application_deadline = ?, application_url = ?,
             application_email = ?, is_expired = ?, updated_at = ?, last_seen_at = ? WHERE job_id = ?",
        )
        .bind(company_id)
        .bind(&cleaned.job_title)
        .bind(&cleaned.company_name)
        .bind(&cleaned.location)
        .bind(&cleaned.work_arrangement)
        .bind(&cleaned.salary)
        .bind(&cleaned.description)
        .bind(&cleaned.requirements)
        .bind(&cleaned.benefits)
        .bind(&cleaned.industry)
        .bind(&cleaned.job_type)
        .bind(&cleaned.experience_level)
        .bind(cleaned.posting_date)
        .bind(cleaned.application_deadline)
        .bind(&cleaned.application_url)
        .bind(&cleaned.application_email)
        .bind(cleaned.is_expired)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_job(&self, cleaned: &CleanedScrape, company_id: &str) -> CoreResult<String> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO jobs (job_id, company_id, external_job_id, source, job_title, company_name, location,
             work_arrangement, salary, description, requirements, benefits, industry, job_type, experience_level,
             posting_date, application_deadline, application_url, application_email, is_expired, analysis_completed,
             analysis_state, created_at, updated_at, last_seen_at)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&job_id)
        .bind(company_id)
        .bind(&cleaned.external_job_id)
        .bind(&cleaned.source)
        .bind(&cleaned.job_title)
        .bind(&cleaned.company_name)
        .bind(&cleaned.location)
        .bind(&cleaned.work_arrangement)
        .bind(&cleaned.salary)
        .bind(&cleaned.description)
        .bind(&cleaned.requirements)
        .bind(&cleaned.benefits)
        .bind(&cleaned.industry)
        .bind(&cleaned.job_type)
        .bind(&cleaned.experience_level)
        .bind(cleaned.posting_date)
        .bind(cleaned.application_deadline)
        .bind(&cleaned.application_url)
        .bind(&cleaned.application_email)
        .bind(cleaned.is_expired)
        .bind(false)
        .bind("unanalyzed")
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(job_id)
    }
}

enum TransferOutcome {
    Created,
    Updated,
    Protected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cleaned_scrape::{Location, Salary, WorkArrangement};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE companies (
                company_id TEXT PRIMARY KEY, name TEXT NOT NULL, website TEXT, description TEXT,
                strategic_mission TEXT, strategic_values TEXT, recent_news TEXT,
                created_at TEXT NOT NULL, updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE jobs (
                job_id TEXT PRIMARY KEY, company_id TEXT NOT NULL, external_job_id TEXT, source TEXT NOT NULL,
                job_title TEXT NOT NULL, company_name TEXT NOT NULL, location TEXT NOT NULL,
                work_arrangement TEXT NOT NULL, salary TEXT NOT NULL, description TEXT, requirements TEXT,
                benefits TEXT, industry TEXT, job_type TEXT, experience_level TEXT, posting_date TEXT,
                application_deadline TEXT, application_url TEXT, application_email TEXT,
                is_expired BOOLEAN NOT NULL, analysis_completed BOOLEAN NOT NULL, analysis_state TEXT NOT NULL,
                created_at TEXT NOT NULL, updated_at TEXT NOT NULL, last_seen_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
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

    fn cleaned(source_raw: &str, title: &str, company: &str, ext_id: Option<&str>) -> CleanedScrape {
        CleanedScrape {
            cleaned_id: uuid::Uuid::new_v4().to_string(),
            source: "acme-feed".into(),
            external_job_id: ext_id.map(str::to_string),
            job_title: Some(title.into()),
            company_name: Some(company.into()),
            location: sqlx::types::Json(Location::default()),
            work_arrangement: WorkArrangement::Remote.as_str().to_string(),
            salary: sqlx::types::Json(Salary::default()),
            description: Some("A reasonably long description of the role and its duties.".into()),
            requirements: None,
            benefits: None,
            industry: None,
            job_type: None,
            experience_level: None,
            posting_date: None,
            application_deadline: None,
            application_url: None,
            application_email: None,
            is_expired: false,
            duplicates_count: 1,
            confidence_score: 0.8,
            provenance_raw_ids: source_raw.into(),
            cleaned_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn new_cleaned_record_creates_job_and_enqueues_tier1() {
        let pool = test_pool().await;
        let transfer = ProtectedTransfer::new(pool.clone(), TransferConfig::default());
        let queue = QueueRepository::new(pool.clone());

        let report = transfer.transfer_to_jobs(&[cleaned("raw-1", "Software Engineer", "Acme Inc", Some("ext-1"))], &queue).await.unwrap();

        assert_eq!(report.created, 1);
        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs").fetch_one(&pool).await.unwrap();
        assert_eq!(job_count, 1);
        let queue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_queue WHERE tier_target = 1").fetch_one(&pool).await.unwrap();
        assert_eq!(queue_count, 1);
    }

    #[tokio::test]
    async fn completed_job_is_protected_from_identity_overwrite() {
        let pool = test_pool().await;
        let transfer = ProtectedTransfer::new(pool.clone(), TransferConfig::default());
        let queue = QueueRepository::new(pool.clone());

        transfer.transfer_to_jobs(&[cleaned("raw-1", "Software Engineer", "Acme Inc", Some("ext-1"))], &queue).await.unwrap();
        let job_id: String = sqlx::query_scalar("SELECT job_id FROM jobs LIMIT 1").fetch_one(&pool).await.unwrap();
        sqlx::query("UPDATE jobs SET analysis_completed = TRUE, description = 'original description' WHERE job_id = ?")
            .bind(&job_id)
            .execute(&pool)
            .await
            .unwrap();

        let report =
            transfer.transfer_to_jobs(&[cleaned("raw-2", "Software Engineer II", "Acme, Inc.", Some("ext-1"))], &queue).await.unwrap();

        assert_eq!(report.protected, 1);
        let description: String = sqlx::query_scalar("SELECT description FROM jobs WHERE job_id = ?").bind(&job_id).fetch_one(&pool).await.unwrap();
        assert_eq!(description, "original description");
    }

    #[tokio::test]
    async fn ambiguous_company_match_is_held_for_review() {
        let pool = test_pool().await;
        let now = Utc::now();
        // Two candidates of equal length differing only in a trailing
        // word of equal length to the query's prefix — jaro_winkler and
        // normalized_levenshtein score both identically by construction,
        // forcing the tie that makes resolution ambiguous.
        for (id, name) in [("c1", "Zebra Dynamics Corporation Omega"), ("c2", "Zebra Dynamics Corporation Sigma")] {
            sqlx::query("INSERT INTO companies VALUES (?,?,?,?,?,?,?,?,?)")
                .bind(id)
                .bind(name)
                .bind(Option::<String>::None)
                .bind(Option::<String>::None)
                .bind(Option::<String>::None)
                .bind(Option::<String>::None)
                .bind(Option::<String>::None)
                .bind(now)
                .bind(now)
                .execute(&pool)
                .await
                .unwrap();
        }

        let transfer = ProtectedTransfer::new(pool.clone(), TransferConfig::default());
        let queue = QueueRepository::new(pool.clone());
        let report =
            transfer.transfer_to_jobs(&[cleaned("raw-1", "Software Engineer", "Zebra Dynamics Corporation", None)], &queue).await.unwrap();

        assert_eq!(report.failed, 1);
        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs").fetch_one(&pool).await.unwrap();
        assert_eq!(job_count, 0);
    }
}
