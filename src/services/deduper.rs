//! Deduper (C3) — `upsert_cleaned` merges a freshly cleaned record into an
//! existing one describing the same job, or creates a new one.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::cleaned_scrape::{CleanedFields, CleanedScrape};
use crate::services::{confidence, fuzzy};
use crate::utils::CoreResult;

/// Recency window searched for fuzzy matches when no external_job_id hit
/// is found (§4.5 default).
pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 60;

pub struct DeduperConfig {
    pub title_threshold: f64,
    pub company_threshold: f64,
    pub recency_window_days: i64,
}

impl Default for DeduperConfig {
    fn default() -> Self {
        Self { title_threshold: 0.85, company_threshold: 0.90, recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS }
    }
}

pub struct Deduper {
    pool: SqlitePool,
    config: DeduperConfig,
}

impl Deduper {
    pub fn new(pool: SqlitePool, config: DeduperConfig) -> Self {
        Self { pool, config }
    }

    /// `upsert_cleaned(new_cleaned) → cleaned_id` (§4.5). Merging is atomic
    /// per cleaned_id via a single transaction.
    pub async fn upsert_cleaned(&self, new: CleanedFields) -> CoreResult<String> {
        let mut tx = self.pool.begin().await?;

        let existing_by_external_id = if let Some(ext_id) = &new.external_job_id {
            sqlx::query_as::<_, CleanedScrape>(
                "SELECT * FROM cleaned_scrapes WHERE source = ? AND external_job_id = ? LIMIT 1",
            )
            .bind(&new.source)
            .bind(ext_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        let candidate = match existing_by_external_id {
            Some(row) => Some(row),
            None => {
                let cutoff = Utc::now() - Duration::days(self.config.recency_window_days);
                let recent: Vec<CleanedScrape> = sqlx::query_as(
                    "SELECT * FROM cleaned_scrapes WHERE source = ? AND cleaned_at >= ? ORDER BY cleaned_at DESC",
                )
                .bind(&new.source)
                .bind(cutoff)
                .fetch_all(&mut *tx)
                .await?;

                recent.into_iter().find(|existing| {
                    let title_a = existing.job_title.as_deref().unwrap_or("");
                    let company_a = existing.company_name.as_deref().unwrap_or("");
                    let title_b = new.job_title.as_deref().unwrap_or("");
                    let company_b = new.company_name.as_deref().unwrap_or("");
                    fuzzy::same_job(title_a, company_a, title_b, company_b, self.config.title_threshold, self.config.company_threshold)
                })
            }
        };

        let cleaned_id = match candidate {
            Some(existing) => {
                merge_into(&mut tx, &existing, &new).await?;
                existing.cleaned_id
            },
            None => create_new(&mut tx, &new).await?,
        };

        tx.commit().await?;
        Ok(cleaned_id)
    }
}

async fn create_new(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, new: &CleanedFields) -> CoreResult<String> {
    let cleaned_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO cleaned_scrapes (
            cleaned_id, source, external_job_id, job_title, company_name, location, work_arrangement,
            salary, description, requirements, benefits, industry, job_type, experience_level,
            posting_date, application_deadline, application_url, application_email, is_expired,
            duplicates_count, confidence_score, provenance_raw_ids, cleaned_at, last_seen_at
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&cleaned_id)
    .bind(&new.source)
    .bind(&new.external_job_id)
    .bind(&new.job_title)
    .bind(&new.company_name)
    .bind(sqlx::types::Json(&new.location))
    .bind(new.work_arrangement.as_str())
    .bind(sqlx::types::Json(&new.salary))
    .bind(&new.description)
    .bind(&new.requirements)
    .bind(&new.benefits)
    .bind(&new.industry)
    .bind(&new.job_type)
    .bind(&new.experience_level)
    .bind(new.posting_date)
    .bind(new.application_deadline)
    .bind(&new.application_url)
    .bind(&new.application_email)
    .bind(new.is_expired)
    .bind(1i64)
    .bind(0.0f64)
    .bind(&new.source_raw_id)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let confidence = confidence::score(&fetch_one(&mut *tx, &cleaned_id).await?);
    sqlx::query("UPDATE cleaned_scrapes SET confidence_score = ? WHERE cleaned_id = ?")
        .bind(confidence)
        .bind(&cleaned_id)
        .execute(&mut **tx)
        .await?;

    Ok(cleaned_id)
}

async fn merge_into(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, existing: &CleanedScrape, new: &CleanedFields) -> CoreResult<()> {
    let existing_score = confidence::score(existing);
    // Build a provisional row for the incoming record to score it the
    // same way, so the winner is decided field-by-field (§4.5: higher
    // confidence wins, lower confidence fills gaps in the winner).
    let new_as_row = provisional_row(existing, new);
    let new_score = confidence::score(&new_as_row);

    let (winner, loser) = if new_score > existing_score { (&new_as_row, existing) } else { (existing, &new_as_row) };

    let merged_job_title = winner.job_title.clone().or_else(|| loser.job_title.clone());
    let merged_company = winner.company_name.clone().or_else(|| loser.company_name.clone());
    let merged_description = winner.description.clone().or_else(|| loser.description.clone());
    let merged_requirements = winner.requirements.clone().or_else(|| loser.requirements.clone());
    let merged_benefits = winner.benefits.clone().or_else(|| loser.benefits.clone());
    let merged_industry = winner.industry.clone().or_else(|| loser.industry.clone());
    let merged_job_type = winner.job_type.clone().or_else(|| loser.job_type.clone());
    let merged_experience = winner.experience_level.clone().or_else(|| loser.experience_level.clone());

    let merged_score = new_score.max(existing_score);
    let mut provenance = existing.provenance_ids();
    provenance.push(new.source_raw_id.clone());

    sqlx::query(
        "UPDATE cleaned_scrapes SET job_title = ?, company_name = ?, description = ?, requirements = ?,
         benefits = ?, industry = ?, job_type = ?, experience_level = ?, confidence_score = ?,
         duplicates_count = duplicates_count + 1, provenance_raw_ids = ?, last_seen_at = ?
         WHERE cleaned_id = ?",
    )
    .bind(&merged_job_title)
    .bind(&merged_company)
    .bind(&merged_description)
    .bind(&merged_requirements)
    .bind(&merged_benefits)
    .bind(&merged_industry)
    .bind(&merged_job_type)
    .bind(&merged_experience)
    .bind(merged_score)
    .bind(provenance.join(","))
    .bind(Utc::now())
    .bind(&existing.cleaned_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Builds a `CleanedScrape`-shaped view of incoming fields purely in memory
/// so `confidence::score` can rank it against the existing row without a
/// round trip through the database.
fn provisional_row(existing: &CleanedScrape, new: &CleanedFields) -> CleanedScrape {
    CleanedScrape {
        cleaned_id: existing.cleaned_id.clone(),
        source: new.source.clone(),
        external_job_id: new.external_job_id.clone(),
        job_title: new.job_title.clone(),
        company_name: new.company_name.clone(),
        location: sqlx::types::Json(new.location.clone()),
        work_arrangement: new.work_arrangement.as_str().to_string(),
        salary: sqlx::types::Json(new.salary.clone()),
        description: new.description.clone(),
        requirements: new.requirements.clone(),
        benefits: new.benefits.clone(),
        industry: new.industry.clone(),
        job_type: new.job_type.clone(),
        experience_level: new.experience_level.clone(),
        posting_date: new.posting_date,
        application_deadline: new.application_deadline,
        application_url: new.application_url.clone(),
        application_email: new.application_email.clone(),
        is_expired: new.is_expired,
        duplicates_count: 1,
        confidence_score: 0.0,
        provenance_raw_ids: new.source_raw_id.clone(),
        cleaned_at: existing.cleaned_at,
        last_seen_at: Utc::now(),
    }
}

async fn fetch_one(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, cleaned_id: &str) -> CoreResult<CleanedScrape> {
    Ok(sqlx::query_as("SELECT * FROM cleaned_scrapes WHERE cleaned_id = ?")
        .bind(cleaned_id)
        .fetch_one(&mut **tx)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE cleaned_scrapes (
                cleaned_id TEXT PRIMARY KEY, source TEXT NOT NULL, external_job_id TEXT,
                job_title TEXT, company_name TEXT, location TEXT NOT NULL, work_arrangement TEXT NOT NULL,
                salary TEXT NOT NULL, description TEXT, requirements TEXT, benefits TEXT, industry TEXT,
                job_type TEXT, experience_level TEXT, posting_date TEXT, application_deadline TEXT,
                application_url TEXT, application_email TEXT, is_expired BOOLEAN NOT NULL,
                duplicates_count INTEGER NOT NULL, confidence_score REAL NOT NULL,
                provenance_raw_ids TEXT NOT NULL, cleaned_at TEXT NOT NULL, last_seen_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn fields(source_raw_id: &str, title: &str, company: &str) -> CleanedFields {
        CleanedFields {
            source: "acme-feed".into(),
            external_job_id: None,
            job_title: Some(title.into()),
            company_name: Some(company.into()),
            location: Default::default(),
            work_arrangement: Default::default(),
            salary: Default::default(),
            description: Some("A job description long enough to matter here.".into()),
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
            source_raw_id: source_raw_id.into(),
        }
    }

    #[tokio::test]
    async fn dedup_merges_fuzzy_matching_titles() {
        let pool = test_pool().await;
        let deduper = Deduper::new(pool.clone(), DeduperConfig::default());

        let id1 = deduper.upsert_cleaned(fields("raw-1", "Software Engineer", "Acme Inc")).await.unwrap();
        let id2 = deduper.upsert_cleaned(fields("raw-2", "Software Engineer II", "Acme, Inc.")).await.unwrap();

        assert_eq!(id1, id2);
        let row: CleanedScrape = sqlx::query_as("SELECT * FROM cleaned_scrapes WHERE cleaned_id = ?")
            .bind(&id1)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.duplicates_count, 2);
        assert_eq!(row.provenance_ids(), vec!["raw-1", "raw-2"]);
    }

    #[tokio::test]
    async fn reingesting_same_payload_is_idempotent() {
        let pool = test_pool().await;
        let deduper = Deduper::new(pool.clone(), DeduperConfig::default());

        let id1 = deduper.upsert_cleaned(fields("raw-1", "Data Analyst", "Beta Corp")).await.unwrap();
        let id2 = deduper.upsert_cleaned(fields("raw-1-retry", "Data Analyst", "Beta Corp")).await.unwrap();
        assert_eq!(id1, id2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cleaned_scrapes").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }
}
