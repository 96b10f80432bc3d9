//! Raw Ingestor (C1) — accepts raw scrape records verbatim.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::raw_scrape::{IngestRequest, RawScrape};
use crate::utils::{CoreError, CoreResult};

pub struct RawIngestor {
    pool: SqlitePool,
}

impl RawIngestor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `ingest(provider_record) → scrape_id` (§4.1). Stored byte-for-equivalent
    /// in `payload`; no transformation, no filtering.
    pub async fn ingest(&self, request: IngestRequest) -> CoreResult<String> {
        let scrape_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let payload = serde_json::to_string(&request.payload)?;

        sqlx::query(
            "INSERT INTO raw_scrapes (scrape_id, source, source_url, scraped_at, payload, scraper_run_id, success, error_detail, created_at)
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(&scrape_id)
        .bind(&request.provenance.source)
        .bind(&request.provenance.source_url)
        .bind(now)
        .bind(&payload)
        .bind(&request.provenance.scraper_run_id)
        .bind(request.success)
        .bind(&request.error_detail)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::TransientInfrastructure(e.to_string()))?;

        tracing::info!(scrape_id = %scrape_id, source = %request.provenance.source, "ingested raw scrape");
        Ok(scrape_id)
    }

    pub async fn get(&self, scrape_id: &str) -> CoreResult<RawScrape> {
        Ok(sqlx::query_as("SELECT * FROM raw_scrapes WHERE scrape_id = ?")
            .bind(scrape_id)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::raw_scrape::ScrapeProvenance;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE raw_scrapes (
                scrape_id TEXT PRIMARY KEY, source TEXT NOT NULL, source_url TEXT, scraped_at TEXT NOT NULL,
                payload TEXT NOT NULL, scraper_run_id TEXT NOT NULL, success BOOLEAN NOT NULL,
                error_detail TEXT, created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn ingest_stores_payload_verbatim() {
        let pool = test_pool().await;
        let ingestor = RawIngestor::new(pool);
        let req = IngestRequest {
            provenance: ScrapeProvenance { source: "acme-feed".into(), source_url: Some("https://acme.example/jobs/1".into()), scraper_run_id: "run-1".into() },
            payload: serde_json::json!({"title": "Software Engineer"}),
            success: true,
            error_detail: None,
        };
        let scrape_id = ingestor.ingest(req).await.unwrap();
        let stored = ingestor.get(&scrape_id).await.unwrap();
        let round_tripped: serde_json::Value = serde_json::from_str(&stored.payload).unwrap();
        assert_eq!(round_tripped["title"], "Software Engineer");
    }
}
