//! Tiered Scheduler (C10) — the cooperative loop tying together the queue
//! (C7), batch optimizer (C8), prompt security (C9), LLM client, and
//! response validator (C11) into the dispatch flow §4.10 describes: lease →
//! plan a batch → gate on rate limit/spend → build the prompt → call →
//! validate → persist → advance the pipeline to the next tier.
//!
//! Built directly on the `ScheduledExecutor`/`ScheduledTask` polling
//! framework; each `run()` is one pass over all three tiers, run
//! concurrently up to `LlmConfig.concurrency`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{BatchingConfig, LlmConfig, SecurityConfig};
use crate::models::event::{BudgetExceeded, RateLimited, SecurityDetected, TierCompleted, TierFailed};
use crate::models::job::Job;
use crate::models::queue::{AnalysisQueueEntry, DispatchOutcome, Priority};
use crate::services::events::EventRepository;
use crate::services::llm::{JobPromptInput, LLMError, LlmClient, LlmRepository, tier1, tier2, tier3};
use crate::services::optimizer::{JobCandidate, ModelInfo, TokenOptimizer};
use crate::services::queue_service::QueueRepository;
use crate::services::security::SecurityManager;
use crate::services::validator::{ValidatedTierResponse, ValidationError, validate_tier_response};
use crate::utils::{CoreError, CoreResult, ScheduledTask};

/// Lease duration granted per batch; generous relative to the per-call
/// timeout so a slow-but-live call isn't reclaimed out from under itself.
const LEASE_DURATION: ChronoDuration = ChronoDuration::minutes(10);
const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_CAP_SECS: u64 = 300;
const BACKOFF_JITTER: f64 = 0.20;
/// Validation failures are retried at most this many times before the
/// response shape itself is treated as permanently broken (§4.11/§7).
const MAX_VALIDATION_ATTEMPTS: i32 = 3;

fn exponential_backoff(attempts: i32) -> Duration {
    let base = (BACKOFF_BASE_SECS as f64) * 2f64.powi(attempts.max(0));
    let capped = base.min(BACKOFF_CAP_SECS as f64);
    let jitter = 1.0 + rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    Duration::from_secs_f64((capped * jitter).max(1.0))
}

fn seconds_until_next_utc_midnight(now: DateTime<Utc>) -> i64 {
    let tomorrow = (now + ChronoDuration::days(1)).date_naive().and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let tomorrow = DateTime::<Utc>::from_naive_utc_and_offset(tomorrow, Utc);
    (tomorrow - now).num_seconds().max(0)
}

/// Maps a failed LLM call to a dispatch outcome (§4.10 step 4, §9 REDESIGN
/// FLAGS: explicit sum type instead of exception-based retry control flow).
/// `ApiError` carries the response body, so a 4xx status (a request the
/// provider will never accept, retried or not) is treated as permanent;
/// everything else — timeouts, 5xx, transport failures — is retryable.
fn classify_llm_error(err: &LLMError, attempts: i32) -> DispatchOutcome {
    match err {
        LLMError::RateLimited(secs) => DispatchOutcome::RetryableFailure { reason: err.to_string(), backoff: Duration::from_secs(*secs) },
        LLMError::ApiError(msg) if msg.contains("HTTP 4") => DispatchOutcome::PermanentFailure { reason: err.to_string() },
        LLMError::SerializationError(_) => DispatchOutcome::PermanentFailure { reason: err.to_string() },
        _ => DispatchOutcome::RetryableFailure { reason: err.to_string(), backoff: exponential_backoff(attempts) },
    }
}

fn classify_validation_error(err: &ValidationError, attempts: i32) -> DispatchOutcome {
    if attempts + 1 >= MAX_VALIDATION_ATTEMPTS {
        DispatchOutcome::PermanentFailure { reason: format!("validation: {}", err.reason) }
    } else {
        DispatchOutcome::RetryableFailure { reason: format!("validation: {}", err.reason), backoff: exponential_backoff(attempts) }
    }
}

pub struct TieredScheduler {
    pool: sqlx::SqlitePool,
    queue: QueueRepository,
    llm_repo: LlmRepository,
    optimizer: TokenOptimizer,
    security: SecurityManager,
    events: EventRepository,
    client: Arc<dyn LlmClient>,
    llm_config: LlmConfig,
    batching_config: BatchingConfig,
    semaphore: Arc<Semaphore>,
}

impl TieredScheduler {
    pub fn new(pool: sqlx::SqlitePool, client: Arc<dyn LlmClient>, llm_config: LlmConfig, batching_config: BatchingConfig, security_config: &SecurityConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(llm_config.concurrency.max(1)));
        Self {
            queue: QueueRepository::new(pool.clone()),
            llm_repo: LlmRepository::new(pool.clone()),
            optimizer: TokenOptimizer::new(pool.clone()),
            security: SecurityManager::new(pool.clone(), security_config),
            events: EventRepository::new(pool.clone()),
            pool,
            client,
            llm_config,
            batching_config,
            semaphore,
        }
    }

    /// One full pass: expire stale leases, then advance each tier's queue
    /// concurrently, bounded by `llm_config.concurrency`.
    pub async fn run_once(&self) -> CoreResult<()> {
        let now = Utc::now();
        let expired = self.queue.expire_leases(now).await?;
        if expired > 0 {
            tracing::info!(expired, "reclaimed expired leases");
        }

        let (t1, t2, t3) = tokio::join!(self.process_tier(1), self.process_tier(2), self.process_tier(3));
        t1?;
        t2?;
        t3?;
        Ok(())
    }

    async fn fetch_job(&self, job_id: &str) -> CoreResult<Job> {
        Ok(sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = ?").bind(job_id).fetch_one(&self.pool).await?)
    }

    async fn build_prompt_input(&self, job: &Job, tier: i32) -> CoreResult<JobPromptInput> {
        let tier1_context = if tier >= 2 { self.llm_repo.load_tier1_context(&job.job_id).await? } else { None };
        let tier2_context = if tier >= 3 { self.llm_repo.load_tier2_context(&job.job_id).await? } else { None };
        Ok(JobPromptInput {
            job_id: job.job_id.clone(),
            job_title: job.job_title.clone(),
            company_name: job.company_name.clone(),
            description: job.description.clone().unwrap_or_default(),
            requirements: job.requirements.clone().unwrap_or_default(),
            tier1_context,
            tier2_context,
        })
    }

    /// Leases up to this tier's configured max batch, shrinks to what the
    /// optimizer's plan actually allows, and releases any leased-but-unused
    /// entries straight back to pending (§4.7/§4.8).
    async fn lease_and_plan(&self, tier: i32) -> CoreResult<Option<(Vec<AnalysisQueueEntry>, crate::services::optimizer::BatchPlan)>> {
        let (_, max_batch) = match tier {
            1 => (3usize, self.batching_config.tier1_max_batch),
            2 => (1usize, self.batching_config.tier2_max_batch),
            _ => (1usize, self.batching_config.tier3_max_batch),
        };

        let now = Utc::now();
        let leased = self.queue.lease(max_batch as i64, now, LEASE_DURATION).await?;
        if leased.is_empty() {
            return Ok(None);
        }

        let mut jobs = Vec::with_capacity(leased.len());
        for entry in &leased {
            jobs.push(self.fetch_job(&entry.job_id).await?);
        }

        let candidates: Vec<JobCandidate> = jobs
            .iter()
            .map(|j| JobCandidate {
                job_id: j.job_id.clone(),
                description_chars: j.description.as_deref().map_or(0, str::len) + j.requirements.as_deref().map_or(0, str::len),
            })
            .collect();

        let plan = self.optimizer.plan_batch(tier, &candidates, &self.batching_config).await?;

        if plan.batch_size < leased.len() {
            for entry in &leased[plan.batch_size..] {
                self.queue.postpone_to(entry.id, now).await?;
            }
        }

        Ok(Some((leased.into_iter().take(plan.batch_size).collect(), plan)))
    }

    async fn process_tier(&self, tier: i32) -> CoreResult<()> {
        let Some((entries, plan)) = self.lease_and_plan(tier).await? else {
            return Ok(());
        };

        let model = ModelInfo::by_id(plan.model_id).ok_or_else(|| CoreError::ConfigurationError(format!("unknown model_id {}", plan.model_id)))?;
        let now = Utc::now();

        let rate_decision = self.llm_repo.reserve_rate_limit(model.model_id, self.llm_config.rpm, self.llm_config.rpd, now).await?;
        if let Err(denial) = rate_decision {
            for entry in &entries {
                self.queue.postpone_to(entry.id, now + ChronoDuration::seconds(denial.retry_after_secs as i64)).await?;
            }
            self.events.record(&RateLimited { provider: model.model_id.to_string(), retry_after_secs: denial.retry_after_secs, queue_depth: entries.len() as i64 }).await?;
            return Ok(());
        }

        // Rough pre-dispatch estimate; `commit_spend` records the real cost
        // from `call_outcome`'s reported usage once the call returns.
        let estimated_input_tokens = 400u32 * entries.len() as u32;
        let estimated_cost = model.estimated_cost_usd(estimated_input_tokens, plan.max_output_tokens);
        let budget_decision = self.llm_repo.reserve_budget(estimated_cost, self.llm_config.daily_max_usd, self.llm_config.monthly_max_usd, now).await?;
        if let Err(denial) = budget_decision {
            let next_midnight = now + ChronoDuration::seconds(seconds_until_next_utc_midnight(now));
            for entry in &entries {
                self.queue.postpone_to(entry.id, next_midnight).await?;
            }
            self.events.record(&BudgetExceeded { scope: denial.scope.clone(), limit_usd: denial.limit_usd, spent_usd: denial.spent_usd }).await?;
            return Ok(());
        }

        let mut prompt_inputs = Vec::with_capacity(entries.len());
        let mut jobs_by_id = std::collections::HashMap::new();
        for entry in &entries {
            let job = self.fetch_job(&entry.job_id).await?;
            for text in [job.description.as_deref().unwrap_or(""), job.requirements.as_deref().unwrap_or("")] {
                if text.is_empty() {
                    continue;
                }
                let findings = self.security.scan_job_text(&job.job_id, text);
                if !findings.is_empty() {
                    let recorded = self.security.record_findings(&findings).await?;
                    for detection in recorded {
                        self.events
                            .record(&SecurityDetected {
                                detection_id: detection.detection_id,
                                job_id: detection.job_id,
                                detection_type: detection.detection_type,
                                severity: detection.severity,
                            })
                            .await?;
                    }
                }
            }
            let input = self.build_prompt_input(&job, tier).await?;
            jobs_by_id.insert(job.job_id.clone(), job);
            prompt_inputs.push(input);
        }

        let token = self.security.issue_token();
        let expected_job_ids: Vec<String> = prompt_inputs.iter().map(|j| j.job_id.clone()).collect();
        let (system_prompt, user_prompt) = match tier {
            1 => tier1::build_prompt(&prompt_inputs, &token, self.security.min_occurrences()),
            2 => tier2::build_prompt(&prompt_inputs, &token, self.security.min_occurrences()),
            _ => tier3::build_prompt(&prompt_inputs, &token, self.security.min_occurrences()),
        };

        let timeout = Duration::from_secs_f64((plan.max_output_tokens as f64 * model.output_ms_per_token * 1.5 / 1000.0).max(30.0));

        let _permit = self.semaphore.acquire().await.expect("scheduler semaphore is never closed");
        let call_start = std::time::Instant::now();
        let outcome = self.client.call(&system_prompt, &user_prompt, model, plan.max_output_tokens, timeout).await;
        drop(_permit);
        let response_time_ms = call_start.elapsed().as_millis() as i32;

        let call_outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(tier, error = %e, "llm call failed");
                for entry in &entries {
                    let dispatch = classify_llm_error(&e, entry.attempts);
                    self.fail_entry(entry, dispatch).await?;
                }
                return Ok(());
            },
        };

        self.llm_repo.commit_rate_limit(model.model_id, now).await?;
        self.llm_repo.commit_spend(model.estimated_cost_usd(call_outcome.input_tokens, call_outcome.output_tokens), now).await?;
        let current_base = self.optimizer.current_base_output_tokens(tier, &self.batching_config).await?;
        self.optimizer.record_actual_usage(tier, plan.max_output_tokens, call_outcome.output_tokens, current_base).await?;

        let validated = match validate_tier_response(tier, &call_outcome.body, &token, &expected_job_ids) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tier, reason = %e.reason, "tier response failed validation");
                if e.reason.contains("token") {
                    let echoed = call_outcome.body.get("security_token").and_then(|v| v.as_str()).unwrap_or("<missing>");
                    let detection = self.security.record_token_mismatch(None, &token, echoed).await?;
                    self.events
                        .record(&SecurityDetected { detection_id: detection.detection_id, job_id: detection.job_id, detection_type: detection.detection_type, severity: detection.severity })
                        .await?;
                }
                for entry in &entries {
                    let dispatch = classify_validation_error(&e, entry.attempts);
                    self.fail_entry(entry, dispatch).await?;
                }
                return Ok(());
            },
        };

        self.persist_and_advance(tier, &entries, validated, model.model_id, call_outcome.output_tokens as i32, response_time_ms).await
    }

    async fn fail_entry(&self, entry: &AnalysisQueueEntry, outcome: DispatchOutcome) -> CoreResult<()> {
        let permanent = matches!(outcome, DispatchOutcome::PermanentFailure { .. });
        let reason = match &outcome {
            DispatchOutcome::RetryableFailure { reason, .. } | DispatchOutcome::PermanentFailure { reason } => reason.clone(),
            DispatchOutcome::Done => String::new(),
        };
        if permanent {
            self.llm_repo.mark_tier_failed(&entry.job_id, entry.tier_target as u8).await?;
        }
        self.events
            .record(&TierFailed { job_id: entry.job_id.clone(), tier: entry.tier_target, attempts: entry.attempts + 1, reason, permanent })
            .await?;
        self.queue.complete(entry.id, outcome).await
    }

    async fn persist_and_advance(&self, tier: i32, entries: &[AnalysisQueueEntry], validated: ValidatedTierResponse, model_used: &str, tokens_used: i32, response_time_ms: i32) -> CoreResult<()> {
        let by_id: std::collections::HashMap<&str, &AnalysisQueueEntry> = entries.iter().map(|e| (e.job_id.as_str(), e)).collect();

        match validated {
            ValidatedTierResponse::Tier1(response) => {
                for job in &response.jobs {
                    self.llm_repo.persist_tier1(&job.job_id, job, tokens_used, model_used, response_time_ms).await?;
                    self.finish_entry(&by_id, &job.job_id, tier, model_used, tokens_used, response_time_ms).await?;
                }
            },
            ValidatedTierResponse::Tier2(response) => {
                for job in &response.jobs {
                    self.llm_repo.persist_tier2(&job.job_id, job, tokens_used, model_used, response_time_ms).await?;
                    self.finish_entry(&by_id, &job.job_id, tier, model_used, tokens_used, response_time_ms).await?;
                }
            },
            ValidatedTierResponse::Tier3(response) => {
                for job in &response.jobs {
                    self.llm_repo.persist_tier3(&job.job_id, job, tokens_used, model_used, response_time_ms).await?;
                    self.finish_entry(&by_id, &job.job_id, tier, model_used, tokens_used, response_time_ms).await?;
                }
            },
        }
        Ok(())
    }

    async fn finish_entry(
        &self,
        by_id: &std::collections::HashMap<&str, &AnalysisQueueEntry>,
        job_id: &str,
        tier: i32,
        model_used: &str,
        tokens_used: i32,
        response_time_ms: i32,
    ) -> CoreResult<()> {
        let Some(entry) = by_id.get(job_id) else {
            return Ok(());
        };
        self.queue.complete(entry.id, DispatchOutcome::Done).await?;
        self.events.record(&TierCompleted { job_id: job_id.to_string(), tier, model_used: model_used.to_string(), tokens_used, response_time_ms }).await?;

        if tier < 3 {
            self.queue.enqueue(job_id, tier + 1, entry.priority_enum()).await?;
        }
        Ok(())
    }
}

impl ScheduledTask for TieredScheduler {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.run_once().await.map_err(anyhow::Error::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::services::llm::LlmCallOutcome;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn call(&self, _system_prompt: &str, _user_prompt: &str, _model: ModelInfo, _max_output_tokens: u32, _timeout: Duration) -> Result<LlmCallOutcome, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::ApiError("HTTP 500: server error".into()))
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE jobs (
                job_id TEXT PRIMARY KEY, company_id TEXT NOT NULL, external_job_id TEXT, source TEXT NOT NULL,
                job_title TEXT NOT NULL, company_name TEXT NOT NULL, location TEXT NOT NULL, work_arrangement TEXT NOT NULL,
                salary TEXT NOT NULL, description TEXT, requirements TEXT, benefits TEXT, industry TEXT, job_type TEXT,
                experience_level TEXT, posting_date TEXT, application_deadline TEXT, application_url TEXT, application_email TEXT,
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
        for table in [
            "analysis_tier_records (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, tier INTEGER NOT NULL, completed BOOLEAN NOT NULL, completed_at TEXT, tokens_used INTEGER NOT NULL, model_used TEXT NOT NULL, response_time_ms INTEGER NOT NULL)",
            "required_skills (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, skill TEXT NOT NULL, importance INTEGER NOT NULL)",
            "job_benefits (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, benefit TEXT NOT NULL)",
            "ats_keywords (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, keyword TEXT NOT NULL)",
            "secondary_industries (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, industry TEXT NOT NULL)",
            "red_flags (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, flag TEXT NOT NULL, severity TEXT NOT NULL)",
            "implicit_requirements (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, requirement TEXT NOT NULL)",
            "cover_letter_insights (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, angle TEXT NOT NULL, detail TEXT NOT NULL)",
            "authenticity_flags (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, flag TEXT NOT NULL, confidence REAL NOT NULL)",
            "strategic_positioning (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, recommendation TEXT NOT NULL)",
            "llm_priority_scores (job_id TEXT PRIMARY KEY, score REAL NOT NULL, computed_at TEXT NOT NULL)",
            "rate_limit_requests (model_id TEXT NOT NULL, requested_at TEXT NOT NULL)",
            "rate_limit_daily (model_id TEXT NOT NULL, day TEXT NOT NULL, count INTEGER NOT NULL, PRIMARY KEY (model_id, day))",
            "spend_daily (day TEXT PRIMARY KEY, amount_usd REAL NOT NULL)",
            "spend_monthly (month TEXT PRIMARY KEY, amount_usd REAL NOT NULL)",
            "tier_result_cache (job_id TEXT NOT NULL, tier INTEGER NOT NULL, result_json TEXT NOT NULL, PRIMARY KEY (job_id, tier))",
            "optimizer_state (tier INTEGER PRIMARY KEY, ema_efficiency REAL NOT NULL, base_output_tokens INTEGER NOT NULL, updated_at TEXT NOT NULL)",
            "security_detections (detection_id TEXT PRIMARY KEY, job_id TEXT, detection_type TEXT NOT NULL, severity TEXT NOT NULL, pattern_matched TEXT, text_sample TEXT NOT NULL, metadata TEXT NOT NULL, detected_at TEXT NOT NULL, handled BOOLEAN NOT NULL, action_taken TEXT)",
            "event_log (event_id TEXT PRIMARY KEY, event_type TEXT NOT NULL, payload TEXT NOT NULL, occurred_at TEXT NOT NULL)",
        ] {
            sqlx::query(&format!("CREATE TABLE {table}")).execute(&pool).await.unwrap();
        }

        sqlx::query(
            "INSERT INTO jobs (job_id, company_id, external_job_id, source, job_title, company_name, location, work_arrangement, salary,
                description, requirements, benefits, industry, job_type, experience_level, posting_date, application_deadline,
                application_url, application_email, is_expired, analysis_completed, analysis_state, created_at, updated_at, last_seen_at)
             VALUES ('job-1','company-1',NULL,'greenhouse','Backend Engineer','Acme Inc','{}','remote','{}',
                'Build backend services in Rust.','5 years of Rust experience.',NULL,NULL,NULL,NULL,NULL,NULL,
                NULL,NULL,0,0,'tier1_pending',?,?,?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn failed_dispatch_requeues_with_a_retryable_reason() {
        let pool = test_pool().await;
        let queue = QueueRepository::new(pool.clone());
        queue.enqueue("job-1", 1, Priority::Normal).await.unwrap();

        let client = Arc::new(StubClient { calls: AtomicUsize::new(0) });
        let scheduler = TieredScheduler::new(pool.clone(), client.clone(), LlmConfig::default(), BatchingConfig::default(), &SecurityConfig::default());
        scheduler.run_once().await.unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        let (state, attempts, last_error): (String, i32, Option<String>) =
            sqlx::query_as("SELECT state, attempts, last_error FROM analysis_queue WHERE job_id = 'job-1'").fetch_one(&pool).await.unwrap();
        assert_eq!(state, "pending");
        assert_eq!(attempts, 1);
        assert!(last_error.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let pool = test_pool().await;
        let client = Arc::new(StubClient { calls: AtomicUsize::new(0) });
        let scheduler = TieredScheduler::new(pool, client.clone(), LlmConfig::default(), BatchingConfig::default(), &SecurityConfig::default());
        scheduler.run_once().await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
