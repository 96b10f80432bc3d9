//! Tiered LLM analysis (C9-C11): per-tier prompt schemas and wire errors
//! (`models`), the provider-agnostic HTTP client (`client`), the per-tier
//! prompt builders (`scenarios`), and the persistence + rate-limit/spend
//! ledgers the scheduler reserves against (`repository`).

mod client;
mod models;
mod repository;
mod scenarios;

pub use client::{HttpLlmClient, LlmCallOutcome, LlmClient};
pub use models::*;
pub use repository::{BudgetDenial, LlmRepository, RateLimitDenial};
pub use scenarios::{tier1, tier2, tier3};
