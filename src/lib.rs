//! Job pipeline, tiered LLM analysis, and preference scoring core.
//!
//! `models` holds the durable record types, `services` the domain logic
//! (ingestion/cleaning/dedup, the tiered LLM scheduler, preference
//! regression and scoring), `config` the layered configuration, and `db`
//! the SQLite pool setup. No HTTP surface lives in this crate — ingestion,
//! scraping, and presentation are external collaborators (see `config`
//! module docs for the load order this crate expects to be driven by).

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use utils::{CoreError, CoreResult};
