//! Layered configuration: defaults → TOML file → environment variables →
//! CLI overrides → `validate()`. Mirrors the teacher's load order exactly;
//! key names follow spec §6.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub fuzzy: FuzzyConfig,
    pub security: SecurityConfig,
    pub batching: BatchingConfig,
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/jobflow.db".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,jobflow_core=debug".to_string(), file: Some("logs/jobflow.log".to_string()) }
    }
}

/// Rate limit, spend, and concurrency settings for the tiered scheduler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub rpm: u32,
    pub rpd: u32,
    pub concurrency: usize,
    pub daily_max_usd: f64,
    pub monthly_max_usd: f64,
    /// Empty-queue poll backoff floor/ceiling (§5).
    pub poll_backoff_min_secs: u64,
    pub poll_backoff_max_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            rpm: 60,
            rpd: 10_000,
            concurrency: 4,
            daily_max_usd: 0.0,
            monthly_max_usd: 0.0,
            poll_backoff_min_secs: 1,
            poll_backoff_max_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    pub title: f64,
    pub company: f64,
    pub company_resolve: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self { title: 0.85, company: 0.90, company_resolve: 0.92 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub token_min_occurrences: u32,
    pub hash_and_replace_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { token_min_occurrences: 20, hash_and_replace_enabled: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub tier1_base_output_tokens: u32,
    pub tier2_base_output_tokens: u32,
    pub tier3_base_output_tokens: u32,
    pub tier1_max_batch: usize,
    pub tier2_max_batch: usize,
    pub tier3_max_batch: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            tier1_base_output_tokens: 700,
            tier2_base_output_tokens: 1200,
            tier3_base_output_tokens: 1500,
            tier1_max_batch: 20,
            tier2_max_batch: 5,
            tier3_max_batch: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    pub default_decision_threshold: f64,
    pub max_scenarios: usize,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self { default_decision_threshold: 70.0, max_scenarios: 5 }
    }
}

/// Command line argument overrides.
#[derive(Parser, Debug, Clone)]
#[command(name = "jobflow")]
#[command(version, about = "Job pipeline, tiered LLM analysis, and preference scoring core")]
pub struct CommandLineArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_name = "N")]
    pub llm_rpm: Option<u32>,

    #[arg(long, value_name = "N")]
    pub llm_rpd: Option<u32>,

    #[arg(long, value_name = "N")]
    pub llm_concurrency: Option<usize>,

    #[arg(long, value_name = "USD")]
    pub llm_daily_max_usd: Option<f64>,

    #[arg(long, value_name = "USD")]
    pub llm_monthly_max_usd: Option<f64>,
}

impl Config {
    /// Loading order (priority highest to lowest): CLI > env > TOML file > defaults.
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(path) = config_path {
            Self::from_toml(&path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("LLM_RPM")
            && let Ok(v) = v.parse()
        {
            self.llm.rpm = v;
        }
        if let Ok(v) = std::env::var("LLM_RPD")
            && let Ok(v) = v.parse()
        {
            self.llm.rpd = v;
        }
        if let Ok(v) = std::env::var("LLM_CONCURRENCY")
            && let Ok(v) = v.parse()
        {
            self.llm.concurrency = v;
        }
        if let Ok(v) = std::env::var("LLM_DAILY_MAX_USD")
            && let Ok(v) = v.parse()
        {
            self.llm.daily_max_usd = v;
        }
        if let Ok(v) = std::env::var("LLM_MONTHLY_MAX_USD")
            && let Ok(v) = v.parse()
        {
            self.llm.monthly_max_usd = v;
        }
        if let Ok(v) = std::env::var("FUZZY_TITLE")
            && let Ok(v) = v.parse()
        {
            self.fuzzy.title = v;
        }
        if let Ok(v) = std::env::var("FUZZY_COMPANY")
            && let Ok(v) = v.parse()
        {
            self.fuzzy.company = v;
        }
        if let Ok(v) = std::env::var("FUZZY_COMPANY_RESOLVE")
            && let Ok(v) = v.parse()
        {
            self.fuzzy.company_resolve = v;
        }
        if let Ok(v) = std::env::var("SECURITY_TOKEN_MIN_OCCURRENCES")
            && let Ok(v) = v.parse()
        {
            self.security.token_min_occurrences = v;
        }
        if let Ok(v) = std::env::var("HASH_AND_REPLACE_ENABLED")
            && let Ok(v) = v.parse()
        {
            self.security.hash_and_replace_enabled = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_DECISION_THRESHOLD")
            && let Ok(v) = v.parse()
        {
            self.preferences.default_decision_threshold = v;
        }
        if let Ok(v) = std::env::var("MAX_SCENARIOS")
            && let Ok(v) = v.parse()
        {
            self.preferences.max_scenarios = v;
        }
    }

    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(v) = &args.database_url {
            self.database.url = v.clone();
        }
        if let Some(v) = &args.log_level {
            self.logging.level = v.clone();
        }
        if let Some(v) = args.llm_rpm {
            self.llm.rpm = v;
        }
        if let Some(v) = args.llm_rpd {
            self.llm.rpd = v;
        }
        if let Some(v) = args.llm_concurrency {
            self.llm.concurrency = v;
        }
        if let Some(v) = args.llm_daily_max_usd {
            self.llm.daily_max_usd = v;
        }
        if let Some(v) = args.llm_monthly_max_usd {
            self.llm.monthly_max_usd = v;
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database.url.is_empty() {
            anyhow::bail!("database.url cannot be empty");
        }
        if self.llm.concurrency == 0 {
            anyhow::bail!("llm.concurrency must be > 0");
        }
        if !(0.0..=1.0).contains(&self.fuzzy.title) {
            anyhow::bail!("fuzzy.title must be in [0,1]");
        }
        if !(0.0..=1.0).contains(&self.fuzzy.company) {
            anyhow::bail!("fuzzy.company must be in [0,1]");
        }
        if !(0.0..=1.0).contains(&self.fuzzy.company_resolve) {
            anyhow::bail!("fuzzy.company_resolve must be in [0,1]");
        }
        if self.preferences.default_decision_threshold <= 0.0 {
            anyhow::bail!("preferences.default_decision_threshold must be > 0");
        }
        if self.preferences.max_scenarios == 0 {
            anyhow::bail!("preferences.max_scenarios must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let candidates = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        candidates.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Parses human-friendly durations ("30s", "5m", "1h", "7d") into seconds.
/// Reused for lease durations, batching windows, and backoff caps.
pub fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }
    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}
