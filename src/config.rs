//! Configuration management for the FitRec engine
//!
//! Provides strongly-typed configuration with validation, environment variable parsing,
//! and sensible defaults. Every empirical scoring constant is exposed here so it can be
//! tuned without a rebuild.
//!
//! # Example
//! ```no_run
//! use fitrec::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Catalog: {}", config.catalog.path.display());
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,
    /// Program catalog location
    pub catalog: CatalogConfig,
    /// Feedback store locations
    pub feedback: FeedbackConfig,
    /// Recommendation engine configuration
    pub recommendation: RecommendationConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Enable CORS
    pub cors_enabled: bool,
}

/// Catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Raw catalog JSON (object keyed by program id)
    pub path: PathBuf,
}

/// Feedback store configuration
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Primary JSON store
    pub store_path: PathBuf,
    /// Snapshot used when the primary cannot be read
    pub backup_path: PathBuf,
}

/// Recommendation engine configuration
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Weight applied to raw content similarity
    pub content_weight: f64,
    /// Weight applied to the collaborative scorer (0 disables it)
    pub collab_weight: f64,
    /// Share of content similarity in the final candidate score
    pub content_blend: f64,
    /// Share of goal affinity in the final candidate score
    pub goal_blend: f64,
    /// Share of the rule-based goal score in goal affinity
    pub rule_weight: f64,
    /// Share of the keyword goal score in goal affinity
    pub semantic_weight: f64,
    /// Diversity factor (0.0-1.0)
    pub diversity_factor: f64,
    /// Cache TTL for recommendations
    pub cache_ttl: Duration,
    /// Maximum cached result sets
    pub cache_capacity: usize,
    /// Results returned when the caller does not ask for a count
    pub default_results: usize,
    /// Upper bound on requested results
    pub max_results: usize,
    /// Blend goal affinity into candidate scores
    pub goal_matching: bool,
    /// Use keyword similarity inside goal affinity
    pub semantic_matching: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            request_timeout: Duration::from_secs(30),
            cors_enabled: true,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fitness_program.json"),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("user_feedback.json"),
            backup_path: PathBuf::from("user_feedback.json.bak"),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            content_weight: 1.0,
            collab_weight: 0.0,
            content_blend: 0.3,
            goal_blend: 0.7,
            rule_weight: 0.6,
            semantic_weight: 0.4,
            diversity_factor: 0.3,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1000,
            default_results: 5,
            max_results: 20,
            goal_matching: true,
            semantic_matching: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            api: ApiConfig::from_env(),
            catalog: CatalogConfig::from_env(),
            feedback: FeedbackConfig::from_env(),
            recommendation: RecommendationConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.recommendation.validate()?;

        if self.feedback.store_path == self.feedback.backup_path {
            return Err(Error::InvalidConfig {
                key: "FEEDBACK_BACKUP_PATH",
                message: "backup path must differ from the store path".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary
    fn log_summary(&self) {
        let rec = &self.recommendation;
        info!("Configuration loaded:");
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("    Request timeout: {:?}", self.api.request_timeout);
        info!("  Catalog: {}", self.catalog.path.display());
        info!(
            "  Feedback store: {} (backup {})",
            self.feedback.store_path.display(),
            self.feedback.backup_path.display()
        );
        info!("  Recommendation:");
        info!(
            "    Blend content/goal: {}/{}",
            rec.content_blend, rec.goal_blend
        );
        info!(
            "    Goal rule/semantic: {}/{}",
            rec.rule_weight, rec.semantic_weight
        );
        info!("    Diversity factor: {}", rec.diversity_factor);
        info!(
            "    Cache: {} entries, TTL {:?}",
            rec.cache_capacity, rec.cache_ttl
        );
    }
}

impl ApiConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: get_env_or("API_PORT", "8000").parse().unwrap_or(defaults.port),
            host: get_env_or("API_HOST", &defaults.host),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            cors_enabled: get_env_or("API_CORS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
        }
    }
}

impl CatalogConfig {
    fn from_env() -> Self {
        Self {
            path: PathBuf::from(get_env_or("CATALOG_PATH", "fitness_program.json")),
        }
    }
}

impl FeedbackConfig {
    fn from_env() -> Self {
        let store_path = PathBuf::from(get_env_or("FEEDBACK_STORE_PATH", "user_feedback.json"));
        let backup_path = std::env::var("FEEDBACK_BACKUP_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| backup_path_for(&store_path));

        Self {
            store_path,
            backup_path,
        }
    }
}

impl RecommendationConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            content_weight: get_env_parsed_or("REC_CONTENT_WEIGHT", defaults.content_weight)?,
            collab_weight: get_env_parsed_or("REC_COLLAB_WEIGHT", defaults.collab_weight)?,
            content_blend: get_env_parsed_or("REC_CONTENT_BLEND", defaults.content_blend)?,
            goal_blend: get_env_parsed_or("REC_GOAL_BLEND", defaults.goal_blend)?,
            rule_weight: get_env_parsed_or("REC_RULE_WEIGHT", defaults.rule_weight)?,
            semantic_weight: get_env_parsed_or("REC_SEMANTIC_WEIGHT", defaults.semantic_weight)?,
            diversity_factor: get_env_parsed_or(
                "REC_DIVERSITY_FACTOR",
                defaults.diversity_factor,
            )?,
            cache_ttl: Duration::from_secs(get_env_parsed_or("REC_CACHE_TTL_SECS", 3600u64)?),
            cache_capacity: get_env_parsed_or("REC_CACHE_CAPACITY", defaults.cache_capacity)?,
            default_results: get_env_parsed_or("REC_DEFAULT_RESULTS", defaults.default_results)?,
            max_results: get_env_parsed_or("REC_MAX_RESULTS", defaults.max_results)?,
            goal_matching: get_env_parsed_or("REC_GOAL_MATCHING", defaults.goal_matching)?,
            semantic_matching: get_env_parsed_or(
                "REC_SEMANTIC_MATCHING",
                defaults.semantic_matching,
            )?,
        })
    }

    /// Validate weights and bounds
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("REC_CONTENT_WEIGHT", self.content_weight),
            ("REC_COLLAB_WEIGHT", self.collab_weight),
            ("REC_CONTENT_BLEND", self.content_blend),
            ("REC_GOAL_BLEND", self.goal_blend),
            ("REC_RULE_WEIGHT", self.rule_weight),
            ("REC_SEMANTIC_WEIGHT", self.semantic_weight),
            ("REC_DIVERSITY_FACTOR", self.diversity_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig {
                    key,
                    message: format!("{} is outside [0, 1]", value).into(),
                });
            }
        }

        if self.content_blend + self.goal_blend <= 0.0 {
            return Err(Error::InvalidConfig {
                key: "REC_GOAL_BLEND",
                message: "content and goal blend cannot both be zero".into(),
            });
        }

        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_CACHE_CAPACITY",
                message: "cache capacity must be at least 1".into(),
            });
        }

        if self.default_results == 0 || self.default_results > self.max_results {
            return Err(Error::InvalidConfig {
                key: "REC_DEFAULT_RESULTS",
                message: format!(
                    "default results must be within 1..={}",
                    self.max_results
                )
                .into(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse an optional environment variable, rejecting unparsable values
fn get_env_parsed_or<T: FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Default backup location next to the primary store
pub fn backup_path_for(store_path: &std::path::Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    store_path.with_file_name(name)
}
