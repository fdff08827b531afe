//! Environment configuration
//!
//! Read once at startup after `dotenvy` has loaded `.env`. Strava and Claude
//! credentials are optional: without them the matching endpoints answer
//! "not connected" instead of the server refusing to start.

use crate::aggregation::{AggregationOptions, HrMeanPolicy};
use crate::llm::LlmConfig;
use crate::logging::LogFormat;
use crate::strava::StravaConfig;
use crate::units::DEFAULT_CALORIES_PER_KM;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATABASE_URL: &str = "sqlite://run-coach.db?mode=rwc";
const DEFAULT_USER_ID: &str = "demo-user";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Invalid value for {key}: {value}")]
  Invalid { key: &'static str, value: String },
}

/// Bulk import safeguards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportLimits {
  /// Hard ceiling on pages fetched in one import
  pub max_pages: u32,
  pub per_page: u32,
  /// Fixed pause between pages
  pub page_delay: Duration,
}

impl Default for ImportLimits {
  fn default() -> Self {
    Self {
      max_pages: 20,
      per_page: 100,
      page_delay: Duration::from_millis(500),
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub bind_addr: String,
  pub database_url: String,
  /// Identity used when a request does not name one
  pub default_user_id: String,
  pub strava: Option<StravaConfig>,
  pub llm: Option<LlmConfig>,
  pub aggregation: AggregationOptions,
  pub summary_stale_days: i64,
  pub import: ImportLimits,
  pub log_format: LogFormat,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      bind_addr: DEFAULT_BIND_ADDR.to_string(),
      database_url: DEFAULT_DATABASE_URL.to_string(),
      default_user_id: DEFAULT_USER_ID.to_string(),
      strava: None,
      llm: None,
      aggregation: AggregationOptions::default(),
      summary_stale_days: 7,
      import: ImportLimits::default(),
      log_format: LogFormat::default(),
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let defaults = Self::default();

    let aggregation = AggregationOptions {
      calories_per_km: parse_var("CALORIES_PER_KM", DEFAULT_CALORIES_PER_KM)?,
      hr_mean_policy: parse_var("HR_MEAN_POLICY", HrMeanPolicy::default())?,
    };

    let import = ImportLimits {
      max_pages: parse_positive("IMPORT_MAX_PAGES", defaults.import.max_pages)?,
      per_page: parse_positive("IMPORT_PER_PAGE", defaults.import.per_page)?,
      page_delay: Duration::from_millis(parse_var("IMPORT_PAGE_DELAY_MS", 500u64)?),
    };

    Ok(Self {
      bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
      database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
      default_user_id: env::var("DEMO_USER_ID").unwrap_or(defaults.default_user_id),
      strava: StravaConfig::from_env().ok(),
      llm: LlmConfig::from_env().ok(),
      aggregation,
      summary_stale_days: parse_var("SUMMARY_STALE_DAYS", defaults.summary_stale_days)?,
      import,
      log_format: parse_var("LOG_FORMAT", defaults.log_format)?,
    })
  }
}

/// Parse `key` if set, otherwise use `default`. A set but malformed value is
/// an error rather than silently ignored.
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
  match env::var(key) {
    Ok(value) => value
      .trim()
      .parse()
      .map_err(|_| ConfigError::Invalid { key, value }),
    Err(_) => Ok(default),
  }
}

/// Like `parse_var`, but zero is rejected.
fn parse_positive(key: &'static str, default: u32) -> Result<u32, ConfigError> {
  match parse_var(key, default)? {
    0 => Err(ConfigError::Invalid {
      key,
      value: "0".to_string(),
    }),
    value => Ok(value),
  }
}
