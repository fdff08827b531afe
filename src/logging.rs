//! Tracing subscriber setup

use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "info,sqlx=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
  #[default]
  Pretty,
  Json,
  Compact,
}

impl FromStr for LogFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "pretty" => Ok(Self::Pretty),
      "json" => Ok(Self::Json),
      "compact" => Ok(Self::Compact),
      other => Err(format!("Unknown log format: {}", other)),
    }
  }
}

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
/// Calling this twice is harmless, the second install is ignored.
pub fn init(format: LogFormat) {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
  let registry = tracing_subscriber::registry().with(env_filter);

  let result = match format {
    LogFormat::Json => registry
      .with(fmt::layer().json().with_current_span(true).with_target(true))
      .try_init(),
    LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    LogFormat::Compact => registry
      .with(fmt::layer().compact().with_target(false))
      .try_init(),
  };

  if result.is_err() {
    tracing::debug!("Tracing subscriber already installed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_log_format_from_str() {
    assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
    assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
    assert!("xml".parse::<LogFormat>().is_err());
  }

  #[test]
  fn test_init_twice_does_not_panic() {
    init(LogFormat::Compact);
    init(LogFormat::Json);
  }
}
