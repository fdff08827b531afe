//! Test utilities and helpers for unit and router tests
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - Router request helpers
//! - Helper assertions

use crate::config::AppConfig;
use crate::db::AppState;
use crate::llm::LlmConfig;
use crate::models::{Activity, UserPreferences, ZoneMethod};
use crate::strava::{StravaActivity, StravaConfig};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// User id every seeded row belongs to
pub const TEST_USER: &str = "test-user";

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Config for router tests: test user as default identity, no external
/// services and no import delay
pub fn test_config() -> AppConfig {
  let mut config = AppConfig {
    default_user_id: TEST_USER.to_string(),
    ..AppConfig::default()
  };
  config.import.page_delay = Duration::ZERO;
  config
}

pub fn test_state(pool: &SqlitePool, config: AppConfig) -> Arc<AppState> {
  Arc::new(AppState {
    db: pool.clone(),
    config,
  })
}

/// Seed the database with the given activities
pub async fn seed_activities(pool: &SqlitePool, activities: &[Activity]) {
  crate::db::upsert_activities(pool, activities)
    .await
    .expect("Failed to seed activities");
}

/// Seed the database with test preferences (max HR 190, LTHR 170, resting 50)
pub async fn seed_preferences(pool: &SqlitePool) -> UserPreferences {
  let prefs = mock_preferences();
  crate::db::save_preferences(pool, TEST_USER, &prefs)
    .await
    .expect("Failed to seed preferences");
  prefs
}

/// Store Strava tokens for the test user
pub async fn seed_strava_tokens(pool: &SqlitePool, expires_in: chrono::Duration) {
  sqlx::query(
    r#"
    INSERT INTO sync_state (user_id, source, access_token, refresh_token, token_expires_at)
    VALUES (?1, 'strava', 'test-access', 'test-refresh', ?2)
    "#,
  )
  .bind(TEST_USER)
  .bind(Utc::now() + expires_in)
  .execute(pool)
  .await
  .expect("Failed to seed Strava tokens");
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn mock_preferences() -> UserPreferences {
  UserPreferences {
    max_hr: Some(190),
    lthr: Some(170),
    resting_hr: Some(50),
    zone_method: ZoneMethod::MaxHr,
    age: Some(32),
    ..UserPreferences::default()
  }
}

/// A 5:00/km activity starting 2024-03-11 07:00 local, no heart rate or
/// calories
pub fn mock_activity(id: i64, activity_type: &str, distance: f64) -> Activity {
  let moving_time = (distance * 0.3).round() as i64;
  let start_local = naive_date(2024, 3, 11)
    .and_hms_opt(7, 0, 0)
    .expect("valid time");

  Activity {
    id,
    user_id: TEST_USER.to_string(),
    name: format!("{} {}", activity_type, id),
    activity_type: activity_type.to_string(),
    start_date: Utc.from_utc_datetime(&start_local),
    start_date_local: start_local,
    distance,
    moving_time,
    elapsed_time: moving_time,
    average_speed: if moving_time > 0 {
      Some(distance / moving_time as f64)
    } else {
      None
    },
    max_speed: None,
    average_heartrate: None,
    max_heartrate: None,
    total_elevation_gain: None,
    calories: None,
    ai_analysis: None,
  }
}

/// A run on `date` at 07:00 local
pub fn mock_activity_on(id: i64, date: NaiveDate, distance: f64) -> Activity {
  let start_local: NaiveDateTime = date.and_hms_opt(7, 0, 0).expect("valid time");
  Activity {
    start_date: Utc.from_utc_datetime(&start_local),
    start_date_local: start_local,
    ..mock_activity(id, "Run", distance)
  }
}

/// Create a mock Strava activity for testing
pub fn mock_strava_activity() -> StravaActivity {
  StravaActivity {
    id: 123456,
    name: "Morning Run".to_string(),
    activity_type: "Run".to_string(),
    start_date: Utc::now(),
    start_date_local: None,
    elapsed_time: 3700,
    moving_time: 3600,
    distance: Some(10000.0),
    average_speed: Some(2.78),
    max_speed: Some(3.9),
    total_elevation_gain: Some(100.0),
    average_heartrate: Some(145.0),
    max_heartrate: Some(165.0),
    calories: None,
  }
}

pub fn mock_strava_config(base_url: &str) -> StravaConfig {
  StravaConfig {
    client_id: "test-client".to_string(),
    client_secret: "test-secret".to_string(),
    redirect_uri: "http://localhost:3000/api/strava/callback".to_string(),
    auth_url: "https://www.strava.com/oauth/authorize".to_string(),
    token_url: format!("{}/oauth/token", base_url),
    api_base: base_url.to_string(),
  }
}

pub fn mock_llm_config(base_url: &str) -> LlmConfig {
  LlmConfig {
    api_key: "test-key".to_string(),
    api_url: format!("{}/v1/messages", base_url),
    model: "test-model".to_string(),
  }
}

/// Messages API response body carrying `text`
pub fn mock_claude_body(text: &str) -> String {
  serde_json::json!({
    "id": "msg_test",
    "type": "message",
    "role": "assistant",
    "model": "test-model",
    "content": [{"type": "text", "text": text}],
    "stop_reason": "end_turn",
    "usage": {"input_tokens": 12, "output_tokens": 5}
  })
  .to_string()
}

/// ---------------------------------------------------------------------------
/// Router Helpers
/// ---------------------------------------------------------------------------

/// Send one request through `app` and return status plus JSON body
/// (`Value::Null` for an empty body).
pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };

  let response = app
    .oneshot(builder.body(body).expect("Failed to build request"))
    .await
    .expect("Failed to execute request");

  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX)
    .await
    .expect("Failed to read response body");
  let json = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
  };

  (status, json)
}

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

pub fn naive_date(year: i32, month: u32, day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[tokio::test]
  #[serial]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN
        ('activities', 'user_settings', 'training_plans', 'sync_state', 'fitness_summaries', 'coach_messages')",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 6, "Expected 6 tables, got {:?}", tables);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let activity = mock_activity(1, "Run", 10_000.0);
    assert_eq!(activity.moving_time, 3000);
    assert!(activity.is_run());
    assert_eq!(activity.user_id, TEST_USER);

    let on_day = mock_activity_on(2, naive_date(2024, 2, 29), 5_000.0);
    assert_eq!(on_day.start_date_local.date(), naive_date(2024, 2, 29));

    let strava = mock_strava_activity();
    assert_eq!(strava.activity_type, "Run");
    assert_eq!(strava.distance, Some(10000.0));
  }
}
