use crate::config::AppConfig;
use crate::llm::{ClaudeClient, LlmError};
use crate::models::{Activity, UserPreferences};
use crate::strava::{StravaConfig, StravaError};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub type DbPool = SqlitePool;

/// Application state shared by every handler
pub struct AppState {
  pub db: DbPool,
  pub config: AppConfig,
}

impl AppState {
  pub fn strava_config(&self) -> Result<&StravaConfig, StravaError> {
    self
      .config
      .strava
      .as_ref()
      .ok_or_else(|| StravaError::MissingConfig("STRAVA_CLIENT_ID".into()))
  }

  pub fn claude(&self) -> Result<ClaudeClient, LlmError> {
    self
      .config
      .llm
      .clone()
      .map(ClaudeClient::new)
      .ok_or(LlmError::MissingApiKey)
  }
}

/// Open the connection pool and run migrations
pub async fn initialize_db(database_url: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
  tracing::info!(url = database_url, "Initializing database");

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  tracing::info!("Database initialized successfully");

  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// Activities
/// ---------------------------------------------------------------------------

const ACTIVITY_COLUMNS: &str = "id, user_id, name, activity_type, start_date, start_date_local, \
  distance, moving_time, elapsed_time, average_speed, max_speed, average_heartrate, \
  max_heartrate, total_elevation_gain, calories, ai_analysis";

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityFilter {
  /// Local start at or after this time
  pub since: Option<NaiveDateTime>,
  pub runs_only: bool,
  pub limit: Option<i64>,
}

/// Cached activities for `user_id`, newest first
pub async fn load_activities(
  db: &DbPool,
  user_id: &str,
  filter: ActivityFilter,
) -> Result<Vec<Activity>, sqlx::Error> {
  let mut sql = format!("SELECT {} FROM activities WHERE user_id = ?1", ACTIVITY_COLUMNS);
  if filter.since.is_some() {
    sql.push_str(" AND start_date_local >= ?2");
  }
  if filter.runs_only {
    sql.push_str(" AND activity_type = 'Run'");
  }
  sql.push_str(" ORDER BY start_date_local DESC LIMIT ?3");

  sqlx::query_as::<_, Activity>(&sql)
    .bind(user_id)
    .bind(filter.since)
    .bind(filter.limit.unwrap_or(-1))
    .fetch_all(db)
    .await
}

pub async fn load_activity(
  db: &DbPool,
  user_id: &str,
  id: i64,
) -> Result<Option<Activity>, sqlx::Error> {
  let sql = format!("SELECT {} FROM activities WHERE user_id = ?1 AND id = ?2", ACTIVITY_COLUMNS);
  sqlx::query_as::<_, Activity>(&sql)
    .bind(user_id)
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Insert or merge a batch in one transaction. Every imported field is
/// overwritten; `ai_analysis` is kept. Returns how many rows were new.
pub async fn upsert_activities(db: &DbPool, activities: &[Activity]) -> Result<usize, sqlx::Error> {
  let mut tx = db.begin().await?;
  let mut inserted = 0;

  for activity in activities {
    let exists: Option<(i64,)> =
      sqlx::query_as("SELECT id FROM activities WHERE user_id = ?1 AND id = ?2")
        .bind(&activity.user_id)
        .bind(activity.id)
        .fetch_optional(&mut *tx)
        .await?;

    sqlx::query(
      r#"
      INSERT INTO activities (
        user_id, id, name, activity_type, start_date, start_date_local,
        distance, moving_time, elapsed_time, average_speed, max_speed,
        average_heartrate, max_heartrate, total_elevation_gain, calories
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
      ON CONFLICT(user_id, id) DO UPDATE SET
        name = excluded.name,
        activity_type = excluded.activity_type,
        start_date = excluded.start_date,
        start_date_local = excluded.start_date_local,
        distance = excluded.distance,
        moving_time = excluded.moving_time,
        elapsed_time = excluded.elapsed_time,
        average_speed = excluded.average_speed,
        max_speed = excluded.max_speed,
        average_heartrate = excluded.average_heartrate,
        max_heartrate = excluded.max_heartrate,
        total_elevation_gain = excluded.total_elevation_gain,
        calories = excluded.calories,
        imported_at = CURRENT_TIMESTAMP
      "#,
    )
    .bind(&activity.user_id)
    .bind(activity.id)
    .bind(&activity.name)
    .bind(&activity.activity_type)
    .bind(activity.start_date)
    .bind(activity.start_date_local)
    .bind(activity.distance)
    .bind(activity.moving_time)
    .bind(activity.elapsed_time)
    .bind(activity.average_speed)
    .bind(activity.max_speed)
    .bind(activity.average_heartrate)
    .bind(activity.max_heartrate)
    .bind(activity.total_elevation_gain)
    .bind(activity.calories)
    .execute(&mut *tx)
    .await?;

    if exists.is_none() {
      inserted += 1;
    }
  }

  tx.commit().await?;
  Ok(inserted)
}

pub async fn save_activity_analysis(
  db: &DbPool,
  user_id: &str,
  id: i64,
  analysis: &str,
) -> Result<(), sqlx::Error> {
  sqlx::query("UPDATE activities SET ai_analysis = ?1 WHERE user_id = ?2 AND id = ?3")
    .bind(analysis)
    .bind(user_id)
    .bind(id)
    .execute(db)
    .await?;
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Preferences
/// ---------------------------------------------------------------------------

type PreferencesRow = (
  Option<i64>,
  Option<i64>,
  Option<i64>,
  String,
  Option<i64>,
  String,
  String,
  String,
  bool,
);

/// Stored preferences, or defaults for a user who never saved any
pub async fn load_preferences(db: &DbPool, user_id: &str) -> Result<UserPreferences, sqlx::Error> {
  let row: Option<PreferencesRow> = sqlx::query_as(
    "SELECT max_hr, lthr, resting_hr, zone_method, age, units, time_format, privacy, notifications
     FROM user_settings WHERE user_id = ?1",
  )
  .bind(user_id)
  .fetch_optional(db)
  .await?;

  Ok(match row {
    Some((max_hr, lthr, resting_hr, zone_method, age, units, time_format, privacy, notifications)) => {
      UserPreferences {
        max_hr,
        lthr,
        resting_hr,
        zone_method: zone_method.parse().unwrap_or_default(),
        age,
        units,
        time_format,
        privacy,
        notifications,
      }
    }
    None => UserPreferences::default(),
  })
}

pub async fn save_preferences(
  db: &DbPool,
  user_id: &str,
  prefs: &UserPreferences,
) -> Result<(), sqlx::Error> {
  sqlx::query(
    r#"
    INSERT INTO user_settings (
      user_id, max_hr, lthr, resting_hr, zone_method, age,
      units, time_format, privacy, notifications, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, CURRENT_TIMESTAMP)
    ON CONFLICT(user_id) DO UPDATE SET
      max_hr = excluded.max_hr,
      lthr = excluded.lthr,
      resting_hr = excluded.resting_hr,
      zone_method = excluded.zone_method,
      age = excluded.age,
      units = excluded.units,
      time_format = excluded.time_format,
      privacy = excluded.privacy,
      notifications = excluded.notifications,
      updated_at = CURRENT_TIMESTAMP
    "#,
  )
  .bind(user_id)
  .bind(prefs.max_hr)
  .bind(prefs.lthr)
  .bind(prefs.resting_hr)
  .bind(prefs.zone_method.as_str())
  .bind(prefs.age)
  .bind(&prefs.units)
  .bind(&prefs.time_format)
  .bind(&prefs.privacy)
  .bind(prefs.notifications)
  .execute(db)
  .await?;

  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ZoneMethod;
  use crate::test_utils::*;
  use serial_test::serial;

  #[tokio::test]
  #[serial]
  async fn test_upsert_merges_and_keeps_analysis() {
    let pool = setup_test_db().await;
    let mut activity = mock_activity(1, "Run", 5000.0);

    assert_eq!(upsert_activities(&pool, &[activity.clone()]).await.unwrap(), 1);
    save_activity_analysis(&pool, TEST_USER, 1, "Solid aerobic run").await.unwrap();

    activity.name = "Renamed Run".to_string();
    activity.distance = 5200.0;
    assert_eq!(upsert_activities(&pool, &[activity]).await.unwrap(), 0);

    let stored = load_activity(&pool, TEST_USER, 1).await.unwrap().unwrap();
    assert_eq!(stored.name, "Renamed Run");
    assert_eq!(stored.distance, 5200.0);
    assert_eq!(stored.ai_analysis.as_deref(), Some("Solid aerobic run"));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_load_activities_filters() {
    let pool = setup_test_db().await;
    let mut ride = mock_activity(2, "Ride", 30_000.0);
    ride.start_date_local = naive_date(2024, 3, 2).and_hms_opt(9, 0, 0).unwrap();
    let mut old_run = mock_activity(3, "Run", 8_000.0);
    old_run.start_date_local = naive_date(2023, 1, 2).and_hms_opt(9, 0, 0).unwrap();
    let mut new_run = mock_activity(4, "Run", 10_000.0);
    new_run.start_date_local = naive_date(2024, 3, 3).and_hms_opt(9, 0, 0).unwrap();
    seed_activities(&pool, &[ride, old_run, new_run]).await;

    let all = load_activities(&pool, TEST_USER, ActivityFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, 4);

    let recent_runs = load_activities(
      &pool,
      TEST_USER,
      ActivityFilter {
        since: naive_date(2024, 1, 1).and_hms_opt(0, 0, 0),
        runs_only: true,
        limit: None,
      },
    )
    .await
    .unwrap();
    assert_eq!(recent_runs.iter().map(|a| a.id).collect::<Vec<_>>(), vec![4]);

    let other_user = load_activities(&pool, "someone-else", ActivityFilter::default()).await.unwrap();
    assert!(other_user.is_empty());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_preferences_default_then_round_trip() {
    let pool = setup_test_db().await;

    let defaults = load_preferences(&pool, TEST_USER).await.unwrap();
    assert_eq!(defaults, UserPreferences::default());

    let prefs = UserPreferences {
      max_hr: Some(188),
      resting_hr: Some(48),
      zone_method: ZoneMethod::Hrr,
      notifications: false,
      ..UserPreferences::default()
    };
    save_preferences(&pool, TEST_USER, &prefs).await.unwrap();

    assert_eq!(load_preferences(&pool, TEST_USER).await.unwrap(), prefs);

    teardown_test_db(pool).await;
  }
}
