use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded workout, cached verbatim from the fitness platform.
///
/// `id` is the platform's identifier. Rows are keyed by `(user_id, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
  pub id: i64,
  pub user_id: String,
  pub name: String,
  pub activity_type: String,
  pub start_date: DateTime<Utc>,
  /// Wall-clock start in the athlete's timezone (no offset attached)
  pub start_date_local: NaiveDateTime,
  /// Meters
  pub distance: f64,
  /// Seconds
  pub moving_time: i64,
  /// Seconds
  pub elapsed_time: i64,
  /// m/s
  pub average_speed: Option<f64>,
  pub max_speed: Option<f64>,
  pub average_heartrate: Option<f64>,
  pub max_heartrate: Option<f64>,
  pub total_elevation_gain: Option<f64>,
  pub calories: Option<f64>,
  pub ai_analysis: Option<String>,
}

impl Activity {
  pub fn is_run(&self) -> bool {
    self.activity_type == "Run"
  }

  /// Average heart rate, treating 0 the same as missing.
  pub fn heart_rate(&self) -> Option<f64> {
    self.average_heartrate.filter(|hr| *hr > 0.0)
  }

  /// Average speed, or 0.0 when the platform did not report one.
  pub fn speed(&self) -> f64 {
    self.average_speed.unwrap_or(0.0)
  }
}
