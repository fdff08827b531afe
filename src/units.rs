//! Unit conversion and display formatting
//!
//! Raw sensor units (m/s, meters, seconds) come straight from the fitness
//! platform. Everything user-facing goes through these helpers.
//!
//! There are two pace conversions on purpose: `pace_decimal` floors the
//! seconds and feeds numeric aggregation, `pace_label` rounds them for the
//! "M:SS" string shown next to a single run.

use crate::models::Activity;

/// Fallback calorie estimate when the platform did not report one.
pub const DEFAULT_CALORIES_PER_KM: f64 = 65.0;

/// Pace in decimal minutes per km (5.5 == 5:30/km).
///
/// Returns 0.0 for a non-positive or non-finite speed.
pub fn pace_decimal(speed_mps: f64) -> f64 {
  match seconds_per_km(speed_mps) {
    Some(secs) => {
      let minutes = (secs / 60.0).floor();
      let seconds = (secs % 60.0).floor();
      minutes + seconds / 60.0
    }
    None => 0.0,
  }
}

/// Pace as a "M:SS" string, seconds rounded to the nearest whole second.
///
/// Returns "0:00" for a non-positive or non-finite speed.
pub fn pace_label(speed_mps: f64) -> String {
  match seconds_per_km(speed_mps) {
    Some(secs) => {
      let mut minutes = (secs / 60.0).floor() as i64;
      let mut seconds = (secs % 60.0).round() as i64;
      if seconds == 60 {
        minutes += 1;
        seconds = 0;
      }
      format!("{}:{:02}", minutes, seconds)
    }
    None => "0:00".to_string(),
  }
}

fn seconds_per_km(speed_mps: f64) -> Option<f64> {
  if speed_mps.is_finite() && speed_mps > 0.0 {
    Some(1000.0 / speed_mps)
  } else {
    None
  }
}

/// Meters to kilometers, two decimals.
pub fn distance_km(meters: f64) -> f64 {
  (meters / 10.0).round() / 100.0
}

/// `H:MM:SS` for an hour or more, otherwise `M:SS`.
pub fn duration_label(seconds: i64) -> String {
  let seconds = seconds.max(0);
  let hours = seconds / 3600;
  let minutes = (seconds % 3600) / 60;
  let secs = seconds % 60;

  if hours > 0 {
    format!("{}:{:02}:{:02}", hours, minutes, secs)
  } else {
    format!("{}:{:02}", minutes, secs)
  }
}

/// Reported calories if present and non-zero, otherwise
/// `round(distance_km * kcal_per_km)`.
pub fn calorie_estimate(activity: &Activity, kcal_per_km: f64) -> f64 {
  match activity.calories {
    Some(kcal) if kcal > 0.0 => kcal,
    _ => (distance_km(activity.distance) * kcal_per_km).round(),
  }
}

pub fn round1(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
