//! Easy-run / Zone-2 classifier
//!
//! Runs with heart-rate telemetry are judged against the zone-2 band. Runs
//! without it are judged by relative effort: at least 15% slower than the
//! cohort's mean pace counts as easy.

use crate::models::{Activity, ZoneMethod};
use crate::units::{distance_km, pace_decimal, round1};
use crate::zones::{HeartRateZoneSet, ZoneBounds};
use serde::{Deserialize, Serialize};

/// Pace at or above `EASY_PACE_FACTOR * mean` is easy.
const EASY_PACE_FACTOR: f64 = 1.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
  HeartRate,
  Pace,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedActivity {
  #[serde(flatten)]
  pub activity: Activity,
  pub classification: ClassificationMethod,
  /// Zone-2 band used, heart-rate classification only
  #[serde(skip_serializing_if = "Option::is_none")]
  pub zone_bounds: Option<ZoneBounds>,
  /// min/km
  pub pace: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Zone2Summary {
  pub count: usize,
  /// km, one decimal
  pub total_distance: f64,
  /// min/km across classified runs, one decimal
  pub average_pace: f64,
  /// Share of the whole cohort, one decimal
  pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Zone2Analysis {
  pub method: ZoneMethod,
  pub zones: HeartRateZoneSet,
  pub classified: Vec<ClassifiedActivity>,
  pub other: Vec<Activity>,
  pub summary: Zone2Summary,
}

/// Partition `activities` into aerobic-base runs and everything else.
pub fn classify_zone2(
  activities: &[Activity],
  zones: &HeartRateZoneSet,
  method: ZoneMethod,
) -> Zone2Analysis {
  let paces: Vec<f64> = activities.iter().map(|a| pace_decimal(a.speed())).collect();
  let mean_pace = if paces.is_empty() {
    0.0
  } else {
    paces.iter().sum::<f64>() / paces.len() as f64
  };
  let easy_threshold = mean_pace * EASY_PACE_FACTOR;

  let mut classified = Vec::new();
  let mut other = Vec::new();

  for (activity, pace) in activities.iter().zip(paces) {
    let decision = match activity.heart_rate() {
      Some(hr) => zones
        .zone2
        .contains(hr)
        .then_some((ClassificationMethod::HeartRate, Some(zones.zone2))),
      None => (pace >= easy_threshold).then_some((ClassificationMethod::Pace, None)),
    };

    match decision {
      Some((classification, zone_bounds)) => classified.push(ClassifiedActivity {
        activity: activity.clone(),
        classification,
        zone_bounds,
        pace,
      }),
      None => other.push(activity.clone()),
    }
  }

  let summary = summarize(&classified, activities.len());

  Zone2Analysis {
    method,
    zones: *zones,
    classified,
    other,
    summary,
  }
}

fn summarize(classified: &[ClassifiedActivity], cohort_size: usize) -> Zone2Summary {
  if classified.is_empty() || cohort_size == 0 {
    return Zone2Summary::default();
  }

  let count = classified.len();
  let total_distance: f64 = classified
    .iter()
    .map(|c| distance_km(c.activity.distance))
    .sum();
  let average_pace = classified.iter().map(|c| c.pace).sum::<f64>() / count as f64;

  Zone2Summary {
    count,
    total_distance: round1(total_distance),
    average_pace: round1(average_pace),
    percentage: round1(count as f64 / cohort_size as f64 * 100.0),
  }
}
