//! Aggregation engine: monthly, weekly and overall run statistics
//!
//! All folds are pure. Bucketing uses the activity's local start date so a
//! 23:30 run lands on the day the athlete ran it.

use crate::models::Activity;
use crate::units::{calorie_estimate, distance_km, pace_decimal, round1, DEFAULT_CALORIES_PER_KM};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const MONTH_BUCKETS: u32 = 12;
const WEEK_BUCKETS: i64 = 8;

/// ---------------------------------------------------------------------------
/// Options
/// ---------------------------------------------------------------------------

/// How runs without heart-rate data enter the mean heart rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrMeanPolicy {
  /// Missing readings count as 0 and stay in the denominator
  #[default]
  IncludeMissing,
  /// Only runs with a reading are averaged
  ExcludeMissing,
}

impl FromStr for HrMeanPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "include_missing" => Ok(Self::IncludeMissing),
      "exclude_missing" => Ok(Self::ExcludeMissing),
      other => Err(format!("Unknown heart-rate mean policy: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationOptions {
  pub calories_per_km: f64,
  pub hr_mean_policy: HrMeanPolicy,
}

impl Default for AggregationOptions {
  fn default() -> Self {
    Self {
      calories_per_km: DEFAULT_CALORIES_PER_KM,
      hr_mean_policy: HrMeanPolicy::IncludeMissing,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Output Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
  /// Abbreviated month name, e.g. "Mar"
  pub label: String,
  pub year: i32,
  pub month: u32,
  /// km
  pub distance: f64,
  /// hours
  pub time: f64,
  pub runs: usize,
  /// min/km, mean of per-run paces
  pub avg_pace: f64,
  pub avg_heart_rate: f64,
  pub avg_calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekBucket {
  /// ISO date of the Monday
  pub week_start: String,
  /// ISO date of the Sunday
  pub week_end: String,
  /// km
  pub distance: f64,
  pub runs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
  /// km
  pub total_distance: f64,
  /// hours
  pub total_time: f64,
  /// min/km
  pub avg_pace: f64,
  pub total_calories: f64,
  pub run_count: usize,
  pub avg_heart_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
  pub monthly: Vec<MonthBucket>,
  pub weekly: Vec<WeekBucket>,
  pub summary: Summary,
}

/// ---------------------------------------------------------------------------
/// Monthly
/// ---------------------------------------------------------------------------

#[derive(Default)]
struct MonthAccumulator {
  distance_m: f64,
  seconds: i64,
  pace_sum: f64,
  hr_sum: f64,
  hr_count: usize,
  calorie_sum: f64,
  runs: usize,
}

/// Twelve calendar months ending with the month of `today`. Only months
/// with at least one run are returned, oldest first.
pub fn aggregate_monthly(
  activities: &[Activity],
  today: NaiveDate,
  options: &AggregationOptions,
) -> Vec<MonthBucket> {
  let current_month = first_of_month(today);
  let months: Vec<NaiveDate> = (0..MONTH_BUCKETS)
    .rev()
    .filter_map(|back| current_month.checked_sub_months(Months::new(back)))
    .collect();
  let mut buckets: Vec<MonthAccumulator> = months.iter().map(|_| MonthAccumulator::default()).collect();

  for activity in activities {
    let month = first_of_month(activity.start_date_local.date());
    let Some(idx) = months.iter().position(|m| *m == month) else {
      continue;
    };
    let bucket = &mut buckets[idx];
    bucket.distance_m += activity.distance;
    bucket.seconds += activity.moving_time;
    bucket.pace_sum += pace_decimal(activity.speed());
    bucket.calorie_sum += calorie_estimate(activity, options.calories_per_km);
    bucket.runs += 1;
    push_heart_rate(activity, options.hr_mean_policy, &mut bucket.hr_sum, &mut bucket.hr_count);
  }

  months
    .iter()
    .zip(buckets)
    .filter(|(_, acc)| acc.runs > 0)
    .map(|(month, acc)| {
      let runs = acc.runs as f64;
      MonthBucket {
        label: month.format("%b").to_string(),
        year: month.year(),
        month: month.month(),
        distance: round1(acc.distance_m / 1000.0),
        time: round1(acc.seconds as f64 / 3600.0),
        runs: acc.runs,
        avg_pace: round1(acc.pace_sum / runs),
        avg_heart_rate: mean_rounded(acc.hr_sum, acc.hr_count),
        avg_calories: (acc.calorie_sum / runs).round(),
      }
    })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Weekly
/// ---------------------------------------------------------------------------

/// Eight Monday-starting weeks ending with the week of `today`, oldest
/// first. Empty weeks are kept.
pub fn aggregate_weekly(activities: &[Activity], today: NaiveDate) -> Vec<WeekBucket> {
  let current_monday = monday_of(today);

  (0..WEEK_BUCKETS)
    .rev()
    .map(|back| {
      let start = current_monday - Duration::weeks(back);
      let end = start + Duration::days(6);

      let (meters, runs) = activities
        .iter()
        .filter(|a| {
          let day = a.start_date_local.date();
          day >= start && day <= end
        })
        .fold((0.0, 0), |(meters, runs), a| (meters + a.distance, runs + 1));

      WeekBucket {
        week_start: start.format("%Y-%m-%d").to_string(),
        week_end: end.format("%Y-%m-%d").to_string(),
        distance: round1(meters / 1000.0),
        runs,
      }
    })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Summary
/// ---------------------------------------------------------------------------

pub fn summarize(activities: &[Activity], options: &AggregationOptions) -> Summary {
  if activities.is_empty() {
    return Summary::default();
  }

  let count = activities.len() as f64;
  let mut hr_sum = 0.0;
  let mut hr_count = 0;
  for activity in activities {
    push_heart_rate(activity, options.hr_mean_policy, &mut hr_sum, &mut hr_count);
  }

  let total_km: f64 = activities.iter().map(|a| distance_km(a.distance)).sum();
  let total_seconds: i64 = activities.iter().map(|a| a.moving_time).sum();
  let pace_sum: f64 = activities.iter().map(|a| pace_decimal(a.speed())).sum();
  let calories: f64 = activities
    .iter()
    .map(|a| calorie_estimate(a, options.calories_per_km))
    .sum();

  Summary {
    total_distance: round1(total_km),
    total_time: round1(total_seconds as f64 / 3600.0),
    avg_pace: round1(pace_sum / count),
    total_calories: calories.round(),
    run_count: activities.len(),
    avg_heart_rate: mean_rounded(hr_sum, hr_count),
  }
}

pub fn compute_stats(activities: &[Activity], today: NaiveDate, options: &AggregationOptions) -> Stats {
  Stats {
    monthly: aggregate_monthly(activities, today, options),
    weekly: aggregate_weekly(activities, today),
    summary: summarize(activities, options),
  }
}

/// ---------------------------------------------------------------------------
/// Helpers
/// ---------------------------------------------------------------------------

fn push_heart_rate(activity: &Activity, policy: HrMeanPolicy, sum: &mut f64, count: &mut usize) {
  match (activity.heart_rate(), policy) {
    (Some(hr), _) => {
      *sum += hr;
      *count += 1;
    }
    (None, HrMeanPolicy::IncludeMissing) => *count += 1,
    (None, HrMeanPolicy::ExcludeMissing) => {}
  }
}

fn mean_rounded(sum: f64, count: usize) -> f64 {
  if count == 0 {
    0.0
  } else {
    (sum / count as f64).round()
  }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
  date - Duration::days(date.weekday().num_days_from_monday() as i64)
}
