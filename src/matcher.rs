//! Activity-to-plan matcher
//!
//! Lines a seven-day plan up against the current Monday-Sunday week and
//! marks a session done when a run was recorded on its day.

use crate::aggregation::monday_of;
use crate::models::{Activity, ActualActivity, TrainingSession};
use crate::units::{duration_label, pace_decimal, round1};
use chrono::{Duration, NaiveDate};

/// Match `week` (Monday first) against `activities` for the week containing
/// `today`. Returns a new week; sessions without a run on their day are
/// returned unchanged.
pub fn match_plan_to_activities(
  week: &[TrainingSession],
  activities: &[Activity],
  today: NaiveDate,
) -> Vec<TrainingSession> {
  let monday = monday_of(today);

  week
    .iter()
    .enumerate()
    .map(|(offset, session)| {
      let date = monday + Duration::days(offset as i64);
      match longest_run_on(activities, date) {
        Some(run) => TrainingSession {
          completed: true,
          actual_activity: Some(actual_from(run)),
          ..session.clone()
        },
        None => session.clone(),
      }
    })
    .collect()
}

/// Longest run on `date`, first one wins a tie.
fn longest_run_on(activities: &[Activity], date: NaiveDate) -> Option<&Activity> {
  activities
    .iter()
    .filter(|a| a.is_run() && a.start_date_local.date() == date)
    .fold(None, |best: Option<&Activity>, candidate| match best {
      Some(current) if candidate.distance > current.distance => Some(candidate),
      Some(current) => Some(current),
      None => Some(candidate),
    })
}

fn actual_from(activity: &Activity) -> ActualActivity {
  ActualActivity {
    name: activity.name.clone(),
    distance: round1(activity.distance / 1000.0),
    duration: duration_label(activity.moving_time),
    pace: round1(pace_decimal(activity.speed())),
  }
}
