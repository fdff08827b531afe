use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weekday names in plan order (Monday first).
pub const WEEKDAYS: [&str; 7] = [
  "Monday",
  "Tuesday",
  "Wednesday",
  "Thursday",
  "Friday",
  "Saturday",
  "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
  Easy,
  Tempo,
  Long,
  Interval,
  Race,
  Rest,
}

impl SessionType {
  /// Duration shown when the coach did not name one.
  pub fn default_duration(&self) -> &'static str {
    match self {
      SessionType::Rest => "Rest",
      SessionType::Interval | SessionType::Tempo => "45-60 min",
      SessionType::Long => "60-120 min",
      SessionType::Easy => "30-45 min",
      SessionType::Race => "Race day",
    }
  }

  pub fn default_description(&self) -> &'static str {
    match self {
      SessionType::Rest => "Rest day - recovery and light stretching",
      SessionType::Interval => "Interval session - fast repeats with recovery jogs",
      SessionType::Tempo => "Tempo run at comfortably hard effort",
      SessionType::Long => "Long run at an easy, conversational pace",
      SessionType::Easy => "Easy run at a relaxed, conversational pace",
      SessionType::Race => "Race day - warm up well and run your plan",
    }
  }
}

/// Stats of the activity that satisfied a planned session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualActivity {
  pub name: String,
  /// km, one decimal
  pub distance: f64,
  pub duration: String,
  /// min/km, one decimal
  pub pace: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
  pub day: String,
  #[serde(rename = "type")]
  pub session_type: SessionType,
  pub duration: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub distance: Option<String>,
  pub description: String,
  /// Only meaningful in the weekly view
  #[serde(default)]
  pub completed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub actual_activity: Option<ActualActivity>,
}

impl TrainingSession {
  pub fn new(day: &str, session_type: SessionType, description: &str) -> Self {
    Self {
      day: day.to_string(),
      session_type,
      duration: session_type.default_duration().to_string(),
      distance: None,
      description: description.to_string(),
      completed: false,
      actual_activity: None,
    }
  }

  pub fn rest(day: &str) -> Self {
    Self::new(day, SessionType::Rest, SessionType::Rest.default_description())
  }

  fn weekday_index(&self) -> Option<usize> {
    let day = self.day.trim().to_lowercase();
    WEEKDAYS
      .iter()
      .position(|name| name.to_lowercase() == day || name[..3].to_lowercase() == day)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
  pub title: String,
  pub description: String,
  /// Free text, e.g. "8-12 weeks"
  pub duration: String,
  pub sessions: Vec<TrainingSession>,
}

impl TrainingPlan {
  /// Materialize exactly seven sessions, Monday first.
  ///
  /// Sessions land in the slot of their weekday. Sessions with an
  /// unrecognized day name fill the first free slot, days nobody claimed
  /// become rest days and anything beyond seven is dropped.
  pub fn into_week(self) -> Vec<TrainingSession> {
    let mut slots: [Option<TrainingSession>; 7] = Default::default();
    let mut unplaced = Vec::new();

    for session in self.sessions {
      match session.weekday_index() {
        Some(idx) if slots[idx].is_none() => slots[idx] = Some(session),
        Some(_) => {}
        None => unplaced.push(session),
      }
    }

    for mut session in unplaced {
      if let Some(idx) = slots.iter().position(Option::is_none) {
        session.day = WEEKDAYS[idx].to_string();
        slots[idx] = Some(session);
      }
    }

    slots
      .into_iter()
      .enumerate()
      .map(|(idx, slot)| slot.unwrap_or_else(|| TrainingSession::rest(WEEKDAYS[idx])))
      .collect()
  }
}

/// A plan the user explicitly saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
  pub id: i64,
  #[serde(flatten)]
  pub plan: TrainingPlan,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
}
