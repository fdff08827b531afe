//! Training-plan text extractor
//!
//! Best-effort mining of a weekly plan out of free-form coach prose. This is
//! not a grammar: lines that mention a weekday become sessions, keywords pick
//! the session type, and a fixed template covers responses that clearly talk
//! about a plan but do not lay out the days.

use crate::models::{SessionType, TrainingPlan, TrainingSession, WEEKDAYS};
use regex::Regex;
use std::sync::LazyLock;

/// Fewer day lines than this is not treated as a plan.
const MIN_DAY_SESSIONS: usize = 3;
/// Length a response must exceed before the template fallback kicks in.
const FALLBACK_MIN_CHARS: usize = 200;
/// Descriptions this short are replaced by the generic one.
const MIN_DESCRIPTION_CHARS: usize = 10;

/// ---------------------------------------------------------------------------
/// Patterns
/// ---------------------------------------------------------------------------

static TITLE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"(?i)(?:plan|program|schedule)[^\n]*?(?:\bfor\b|:)[ \t]*([^\n]+)").ok()
});

static PLAN_DURATION_PATTERN: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(weeks?|months?)\b").ok());

static WEEKDAY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(
    r"(?i)\b(mon(?:day)?|tue(?:sday)?|wed(?:nesday)?|thu(?:rsday)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?)\b",
  )
  .ok()
});

static DISTANCE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"(?i)\b\d+(?:\.\d+)?(?:\s*-\s*\d+(?:\.\d+)?)?\s*(?:km|k|miles?|mi)\b").ok()
});

static DURATION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?\s*(minutes|mins?|hours?|hrs?)\b").ok()
});

/// Session keywords in priority order, first hit wins.
static SESSION_KEYWORDS: LazyLock<Vec<(SessionType, Option<Regex>)>> = LazyLock::new(|| {
  [
    (SessionType::Rest, r"(?i)\b(?:rest|off)"),
    (SessionType::Interval, r"(?i)\b(?:interval|speed|track)"),
    (SessionType::Tempo, r"(?i)\b(?:tempo|threshold)"),
    (SessionType::Long, r"(?i)\b(?:long|endurance)"),
    (SessionType::Easy, r"(?i)\b(?:easy|recovery|jog)"),
  ]
  .into_iter()
  .map(|(session_type, pattern)| (session_type, Regex::new(pattern).ok()))
  .collect()
});

/// ---------------------------------------------------------------------------
/// Extraction
/// ---------------------------------------------------------------------------

/// Extract a plan from coach text.
///
/// Returns the day sessions found (not padded to seven) when at least three
/// lines name a weekday, the fixed template when the text is a long answer
/// about a plan, and `None` otherwise.
pub fn extract_plan(text: &str) -> Option<TrainingPlan> {
  let sessions: Vec<TrainingSession> = text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .filter_map(parse_day_line)
    .collect();

  if sessions.len() >= MIN_DAY_SESSIONS {
    return Some(TrainingPlan {
      title: extract_title(text),
      description: "Weekly schedule from your coach".to_string(),
      duration: extract_plan_duration(text),
      sessions,
    });
  }

  if text.to_lowercase().contains("plan") && text.chars().count() > FALLBACK_MIN_CHARS {
    return Some(fallback_template(RaceTarget::detect(text)));
  }

  None
}

fn extract_title(text: &str) -> String {
  TITLE_PATTERN
    .as_ref()
    .and_then(|re| re.captures(text))
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str().trim().trim_end_matches(['.', ':', '!']).trim().to_string())
    .filter(|title| !title.is_empty())
    .unwrap_or_else(|| "Training Plan".to_string())
}

fn extract_plan_duration(text: &str) -> String {
  PLAN_DURATION_PATTERN
    .as_ref()
    .and_then(|re| re.find(text))
    .map(|m| m.as_str().to_string())
    .unwrap_or_else(|| "Variable".to_string())
}

/// A line naming a weekday becomes one session. The earliest weekday token
/// in the line decides the day.
fn parse_day_line(line: &str) -> Option<TrainingSession> {
  let day_match = WEEKDAY_PATTERN.as_ref()?.find(line)?;
  let prefix = day_match.as_str().get(..3)?.to_lowercase();
  let day = WEEKDAYS
    .iter()
    .find(|name| name[..3].to_lowercase() == prefix)?;

  let session_type = classify_line(line);
  let mut session = TrainingSession::new(day, session_type, session_type.default_description());

  if let Some(distance) = DISTANCE_PATTERN.as_ref().and_then(|re| re.find(line)) {
    session.distance = Some(distance.as_str().trim().to_string());
  }

  if let Some(duration) = extract_session_duration(line) {
    session.duration = duration;
  }

  let description = line[day_match.end()..]
    .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '*' | '.' | ','))
    .trim();
  if description.chars().count() > MIN_DESCRIPTION_CHARS {
    session.description = description.to_string();
  }

  Some(session)
}

fn classify_line(line: &str) -> SessionType {
  SESSION_KEYWORDS
    .iter()
    .find(|(_, pattern)| pattern.as_ref().is_some_and(|re| re.is_match(line)))
    .map(|(session_type, _)| *session_type)
    .unwrap_or(SessionType::Easy)
}

/// "45 minutes" -> "45 min", "1.5 hours" -> "90 min", "30-45 mins" -> "30-45 min".
fn extract_session_duration(line: &str) -> Option<String> {
  let caps = DURATION_PATTERN.as_ref()?.captures(line)?;
  let unit = caps.get(3)?.as_str().to_lowercase();
  let factor = if unit.starts_with('h') { 60.0 } else { 1.0 };

  let to_minutes = |raw: &str| -> Option<i64> {
    raw.parse::<f64>().ok().map(|value| (value * factor).round() as i64)
  };

  let low = to_minutes(caps.get(1)?.as_str())?;
  match caps.get(2).and_then(|m| to_minutes(m.as_str())) {
    Some(high) => Some(format!("{}-{} min", low, high)),
    None => Some(format!("{} min", low)),
  }
}

/// ---------------------------------------------------------------------------
/// Fallback Template
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceTarget {
  FiveK,
  TenK,
  HalfMarathon,
  Marathon,
  General,
}

impl RaceTarget {
  /// Pick the race a text talks about. Longer names are checked first so
  /// "half marathon" is not read as "marathon".
  pub fn detect(text: &str) -> Self {
    let lower = text.to_lowercase();
    if lower.contains("half marathon") || lower.contains("half-marathon") {
      RaceTarget::HalfMarathon
    } else if lower.contains("marathon") {
      RaceTarget::Marathon
    } else if lower.contains("10k") {
      RaceTarget::TenK
    } else if lower.contains("5k") {
      RaceTarget::FiveK
    } else {
      RaceTarget::General
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      RaceTarget::FiveK => "5K",
      RaceTarget::TenK => "10K",
      RaceTarget::HalfMarathon => "Half Marathon",
      RaceTarget::Marathon => "Marathon",
      RaceTarget::General => "running",
    }
  }

  fn typical_duration(&self) -> &'static str {
    match self {
      RaceTarget::FiveK => "6-8 weeks",
      RaceTarget::TenK => "8-10 weeks",
      RaceTarget::HalfMarathon => "10-12 weeks",
      RaceTarget::Marathon => "16-20 weeks",
      RaceTarget::General => "8-12 weeks",
    }
  }
}

/// The fixed seven-day week used when a response has no day breakdown.
pub fn fallback_template(race: RaceTarget) -> TrainingPlan {
  let title = match race {
    RaceTarget::General => "Running Training Plan".to_string(),
    other => format!("{} Training Plan", other.label()),
  };

  let week = [
    (SessionType::Easy, "Easy run at a conversational pace"),
    (SessionType::Interval, "Intervals: 6 x 800m at 5K effort with 400m jog recoveries"),
    (SessionType::Rest, "Rest day - recovery and light stretching"),
    (SessionType::Tempo, "Tempo run: 20 minutes at comfortably hard effort"),
    (SessionType::Rest, "Rest or gentle cross-training"),
    (SessionType::Long, "Long run at an easy pace, building each week"),
    (SessionType::Easy, "Recovery run, very easy effort"),
  ];

  let sessions = WEEKDAYS
    .iter()
    .zip(week)
    .map(|(day, (session_type, description))| TrainingSession::new(day, session_type, description))
    .collect();

  TrainingPlan {
    title,
    description: format!("A balanced week building toward your {} goal", race.label()),
    duration: race.typical_duration().to_string(),
    sessions,
  }
}

/// Template plan for a free-text goal such as "sub-2 half marathon".
pub fn template_for_goal(goal: &str) -> TrainingPlan {
  fallback_template(RaceTarget::detect(goal))
}

/// Plan shown when nothing else is available.
pub fn default_plan() -> TrainingPlan {
  fallback_template(RaceTarget::General)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
