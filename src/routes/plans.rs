use super::coach::training_context;
use crate::aggregation::monday_of;
use crate::db::{self, ActivityFilter, AppState, DbPool};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::matcher::match_plan_to_activities;
use crate::models::{StoredPlan, TrainingPlan, TrainingSession};
use crate::plan_extractor::{default_plan, extract_plan, template_for_goal};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// ---------------------------------------------------------------------------
/// Generate
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
  pub goal: String,
}

/// Where a generated plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
  /// Structured JSON from the model
  Structured,
  /// Mined from the model's prose
  Extracted,
  Template,
}

#[derive(Debug, Serialize)]
pub struct GeneratedPlan {
  pub plan: TrainingPlan,
  pub source: PlanSource,
}

/// Ask the model for a JSON plan. Prose replies go through the text
/// extractor, and the goal's template covers everything else including a
/// missing API key.
pub async fn generate(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(request): Json<GenerateRequest>,
) -> Result<Json<GeneratedPlan>, ApiError> {
  let goal = request.goal.trim();
  if goal.is_empty() {
    return Err(ApiError::InvalidInput("Goal must not be empty".to_string()));
  }

  let Ok(claude) = state.claude() else {
    tracing::info!(user = caller.id(), "No AI coach configured, using template plan");
    return Ok(Json(GeneratedPlan {
      plan: template_for_goal(goal),
      source: PlanSource::Template,
    }));
  };

  let context = training_context(&state, caller.id()).await?;
  let (structured, raw) = claude.generate_plan(goal, &context.to_string()).await?;

  let generated = match (structured, extract_plan(&raw)) {
    (Some(plan), _) if !plan.sessions.is_empty() => GeneratedPlan {
      plan,
      source: PlanSource::Structured,
    },
    (_, Some(plan)) => GeneratedPlan {
      plan,
      source: PlanSource::Extracted,
    },
    _ => GeneratedPlan {
      plan: template_for_goal(goal),
      source: PlanSource::Template,
    },
  };

  tracing::info!(user = caller.id(), source = ?generated.source, "Plan generated");
  Ok(Json(generated))
}

/// ---------------------------------------------------------------------------
/// Stored Plans
/// ---------------------------------------------------------------------------

type PlanRow = (i64, String, String, String, String, DateTime<Utc>);

async fn active_plan_id(db: &DbPool, user_id: &str) -> Result<Option<i64>, sqlx::Error> {
  let row: Option<(Option<i64>,)> =
    sqlx::query_as("SELECT active_plan_id FROM user_settings WHERE user_id = ?1")
      .bind(user_id)
      .fetch_optional(db)
      .await?;
  Ok(row.and_then(|(id,)| id))
}

fn stored_from(row: PlanRow, active: Option<i64>) -> StoredPlan {
  let (id, title, description, duration, sessions_json, created_at) = row;
  let sessions = serde_json::from_str(&sessions_json).unwrap_or_else(|e| {
    tracing::warn!(plan = id, error = %e, "Stored plan sessions are unreadable");
    Vec::new()
  });

  StoredPlan {
    id,
    plan: TrainingPlan {
      title,
      description,
      duration,
      sessions,
    },
    is_active: active == Some(id),
    created_at,
  }
}

async fn load_plan(db: &DbPool, user_id: &str, id: i64) -> Result<Option<StoredPlan>, sqlx::Error> {
  let row: Option<PlanRow> = sqlx::query_as(
    "SELECT id, title, description, duration, sessions_json, created_at
     FROM training_plans WHERE user_id = ?1 AND id = ?2",
  )
  .bind(user_id)
  .bind(id)
  .fetch_optional(db)
  .await?;

  let active = active_plan_id(db, user_id).await?;
  Ok(row.map(|row| stored_from(row, active)))
}

/// Saved plans, newest first
pub async fn list(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<Vec<StoredPlan>>, ApiError> {
  let rows: Vec<PlanRow> = sqlx::query_as(
    "SELECT id, title, description, duration, sessions_json, created_at
     FROM training_plans WHERE user_id = ?1 ORDER BY id DESC",
  )
  .bind(caller.id())
  .fetch_all(&state.db)
  .await?;

  let active = active_plan_id(&state.db, caller.id()).await?;
  Ok(Json(rows.into_iter().map(|row| stored_from(row, active)).collect()))
}

pub async fn save(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(plan): Json<TrainingPlan>,
) -> Result<Json<StoredPlan>, ApiError> {
  if plan.title.trim().is_empty() {
    return Err(ApiError::InvalidInput("Plan title must not be empty".to_string()));
  }
  if plan.sessions.is_empty() {
    return Err(ApiError::InvalidInput("Plan needs at least one session".to_string()));
  }

  let sessions_json = serde_json::to_string(&plan.sessions)
    .map_err(|e| ApiError::InvalidInput(format!("Unreadable sessions: {}", e)))?;
  let created_at = Utc::now();

  let result = sqlx::query(
    "INSERT INTO training_plans (user_id, title, description, duration, sessions_json, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )
  .bind(caller.id())
  .bind(&plan.title)
  .bind(&plan.description)
  .bind(&plan.duration)
  .bind(sessions_json)
  .bind(created_at)
  .execute(&state.db)
  .await?;

  let id = result.last_insert_rowid();
  tracing::info!(user = caller.id(), plan = id, "Plan saved");

  Ok(Json(StoredPlan {
    id,
    plan,
    is_active: false,
    created_at,
  }))
}

/// Delete a plan, clearing the active pointer if it pointed here
pub async fn remove(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
  let mut tx = state.db.begin().await?;

  let deleted = sqlx::query("DELETE FROM training_plans WHERE user_id = ?1 AND id = ?2")
    .bind(caller.id())
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
  if deleted == 0 {
    return Err(ApiError::NotFound(format!("Plan {}", id)));
  }

  sqlx::query(
    "UPDATE user_settings SET active_plan_id = NULL WHERE user_id = ?1 AND active_plan_id = ?2",
  )
  .bind(caller.id())
  .bind(id)
  .execute(&mut *tx)
  .await?;

  tx.commit().await?;
  tracing::info!(user = caller.id(), plan = id, "Plan deleted");
  Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn activate(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Path(id): Path<i64>,
) -> Result<Json<StoredPlan>, ApiError> {
  let exists: Option<(i64,)> =
    sqlx::query_as("SELECT id FROM training_plans WHERE user_id = ?1 AND id = ?2")
      .bind(caller.id())
      .bind(id)
      .fetch_optional(&state.db)
      .await?;
  if exists.is_none() {
    return Err(ApiError::NotFound(format!("Plan {}", id)));
  }

  sqlx::query(
    r#"
    INSERT INTO user_settings (user_id, active_plan_id)
    VALUES (?1, ?2)
    ON CONFLICT(user_id) DO UPDATE SET
      active_plan_id = excluded.active_plan_id,
      updated_at = CURRENT_TIMESTAMP
    "#,
  )
  .bind(caller.id())
  .bind(id)
  .execute(&state.db)
  .await?;

  let plan = load_plan(&state.db, caller.id(), id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Plan {}", id)))?;
  Ok(Json(plan))
}

/// ---------------------------------------------------------------------------
/// This Week
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WeekView {
  /// None when the default template is shown
  pub plan_id: Option<i64>,
  pub title: String,
  pub description: String,
  pub duration: String,
  pub week_start: NaiveDate,
  pub sessions: Vec<TrainingSession>,
}

/// The active plan (or the default template) laid over Monday-Sunday of the
/// current week, with each day marked done by the longest run on it.
pub async fn active_week(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<WeekView>, ApiError> {
  let active = match active_plan_id(&state.db, caller.id()).await? {
    Some(id) => load_plan(&state.db, caller.id(), id).await?,
    None => None,
  };
  let (plan_id, plan) = match active {
    Some(stored) => (Some(stored.id), stored.plan),
    None => (None, default_plan()),
  };

  let today = Local::now().date_naive();
  let week_start = monday_of(today);
  let mut runs = db::load_activities(
    &state.db,
    caller.id(),
    ActivityFilter {
      since: week_start.and_hms_opt(0, 0, 0),
      runs_only: true,
      limit: None,
    },
  )
  .await?;
  // oldest first so the earlier run wins a distance tie
  runs.reverse();

  let title = plan.title.clone();
  let description = plan.description.clone();
  let duration = plan.duration.clone();
  let sessions = match_plan_to_activities(&plan.into_week(), &runs, today);

  Ok(Json(WeekView {
    plan_id,
    title,
    description,
    duration,
    week_start,
    sessions,
  }))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
