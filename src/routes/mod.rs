pub mod analysis;
pub mod coach;
pub mod plans;
pub mod strava;

use crate::db::{self, ActivityFilter, AppState};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::models::Activity;
use crate::units::{duration_label, pace_label};
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

/// The full HTTP surface
pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/api/activities", get(list_activities))
    .route("/api/activities/:id/analysis", post(analyze_activity))
    // Strava
    .route("/api/strava/auth", get(strava::auth_url))
    .route("/api/strava/callback", get(strava::callback))
    .route("/api/strava/status", get(strava::status))
    .route("/api/strava/refresh", post(strava::refresh))
    .route("/api/strava/disconnect", post(strava::disconnect))
    .route("/api/strava/import", post(strava::import_all))
    .route("/api/strava/sync", post(strava::sync_recent))
    // Analysis
    .route(
      "/api/preferences",
      get(analysis::get_preferences).put(analysis::update_preferences),
    )
    .route("/api/zones", get(analysis::zones))
    .route("/api/analysis/zone2", get(analysis::zone2))
    .route("/api/stats", get(analysis::stats))
    .route("/api/fitness-summary", get(analysis::fitness_summary))
    // Coach
    .route("/api/coach/chat", post(coach::chat))
    .route("/api/coach/history", get(coach::history))
    // Plans
    .route("/api/plans/generate", post(plans::generate))
    .route("/api/plans", get(plans::list).post(plans::save))
    .route("/api/plans/active/week", get(plans::active_week))
    .route("/api/plans/:id", delete(plans::remove))
    .route("/api/plans/:id/activate", post(plans::activate))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
  Json(json!({ "status": "ok" }))
}

/// ---------------------------------------------------------------------------
/// Activities
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ActivityListQuery {
  pub limit: Option<i64>,
}

/// Activity plus display-ready pace and duration
#[derive(Debug, Serialize)]
pub struct ActivityView {
  #[serde(flatten)]
  pub activity: Activity,
  pub pace_label: String,
  pub duration_label: String,
}

impl From<Activity> for ActivityView {
  fn from(activity: Activity) -> Self {
    Self {
      pace_label: pace_label(activity.speed()),
      duration_label: duration_label(activity.moving_time),
      activity,
    }
  }
}

async fn list_activities(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Query(query): Query<ActivityListQuery>,
) -> Result<Json<Vec<ActivityView>>, ApiError> {
  let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 500);
  let activities = db::load_activities(
    &state.db,
    caller.id(),
    ActivityFilter {
      limit: Some(limit),
      ..ActivityFilter::default()
    },
  )
  .await?;

  Ok(Json(activities.into_iter().map(ActivityView::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct ActivityAnalysis {
  pub id: i64,
  pub analysis: String,
}

/// Ask the coach about one run and attach the answer to the activity
async fn analyze_activity(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Path(id): Path<i64>,
) -> Result<Json<ActivityAnalysis>, ApiError> {
  let activity = db::load_activity(&state.db, caller.id(), id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Activity {}", id)))?;

  let claude = state.claude()?;
  let view = ActivityView::from(activity);
  let activity_json = serde_json::to_string_pretty(&view).unwrap_or_default();
  let analysis = claude.analyze_activity(&activity_json).await?;

  db::save_activity_analysis(&state.db, caller.id(), id, &analysis).await?;
  tracing::info!(user = caller.id(), activity = id, "Stored activity analysis");

  Ok(Json(ActivityAnalysis { id, analysis }))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
