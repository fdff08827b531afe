use super::coach::training_context;
use crate::aggregation::{compute_stats, Stats};
use crate::classifier::{classify_zone2, Zone2Analysis};
use crate::db::{self, ActivityFilter, AppState};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::models::{PreferencesUpdate, UserPreferences, ZoneMethod};
use crate::zones::{HeartRateZoneSet, ZoneInputs};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Local, Months, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// ---------------------------------------------------------------------------
/// Preferences
/// ---------------------------------------------------------------------------

pub async fn get_preferences(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<UserPreferences>, ApiError> {
  Ok(Json(db::load_preferences(&state.db, caller.id()).await?))
}

/// Merge the supplied fields into the stored settings. Nothing is written
/// when the merged result fails validation.
pub async fn update_preferences(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(update): Json<PreferencesUpdate>,
) -> Result<Json<UserPreferences>, ApiError> {
  let current = db::load_preferences(&state.db, caller.id()).await?;
  let merged = update.apply(&current)?;
  db::save_preferences(&state.db, caller.id(), &merged).await?;

  tracing::info!(user = caller.id(), method = %merged.zone_method, "Preferences updated");
  Ok(Json(merged))
}

/// ---------------------------------------------------------------------------
/// Heart-Rate Zones
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ZonesResponse {
  /// Method the user asked for
  pub method: ZoneMethod,
  /// Method used after falling back for missing inputs
  pub effective_method: ZoneMethod,
  pub zones: HeartRateZoneSet,
}

pub async fn zones(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<ZonesResponse>, ApiError> {
  let prefs = db::load_preferences(&state.db, caller.id()).await?;
  let inputs = ZoneInputs::from(&prefs);

  Ok(Json(ZonesResponse {
    method: prefs.zone_method,
    effective_method: inputs.effective_method(),
    zones: inputs.compute(),
  }))
}

/// ---------------------------------------------------------------------------
/// Zone-2 Analysis
/// ---------------------------------------------------------------------------

const ZONE2_WINDOW_MONTHS: u32 = 6;

/// Classify the last six months of runs against the user's zone 2
pub async fn zone2(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<Zone2Analysis>, ApiError> {
  let prefs = db::load_preferences(&state.db, caller.id()).await?;
  let inputs = ZoneInputs::from(&prefs);

  let now = Local::now().naive_local();
  let since = now
    .checked_sub_months(Months::new(ZONE2_WINDOW_MONTHS))
    .unwrap_or(now);
  let runs = db::load_activities(
    &state.db,
    caller.id(),
    ActivityFilter {
      since: Some(since),
      runs_only: true,
      limit: None,
    },
  )
  .await?;

  let analysis = classify_zone2(&runs, &inputs.compute(), inputs.effective_method());
  tracing::debug!(
    user = caller.id(),
    runs = runs.len(),
    easy = analysis.summary.count,
    "Zone 2 analysis complete"
  );

  Ok(Json(analysis))
}

/// ---------------------------------------------------------------------------
/// Stats
/// ---------------------------------------------------------------------------

pub async fn stats(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<Stats>, ApiError> {
  let runs = db::load_activities(
    &state.db,
    caller.id(),
    ActivityFilter {
      runs_only: true,
      ..ActivityFilter::default()
    },
  )
  .await?;

  let today = Local::now().date_naive();
  Ok(Json(compute_stats(&runs, today, &state.config.aggregation)))
}

/// ---------------------------------------------------------------------------
/// Fitness Summary
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
  /// Regenerate even when the cached summary is fresh
  #[serde(default)]
  pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct FitnessSummary {
  pub summary: String,
  pub generated_at: DateTime<Utc>,
  pub cached: bool,
}

/// Cached LLM summary, regenerated once it is older than the configured
/// number of days. Concurrent regenerations race; the last write wins.
pub async fn fitness_summary(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Query(query): Query<SummaryQuery>,
) -> Result<Json<FitnessSummary>, ApiError> {
  let cached: Option<(String, DateTime<Utc>)> =
    sqlx::query_as("SELECT summary, generated_at FROM fitness_summaries WHERE user_id = ?1")
      .bind(caller.id())
      .fetch_optional(&state.db)
      .await?;

  let max_age = Duration::days(state.config.summary_stale_days);
  if let Some((summary, generated_at)) = cached {
    if !query.refresh && Utc::now() - generated_at < max_age {
      return Ok(Json(FitnessSummary {
        summary,
        generated_at,
        cached: true,
      }));
    }
  }

  let claude = state.claude()?;
  let context = training_context(&state, caller.id()).await?;
  let summary = claude.fitness_summary(&context.to_string()).await?;
  let generated_at = Utc::now();

  sqlx::query(
    r#"
    INSERT INTO fitness_summaries (user_id, summary, generated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(user_id) DO UPDATE SET
      summary = excluded.summary,
      generated_at = excluded.generated_at
    "#,
  )
  .bind(caller.id())
  .bind(&summary)
  .bind(generated_at)
  .execute(&state.db)
  .await?;

  tracing::info!(user = caller.id(), "Fitness summary regenerated");
  Ok(Json(FitnessSummary {
    summary,
    generated_at,
    cached: false,
  }))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
