use crate::aggregation::summarize;
use crate::db::{self, ActivityFilter, AppState};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::llm::ChatMessage;
use crate::models::TrainingPlan;
use crate::plan_extractor::extract_plan;
use crate::units::{distance_km, duration_label, pace_label, round1};
use crate::zones::ZoneInputs;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Earlier turns replayed to the model with each message
const HISTORY_WINDOW: i64 = 20;
const RECENT_RUNS: i64 = 10;
const SUMMARY_WINDOW_DAYS: i64 = 90;

/// ---------------------------------------------------------------------------
/// Training Context
/// ---------------------------------------------------------------------------

/// Snapshot of the athlete handed to the model: settings, zones, a 90-day
/// summary and the latest runs.
pub(crate) async fn training_context(state: &AppState, user_id: &str) -> Result<Value, ApiError> {
  let prefs = db::load_preferences(&state.db, user_id).await?;
  let inputs = ZoneInputs::from(&prefs);

  let since = Local::now().naive_local() - Duration::days(SUMMARY_WINDOW_DAYS);
  let window = db::load_activities(
    &state.db,
    user_id,
    ActivityFilter {
      since: Some(since),
      runs_only: true,
      limit: None,
    },
  )
  .await?;

  let recent: Vec<Value> = window
    .iter()
    .take(RECENT_RUNS as usize)
    .map(|run| {
      json!({
        "date": run.start_date_local.date().to_string(),
        "name": run.name,
        "distance_km": round1(distance_km(run.distance)),
        "duration": duration_label(run.moving_time),
        "pace": pace_label(run.speed()),
        "avg_hr": run.heart_rate().map(f64::round),
      })
    })
    .collect();

  Ok(json!({
    "preferences": {
      "max_hr": prefs.max_hr,
      "lthr": prefs.lthr,
      "resting_hr": prefs.resting_hr,
      "age": prefs.age,
      "units": prefs.units,
    },
    "zone_method": inputs.effective_method(),
    "zones": inputs.compute(),
    "last_90_days": summarize(&window, &state.config.aggregation),
    "recent_runs": recent,
  }))
}

/// ---------------------------------------------------------------------------
/// Chat History
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StoredMessage {
  pub id: i64,
  pub role: String,
  pub content: String,
  pub plan: Option<TrainingPlan>,
  pub created_at: DateTime<Utc>,
}

type MessageRow = (i64, String, String, Option<String>, DateTime<Utc>);

/// Last `limit` messages, oldest first
async fn load_history(
  state: &AppState,
  user_id: &str,
  limit: i64,
) -> Result<Vec<StoredMessage>, sqlx::Error> {
  let rows: Vec<MessageRow> = sqlx::query_as(
    "SELECT id, role, content, plan_json, created_at FROM coach_messages
     WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
  )
  .bind(user_id)
  .bind(limit)
  .fetch_all(&state.db)
  .await?;

  Ok(
    rows
      .into_iter()
      .rev()
      .map(|(id, role, content, plan_json, created_at)| StoredMessage {
        id,
        role,
        content,
        plan: plan_json.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at,
      })
      .collect(),
  )
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
  pub limit: Option<i64>,
}

pub async fn history(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
  let limit = query.limit.unwrap_or(50).clamp(1, 500);
  Ok(Json(load_history(&state, caller.id(), limit).await?))
}

/// ---------------------------------------------------------------------------
/// Chat
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
  pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
  pub reply: String,
  /// Plan mined from the reply, if it laid one out
  pub plan: Option<TrainingPlan>,
}

pub async fn chat(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
  let message = request.message.trim();
  if message.is_empty() {
    return Err(ApiError::InvalidInput("Message must not be empty".to_string()));
  }

  let claude = state.claude()?;
  let context = training_context(&state, caller.id()).await?;

  // The messages API wants the conversation to open with a user turn
  let history: Vec<ChatMessage> = load_history(&state, caller.id(), HISTORY_WINDOW)
    .await?
    .into_iter()
    .skip_while(|m| m.role != "user")
    .map(|m| ChatMessage {
      role: m.role,
      content: m.content,
    })
    .collect();

  let reply = claude
    .coach_reply(&history, message, &context.to_string())
    .await?;
  let plan = extract_plan(&reply);

  let plan_json = plan.as_ref().and_then(|p| serde_json::to_string(p).ok());
  let now = Utc::now();

  let mut tx = state.db.begin().await?;
  sqlx::query(
    "INSERT INTO coach_messages (user_id, role, content, plan_json, created_at)
     VALUES (?1, 'user', ?2, NULL, ?3)",
  )
  .bind(caller.id())
  .bind(message)
  .bind(now)
  .execute(&mut *tx)
  .await?;
  sqlx::query(
    "INSERT INTO coach_messages (user_id, role, content, plan_json, created_at)
     VALUES (?1, 'assistant', ?2, ?3, ?4)",
  )
  .bind(caller.id())
  .bind(&reply)
  .bind(plan_json)
  .bind(now)
  .execute(&mut *tx)
  .await?;
  tx.commit().await?;

  tracing::info!(
    user = caller.id(),
    history = history.len(),
    plan = plan.is_some(),
    "Coach replied"
  );
  Ok(Json(ChatReply { reply, plan }))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::routes::router;
  use crate::test_utils::*;
  use axum::http::{Method, StatusCode};
  use mockito::Matcher;
  use serial_test::serial;

  const PLAN_REPLY: &str = "Here's a plan for your 10K:\n\
    Monday: Easy run 5 km\n\
    Wednesday: Interval session 6x800m at 5K pace\n\
    Saturday: Long run 12 km, conversational";

  #[tokio::test]
  #[serial]
  async fn test_chat_without_llm_is_not_connected() {
    let pool = setup_test_db().await;
    let app = router(test_state(&pool, test_config()));

    let (status, body) = send(
      app,
      Method::POST,
      "/api/coach/chat",
      Some(json!({ "message": "How is my training going?" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "not_connected");
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_empty_message_is_rejected() {
    let pool = setup_test_db().await;
    let app = router(test_state(&pool, test_config()));

    let (status, _) = send(app, Method::POST, "/api/coach/chat", Some(json!({ "message": "  " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_chat_extracts_plan_and_stores_history() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(mock_claude_body(PLAN_REPLY))
      .create_async()
      .await;

    let mut config = test_config();
    config.llm = Some(mock_llm_config(&server.url()));
    let state = test_state(&pool, config);

    let (status, body) = send(
      router(state.clone()),
      Method::POST,
      "/api/coach/chat",
      Some(json!({ "message": "Can you plan my week?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], PLAN_REPLY);
    let sessions = body["plan"]["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[1]["day"], "Wednesday");
    assert_eq!(sessions[1]["type"], "interval");

    let (_, history) = send(router(state), Method::GET, "/api/coach/history", None).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "Can you plan my week?");
    assert!(history[0]["plan"].is_null());
    assert_eq!(history[1]["role"], "assistant");
    assert!(history[1]["plan"].is_object());
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_earlier_turns_are_replayed() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(mock_claude_body("Keep it easy this week."))
      .create_async()
      .await;
    let replay = server
      .mock("POST", "/v1/messages")
      .match_body(Matcher::Regex("Keep it easy this week".to_string()))
      .with_status(200)
      .with_body(mock_claude_body("Then add strides on Thursday."))
      .create_async()
      .await;

    let mut config = test_config();
    config.llm = Some(mock_llm_config(&server.url()));
    let state = test_state(&pool, config);

    send(
      router(state.clone()),
      Method::POST,
      "/api/coach/chat",
      Some(json!({ "message": "I feel tired." })),
    )
    .await;
    let (status, body) = send(
      router(state),
      Method::POST,
      "/api/coach/chat",
      Some(json!({ "message": "And after that?" })),
    )
    .await;

    replay.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Then add strides on Thursday.");
    assert!(body["plan"].is_null());
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_training_context_includes_recent_runs() {
    let pool = setup_test_db().await;
    seed_preferences(&pool).await;
    let today = Local::now().date_naive();
    seed_activities(
      &pool,
      &[
        mock_activity_on(1, today - Duration::days(1), 10_000.0),
        mock_activity_on(2, today - Duration::days(200), 10_000.0),
      ],
    )
    .await;
    let state = test_state(&pool, test_config());

    let context = training_context(&state, TEST_USER).await.unwrap();

    assert_eq!(context["recent_runs"].as_array().unwrap().len(), 1);
    assert_eq!(context["recent_runs"][0]["pace"], "5:00");
    assert_eq!(context["last_90_days"]["run_count"], 1);
    assert_eq!(context["zone_method"], "maxhr");
    assert_eq!(context["zones"]["zone2"]["min"], 114);
    teardown_test_db(pool).await;
  }
}
