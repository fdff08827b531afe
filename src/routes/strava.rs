use crate::db::{self, AppState, DbPool};
use crate::error::ApiError;
use crate::identity::Caller;
use crate::models::SyncState;
use crate::strava::{
  build_auth_url, exchange_code_for_tokens, fetch_activities, refresh_tokens, ActivityPage,
  StravaConfig, StravaError, StravaTokens,
};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// ---------------------------------------------------------------------------
/// Start OAuth Flow
/// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct AuthUrl {
  pub url: String,
}

/// Authorization URL for the browser to open. The caller id rides along in
/// `state` so the callback can store tokens for the right user.
pub async fn auth_url(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<AuthUrl>, ApiError> {
  let config = state.strava_config()?;
  let url = build_auth_url(config, caller.id())?;
  Ok(Json(AuthUrl { url }))
}

/// ---------------------------------------------------------------------------
/// OAuth Callback
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
  pub code: Option<String>,
  pub state: Option<String>,
  pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectResult {
  pub connected: bool,
  pub athlete_id: Option<i64>,
}

/// Exchange the authorization code for tokens and store them
pub async fn callback(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Query(query): Query<CallbackQuery>,
) -> Result<Json<ConnectResult>, ApiError> {
  if let Some(error) = query.error {
    return Err(ApiError::InvalidInput(format!("Strava authorization denied: {}", error)));
  }
  let code = query
    .code
    .ok_or_else(|| ApiError::InvalidInput("Missing authorization code".to_string()))?;
  let user_id = query.state.filter(|s| !s.is_empty()).unwrap_or(caller.0);

  let config = state.strava_config()?;
  let (tokens, athlete) = exchange_code_for_tokens(config, &code).await?;
  let athlete_id = athlete.map(|a| a.id);

  save_tokens(&state.db, &user_id, &tokens).await?;
  if let Some(id) = athlete_id {
    sqlx::query("UPDATE sync_state SET athlete_id = ?1 WHERE user_id = ?2 AND source = 'strava'")
      .bind(id)
      .bind(&user_id)
      .execute(&state.db)
      .await?;
  }

  tracing::info!(user = %user_id, "Strava OAuth completed successfully");
  Ok(Json(ConnectResult {
    connected: true,
    athlete_id,
  }))
}

/// ---------------------------------------------------------------------------
/// Check Authentication Status
/// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StravaAuthStatus {
  pub is_authenticated: bool,
  pub expires_at: Option<String>,
  pub needs_refresh: bool,
  pub last_sync_at: Option<DateTime<Utc>>,
}

pub async fn status(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<StravaAuthStatus>, ApiError> {
  let sync = load_sync_state(&state.db, caller.id()).await?;
  let last_sync_at = sync.as_ref().and_then(|s| s.last_sync_at);

  let status = match sync.and_then(tokens_from) {
    Some(tokens) => StravaAuthStatus {
      is_authenticated: true,
      expires_at: Some(tokens.expires_at.to_rfc3339()),
      needs_refresh: tokens.needs_refresh(),
      last_sync_at,
    },
    None => StravaAuthStatus {
      is_authenticated: false,
      expires_at: None,
      needs_refresh: false,
      last_sync_at,
    },
  };

  Ok(Json(status))
}

/// ---------------------------------------------------------------------------
/// Refresh Tokens
/// ---------------------------------------------------------------------------

pub async fn refresh(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<StravaAuthStatus>, ApiError> {
  let config = state.strava_config()?;

  let existing = load_tokens(&state.db, caller.id())
    .await?
    .ok_or(StravaError::NotAuthenticated)?;

  let new_tokens = refresh_tokens(config, &existing.refresh_token).await?;
  save_tokens(&state.db, caller.id(), &new_tokens).await?;

  tracing::info!(user = caller.id(), "Strava tokens refreshed successfully");
  status(State(state), caller).await
}

/// ---------------------------------------------------------------------------
/// Disconnect Strava
/// ---------------------------------------------------------------------------

pub async fn disconnect(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<serde_json::Value>, ApiError> {
  sqlx::query(
    "UPDATE sync_state SET access_token = NULL, refresh_token = NULL,
         token_expires_at = NULL WHERE user_id = ?1 AND source = 'strava'",
  )
  .bind(caller.id())
  .execute(&state.db)
  .await?;

  tracing::info!(user = caller.id(), "Strava disconnected");
  Ok(Json(serde_json::json!({ "connected": false })))
}

/// ---------------------------------------------------------------------------
/// Get Valid Access Token (with auto-refresh)
/// ---------------------------------------------------------------------------

/// Valid access token for `user_id`, refreshed first when it expires within
/// five minutes.
pub async fn get_valid_access_token(
  db: &DbPool,
  config: &StravaConfig,
  user_id: &str,
) -> Result<String, StravaError> {
  let mut tokens = load_tokens(db, user_id)
    .await?
    .ok_or(StravaError::NotAuthenticated)?;

  if tokens.needs_refresh() {
    tokens = refresh_tokens(config, &tokens.refresh_token).await?;
    save_tokens(db, user_id, &tokens).await?;
    tracing::info!(user = user_id, "Strava tokens auto-refreshed");
  }

  Ok(tokens.access_token)
}

/// ---------------------------------------------------------------------------
/// Database Helpers
/// ---------------------------------------------------------------------------

async fn save_tokens(db: &DbPool, user_id: &str, tokens: &StravaTokens) -> Result<(), StravaError> {
  sqlx::query(
    r#"
        INSERT INTO sync_state (user_id, source, access_token, refresh_token, token_expires_at)
        VALUES (?1, 'strava', ?2, ?3, ?4)
        ON CONFLICT(user_id, source) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            token_expires_at = excluded.token_expires_at
        "#,
  )
  .bind(user_id)
  .bind(&tokens.access_token)
  .bind(&tokens.refresh_token)
  .bind(tokens.expires_at)
  .execute(db)
  .await?;

  Ok(())
}

async fn load_sync_state(db: &DbPool, user_id: &str) -> Result<Option<SyncState>, StravaError> {
  let row = sqlx::query_as::<_, SyncState>(
    "SELECT user_id, source, last_sync_at, access_token, refresh_token, token_expires_at
     FROM sync_state WHERE user_id = ?1 AND source = 'strava'",
  )
  .bind(user_id)
  .fetch_optional(db)
  .await?;

  Ok(row)
}

fn tokens_from(sync: SyncState) -> Option<StravaTokens> {
  match sync {
    SyncState {
      access_token: Some(access_token),
      refresh_token: Some(refresh_token),
      token_expires_at: Some(expires_at),
      ..
    } => Some(StravaTokens {
      access_token,
      refresh_token,
      expires_at,
    }),
    _ => None,
  }
}

async fn load_tokens(db: &DbPool, user_id: &str) -> Result<Option<StravaTokens>, StravaError> {
  Ok(load_sync_state(db, user_id).await?.and_then(tokens_from))
}

async fn update_sync_time(db: &DbPool, user_id: &str) -> Result<(), StravaError> {
  sqlx::query("UPDATE sync_state SET last_sync_at = ?1 WHERE user_id = ?2 AND source = 'strava'")
    .bind(Utc::now())
    .bind(user_id)
    .execute(db)
    .await?;

  Ok(())
}

/// ---------------------------------------------------------------------------
/// Import Activities from Strava
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncResult {
  pub new_activities: usize,
  pub total_fetched: usize,
  pub pages: u32,
  /// The page ceiling stopped the import before Strava ran out of data
  pub truncated: bool,
}

/// Walk pages sequentially until a short page, storing each page in one
/// transaction. Stops at the configured page ceiling and pauses between
/// pages.
async fn import_pages(
  state: &AppState,
  user_id: &str,
  after: Option<i64>,
) -> Result<SyncResult, StravaError> {
  let config = state.strava_config()?;
  let limits = state.config.import;
  let access_token = get_valid_access_token(&state.db, config, user_id).await?;

  let mut result = SyncResult {
    new_activities: 0,
    total_fetched: 0,
    pages: 0,
    truncated: false,
  };

  for page in 1..=limits.max_pages {
    if page > 1 && !limits.page_delay.is_zero() {
      tokio::time::sleep(limits.page_delay).await;
    }

    let query = ActivityPage {
      after,
      page,
      per_page: limits.per_page,
    };
    let batch = fetch_activities(config, &access_token, query).await?;
    let fetched = batch.len();
    result.pages = page;
    result.total_fetched += fetched;

    let activities: Vec<_> = batch.into_iter().map(|a| a.into_activity(user_id)).collect();
    result.new_activities += db::upsert_activities(&state.db, &activities).await?;

    tracing::debug!(user = user_id, page, fetched, "Imported Strava page");

    if fetched < limits.per_page as usize {
      break;
    }
    if page == limits.max_pages {
      result.truncated = true;
      tracing::warn!(user = user_id, max_pages = limits.max_pages, "Import stopped at page ceiling");
    }
  }

  update_sync_time(&state.db, user_id).await?;
  Ok(result)
}

/// Full history import
pub async fn import_all(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<SyncResult>, ApiError> {
  let result = import_pages(&state, caller.id(), None).await?;

  tracing::info!(
    user = caller.id(),
    new = result.new_activities,
    fetched = result.total_fetched,
    pages = result.pages,
    "Strava import complete"
  );
  Ok(Json(result))
}

/// Only activities newer than the newest cached one
pub async fn sync_recent(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<SyncResult>, ApiError> {
  let newest: Option<(DateTime<Utc>,)> = sqlx::query_as(
    "SELECT start_date FROM activities WHERE user_id = ?1 ORDER BY start_date DESC LIMIT 1",
  )
  .bind(caller.id())
  .fetch_optional(&state.db)
  .await?;

  let after = newest.map(|(start,)| start.timestamp());
  let result = import_pages(&state, caller.id(), after).await?;

  tracing::info!(
    user = caller.id(),
    new = result.new_activities,
    fetched = result.total_fetched,
    "Strava sync complete"
  );
  Ok(Json(result))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::routes::router;
  use crate::test_utils::*;
  use axum::http::{Method, StatusCode};
  use mockito::Matcher;
  use serial_test::serial;

  fn strava_page(ids: std::ops::Range<i64>) -> String {
    let items: Vec<serde_json::Value> = ids
      .map(|id| {
        serde_json::json!({
          "id": id,
          "name": format!("Run {}", id),
          "type": "Run",
          "start_date": "2024-03-11T07:00:00Z",
          "start_date_local": "2024-03-11T08:00:00Z",
          "distance": 5000.0,
          "moving_time": 1500,
          "elapsed_time": 1550,
          "average_speed": 3.33
        })
      })
      .collect();
    serde_json::Value::Array(items).to_string()
  }

  #[tokio::test]
  #[serial]
  async fn test_status_without_tokens() {
    let pool = setup_test_db().await;
    let app = router(test_state(&pool, test_config()));

    let (status, body) = send(app, Method::GET, "/api/strava/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_authenticated"], false);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_auth_url_requires_config() {
    let pool = setup_test_db().await;
    let app = router(test_state(&pool, test_config()));

    let (status, body) = send(app, Method::GET, "/api/strava/auth", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "not_connected");
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_sync_without_tokens_is_not_connected() {
    let pool = setup_test_db().await;
    let mut config = test_config();
    config.strava = Some(mock_strava_config("http://127.0.0.1:9"));
    let app = router(test_state(&pool, config));

    let (status, _) = send(app, Method::POST, "/api/strava/sync", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_callback_stores_tokens_for_state_user() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/oauth/token")
      .with_status(200)
      .with_body(r#"{"access_token":"at","refresh_token":"rt","expires_at":4102444800,"athlete":{"id":99}}"#)
      .create_async()
      .await;

    let mut config = test_config();
    config.strava = Some(mock_strava_config(&server.url()));
    let state = test_state(&pool, config);

    let (status, body) = send(
      router(state.clone()),
      Method::GET,
      &format!("/api/strava/callback?code=abc&state={}", TEST_USER),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["athlete_id"], 99);

    let (_, status_body) = send(router(state), Method::GET, "/api/strava/status", None).await;
    assert_eq!(status_body["is_authenticated"], true);
    assert_eq!(status_body["needs_refresh"], false);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_import_walks_pages_until_short_page() {
    let pool = setup_test_db().await;
    seed_strava_tokens(&pool, chrono::Duration::hours(6)).await;

    let mut server = mockito::Server::new_async().await;
    let first = server
      .mock("GET", "/athlete/activities")
      .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
      .with_status(200)
      .with_body(strava_page(1..3))
      .create_async()
      .await;
    let second = server
      .mock("GET", "/athlete/activities")
      .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
      .with_status(200)
      .with_body(strava_page(3..4))
      .create_async()
      .await;

    let mut config = test_config();
    config.strava = Some(mock_strava_config(&server.url()));
    config.import.per_page = 2;
    let app = router(test_state(&pool, config));

    let (status, body) = send(app, Method::POST, "/api/strava/import", None).await;

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_activities"], 3);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["truncated"], false);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities WHERE user_id = ?1")
      .bind(TEST_USER)
      .fetch_one(&pool)
      .await
      .unwrap();
    assert_eq!(count, 3);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_import_stops_at_page_ceiling() {
    let pool = setup_test_db().await;
    seed_strava_tokens(&pool, chrono::Duration::hours(6)).await;

    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/athlete/activities")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body(strava_page(1..3))
      .expect(2)
      .create_async()
      .await;

    let mut config = test_config();
    config.strava = Some(mock_strava_config(&server.url()));
    config.import.per_page = 2;
    config.import.max_pages = 2;
    let app = router(test_state(&pool, config));

    let (status, body) = send(app, Method::POST, "/api/strava/import", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["truncated"], true);
    // same two ids on every page: re-imports merge
    assert_eq!(body["new_activities"], 2);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_expiring_token_is_refreshed_before_sync() {
    let pool = setup_test_db().await;
    seed_strava_tokens(&pool, chrono::Duration::minutes(1)).await;

    let mut server = mockito::Server::new_async().await;
    let refresh = server
      .mock("POST", "/oauth/token")
      .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
      .with_status(200)
      .with_body(r#"{"access_token":"fresh","refresh_token":"rt2","expires_at":4102444800}"#)
      .create_async()
      .await;
    let activities = server
      .mock("GET", "/athlete/activities")
      .match_query(Matcher::Any)
      .match_header("authorization", "Bearer fresh")
      .with_status(200)
      .with_body("[]")
      .create_async()
      .await;

    let mut config = test_config();
    config.strava = Some(mock_strava_config(&server.url()));
    let app = router(test_state(&pool, config));

    let (status, body) = send(app, Method::POST, "/api/strava/sync", None).await;

    refresh.assert_async().await;
    activities.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_fetched"], 0);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  #[serial]
  async fn test_disconnect_clears_tokens() {
    let pool = setup_test_db().await;
    seed_strava_tokens(&pool, chrono::Duration::hours(6)).await;
    let state = test_state(&pool, test_config());

    let (status, _) = send(router(state.clone()), Method::POST, "/api/strava/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(router(state), Method::GET, "/api/strava/status", None).await;
    assert_eq!(body["is_authenticated"], false);
    teardown_test_db(pool).await;
  }
}
