use crate::models::Activity;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const STRAVA_AUTH_URL: &str = "https://www.strava.com/oauth/authorize";
const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/api/strava/callback";
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// ---------------------------------------------------------------------------
/// OAuth Data Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StravaConfig {
  pub client_id: String,
  pub client_secret: String,
  pub redirect_uri: String,
  pub auth_url: String,
  pub token_url: String,
  pub api_base: String,
}

impl StravaConfig {
  pub fn from_env() -> Result<Self, StravaError> {
    Ok(Self {
      client_id: env::var("STRAVA_CLIENT_ID")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_ID".into()))?,
      client_secret: env::var("STRAVA_CLIENT_SECRET")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_SECRET".into()))?,
      redirect_uri: env::var("STRAVA_REDIRECT_URI").unwrap_or_else(|_| DEFAULT_REDIRECT_URI.into()),
      auth_url: STRAVA_AUTH_URL.to_string(),
      token_url: env::var("STRAVA_TOKEN_URL").unwrap_or_else(|_| STRAVA_TOKEN_URL.into()),
      api_base: env::var("STRAVA_API_BASE").unwrap_or_else(|_| STRAVA_API_BASE.into()),
    })
  }
}

/// Response from Strava token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: i64,
  pub athlete: Option<AthleteInfo>,
}

/// Basic athlete info returned with the first token exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthleteInfo {
  pub id: i64,
  pub firstname: Option<String>,
  pub lastname: Option<String>,
}

/// Stored token state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaTokens {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl StravaTokens {
  pub fn from_response(resp: TokenResponse) -> Self {
    Self {
      access_token: resp.access_token,
      refresh_token: resp.refresh_token,
      expires_at: DateTime::from_timestamp(resp.expires_at, 0).unwrap_or_else(Utc::now),
    }
  }

  pub fn needs_refresh(&self) -> bool {
    let buffer = Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
    Utc::now() + buffer >= self.expires_at
  }
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("OAuth error: {0}")]
  OAuth(String),

  #[error("Unexpected response: {0}")]
  Parse(String),

  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Not authenticated with Strava")]
  NotAuthenticated,
}

impl Serialize for StravaError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// OAuth URL Generation
/// ---------------------------------------------------------------------------

/// Authorization URL. `state` is echoed back on the callback and carries the
/// caller identity through the redirect.
pub fn build_auth_url(config: &StravaConfig, state: &str) -> Result<String, StravaError> {
  let mut url = Url::parse(&config.auth_url).map_err(|e| StravaError::OAuth(e.to_string()))?;

  url
    .query_pairs_mut()
    .append_pair("client_id", &config.client_id)
    .append_pair("redirect_uri", &config.redirect_uri)
    .append_pair("response_type", "code")
    .append_pair("scope", "read,activity:read_all")
    .append_pair("approval_prompt", "auto")
    .append_pair("state", state);

  Ok(url.to_string())
}

/// ---------------------------------------------------------------------------
/// Token Exchange (Authorization Code -> Tokens)
/// ---------------------------------------------------------------------------

pub async fn exchange_code_for_tokens(
  config: &StravaConfig,
  code: &str,
) -> Result<(StravaTokens, Option<AthleteInfo>), StravaError> {
  let client = Client::new();

  let response = client
    .post(&config.token_url)
    .form(&[
      ("client_id", config.client_id.as_str()),
      ("client_secret", config.client_secret.as_str()),
      ("code", code),
      ("grant_type", "authorization_code"),
    ])
    .send()
    .await?;

  if !response.status().is_success() {
    let error_text = response.text().await.unwrap_or_default();
    return Err(StravaError::OAuth(format!(
      "Token exchange failed: {}",
      error_text
    )));
  }

  let mut token_response: TokenResponse = response.json().await?;
  let athlete = token_response.athlete.take();
  Ok((StravaTokens::from_response(token_response), athlete))
}

/// ---------------------------------------------------------------------------
/// Token Refresh
/// ---------------------------------------------------------------------------

pub async fn refresh_tokens(
  config: &StravaConfig,
  refresh_token: &str,
) -> Result<StravaTokens, StravaError> {
  let client = Client::new();

  let response = client
    .post(&config.token_url)
    .form(&[
      ("client_id", config.client_id.as_str()),
      ("client_secret", config.client_secret.as_str()),
      ("refresh_token", refresh_token),
      ("grant_type", "refresh_token"),
    ])
    .send()
    .await?;

  if !response.status().is_success() {
    let error_text = response.text().await.unwrap_or_default();
    return Err(StravaError::OAuth(format!(
      "Token refresh failed: {}",
      error_text
    )));
  }

  let token_response: TokenResponse = response.json().await?;
  Ok(StravaTokens::from_response(token_response))
}

/// ---------------------------------------------------------------------------
/// Strava API - Activity Fetching
/// ---------------------------------------------------------------------------

/// Activity summary from Strava API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaActivity {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  /// Strava uses "type" for legacy and "sport_type" for newer activities
  #[serde(rename = "type", default)]
  pub activity_type: String,
  pub start_date: DateTime<Utc>,
  /// Strava stamps local wall-clock time with a "Z" suffix
  #[serde(default)]
  pub start_date_local: Option<DateTime<Utc>>,
  #[serde(default)]
  pub elapsed_time: i64,
  #[serde(default)]
  pub moving_time: i64,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub max_speed: Option<f64>,
  #[serde(default)]
  pub total_elevation_gain: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<f64>,
  #[serde(default)]
  pub max_heartrate: Option<f64>,
  #[serde(default)]
  pub calories: Option<f64>,
}

impl StravaActivity {
  /// Convert to the cached form for `user_id`.
  pub fn into_activity(self, user_id: &str) -> Activity {
    let start_date_local: NaiveDateTime = self.start_date_local.unwrap_or(self.start_date).naive_utc();

    Activity {
      id: self.id,
      user_id: user_id.to_string(),
      name: self.name,
      activity_type: self.activity_type,
      start_date: self.start_date,
      start_date_local,
      distance: self.distance.unwrap_or(0.0).max(0.0),
      moving_time: self.moving_time.max(0),
      elapsed_time: self.elapsed_time.max(self.moving_time).max(0),
      average_speed: self.average_speed,
      max_speed: self.max_speed,
      average_heartrate: self.average_heartrate,
      max_heartrate: self.max_heartrate,
      total_elevation_gain: self.total_elevation_gain,
      calories: self.calories,
      ai_analysis: None,
    }
  }
}

/// One page of `/athlete/activities`.
#[derive(Debug, Clone, Copy)]
pub struct ActivityPage {
  /// Only activities starting after this unix timestamp
  pub after: Option<i64>,
  /// 1-based
  pub page: u32,
  pub per_page: u32,
}

/// Fetch one page of the athlete's activities, newest first unless `after`
/// is set (Strava then returns oldest first).
pub async fn fetch_activities(
  config: &StravaConfig,
  access_token: &str,
  query: ActivityPage,
) -> Result<Vec<StravaActivity>, StravaError> {
  let client = Client::new();

  let mut url = format!(
    "{}/athlete/activities?per_page={}&page={}",
    config.api_base, query.per_page, query.page
  );

  if let Some(after_timestamp) = query.after {
    url.push_str(&format!("&after={}", after_timestamp));
  }

  let response = client
    .get(&url)
    .header("Authorization", format!("Bearer {}", access_token))
    .send()
    .await?;

  if response.status() == reqwest::StatusCode::UNAUTHORIZED {
    return Err(StravaError::NotAuthenticated);
  }

  if !response.status().is_success() {
    let error_text = response.text().await.unwrap_or_default();
    return Err(StravaError::OAuth(format!(
      "Failed to fetch activities: {}",
      error_text
    )));
  }

  let response_text = response.text().await?;

  let activities: Vec<StravaActivity> = serde_json::from_str(&response_text).map_err(|e| {
    tracing::warn!(
      error = %e,
      body = %response_text.chars().take(1000).collect::<String>(),
      "Failed to parse Strava activities"
    );
    StravaError::Parse(format!("Failed to parse activities: {}", e))
  })?;

  Ok(activities)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
