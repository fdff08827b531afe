use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncState {
  pub user_id: String,
  pub source: String,
  pub last_sync_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing)]
  pub access_token: Option<String>,
  #[serde(skip_serializing)]
  pub refresh_token: Option<String>,
  pub token_expires_at: Option<DateTime<Utc>>,
}
