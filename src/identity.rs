//! Caller identity
//!
//! There is no login. Every request is attributed to the id in the
//! `x-user-id` header, or to the configured demo user when absent, and that
//! id is passed explicitly into every query.

use crate::db::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;

pub const USER_HEADER: &str = "x-user-id";

/// The user a request acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
  pub fn id(&self) -> &str {
    &self.0
  }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    let id = parts
      .headers
      .get(USER_HEADER)
      .and_then(|value| value.to_str().ok())
      .map(str::trim)
      .filter(|value| !value.is_empty())
      .map(str::to_string)
      .unwrap_or_else(|| state.config.default_user_id.clone());

    Ok(Caller(id))
  }
}
