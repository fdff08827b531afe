use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How heart-rate zones are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMethod {
  /// Fractions of max HR (default, and the fallback for the others)
  #[default]
  MaxHr,
  /// Fractions of lactate threshold HR
  Lthr,
  /// Karvonen: fractions of heart-rate reserve on top of resting HR
  Hrr,
}

impl ZoneMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      ZoneMethod::MaxHr => "maxhr",
      ZoneMethod::Lthr => "lthr",
      ZoneMethod::Hrr => "hrr",
    }
  }
}

impl fmt::Display for ZoneMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ZoneMethod {
  type Err = PreferencesError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "maxhr" => Ok(Self::MaxHr),
      "lthr" => Ok(Self::Lthr),
      "hrr" => Ok(Self::Hrr),
      other => Err(PreferencesError::UnknownZoneMethod(other.to_string())),
    }
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum PreferencesError {
  #[error("maxHR must be between 120 and 220 bpm (got {0})")]
  MaxHrOutOfRange(i64),

  #[error("LTHR must be between 100 and 200 bpm (got {0})")]
  LthrOutOfRange(i64),

  #[error("resting HR must be between 40 and 100 bpm (got {0})")]
  RestingHrOutOfRange(i64),

  #[error("LTHR ({lthr}) must be lower than maxHR ({max_hr})")]
  LthrAboveMax { lthr: i64, max_hr: i64 },

  #[error("age must be between 10 and 100 (got {0})")]
  AgeOutOfRange(i64),

  #[error("unknown zone method: {0}")]
  UnknownZoneMethod(String),
}

/// Per-user physiological and display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
  pub max_hr: Option<i64>,
  pub lthr: Option<i64>,
  pub resting_hr: Option<i64>,
  pub zone_method: ZoneMethod,
  pub age: Option<i64>,
  pub units: String,
  pub time_format: String,
  pub privacy: String,
  pub notifications: bool,
}

impl Default for UserPreferences {
  fn default() -> Self {
    Self {
      max_hr: None,
      lthr: None,
      resting_hr: None,
      zone_method: ZoneMethod::MaxHr,
      age: None,
      units: "metric".to_string(),
      time_format: "24h".to_string(),
      privacy: "private".to_string(),
      notifications: true,
    }
  }
}

impl UserPreferences {
  pub fn validate(&self) -> Result<(), PreferencesError> {
    if let Some(max) = self.max_hr {
      if !(120..=220).contains(&max) {
        return Err(PreferencesError::MaxHrOutOfRange(max));
      }
    }
    if let Some(lthr) = self.lthr {
      if !(100..=200).contains(&lthr) {
        return Err(PreferencesError::LthrOutOfRange(lthr));
      }
    }
    if let Some(resting) = self.resting_hr {
      if !(40..=100).contains(&resting) {
        return Err(PreferencesError::RestingHrOutOfRange(resting));
      }
    }
    if let (Some(lthr), Some(max_hr)) = (self.lthr, self.max_hr) {
      if lthr >= max_hr {
        return Err(PreferencesError::LthrAboveMax { lthr, max_hr });
      }
    }
    if let Some(age) = self.age {
      if !(10..=100).contains(&age) {
        return Err(PreferencesError::AgeOutOfRange(age));
      }
    }
    Ok(())
  }
}

/// Partial update. For the optional bpm and age fields a missing key keeps
/// the stored value and an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
  #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
  pub max_hr: Option<Option<i64>>,
  #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
  pub lthr: Option<Option<i64>>,
  #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
  pub resting_hr: Option<Option<i64>>,
  pub zone_method: Option<ZoneMethod>,
  #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
  pub age: Option<Option<i64>>,
  pub units: Option<String>,
  pub time_format: Option<String>,
  pub privacy: Option<String>,
  pub notifications: Option<bool>,
}

/// Only called when the key is present, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

impl PreferencesUpdate {
  /// Merge into the stored settings and validate the result.
  pub fn apply(self, current: &UserPreferences) -> Result<UserPreferences, PreferencesError> {
    let merged = UserPreferences {
      max_hr: self.max_hr.unwrap_or(current.max_hr),
      lthr: self.lthr.unwrap_or(current.lthr),
      resting_hr: self.resting_hr.unwrap_or(current.resting_hr),
      zone_method: self.zone_method.unwrap_or(current.zone_method),
      age: self.age.unwrap_or(current.age),
      units: self.units.unwrap_or_else(|| current.units.clone()),
      time_format: self.time_format.unwrap_or_else(|| current.time_format.clone()),
      privacy: self.privacy.unwrap_or_else(|| current.privacy.clone()),
      notifications: self.notifications.unwrap_or(current.notifications),
    };
    merged.validate()?;
    Ok(merged)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_update_keeps_unspecified_fields() {
    let current = UserPreferences {
      max_hr: Some(190),
      resting_hr: Some(50),
      age: Some(35),
      ..UserPreferences::default()
    };

    let update = PreferencesUpdate {
      lthr: Some(Some(170)),
      zone_method: Some(ZoneMethod::Lthr),
      ..PreferencesUpdate::default()
    };

    let merged = update.apply(&current).unwrap();
    assert_eq!(merged.max_hr, Some(190));
    assert_eq!(merged.resting_hr, Some(50));
    assert_eq!(merged.age, Some(35));
    assert_eq!(merged.lthr, Some(170));
    assert_eq!(merged.zone_method, ZoneMethod::Lthr);
    assert_eq!(merged.units, "metric");
  }

  #[test]
  fn test_validation_ranges() {
    let base = UserPreferences::default();

    let too_high = PreferencesUpdate { max_hr: Some(Some(230)), ..Default::default() };
    assert_eq!(too_high.apply(&base), Err(PreferencesError::MaxHrOutOfRange(230)));

    let low_lthr = PreferencesUpdate { lthr: Some(Some(90)), ..Default::default() };
    assert_eq!(low_lthr.apply(&base), Err(PreferencesError::LthrOutOfRange(90)));

    let resting = PreferencesUpdate { resting_hr: Some(Some(30)), ..Default::default() };
    assert_eq!(resting.apply(&base), Err(PreferencesError::RestingHrOutOfRange(30)));
  }

  #[test]
  fn test_lthr_must_stay_below_stored_max() {
    let current = UserPreferences { max_hr: Some(170), ..UserPreferences::default() };
    let update = PreferencesUpdate { lthr: Some(Some(175)), ..Default::default() };

    assert_eq!(
      update.apply(&current),
      Err(PreferencesError::LthrAboveMax { lthr: 175, max_hr: 170 })
    );
  }

  #[test]
  fn test_null_clears_and_missing_keeps() {
    let current = UserPreferences {
      max_hr: Some(190),
      lthr: Some(175),
      age: Some(40),
      ..UserPreferences::default()
    };
    let update: PreferencesUpdate = serde_json::from_str(r#"{"max_hr": null, "lthr": null}"#).unwrap();

    let merged = update.apply(&current).unwrap();

    assert_eq!(merged.max_hr, None);
    assert_eq!(merged.lthr, None);
    assert_eq!(merged.age, Some(40));
  }

  #[test]
  fn test_clearing_lthr_allows_lower_max() {
    let current = UserPreferences { max_hr: Some(190), lthr: Some(175), ..UserPreferences::default() };
    let update: PreferencesUpdate =
      serde_json::from_str(r#"{"lthr": null, "max_hr": 170}"#).unwrap();

    let merged = update.apply(&current).unwrap();

    assert_eq!(merged.max_hr, Some(170));
    assert_eq!(merged.lthr, None);
  }

  #[test]
  fn test_zone_method_round_trips_through_str() {
    for method in [ZoneMethod::MaxHr, ZoneMethod::Lthr, ZoneMethod::Hrr] {
      assert_eq!(method.as_str().parse::<ZoneMethod>().unwrap(), method);
    }
    assert!("karvonen".parse::<ZoneMethod>().is_err());
  }
}
