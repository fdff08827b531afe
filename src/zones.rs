//! Heart-rate zone calculator
//!
//! Three methods produce five bpm ranges. Missing inputs never fail: the
//! LTHR and HRR methods quietly fall back to the max-HR method, and max HR
//! itself falls back to `220 - age`.

use crate::models::{UserPreferences, ZoneMethod};
use serde::{Deserialize, Serialize};

/// ---------------------------------------------------------------------------
/// Zone Fractions
/// ---------------------------------------------------------------------------

const DEFAULT_AGE: i64 = 30;

const MAX_HR_FRACTIONS: [(f64, f64); 5] = [
  (0.50, 0.60),
  (0.60, 0.70),
  (0.70, 0.80),
  (0.80, 0.90),
  (0.90, 1.00),
];

// zone1 tops out at 0.85 and zone2 starts at 0.86: LTHR zones are not contiguous
const LTHR_FRACTIONS: [(f64, f64); 5] = [
  (0.60, 0.85),
  (0.86, 0.89),
  (0.90, 0.94),
  (0.95, 0.99),
  (1.00, 1.05),
];

const HRR_FRACTIONS: [(f64, f64); 5] = MAX_HR_FRACTIONS;

/// ---------------------------------------------------------------------------
/// Zone Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBounds {
  pub min: i64,
  pub max: i64,
}

impl ZoneBounds {
  pub fn contains(&self, bpm: f64) -> bool {
    bpm >= self.min as f64 && bpm <= self.max as f64
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateZoneSet {
  pub zone1: ZoneBounds,
  pub zone2: ZoneBounds,
  pub zone3: ZoneBounds,
  pub zone4: ZoneBounds,
  pub zone5: ZoneBounds,
}

impl HeartRateZoneSet {
  fn from_bounds(bounds: [ZoneBounds; 5]) -> Self {
    let [zone1, zone2, zone3, zone4, zone5] = bounds;
    Self { zone1, zone2, zone3, zone4, zone5 }
  }

  pub fn as_array(&self) -> [ZoneBounds; 5] {
    [self.zone1, self.zone2, self.zone3, self.zone4, self.zone5]
  }

  /// Zone number (1-5) containing `bpm`, lowest zone wins on shared bounds.
  pub fn zone_for(&self, bpm: f64) -> Option<u8> {
    self
      .as_array()
      .iter()
      .position(|z| z.contains(bpm))
      .map(|idx| idx as u8 + 1)
  }
}

/// ---------------------------------------------------------------------------
/// Zone Computation
/// ---------------------------------------------------------------------------

/// Inputs for a zone computation, usually taken from stored preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneInputs {
  pub method: ZoneMethod,
  pub max_hr: Option<i64>,
  pub lthr: Option<i64>,
  pub resting_hr: Option<i64>,
  pub age: Option<i64>,
}

impl From<&UserPreferences> for ZoneInputs {
  fn from(prefs: &UserPreferences) -> Self {
    Self {
      method: prefs.zone_method,
      max_hr: prefs.max_hr,
      lthr: prefs.lthr,
      resting_hr: prefs.resting_hr,
      age: prefs.age,
    }
  }
}

impl ZoneInputs {
  /// The method actually used once fallbacks are applied.
  pub fn effective_method(&self) -> ZoneMethod {
    match (self.method, self.lthr, self.max_hr, self.resting_hr) {
      (ZoneMethod::Lthr, Some(_), _, _) => ZoneMethod::Lthr,
      (ZoneMethod::Hrr, _, Some(_), Some(_)) => ZoneMethod::Hrr,
      _ => ZoneMethod::MaxHr,
    }
  }

  /// Max HR if set, else `220 - age` (age defaults to 30).
  pub fn effective_max_hr(&self) -> i64 {
    self
      .max_hr
      .unwrap_or_else(|| 220 - self.age.unwrap_or(DEFAULT_AGE))
  }

  pub fn compute(&self) -> HeartRateZoneSet {
    match self.effective_method() {
      ZoneMethod::Lthr => {
        let lthr = self.lthr.unwrap_or_default() as f64;
        scaled_zones(&LTHR_FRACTIONS, |fraction| lthr * fraction)
      }
      ZoneMethod::Hrr => {
        let max_hr = self.max_hr.unwrap_or_default();
        let resting = self.resting_hr.unwrap_or_default();
        let reserve = (max_hr - resting) as f64;
        let mut zones =
          scaled_zones(&HRR_FRACTIONS, |fraction| resting as f64 + reserve * fraction);
        // resting + reserve * 1.0 is max_hr already; pin it exactly
        zones.zone5.max = max_hr;
        zones
      }
      ZoneMethod::MaxHr => {
        let max_hr = self.effective_max_hr() as f64;
        scaled_zones(&MAX_HR_FRACTIONS, |fraction| max_hr * fraction)
      }
    }
  }
}

/// Each bound is rounded on its own, so neighbouring zones may not share
/// an exact boundary.
fn scaled_zones(fractions: &[(f64, f64); 5], scale: impl Fn(f64) -> f64) -> HeartRateZoneSet {
  let bounds = fractions.map(|(low, high)| ZoneBounds {
    min: scale(low).round() as i64,
    max: scale(high).round() as i64,
  });
  HeartRateZoneSet::from_bounds(bounds)
}

pub fn compute_zones(
  method: ZoneMethod,
  max_hr: Option<i64>,
  lthr: Option<i64>,
  resting_hr: Option<i64>,
  age: Option<i64>,
) -> HeartRateZoneSet {
  ZoneInputs {
    method,
    max_hr,
    lthr,
    resting_hr,
    age,
  }
  .compute()
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn bounds(min: i64, max: i64) -> ZoneBounds {
    ZoneBounds { min, max }
  }

  #[test]
  fn test_max_hr_zones() {
    let zones = compute_zones(ZoneMethod::MaxHr, Some(190), None, None, None);

    assert_eq!(zones.zone1, bounds(95, 114));
    assert_eq!(zones.zone2, bounds(114, 133));
    assert_eq!(zones.zone3, bounds(133, 152));
    assert_eq!(zones.zone4, bounds(152, 171));
    assert_eq!(zones.zone5, bounds(171, 190));
  }

  #[test]
  fn test_max_hr_estimated_from_age() {
    let zones = compute_zones(ZoneMethod::MaxHr, None, None, None, Some(40));
    assert_eq!(zones.zone5.max, 180);

    // age unset defaults to 30 -> 190
    let default_age = compute_zones(ZoneMethod::MaxHr, None, None, None, None);
    assert_eq!(default_age.zone5.max, 190);
  }

  #[test]
  fn test_lthr_zones_keep_offset_boundary() {
    let zones = compute_zones(ZoneMethod::Lthr, Some(190), Some(170), None, None);

    assert_eq!(zones.zone1, bounds(102, 145));
    assert_eq!(zones.zone2, bounds(146, 151));
    assert_eq!(zones.zone3, bounds(153, 160));
    assert_eq!(zones.zone4, bounds(162, 168));
    assert_eq!(zones.zone5, bounds(170, 179));
  }

  #[test]
  fn test_hrr_zones() {
    let zones = compute_zones(ZoneMethod::Hrr, Some(190), None, Some(50), None);

    // reserve = 140
    assert_eq!(zones.zone1, bounds(120, 134));
    assert_eq!(zones.zone2, bounds(134, 148));
    assert_eq!(zones.zone3, bounds(148, 162));
    assert_eq!(zones.zone4, bounds(162, 176));
    assert_eq!(zones.zone5, bounds(176, 190));
  }

  #[test]
  fn test_lthr_without_lthr_falls_back_to_max_hr() {
    let lthr = compute_zones(ZoneMethod::Lthr, Some(190), None, None, Some(30));
    let max = compute_zones(ZoneMethod::MaxHr, Some(190), None, None, Some(30));
    assert_eq!(lthr, max);
  }

  #[test]
  fn test_hrr_without_resting_falls_back_to_max_hr() {
    let hrr = compute_zones(ZoneMethod::Hrr, Some(185), None, None, None);
    let max = compute_zones(ZoneMethod::MaxHr, Some(185), None, None, None);
    assert_eq!(hrr, max);

    let no_max = compute_zones(ZoneMethod::Hrr, None, None, Some(55), Some(45));
    let estimated = compute_zones(ZoneMethod::MaxHr, None, None, None, Some(45));
    assert_eq!(no_max, estimated);
  }

  #[test]
  fn test_effective_method_reports_fallback() {
    let inputs = ZoneInputs {
      method: ZoneMethod::Hrr,
      max_hr: Some(190),
      ..ZoneInputs::default()
    };
    assert_eq!(inputs.effective_method(), ZoneMethod::MaxHr);

    let inputs = ZoneInputs {
      method: ZoneMethod::Lthr,
      lthr: Some(165),
      ..ZoneInputs::default()
    };
    assert_eq!(inputs.effective_method(), ZoneMethod::Lthr);
  }

  #[test]
  fn test_zones_are_monotonic_for_all_methods() {
    for max_hr in 120..=220 {
      for resting in [40, 60, 100] {
        let lthr = (max_hr as f64 * 0.9) as i64;
        for method in [ZoneMethod::MaxHr, ZoneMethod::Lthr, ZoneMethod::Hrr] {
          let zones = compute_zones(method, Some(max_hr), Some(lthr), Some(resting), None);
          let flat: Vec<i64> = zones
            .as_array()
            .iter()
            .flat_map(|z| [z.min, z.max])
            .collect();
          assert!(
            flat.windows(2).all(|w| w[0] <= w[1]),
            "{} zones not monotonic for max_hr={} resting={}: {:?}",
            method,
            max_hr,
            resting,
            flat
          );
        }
      }
    }
  }

  #[test]
  fn test_zone_for() {
    let zones = compute_zones(ZoneMethod::MaxHr, Some(190), None, None, None);
    assert_eq!(zones.zone_for(100.0), Some(1));
    assert_eq!(zones.zone_for(125.0), Some(2));
    // shared boundary resolves to the lower zone
    assert_eq!(zones.zone_for(114.0), Some(1));
    assert_eq!(zones.zone_for(80.0), None);
  }
}
