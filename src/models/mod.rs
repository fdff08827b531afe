pub mod activity;
pub mod plan;
pub mod preferences;
pub mod sync;

pub use activity::Activity;
pub use plan::{ActualActivity, SessionType, StoredPlan, TrainingPlan, TrainingSession, WEEKDAYS};
pub use preferences::{PreferencesError, PreferencesUpdate, UserPreferences, ZoneMethod};
pub use sync::SyncState;
