// Alert decision engine.
//
// Architecture:
// - model.rs: Settings, notification reasons and output records
// - hashing.rs: Content hashing and alert identity resolution
// - state.rs: Per-alert tracking state and the bounded hash history
// - rate_limit.rs: Shared token bucket for the hourly notification budget
// - store.rs: JSON persistence of tracking state
// - engine.rs: AlertManager, which ties the above together

pub mod engine;
pub mod hashing;
pub mod model;
pub mod rate_limit;
pub mod state;
pub mod store;

pub use engine::{AlertManager, AlertStatistics};
pub use model::{AlertNotification, AlertSettings, NotificationReason};
