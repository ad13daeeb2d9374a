//! Cluster Settings
//!
//! Sectioned configuration parameters with per-parameter upgrade policies,
//! the policy-aware merger, and schema checks over the merged result.

pub mod merger;
pub mod model;
pub mod schema;

pub use merger::{MergeOutcome, SettingsMerger};
pub use model::{ChangeDisposition, ParameterChange, Settings, SettingsParameter, UpgradePolicy};
pub use schema::{SchemaRule, SettingsSchema};
