//! Settings Merger
//!
//! Combines admin and user settings under per-parameter upgrade policies,
//! checked against the settings of the manifest currently running.

use crate::error::{ClusterError, ClusterResult};
use crate::settings::model::{
    ChangeDisposition, ParameterChange, Settings, SettingsParameter, UpgradePolicy,
};
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use std::collections::BTreeSet;

/// Result of a merge: the settings to publish and what changed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub merged: Settings,
    pub changes: Vec<ParameterChange>,
}

impl MergeOutcome {
    /// Changes that made it into `merged`
    pub fn applied(&self) -> impl Iterator<Item = &ParameterChange> {
        self.changes.iter().filter(|c| c.is_applied())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ParameterChange> {
        self.changes.iter().filter(|c| !c.is_applied())
    }
}

/// Policy-aware settings merge
#[derive(Clone)]
pub struct SettingsMerger {
    logger: Logger,
}

impl SettingsMerger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Merge admin and user settings against the prior manifest's settings
    ///
    /// User values win over admin values. The admin value of a parameter is
    /// its documented default, and an admin-declared policy wins over the
    /// user's. Parameters frozen in the prior manifest stay frozen.
    ///
    /// `prior` is `None` when the cluster is being created; nothing is
    /// reported as changed in that case.
    ///
    /// A `SingleChange` parameter may move once away from its admin
    /// default. One with no admin default may be introduced once and is
    /// fixed from then on.
    pub fn merge(
        &self,
        admin: &Settings,
        user: &Settings,
        prior: Option<&Settings>,
    ) -> ClusterResult<MergeOutcome> {
        let keys: BTreeSet<(&str, &str)> = admin
            .iter()
            .chain(user.iter())
            .map(|(section, parameter, _)| (section, parameter))
            .collect();

        let Some(prior) = prior else {
            let mut merged = Settings::new();
            for (section, parameter) in keys {
                if let Some(param) = Self::requested(admin, user, section, parameter, None) {
                    merged.insert(section, parameter, param);
                }
            }
            info!(self.logger, "Merged settings for new cluster"; "parameters" => merged.len());
            return Ok(MergeOutcome {
                merged,
                changes: Vec::new(),
            });
        };

        let mut merged = Settings::new();
        let mut changes = Vec::new();

        for &(section, parameter) in &keys {
            let previous = prior.get(section, parameter);
            let Some(requested) = Self::requested(admin, user, section, parameter, previous) else {
                continue;
            };

            let change = |disposition| ParameterChange {
                section: section.to_string(),
                parameter: parameter.to_string(),
                previous: previous.map(|p| p.value.clone()),
                requested: Some(requested.value.clone()),
                policy: requested.policy,
                disposition,
            };

            match requested.policy {
                UpgradePolicy::NotAllowed => match previous {
                    Some(previous) => {
                        if previous.value != requested.value {
                            warn!(self.logger, "Ignoring change to frozen setting";
                                "section" => section, "parameter" => parameter,
                                "current" => &previous.value, "requested" => &requested.value);
                            changes.push(change(ChangeDisposition::Rejected));
                        }
                        merged.insert(
                            section,
                            parameter,
                            SettingsParameter::new(previous.value.clone(), requested.policy),
                        );
                    }
                    None => {
                        warn!(self.logger, "Frozen setting cannot be added after creation";
                            "section" => section, "parameter" => parameter);
                        changes.push(change(ChangeDisposition::Rejected));
                    }
                },
                UpgradePolicy::SingleChange => {
                    if let Some(previous) = previous {
                        if previous.value != requested.value {
                            // Without a documented default the published value
                            // is the one change the parameter gets
                            let default = admin.value(section, parameter);
                            if default != Some(previous.value.as_str()) {
                                let reason = match default {
                                    Some(_) => format!(
                                        "already changed from its default to '{}'",
                                        previous.value
                                    ),
                                    None => format!(
                                        "already set to '{}' and has no default to change from",
                                        previous.value
                                    ),
                                };
                                return Err(ClusterError::PolicyViolation {
                                    section: section.to_string(),
                                    parameter: parameter.to_string(),
                                    policy: UpgradePolicy::SingleChange,
                                    reason,
                                });
                            }
                            changes.push(change(ChangeDisposition::RequiresFullUpgrade));
                        }
                    } else {
                        changes.push(change(ChangeDisposition::RequiresFullUpgrade));
                    }
                    merged.insert(section, parameter, requested);
                }
                UpgradePolicy::Static | UpgradePolicy::Dynamic => {
                    if previous.map(|p| &p.value) != Some(&requested.value) {
                        let disposition = if requested.policy == UpgradePolicy::Static {
                            ChangeDisposition::RequiresFullUpgrade
                        } else {
                            ChangeDisposition::InPlace
                        };
                        changes.push(change(disposition));
                    }
                    merged.insert(section, parameter, requested);
                }
            }
        }

        // Parameters that disappeared from the inputs
        for (section, parameter, previous) in prior.iter() {
            if keys.contains(&(section, parameter)) {
                continue;
            }
            let disposition = match previous.policy {
                UpgradePolicy::NotAllowed => {
                    merged.insert(section, parameter, previous.clone());
                    ChangeDisposition::Rejected
                }
                UpgradePolicy::Dynamic => ChangeDisposition::InPlace,
                UpgradePolicy::Static | UpgradePolicy::SingleChange => {
                    ChangeDisposition::RequiresFullUpgrade
                }
            };
            debug!(self.logger, "Setting removed from inputs";
                "section" => section, "parameter" => parameter, "disposition" => ?disposition);
            changes.push(ParameterChange {
                section: section.to_string(),
                parameter: parameter.to_string(),
                previous: Some(previous.value.clone()),
                requested: None,
                policy: previous.policy,
                disposition,
            });
        }

        info!(self.logger, "Merged settings";
            "parameters" => merged.len(),
            "changed" => changes.iter().filter(|c| c.is_applied()).count(),
            "rejected" => changes.iter().filter(|c| !c.is_applied()).count()
        );

        Ok(MergeOutcome { merged, changes })
    }

    /// Requested value (user over admin) and policy (admin, else user, else
    /// prior). A parameter frozen in the prior manifest stays frozen.
    fn requested(
        admin: &Settings,
        user: &Settings,
        section: &str,
        parameter: &str,
        previous: Option<&SettingsParameter>,
    ) -> Option<SettingsParameter> {
        let admin_param = admin.get(section, parameter);
        let user_param = user.get(section, parameter);
        let value = user_param.or(admin_param)?.value.clone();
        if previous.is_some_and(|p| p.policy == UpgradePolicy::NotAllowed) {
            return Some(SettingsParameter::new(value, UpgradePolicy::NotAllowed));
        }
        let policy = admin_param
            .or(user_param)
            .or(previous)
            .map(|p| p.policy)
            .unwrap_or_default();
        Some(SettingsParameter::new(value, policy))
    }
}
