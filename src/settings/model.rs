//! Settings data model: sections of named parameters, each carrying a value
//! and the upgrade policy that governs how it may change

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a parameter may change once a cluster is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpgradePolicy {
    /// Propagated to running nodes in place
    #[default]
    Dynamic,
    /// Accepted, but needs a full rolling upgrade
    Static,
    /// Frozen after the cluster is created
    NotAllowed,
    /// May move away from its default exactly once
    SingleChange,
}

impl fmt::Display for UpgradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradePolicy::Dynamic => "Dynamic",
            UpgradePolicy::Static => "Static",
            UpgradePolicy::NotAllowed => "NotAllowed",
            UpgradePolicy::SingleChange => "SingleChange",
        };
        f.write_str(name)
    }
}

/// A parameter value and its declared upgrade policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsParameter {
    pub value: String,
    #[serde(default)]
    pub policy: UpgradePolicy,
}

impl SettingsParameter {
    pub fn new(value: impl Into<String>, policy: UpgradePolicy) -> Self {
        Self {
            value: value.into(),
            policy,
        }
    }
}

/// Section name -> parameter name -> parameter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    sections: BTreeMap<String, BTreeMap<String, SettingsParameter>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_parameter(
        mut self,
        section: impl Into<String>,
        parameter: impl Into<String>,
        value: impl Into<String>,
        policy: UpgradePolicy,
    ) -> Self {
        self.insert(section, parameter, SettingsParameter::new(value, policy));
        self
    }

    /// Insert a parameter, returning the one it replaced
    pub fn insert(
        &mut self,
        section: impl Into<String>,
        parameter: impl Into<String>,
        value: SettingsParameter,
    ) -> Option<SettingsParameter> {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(parameter.into(), value)
    }

    pub fn get(&self, section: &str, parameter: &str) -> Option<&SettingsParameter> {
        self.sections.get(section)?.get(parameter)
    }

    pub fn value(&self, section: &str, parameter: &str) -> Option<&str> {
        self.get(section, parameter).map(|p| p.value.as_str())
    }

    pub fn contains(&self, section: &str, parameter: &str) -> bool {
        self.get(section, parameter).is_some()
    }

    /// All parameters as `(section, parameter, value)` in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &SettingsParameter)> {
        self.sections.iter().flat_map(|(section, params)| {
            params
                .iter()
                .map(move |(name, param)| (section.as_str(), name.as_str(), param))
        })
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Number of parameters across all sections
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happens to a changed parameter in the next manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeDisposition {
    /// Pushed to running nodes without restarting them
    InPlace,
    /// Applied through a full rolling upgrade
    RequiresFullUpgrade,
    /// Ignored; the prior value stays in effect
    Rejected,
}

/// A parameter whose value differs from the prior manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub section: String,
    pub parameter: String,
    /// Value in the prior manifest, if the parameter existed
    pub previous: Option<String>,
    /// Value requested by the new inputs, if any
    pub requested: Option<String>,
    pub policy: UpgradePolicy,
    pub disposition: ChangeDisposition,
}

impl ParameterChange {
    pub fn is_applied(&self) -> bool {
        self.disposition != ChangeDisposition::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_iteration_is_sorted() {
        let settings = Settings::new()
            .with_parameter("Security", "ClusterCredentialType", "X509", UpgradePolicy::NotAllowed)
            .with_parameter("Diagnostics", "MaxDiskQuotaInMB", "1024", UpgradePolicy::Dynamic)
            .with_parameter("Diagnostics", "EnableTracing", "true", UpgradePolicy::Static);

        let keys: Vec<_> = settings.iter().map(|(s, p, _)| format!("{}/{}", s, p)).collect();
        assert_eq!(
            keys,
            vec![
                "Diagnostics/EnableTracing",
                "Diagnostics/MaxDiskQuotaInMB",
                "Security/ClusterCredentialType"
            ]
        );
        assert_eq!(settings.len(), 3);
        assert_eq!(settings.value("Diagnostics", "MaxDiskQuotaInMB"), Some("1024"));
    }

    #[test]
    fn test_settings_json_shape() {
        let json = r#"{"Setup":{"FabricDataRoot":{"value":"D:\\data","policy":"NotAllowed"},"Port":{"value":"19000"}}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.get("Setup", "FabricDataRoot").unwrap().policy, UpgradePolicy::NotAllowed);
        assert_eq!(settings.get("Setup", "Port").unwrap().policy, UpgradePolicy::Dynamic);
    }
}
