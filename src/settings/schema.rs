//! Constraints checked against merged settings before a manifest is built

use crate::error::{ClusterError, ClusterResult};
use crate::settings::model::Settings;
use serde::{Deserialize, Serialize};

/// A single schema constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaRule {
    /// The parameter must be present with a non-blank value
    Required { section: String, parameter: String },

    /// When `section/parameter` equals `equals` (ASCII case-insensitive),
    /// `requires_section/requires_parameter` must be present and non-blank
    RequiredWhen {
        section: String,
        parameter: String,
        equals: String,
        requires_section: String,
        requires_parameter: String,
    },
}

/// Ordered list of schema rules; the first violation is reported
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSchema {
    rules: Vec<SchemaRule>,
}

impl SettingsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required(mut self, section: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.rules.push(SchemaRule::Required {
            section: section.into(),
            parameter: parameter.into(),
        });
        self
    }

    pub fn with_dependency(
        mut self,
        section: impl Into<String>,
        parameter: impl Into<String>,
        equals: impl Into<String>,
        requires_section: impl Into<String>,
        requires_parameter: impl Into<String>,
    ) -> Self {
        self.rules.push(SchemaRule::RequiredWhen {
            section: section.into(),
            parameter: parameter.into(),
            equals: equals.into(),
            requires_section: requires_section.into(),
            requires_parameter: requires_parameter.into(),
        });
        self
    }

    pub fn rules(&self) -> &[SchemaRule] {
        &self.rules
    }

    pub fn validate(&self, settings: &Settings) -> ClusterResult<()> {
        for rule in &self.rules {
            match rule {
                SchemaRule::Required { section, parameter } => {
                    if !has_value(settings, section, parameter) {
                        return Err(ClusterError::validation(
                            format!("{}/{}", section, parameter),
                            "required parameter is missing",
                        ));
                    }
                }
                SchemaRule::RequiredWhen {
                    section,
                    parameter,
                    equals,
                    requires_section,
                    requires_parameter,
                } => {
                    let triggered = settings
                        .value(section, parameter)
                        .is_some_and(|v| v.trim().eq_ignore_ascii_case(equals));
                    if triggered && !has_value(settings, requires_section, requires_parameter) {
                        return Err(ClusterError::validation(
                            format!("{}/{}", requires_section, requires_parameter),
                            format!("required when {}/{} is '{}'", section, parameter, equals),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn has_value(settings: &Settings, section: &str, parameter: &str) -> bool {
    settings
        .value(section, parameter)
        .is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::model::UpgradePolicy;

    fn schema() -> SettingsSchema {
        SettingsSchema::new()
            .with_required("Setup", "FabricDataRoot")
            .with_dependency("Security", "ClusterCredentialType", "X509", "Security", "ServerCertThumbprint")
    }

    #[test]
    fn test_required_parameter() {
        let blank = Settings::new().with_parameter("Setup", "FabricDataRoot", "  ", UpgradePolicy::NotAllowed);
        let err = schema().validate(&blank).unwrap_err();
        assert_eq!(
            err,
            ClusterError::validation("Setup/FabricDataRoot", "required parameter is missing")
        );
    }

    #[test]
    fn test_conditional_dependency() {
        let base = Settings::new().with_parameter("Setup", "FabricDataRoot", "D:\\SF", UpgradePolicy::NotAllowed);
        assert!(schema().validate(&base).is_ok());

        let x509 = base
            .clone()
            .with_parameter("Security", "ClusterCredentialType", "x509", UpgradePolicy::NotAllowed);
        assert!(matches!(
            schema().validate(&x509),
            Err(ClusterError::Validation { ref field, .. }) if field == "Security/ServerCertThumbprint"
        ));

        let complete = x509.with_parameter("Security", "ServerCertThumbprint", "AB12", UpgradePolicy::Static);
        assert!(schema().validate(&complete).is_ok());
    }
}
