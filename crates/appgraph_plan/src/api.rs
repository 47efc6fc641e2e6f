//! HTTP API settings.

use serde::{Deserialize, Serialize};

/// Stage name used when none is given
pub const DEFAULT_STAGE: &str = "prod";

/// Request logging level of the deployed stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingLevel {
    /// No request logging
    #[default]
    Off,
    /// Errors only
    Error,
    /// Every request
    Info,
}

/// Settings of the single HTTP API fronting the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Logical name of the API
    pub name: String,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deploy a stage along with the API
    pub deploy: bool,
    /// Stage name
    pub stage: String,
    /// Stage logging level
    pub logging: LoggingLevel,
}

impl ApiSettings {
    /// API deployed to the default stage without request logging
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deploy: true,
            stage: DEFAULT_STAGE.to_string(),
            logging: LoggingLevel::default(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the stage name
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Set the stage logging level
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingLevel) -> Self {
        self.logging = logging;
        self
    }

    /// Declare the API without deploying a stage
    #[must_use]
    pub fn without_deploy(mut self) -> Self {
        self.deploy = false;
        self
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::new("Api")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_defaults() {
        let api = ApiSettings::new("SaladAppApi");
        assert!(api.deploy);
        assert_eq!(api.stage, "prod");
        assert_eq!(api.logging, LoggingLevel::Off);
        assert!(api.description.is_none());
    }

    #[test]
    fn test_api_builder() {
        let api = ApiSettings::new("SaladAppApi")
            .with_description("Salad App API")
            .with_stage("dev")
            .with_logging(LoggingLevel::Info)
            .without_deploy();
        assert_eq!(api.description.as_deref(), Some("Salad App API"));
        assert_eq!(api.stage, "dev");
        assert!(!api.deploy);
        let json = serde_json::to_string(&api).unwrap();
        assert!(json.contains(r#""logging":"info""#));
    }
}
