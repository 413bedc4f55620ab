//! Service configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iz_compiler::{IdRange, TranslateOptions};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// First ID of the dynamic rule range
    pub dynamic_id_start: u32,
    /// Last ID of the dynamic rule range (inclusive)
    pub dynamic_id_end: u32,
    /// Also redirect main_frame and sub_frame loads
    pub include_frames: bool,
    /// Bound on a single platform rule update
    #[serde(with = "humantime_serde")]
    pub platform_timeout: Duration,
    /// Storage key holding the rule list
    pub rules_key: String,
    /// Storage key holding the interception switch
    pub enabled_key: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dynamic_id_start: IdRange::DEFAULT.start,
            dynamic_id_end: IdRange::DEFAULT.end,
            include_frames: false,
            platform_timeout: Duration::from_secs(5),
            rules_key: "interzept-rules".to_string(),
            enabled_key: "interzept-enabled".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read '{}': {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.id_range()?;
        if self.rules_key.is_empty() || self.enabled_key.is_empty() {
            return Err(ServiceError::Config("storage keys must not be empty".to_string()));
        }
        if self.rules_key == self.enabled_key {
            return Err(ServiceError::Config("rulesKey and enabledKey must differ".to_string()));
        }
        if self.platform_timeout.is_zero() {
            return Err(ServiceError::Config("platformTimeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn id_range(&self) -> Result<IdRange, ServiceError> {
        IdRange::new(self.dynamic_id_start, self.dynamic_id_end).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn translate_options(&self) -> TranslateOptions {
        if self.include_frames {
            TranslateOptions::with_frames()
        } else {
            TranslateOptions::default()
        }
    }
}
