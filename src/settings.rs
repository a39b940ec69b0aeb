//! Client-wide configuration.

use crate::error::{ClientError, Result};
use crate::options::BackPressure;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Default credit window for reads and subscriptions.
    pub back_pressure: BackPressure,

    /// Name of the thread draining the connection mailbox.
    /// Default: "tributary-supervisor"
    pub worker_thread_name: String,

    /// Buffer size for channel-backed subscription listeners.
    /// Default: 1000
    pub subscription_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            back_pressure: BackPressure::default(),
            worker_thread_name: "tributary-supervisor".to_string(),
            subscription_buffer: 1000,
        }
    }
}

impl ClientSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: ClientSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.back_pressure.validate()?;
        if self.subscription_buffer == 0 {
            return Err(ClientError::Config(
                "subscription buffer must hold at least one event".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = ClientSettings::from_json(r#"{"back_pressure": {"batch_size": 64}}"#).unwrap();
        assert_eq!(settings.back_pressure.batch_size, 64);
        assert_eq!(settings.back_pressure.threshold_ratio, 0.25);
        assert_eq!(settings.worker_thread_name, "tributary-supervisor");
        assert_eq!(settings.subscription_buffer, 1000);
    }

    #[test]
    fn test_malformed_json() {
        let result = ClientSettings::from_json("{not json");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let result = ClientSettings::from_json(r#"{"back_pressure": {"batch_size": 0}}"#);
        assert!(matches!(result, Err(ClientError::InvalidOptions(_))));
    }

    #[test]
    fn test_empty_subscription_buffer_rejected() {
        let settings = ClientSettings {
            subscription_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ClientError::Config(_))));
    }
}
