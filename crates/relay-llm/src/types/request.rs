use std::time::Duration;

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, validate_sequence};
use crate::error::GatewayError;

/// Call-site generation configuration
///
/// Every field is optional; the registry supplies defaults and the
/// call site wins on conflict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenConfig {
    /// Explicit model override, bypassing tier lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature, 0.0 to 2.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold, (0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum output tokens, > 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences, at most 8
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Per-call timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl GenConfig {
    /// Validate field bounds
    pub fn validate(&self) -> Result<(), GatewayError> {
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(GatewayError::InvalidRequest(format!(
                "temperature must be within [0, 2], got {t}"
            )));
        }
        if let Some(p) = self.top_p
            && !(p > 0.0 && p <= 1.0)
        {
            return Err(GatewayError::InvalidRequest(format!(
                "top_p must be within (0, 1], got {p}"
            )));
        }
        if let Some(m) = self.max_tokens
            && m == 0
        {
            return Err(GatewayError::InvalidRequest("max_tokens must be greater than zero".into()));
        }
        if self.stop_sequences.len() > 8 {
            return Err(GatewayError::InvalidRequest(format!(
                "at most 8 stop sequences are allowed, got {}",
                self.stop_sequences.len()
            )));
        }
        Ok(())
    }

    /// Overlay this config onto registry-resolved parameters
    pub fn apply(&self, mut params: GenerationParams) -> GenerationParams {
        if let Some(temperature) = self.temperature {
            params.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            params.top_p = top_p;
        }
        if let Some(max_tokens) = self.max_tokens {
            params.max_tokens = max_tokens;
        }
        if !self.stop_sequences.is_empty() {
            params.stop_sequences.clone_from(&self.stop_sequences);
        }
        if let Some(secs) = self.timeout_seconds {
            params.timeout = Duration::from_secs(secs);
        }
        params
    }
}

/// One logical generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Ordered conversation
    pub messages: Vec<ChatMessage>,
    /// Call-site parameter overrides
    #[serde(default)]
    pub config: GenConfig,
}

impl GenerationRequest {
    /// Build a request from messages with default config
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            config: GenConfig::default(),
        }
    }

    /// Validate the message sequence and the config bounds
    pub fn validate(&self) -> Result<(), GatewayError> {
        validate_sequence(&self.messages)?;
        self.config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn bounds_are_enforced() {
        let mut config = GenConfig::default();
        assert!(config.validate().is_ok());

        config.temperature = Some(2.5);
        assert!(config.validate().is_err());
        config.temperature = Some(0.0);

        config.top_p = Some(0.0);
        assert!(config.validate().is_err());
        config.top_p = Some(1.0);

        config.max_tokens = Some(0);
        assert!(config.validate().is_err());
        config.max_tokens = Some(1);

        config.stop_sequences = (0..9).map(|i| format!("s{i}")).collect();
        assert!(config.validate().is_err());
    }

    #[test]
    fn call_site_wins_over_registry_params() {
        let config = GenConfig {
            temperature: Some(0.9),
            max_tokens: Some(128),
            timeout_seconds: Some(10),
            ..GenConfig::default()
        };

        let params = config.apply(GenerationParams::default());
        assert_eq!(params.temperature, 0.9);
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.timeout, Duration::from_secs(10));
        // Untouched fields keep registry defaults
        assert_eq!(params.top_p, 1.0);
    }

    #[test]
    fn request_validation_covers_messages_and_config() {
        let mut request = GenerationRequest::new(vec![ChatMessage::user("hi")]);
        assert!(request.validate().is_ok());

        request.config.temperature = Some(-1.0);
        assert!(request.validate().is_err());
    }
}
