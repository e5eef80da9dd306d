//! YAML model registry
//!
//! Declarative mapping from (provider, tier) to model strings, agent tier
//! assignments, generation parameter defaults, and the provider fallback
//! chain. The registry is loaded once at startup and treated as an
//! immutable value; environment overrides are captured at load time so a
//! reload of the same document under the same environment yields
//! identical resolutions.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::env::env_opt;

/// The seven supported inference back ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Local Ollama runtime
    Ollama,
    /// Self-hosted LightLLM runtime (OpenAI dialect)
    Lightllm,
    /// Groq cloud (OpenAI dialect)
    Groq,
    /// Google Generative Language API
    Gemini,
    /// Anthropic Messages API
    Anthropic,
    /// AWS Bedrock foundation models
    Bedrock,
    /// Azure OpenAI deployments
    AzureOpenai,
}

impl ProviderId {
    /// All providers, in the source system's default fallback order
    /// (local first, then free cloud, then paid, then hyperscaler)
    pub const ALL: [Self; 7] = [
        Self::Ollama,
        Self::Lightllm,
        Self::Groq,
        Self::Gemini,
        Self::Anthropic,
        Self::Bedrock,
        Self::AzureOpenai,
    ];

    /// Canonical lowercase identifier
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Lightllm => "lightllm",
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::AzureOpenai => "azure_openai",
        }
    }

    /// Prefix for `<PROVIDER>_API_KEY` style environment variables
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Ollama => "OLLAMA",
            Self::Lightllm => "LIGHTLLM",
            Self::Groq => "GROQ",
            Self::Gemini => "GEMINI",
            Self::Anthropic => "ANTHROPIC",
            Self::Bedrock => "BEDROCK",
            Self::AzureOpenai => "AZURE_OPENAI",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "lightllm" => Ok(Self::Lightllm),
            "groq" => Ok(Self::Groq),
            "gemini" => Ok(Self::Gemini),
            "anthropic" => Ok(Self::Anthropic),
            "bedrock" => Ok(Self::Bedrock),
            "azure_openai" => Ok(Self::AzureOpenai),
            other => anyhow::bail!("unknown provider: {other}"),
        }
    }
}

/// Capability class a model belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Balanced model used when no tier is assigned
    Default,
    /// Low-latency model for classification-style calls
    Fast,
    /// Highest-capability model
    Quality,
    /// Model reserved for offline evaluation runs
    Evaluation,
    /// Older model kept for reproducibility
    Legacy,
}

impl ModelTier {
    /// Canonical lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Fast => "fast",
            Self::Quality => "quality",
            Self::Evaluation => "evaluation",
            Self::Legacy => "legacy",
        }
    }
}

/// Registry entry for one provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Whether the provider participates in selection
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Inline credential (discouraged outside development)
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Name of the environment variable holding the credential
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Endpoint base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Per-tier model strings
    #[serde(default)]
    pub models: IndexMap<ModelTier, String>,
    /// Default request timeout for this provider, in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// API version (Azure OpenAI)
    #[serde(default)]
    pub api_version: Option<String>,
    /// AWS region (Bedrock)
    #[serde(default)]
    pub region: Option<String>,
}

const fn default_enabled() -> bool {
    true
}

/// Per-tier or per-agent generation parameter overrides
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierParams {
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Maximum output tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Per-call timeout in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Fully resolved generation parameters for one call
///
/// Composition order: built-in defaults, tier defaults, per-agent
/// overrides, call-site config — later layers win.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Stop sequences
    pub stop_sequences: Vec<String>,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 1.0,
            max_tokens: 4096,
            stop_sequences: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl GenerationParams {
    fn overlay(&mut self, params: &TierParams) {
        if let Some(temperature) = params.temperature {
            self.temperature = temperature;
        }
        if let Some(top_p) = params.top_p {
            self.top_p = top_p;
        }
        if let Some(max_tokens) = params.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(ref stop) = params.stop_sequences {
            self.stop_sequences.clone_from(stop);
        }
        if let Some(secs) = params.timeout_seconds {
            self.timeout = Duration::from_secs(secs);
        }
    }
}

/// Resolution failure against a loaded registry
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Provider absent from the `providers` table
    #[error("provider {provider} is not configured")]
    UnknownProvider {
        /// Provider identifier
        provider: String,
    },
    /// No model for the tier and no `default` tier fallback
    #[error("no model configured for provider {provider} tier {tier}")]
    MissingModel {
        /// Provider identifier
        provider: String,
        /// Tier that failed to resolve
        tier: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Defaults {
    #[serde(default)]
    provider: Option<ProviderId>,
    #[serde(default)]
    fallback_chain: Vec<ProviderId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvironmentOverlay {
    #[serde(default)]
    provider: Option<ProviderId>,
    #[serde(default)]
    fallback_chain: Option<Vec<ProviderId>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryDoc {
    #[serde(default)]
    providers: IndexMap<ProviderId, ProviderEntry>,
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    agent_assignments: IndexMap<ModelTier, Vec<String>>,
    #[serde(default)]
    parameters: IndexMap<ModelTier, TierParams>,
    #[serde(default)]
    agent_overrides: IndexMap<String, TierParams>,
    #[serde(default)]
    environments: IndexMap<String, EnvironmentOverlay>,
}

/// Loaded, immutable model registry
///
/// Share via `Arc`; reload by loading a fresh value and swapping the
/// `Arc` at the assembly layer.
#[derive(Debug)]
pub struct ModelRegistry {
    doc: RegistryDoc,
    default_provider: ProviderId,
    fallback_chain: Vec<ProviderId>,
    model_overrides: HashMap<ProviderId, String>,
    base_url_overrides: HashMap<ProviderId, Url>,
    credentials: HashMap<ProviderId, SecretString>,
}

impl ModelRegistry {
    /// Load the registry from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, the document fails
    /// to parse, or an environment override names an unknown provider.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read registry {}: {e}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Parse the registry from a YAML string
    ///
    /// # Errors
    ///
    /// Same conditions as [`ModelRegistry::load`], minus file I/O.
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let doc: RegistryDoc =
            serde_yaml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse registry: {e}"))?;

        let mut default_provider = doc.defaults.provider;
        let mut fallback_chain = doc.defaults.fallback_chain.clone();

        // Per-environment overlay, selected by RELAY_ENV
        if let Some(env_name) = env_opt("RELAY_ENV")
            && let Some(overlay) = doc.environments.get(&env_name)
        {
            if let Some(provider) = overlay.provider {
                default_provider = Some(provider);
            }
            if let Some(ref chain) = overlay.fallback_chain {
                fallback_chain.clone_from(chain);
            }
        }

        // Explicit environment overrides win over the document
        if let Some(raw_provider) = env_opt("PROVIDER") {
            default_provider = Some(raw_provider.parse()?);
        }
        if let Some(raw_chain) = env_opt("PROVIDER_FALLBACK") {
            fallback_chain = raw_chain
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<_>, _>>()?;
        }

        let mut model_overrides = HashMap::new();
        let mut base_url_overrides = HashMap::new();
        let mut credentials = HashMap::new();

        for id in ProviderId::ALL {
            let prefix = id.env_prefix();
            if let Some(model) = env_opt(&format!("{prefix}_MODEL")) {
                model_overrides.insert(id, model);
            }
            if let Some(raw_url) = env_opt(&format!("{prefix}_BASE_URL")) {
                let url = Url::parse(&raw_url)
                    .map_err(|e| anyhow::anyhow!("invalid {prefix}_BASE_URL: {e}"))?;
                base_url_overrides.insert(id, url);
            }

            // Credential resolution: `<PREFIX>_API_KEY`, then the inline
            // key, then the env var named by `api_key_env`
            let entry = doc.providers.get(&id);
            let credential = env_opt(&format!("{prefix}_API_KEY"))
                .map(SecretString::from)
                .or_else(|| entry.and_then(|e| e.api_key.clone()))
                .or_else(|| {
                    entry
                        .and_then(|e| e.api_key_env.as_deref())
                        .and_then(env_opt)
                        .map(SecretString::from)
                });
            if let Some(credential) = credential {
                credentials.insert(id, credential);
            }
        }

        Ok(Self {
            default_provider: default_provider.unwrap_or(ProviderId::Ollama),
            fallback_chain,
            model_overrides,
            base_url_overrides,
            credentials,
            doc,
        })
    }

    /// The provider tried first for every call
    pub const fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    /// Fallback chain with duplicates and the primary removed
    pub fn fallback_chain(&self) -> Vec<ProviderId> {
        let mut seen = vec![self.default_provider];
        let mut chain = Vec::new();
        for &id in &self.fallback_chain {
            if !seen.contains(&id) {
                seen.push(id);
                chain.push(id);
            }
        }
        chain
    }

    /// Registry entry for a provider
    pub fn provider(&self, id: ProviderId) -> Option<&ProviderEntry> {
        self.doc.providers.get(&id)
    }

    /// Providers configured and enabled, in document order
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        self.doc
            .providers
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Tier assigned to an agent; unknown agents use the default tier
    pub fn tier_for_agent(&self, agent: &str) -> ModelTier {
        for (&tier, agents) in &self.doc.agent_assignments {
            if agents.iter().any(|a| a == agent) {
                return tier;
            }
        }
        ModelTier::Default
    }

    /// Model string for (provider, tier)
    ///
    /// An environment model override bypasses the tier lookup entirely.
    /// A missing tier falls back to the provider's `default` tier.
    pub fn model_for(&self, provider: ProviderId, tier: ModelTier) -> Result<String, ResolveError> {
        if let Some(model) = self.model_overrides.get(&provider) {
            return Ok(model.clone());
        }

        let entry = self
            .doc
            .providers
            .get(&provider)
            .ok_or_else(|| ResolveError::UnknownProvider {
                provider: provider.to_string(),
            })?;

        entry
            .models
            .get(&tier)
            .or_else(|| entry.models.get(&ModelTier::Default))
            .cloned()
            .ok_or_else(|| ResolveError::MissingModel {
                provider: provider.to_string(),
                tier: tier.as_str().to_owned(),
            })
    }

    /// Model string for (provider, agent) via the agent's tier
    pub fn resolve_model(&self, provider: ProviderId, agent: &str) -> Result<String, ResolveError> {
        self.model_for(provider, self.tier_for_agent(agent))
    }

    /// Generation parameters for an agent: tier defaults overlaid with
    /// per-agent overrides (call-site config is applied by the caller)
    pub fn params_for_agent(&self, agent: &str) -> GenerationParams {
        let mut params = GenerationParams::default();

        let tier = self.tier_for_agent(agent);
        if let Some(tier_params) = self.doc.parameters.get(&tier) {
            params.overlay(tier_params);
        } else if tier != ModelTier::Default
            && let Some(default_params) = self.doc.parameters.get(&ModelTier::Default)
        {
            params.overlay(default_params);
        }

        if let Some(overrides) = self.doc.agent_overrides.get(agent) {
            params.overlay(overrides);
        }

        params
    }

    /// Effective base URL for a provider (env override wins)
    pub fn base_url(&self, id: ProviderId) -> Option<Url> {
        self.base_url_overrides
            .get(&id)
            .cloned()
            .or_else(|| self.provider(id).and_then(|e| e.base_url.clone()))
    }

    /// Resolved credential for a provider, if any source supplied one
    pub fn credential(&self, id: ProviderId) -> Option<SecretString> {
        self.credentials.get(&id).cloned()
    }

    /// Default request timeout for a provider
    pub fn provider_timeout(&self, id: ProviderId) -> Duration {
        self.provider(id)
            .and_then(|e| e.timeout_seconds)
            .map_or(Duration::from_secs(120), Duration::from_secs)
    }
}
