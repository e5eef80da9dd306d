//! Provider selection and typed fallback
//!
//! One logical call resolves to an ordered candidate list (registry
//! primary plus fallback chain), filtered by circuit state. Transferable
//! failures move to the next candidate and feed the circuit breaker;
//! non-transferable failures surface immediately. For streaming calls,
//! fallback holds only until the first chunk arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use relay_config::{ModelRegistry, ProviderId};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::health::{Attempt, CircuitBreakerConfig, HealthTracker};
use crate::provider::{
    ChunkStream, Provider, ProviderRequest, anthropic::AnthropicProvider, azure_openai::AzureOpenaiProvider,
    bedrock::BedrockProvider, gemini::GeminiProvider, groq::GroqProvider, lightllm::LightllmProvider,
    ollama::OllamaProvider,
};
use crate::types::{GenerationRequest, GenerationResponse, StreamChunk};

/// Capacity of the canonical chunk channel
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// The gateway: provider multiplexing with typed fallback
pub struct Gateway {
    registry: Arc<ModelRegistry>,
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    health: HealthTracker,
}

impl Gateway {
    /// Construct adapters for every enabled provider in the registry
    pub async fn from_registry(registry: Arc<ModelRegistry>, breaker: CircuitBreakerConfig) -> Self {
        let mut providers: HashMap<ProviderId, Arc<dyn Provider>> = HashMap::new();

        for id in registry.enabled_providers() {
            let provider: Arc<dyn Provider> = match id {
                ProviderId::Ollama => Arc::new(OllamaProvider::from_registry(&registry)),
                ProviderId::Lightllm => Arc::new(LightllmProvider::from_registry(&registry)),
                ProviderId::Groq => Arc::new(GroqProvider::from_registry(&registry)),
                ProviderId::Gemini => Arc::new(GeminiProvider::from_registry(&registry)),
                ProviderId::Anthropic => Arc::new(AnthropicProvider::from_registry(&registry)),
                ProviderId::Bedrock => Arc::new(BedrockProvider::from_registry(&registry).await),
                ProviderId::AzureOpenai => Arc::new(AzureOpenaiProvider::from_registry(&registry)),
            };
            providers.insert(id, provider);
        }

        Self::with_providers(registry, providers, breaker)
    }

    /// Assemble a gateway from pre-built adapters
    ///
    /// Useful for embedding and for exercising the fallback engine with
    /// scripted providers.
    pub fn with_providers(
        registry: Arc<ModelRegistry>,
        providers: HashMap<ProviderId, Arc<dyn Provider>>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            registry,
            providers,
            health: HealthTracker::new(breaker),
        }
    }

    /// The circuit-breaker table (read-only uses only)
    pub const fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub(crate) fn provider_list(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.values().map(Arc::clone).collect()
    }

    /// Ordered candidate list for an agent: registry primary first, then
    /// the deduplicated fallback chain
    fn candidates(&self) -> Vec<ProviderId> {
        let mut candidates = vec![self.registry.default_provider()];
        candidates.extend(self.registry.fallback_chain());
        candidates.retain(|id| self.providers.contains_key(id));
        candidates
    }

    /// Resolve the adapter-level request for one candidate
    fn build_request(
        &self,
        id: ProviderId,
        agent: &str,
        request: &GenerationRequest,
    ) -> Result<(ProviderRequest, Duration), GatewayError> {
        let model = match request.config.model {
            Some(ref model) => model.clone(),
            None => self.registry.resolve_model(id, agent)?,
        };

        let params = request.config.apply(self.registry.params_for_agent(agent));
        // Effective timeout: call-site/tier timeout bounded by the
        // provider's configured default
        let timeout = params.timeout.min(self.registry.provider_timeout(id));

        Ok((
            ProviderRequest {
                model,
                messages: request.messages.clone(),
                params,
            },
            timeout,
        ))
    }

    /// One non-streaming generation call with fallback
    pub async fn generate(&self, agent: &str, request: &GenerationRequest) -> Result<GenerationResponse, GatewayError> {
        request.validate()?;

        let mut last_error: Option<GatewayError> = None;
        let mut rate_limit_retry: Option<u64> = None;
        let mut last_tried = "none".to_owned();

        for id in self.candidates() {
            let Some(provider) = self.providers.get(&id) else {
                continue;
            };
            let name = provider.name();

            let probe = match self.health.try_acquire(name) {
                Attempt::Skip => continue,
                Attempt::Probe => true,
                Attempt::Normal => false,
            };

            let (provider_request, timeout) = match self.build_request(id, agent, request) {
                Ok(built) => built,
                Err(e) => {
                    if probe {
                        self.health.release_probe(name);
                    }
                    return Err(e);
                }
            };

            last_tried = name.to_owned();
            tracing::debug!(provider = name, model = %provider_request.model, probe, "attempting provider");

            let error = match tokio::time::timeout(timeout, provider.generate(&provider_request)).await {
                Ok(Ok(response)) => {
                    self.health.record_success(name);
                    return Ok(response);
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout {
                    provider: name.to_owned(),
                },
            };

            match self.absorb_failure(name, probe, error, &mut rate_limit_retry).await {
                Ok(transferred) => last_error = Some(transferred),
                Err(terminal) => return Err(terminal),
            }
        }

        Err(exhausted(last_error, rate_limit_retry, last_tried))
    }

    /// One streaming generation call with fallback up to the first chunk
    ///
    /// Returns the canonical chunk channel. The stream is finite and ends
    /// with exactly one terminal chunk; dropping the receiver cancels the
    /// forwarding task and aborts upstream I/O.
    pub async fn generate_stream(
        &self,
        agent: &str,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, GatewayError> {
        request.validate()?;

        let mut last_error: Option<GatewayError> = None;
        let mut rate_limit_retry: Option<u64> = None;
        let mut last_tried = "none".to_owned();

        for id in self.candidates() {
            let Some(provider) = self.providers.get(&id) else {
                continue;
            };
            let name = provider.name();

            let probe = match self.health.try_acquire(name) {
                Attempt::Skip => continue,
                Attempt::Probe => true,
                Attempt::Normal => false,
            };

            let (provider_request, timeout) = match self.build_request(id, agent, request) {
                Ok(built) => built,
                Err(e) => {
                    if probe {
                        self.health.release_probe(name);
                    }
                    return Err(e);
                }
            };

            last_tried = name.to_owned();
            tracing::debug!(provider = name, model = %provider_request.model, probe, "attempting provider stream");

            // Selection holds until the first chunk arrives
            let opened = tokio::time::timeout(timeout, async {
                let mut stream = provider.generate_stream(&provider_request).await?;
                let first = stream.next().await;
                Ok::<_, GatewayError>((stream, first))
            })
            .await;

            let error = match opened {
                Ok(Ok((stream, Some(Ok(first))))) => {
                    self.health.record_success(name);
                    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
                    tokio::spawn(forward_stream(stream, first, tx));
                    return Ok(rx);
                }
                Ok(Ok((_, Some(Err(e))))) => e,
                Ok(Ok((_, None))) => GatewayError::Unavailable {
                    provider: name.to_owned(),
                    message: "stream ended before any chunk".to_owned(),
                },
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout {
                    provider: name.to_owned(),
                },
            };

            match self.absorb_failure(name, probe, error, &mut rate_limit_retry).await {
                Ok(transferred) => last_error = Some(transferred),
                Err(terminal) => return Err(terminal),
            }
        }

        Err(exhausted(last_error, rate_limit_retry, last_tried))
    }

    /// Classify a candidate failure: record health, decide whether the
    /// chain continues (`Ok`) or the error surfaces now (`Err`)
    async fn absorb_failure(
        &self,
        name: &str,
        probe: bool,
        error: GatewayError,
        rate_limit_retry: &mut Option<u64>,
    ) -> Result<GatewayError, GatewayError> {
        if let GatewayError::RateLimited { retry_after, .. } = error {
            // A throttle is load information, not a health signal
            if probe {
                self.health.release_probe(name);
            }
            if let Some(after) = retry_after {
                *rate_limit_retry = Some(rate_limit_retry.map_or(after, |r| r.max(after)));
            }
            tracing::warn!(provider = name, "provider throttled, trying next candidate");
            tokio::time::sleep(jitter_delay()).await;
            return Ok(error);
        }

        if error.is_transferable() {
            self.health.record_failure(name, probe);
            tracing::warn!(provider = name, error = %error, "provider failed, trying next candidate");
            return Ok(error);
        }

        // Non-transferable: would fail identically elsewhere
        if probe {
            self.health.release_probe(name);
        }
        Err(error)
    }
}

/// Final error once every candidate was skipped or exhausted
fn exhausted(last_error: Option<GatewayError>, rate_limit_retry: Option<u64>, last_tried: String) -> GatewayError {
    match last_error {
        // Surface the largest observed retry-after so the caller is
        // admitted on return
        Some(GatewayError::RateLimited { provider, retry_after }) => GatewayError::RateLimited {
            provider,
            retry_after: rate_limit_retry.or(retry_after),
        },
        Some(error) => error,
        None => GatewayError::NoProviderAvailable { last_tried },
    }
}

/// Forward adapter chunks onto the canonical channel
///
/// Guarantees exactly one terminal chunk: adapter errors become terminal
/// `{error}` chunks, and a stream that ends without a terminal gets a
/// synthesized `{done}`. A closed receiver stops forwarding immediately,
/// dropping the upstream stream and releasing its connection.
async fn forward_stream(mut stream: ChunkStream, first: StreamChunk, tx: mpsc::Sender<StreamChunk>) {
    let mut terminal_sent = first.is_terminal();
    if tx.send(first).await.is_err() {
        return;
    }

    while !terminal_sent {
        match stream.next().await {
            Some(Ok(chunk)) => {
                terminal_sent = chunk.is_terminal();
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(StreamChunk::error(&e)).await;
                return;
            }
            None => {
                let _ = tx.send(StreamChunk::done(None, None)).await;
                return;
            }
        }
    }
}

/// Small clock-derived jitter applied between candidates after a
/// provider-side throttle
fn jitter_delay() -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(25 + u64::from(nanos % 75))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::health::CircuitState;
    use crate::types::{ChatMessage, FinishReason, TokenUsage};

    /// Outcome script for one provider call
    #[derive(Debug, Clone)]
    enum Step {
        Ok(&'static str),
        Unavailable,
        Auth,
        RateLimited(Option<u64>),
        Stream(Vec<StreamChunk>),
        StreamOpenFails,
    }

    /// Scripted adapter that records how often it was called
    struct Scripted {
        name: &'static str,
        steps: Mutex<Vec<Step>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                name,
                steps: Mutex::new(steps),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }

        fn next_step(&self) -> Step {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.remove(0)
            } else {
                steps.first().cloned().unwrap_or(Step::Unavailable)
            }
        }

        fn step_error(&self, step: &Step) -> GatewayError {
            match step {
                Step::Unavailable | Step::StreamOpenFails => GatewayError::Unavailable {
                    provider: self.name.to_owned(),
                    message: "scripted failure".into(),
                },
                Step::Auth => GatewayError::Auth {
                    provider: self.name.to_owned(),
                },
                Step::RateLimited(after) => GatewayError::RateLimited {
                    provider: self.name.to_owned(),
                    retry_after: *after,
                },
                _ => unreachable!("not an error step"),
            }
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn default_model(&self) -> String {
            "scripted-model".to_owned()
        }

        async fn generate(&self, request: &ProviderRequest) -> Result<GenerationResponse, GatewayError> {
            match self.next_step() {
                Step::Ok(content) => Ok(GenerationResponse {
                    content: content.to_owned(),
                    input_tokens: 1,
                    output_tokens: 1,
                    finish_reason: FinishReason::Stop,
                    model: request.model.clone(),
                    provider: self.name.to_owned(),
                }),
                step => Err(self.step_error(&step)),
            }
        }

        async fn generate_stream(&self, _request: &ProviderRequest) -> Result<ChunkStream, GatewayError> {
            match self.next_step() {
                Step::Stream(chunks) => {
                    let items: Vec<Result<StreamChunk, GatewayError>> = chunks.into_iter().map(Ok).collect();
                    Ok(Box::pin(futures_util::stream::iter(items)))
                }
                Step::StreamOpenFails => Err(self.step_error(&Step::StreamOpenFails)),
                Step::Ok(content) => {
                    let items = vec![
                        Ok(StreamChunk::delta(content.to_owned())),
                        Ok(StreamChunk::done(Some(FinishReason::Stop), None)),
                    ];
                    Ok(Box::pin(futures_util::stream::iter(items)))
                }
                step => Err(self.step_error(&step)),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    const TEST_REGISTRY: &str = r"
providers:
  ollama:
    models:
      default: local-model
  groq:
    models:
      default: cloud-model
  anthropic:
    models:
      default: paid-model
defaults:
  provider: ollama
  fallback_chain: [groq, anthropic]
";

    fn gateway_with(
        breaker: CircuitBreakerConfig,
        scripted: &[(ProviderId, Arc<Scripted>)],
    ) -> Gateway {
        let registry = temp_env::with_vars(
            [
                ("PROVIDER", None::<&str>),
                ("PROVIDER_FALLBACK", None),
                ("RELAY_ENV", None),
                ("OLLAMA_MODEL", None),
                ("GROQ_MODEL", None),
                ("ANTHROPIC_MODEL", None),
            ],
            || ModelRegistry::from_yaml(TEST_REGISTRY).unwrap(),
        );

        let providers: HashMap<ProviderId, Arc<dyn Provider>> = scripted
            .iter()
            .map(|(id, p)| (*id, Arc::clone(p) as Arc<dyn Provider>))
            .collect();

        Gateway::with_providers(Arc::new(registry), providers, breaker)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn fallback_moves_past_unavailable_primary() {
        let primary = Scripted::new("ollama", vec![Step::Unavailable]);
        let secondary = Scripted::new("groq", vec![Step::Ok("ok")]);
        let gateway = gateway_with(
            CircuitBreakerConfig::default(),
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        let response = gateway.generate("agent", &request()).await.unwrap();

        assert_eq!(response.content, "ok");
        assert_eq!(response.provider, "groq");
        assert_eq!(primary.calls(), 1);
        assert_eq!(gateway.health().snapshot("ollama").consecutive_failures, 1);
    }

    #[tokio::test]
    async fn non_transferable_error_stops_the_chain() {
        let primary = Scripted::new("ollama", vec![Step::Auth]);
        let secondary = Scripted::new("groq", vec![Step::Ok("ok")]);
        let gateway = gateway_with(
            CircuitBreakerConfig::default(),
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        let err = gateway.generate("agent", &request()).await.unwrap_err();

        assert_eq!(err.kind(), "auth_error");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
        // Auth failures are not a health signal
        assert_eq!(gateway.health().snapshot("ollama").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn provider_throttle_moves_on_without_health_damage() {
        let primary = Scripted::new("ollama", vec![Step::RateLimited(Some(7))]);
        let secondary = Scripted::new("groq", vec![Step::Ok("ok")]);
        let gateway = gateway_with(
            CircuitBreakerConfig::default(),
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        let response = gateway.generate("agent", &request()).await.unwrap();

        assert_eq!(response.provider, "groq");
        assert_eq!(gateway.health().state("ollama"), CircuitState::Closed);
        assert_eq!(gateway.health().snapshot("ollama").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_rate_limit_with_largest_retry_after() {
        let primary = Scripted::new("ollama", vec![Step::RateLimited(Some(30))]);
        let secondary = Scripted::new("groq", vec![Step::RateLimited(Some(90))]);
        let gateway = gateway_with(
            CircuitBreakerConfig::default(),
            &[(ProviderId::Ollama, primary), (ProviderId::Groq, secondary)],
        );

        let err = gateway.generate("agent", &request()).await.unwrap_err();

        match err {
            GatewayError::RateLimited { retry_after, .. } => assert_eq!(retry_after, Some(90)),
            other => panic!("expected rate_limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_circuit_is_skipped_until_deadline() {
        let primary = Scripted::new("ollama", vec![Step::Unavailable]);
        let secondary = Scripted::new("groq", vec![Step::Ok("ok")]);
        let gateway = gateway_with(
            CircuitBreakerConfig {
                failure_threshold: 2,
                base_backoff_seconds: 3600,
                max_backoff_seconds: 3600,
            },
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        // Two failures trip the breaker
        for _ in 0..2 {
            let response = gateway.generate("agent", &request()).await.unwrap();
            assert_eq!(response.provider, "groq");
        }
        assert_eq!(gateway.health().state("ollama"), CircuitState::Open);
        assert_eq!(primary.calls(), 2);

        // While open, the primary is not attempted at all
        let response = gateway.generate("agent", &request()).await.unwrap();
        assert_eq!(response.provider, "groq");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn elapsed_deadline_probes_exactly_once_and_recovers() {
        let primary = Scripted::new("ollama", vec![Step::Unavailable, Step::Unavailable, Step::Ok("back")]);
        let secondary = Scripted::new("groq", vec![Step::Ok("ok")]);
        let gateway = gateway_with(
            CircuitBreakerConfig {
                failure_threshold: 2,
                base_backoff_seconds: 0,
                max_backoff_seconds: 600,
            },
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        for _ in 0..2 {
            gateway.generate("agent", &request()).await.unwrap();
        }
        assert_eq!(primary.calls(), 2);

        // Zero backoff: the deadline has already elapsed, so the next
        // call sends a single probe, which succeeds and closes the circuit
        let response = gateway.generate("agent", &request()).await.unwrap();
        assert_eq!(response.provider, "ollama");
        assert_eq!(response.content, "back");
        assert_eq!(primary.calls(), 3);
        assert_eq!(gateway.health().state("ollama"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn empty_candidate_list_reports_no_provider() {
        let gateway = gateway_with(CircuitBreakerConfig::default(), &[]);
        let err = gateway.generate("agent", &request()).await.unwrap_err();
        assert_eq!(err.kind(), "no_provider_available");
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_a_provider() {
        let primary = Scripted::new("ollama", vec![Step::Ok("ok")]);
        let gateway = gateway_with(CircuitBreakerConfig::default(), &[(ProviderId::Ollama, Arc::clone(&primary))]);

        let bad = GenerationRequest::new(vec![ChatMessage::assistant("backwards")]);
        let err = gateway.generate("agent", &bad).await.unwrap_err();

        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn stream_yields_canonical_chunk_sequence() {
        let primary = Scripted::new(
            "ollama",
            vec![Step::Stream(vec![
                StreamChunk::delta("He"),
                StreamChunk::delta("llo"),
                StreamChunk::done(Some(FinishReason::Stop), Some(TokenUsage { input_tokens: 3, output_tokens: 2 })),
            ])],
        );
        let gateway = gateway_with(CircuitBreakerConfig::default(), &[(ProviderId::Ollama, primary)]);

        let mut rx = gateway.generate_stream("agent", &request()).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], StreamChunk::delta("He"));
        assert_eq!(chunks[1], StreamChunk::delta("llo"));
        assert!(chunks[2].is_terminal());
    }

    #[tokio::test]
    async fn stream_open_failure_falls_back_before_first_chunk() {
        let primary = Scripted::new("ollama", vec![Step::StreamOpenFails]);
        let secondary = Scripted::new(
            "groq",
            vec![Step::Stream(vec![
                StreamChunk::delta("ok"),
                StreamChunk::done(Some(FinishReason::Stop), None),
            ])],
        );
        let gateway = gateway_with(
            CircuitBreakerConfig::default(),
            &[(ProviderId::Ollama, Arc::clone(&primary)), (ProviderId::Groq, Arc::clone(&secondary))],
        );

        let mut rx = gateway.generate_stream("agent", &request()).await.unwrap();
        let first = rx.recv().await.unwrap();

        assert_eq!(first, StreamChunk::delta("ok"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn stream_without_terminal_gets_a_synthesized_done() {
        let primary = Scripted::new("ollama", vec![Step::Stream(vec![StreamChunk::delta("partial")])]);
        let gateway = gateway_with(CircuitBreakerConfig::default(), &[(ProviderId::Ollama, primary)]);

        let mut rx = gateway.generate_stream("agent", &request()).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_terminal());
        assert_eq!(chunks[1], StreamChunk::done(None, None));
    }
}
