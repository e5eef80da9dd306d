//! Configuration builders for the test server

use relay_config::{
    AuthConfig, GatewayConfig, JwtAlgorithm, ModelRegistry, RateLimitConfig, ServerConfig, SessionBackend,
    SessionConfig,
};

/// Baseline config: auth disabled, generous rate limits, memory sessions
pub fn base_config() -> GatewayConfig {
    GatewayConfig {
        server: ServerConfig {
            listen: "127.0.0.1:0".parse().expect("valid listen address"),
        },
        auth: AuthConfig {
            enabled: false,
            jwt_secret: None,
            jwt_algorithm: JwtAlgorithm::Hs256,
            exclude_paths: vec!["/health".to_owned(), "/ready".to_owned(), "/live".to_owned()],
        },
        rate_limit: RateLimitConfig {
            enabled: true,
            per_minute: 600,
            per_hour: 10_000,
            redis_url: None,
        },
        session: SessionConfig {
            backend: SessionBackend::Memory,
            redis_url: String::new(),
            ttl_seconds: 3600,
            prefix: "relay:session:".to_owned(),
            max_entries: 1000,
        },
    }
}

/// Baseline config with specific per-identity caps
pub fn config_with_rate_limit(per_minute: u32, per_hour: u32) -> GatewayConfig {
    let mut config = base_config();
    config.rate_limit.per_minute = per_minute;
    config.rate_limit.per_hour = per_hour;
    config
}

/// Baseline config with bearer-token auth enforced
pub fn config_with_auth(secret: &str) -> GatewayConfig {
    let mut config = base_config();
    config.auth.enabled = true;
    config.auth.jwt_secret = Some(secrecy::SecretString::from(secret.to_owned()));
    config
}

/// Baseline config with a short session TTL, for expiry tests
pub fn config_with_session_ttl(ttl_seconds: u64) -> GatewayConfig {
    let mut config = base_config();
    config.session.ttl_seconds = ttl_seconds;
    config
}

/// Registry with a primary (lightllm) and one fallback (groq), both
/// pointed at mock back ends
pub fn registry_with_fallback(primary_url: &str, fallback_url: &str) -> ModelRegistry {
    let yaml = format!(
        r"
providers:
  lightllm:
    base_url: {primary_url}
    models:
      default: mock-local
  groq:
    api_key: test-key
    base_url: {fallback_url}
    models:
      default: mock-cloud
defaults:
  provider: lightllm
  fallback_chain: [lightllm, groq]
"
    );
    ModelRegistry::from_yaml(&yaml).expect("valid test registry")
}

/// Registry with a single mock provider
pub fn registry_single(url: &str) -> ModelRegistry {
    let yaml = format!(
        r"
providers:
  lightllm:
    base_url: {url}
    models:
      default: mock-local
defaults:
  provider: lightllm
  fallback_chain: [lightllm]
"
    );
    ModelRegistry::from_yaml(&yaml).expect("valid test registry")
}

/// Issue an HS256 bearer token carrying a tenant claim
pub fn issue_token(secret: &str, tenant: &str) -> String {
    use jwt_compact::alg::{Hs256, Hs256Key};
    use jwt_compact::{AlgorithmExt, Claims, Header, TimeOptions};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        tenant_id: &'a str,
        user_roles: Vec<&'a str>,
    }

    let time_options = TimeOptions::default();
    let claims = Claims::new(TestClaims {
        tenant_id: tenant,
        user_roles: vec!["tester"],
    })
    .set_duration_and_issuance(&time_options, chrono::Duration::hours(1));

    Hs256
        .token(&Header::empty(), &claims, &Hs256Key::new(secret.as_bytes()))
        .expect("token creation")
}
