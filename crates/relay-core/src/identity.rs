use serde::{Deserialize, Serialize};

/// Tenant identifier substituted when authentication is disabled
pub const DEMO_TENANT: &str = "demo-tenant";

/// Role granted to the demo identity
pub const DEMO_ROLE: &str = "demo-user";

/// Authenticated subject of a request
///
/// Derived from a validated bearer token by the auth middleware and
/// stored in request extensions. Used for rate-limit keying and session
/// ownership checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Tenant this request acts on behalf of
    pub tenant_id: String,
    /// Roles carried by the token
    #[serde(default)]
    pub roles: Vec<String>,
    /// Token expiry as unix timestamp seconds, when the token carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl Identity {
    /// Fixed identity used when authentication is disabled
    pub fn demo() -> Self {
        Self {
            tenant_id: DEMO_TENANT.to_owned(),
            roles: vec![DEMO_ROLE.to_owned()],
            expiry: None,
        }
    }
}
