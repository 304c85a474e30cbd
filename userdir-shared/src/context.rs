/// Per-request context passed explicitly into directory operations
///
/// The directory never reads ambient state: the current time, the host the
/// request arrived on, and the authenticated principal are all carried here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated caller
///
/// The name is the account's email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name (email address)
    pub name: String,
}

impl Principal {
    /// Creates a principal from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Request-scoped inputs for directory operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Host the request was addressed to, used to resolve the current site
    pub host: Option<String>,

    /// Authenticated principal, if any
    pub principal: Option<Principal>,

    /// Request time
    pub now: DateTime<Utc>,
}

impl RequestContext {
    /// Anonymous context at `now` with no host
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            host: None,
            principal: None,
            now,
        }
    }

    /// Sets the request host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the authenticated principal
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Whether the request carries an authenticated principal
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let now = Utc::now();
        let ctx = RequestContext::new(now)
            .with_host("cms.example.com")
            .with_principal(Principal::new("admin@example.com"));

        assert_eq!(ctx.now, now);
        assert_eq!(ctx.host.as_deref(), Some("cms.example.com"));
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn test_default_is_anonymous() {
        let ctx = RequestContext::default();
        assert!(!ctx.is_authenticated());
        assert!(ctx.host.is_none());
    }
}
