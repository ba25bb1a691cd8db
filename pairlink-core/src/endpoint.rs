//! Endpoint resolution for the matching backend.
//!
//! A pure, deterministic mapping from a structured runtime environment
//! descriptor to an ordered list of candidate server endpoints. No I/O
//! happens here; the resolver can be exercised in unit tests without a
//! network or a browser context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

/// Scheme used to reach a candidate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointScheme {
    /// Plain websocket
    Ws,
    /// Websocket over TLS
    Wss,
}

impl EndpointScheme {
    /// Derives the transport scheme from the page's own TLS state.
    pub fn from_secure(secure: bool) -> Self {
        if secure { Self::Wss } else { Self::Ws }
    }
}

impl fmt::Display for EndpointScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws => write!(f, "ws"),
            Self::Wss => write!(f, "wss"),
        }
    }
}

/// One candidate network address for the matching server.
///
/// Immutable once computed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub scheme: EndpointScheme,
    /// Attempt order; 0 is the primary candidate.
    pub priority: u8,
}

impl Endpoint {
    /// Renders the websocket connection URL for this candidate.
    pub fn url(&self) -> String {
        format!("{}://{}:{}/", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Classification of the host the application is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostClass {
    /// Sandboxed-preview hosting (e.g. an online IDE preview URL)
    SandboxPreview,
    /// Local loopback development
    Loopback,
    /// Arbitrary network host
    Direct,
}

/// Structured descriptor of the runtime environment.
///
/// Supplied once at startup by whatever hosts the broker; never read
/// from ambient global state so resolution stays reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Hostname the application was served from
    pub hostname: String,
    /// Whether the page itself was served over TLS
    pub secure: bool,
    /// Deployment flag overriding hostname-based classification
    pub forced_class: Option<HostClass>,
}

impl Environment {
    /// Environment for a plain network host.
    pub fn new(hostname: impl Into<String>, secure: bool) -> Self {
        Self {
            hostname: hostname.into(),
            secure,
            forced_class: None,
        }
    }

    /// Environment for local loopback development.
    pub fn loopback() -> Self {
        Self::new("localhost", false)
    }

    /// Classifies this environment against the configured host rules.
    pub fn classify(&self, config: &EndpointConfig) -> HostClass {
        if let Some(class) = self.forced_class {
            return class;
        }

        let host = self.hostname.to_ascii_lowercase();
        if config
            .sandbox_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()))
        {
            return HostClass::SandboxPreview;
        }

        if matches!(host.as_str(), "localhost" | "127.0.0.1" | "::1") {
            return HostClass::Loopback;
        }

        HostClass::Direct
    }
}

/// Resolves the ordered candidate endpoint list for an environment.
///
/// Rules, in precedence order:
/// - Sandbox preview host: one candidate, derived by substituting the
///   known development port token in the hostname with the backend
///   port. Preview hosts that do not embed the port token fall back to
///   `host:backend_port`.
/// - Loopback host: two candidates, `host:8000` then `host:8001`; the
///   secondary is attempted only if the primary fails.
/// - Any other host: one candidate, `host:8000`.
///
/// The returned list is never empty and the first entry is always the
/// primary candidate.
pub fn resolve_candidates(env: &Environment, config: &EndpointConfig) -> Vec<Endpoint> {
    let scheme = EndpointScheme::from_secure(env.secure);

    match env.classify(config) {
        HostClass::SandboxPreview => {
            let dev_token = format!("-{}", config.dev_port);
            if env.hostname.contains(&dev_token) {
                let backend_token = format!("-{}", config.backend_port);
                let host = env.hostname.replacen(&dev_token, &backend_token, 1);
                // Preview hosts terminate TLS themselves; the scheme's
                // default port applies.
                let port = if env.secure { 443 } else { 80 };
                vec![Endpoint {
                    host,
                    port,
                    scheme,
                    priority: 0,
                }]
            } else {
                vec![Endpoint {
                    host: env.hostname.clone(),
                    port: config.backend_port,
                    scheme,
                    priority: 0,
                }]
            }
        }
        HostClass::Loopback => vec![
            Endpoint {
                host: env.hostname.clone(),
                port: config.backend_port,
                scheme,
                priority: 0,
            },
            Endpoint {
                host: env.hostname.clone(),
                port: config.loopback_fallback_port,
                scheme,
                priority: 1,
            },
        ],
        HostClass::Direct => vec![Endpoint {
            host: env.hostname.clone(),
            port: config.backend_port,
            scheme,
            priority: 0,
        }],
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn config() -> EndpointConfig {
        EndpointConfig::default()
    }

    #[test]
    fn test_direct_host_resolves_single_candidate() {
        let env = Environment::new("example.com", false);
        let candidates = resolve_candidates(&env, &config());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].host, "example.com");
        assert_eq!(candidates[0].port, 8000);
        assert_eq!(candidates[0].scheme, EndpointScheme::Ws);
        assert_eq!(candidates[0].priority, 0);
    }

    #[test]
    fn test_loopback_resolves_primary_then_fallback() {
        let env = Environment::loopback();
        let candidates = resolve_candidates(&env, &config());

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].port, 8000);
        assert_eq!(candidates[1].port, 8001);
        assert!(candidates[0].priority < candidates[1].priority);
    }

    #[test]
    fn test_loopback_by_ip_address() {
        let env = Environment::new("127.0.0.1", false);
        assert_eq!(env.classify(&config()), HostClass::Loopback);
        assert_eq!(resolve_candidates(&env, &config()).len(), 2);
    }

    #[test]
    fn test_sandbox_preview_substitutes_dev_port_token() {
        let env = Environment::new("fancy-app-3000.csb.app", true);
        let candidates = resolve_candidates(&env, &config());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].host, "fancy-app-8000.csb.app");
        assert_eq!(candidates[0].port, 443);
        assert_eq!(candidates[0].scheme, EndpointScheme::Wss);
    }

    #[test]
    fn test_sandbox_preview_without_port_token_uses_backend_port() {
        let env = Environment::new("preview.webcontainer.io", true);
        let candidates = resolve_candidates(&env, &config());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].host, "preview.webcontainer.io");
        assert_eq!(candidates[0].port, 8000);
    }

    #[test]
    fn test_forced_class_overrides_hostname_match() {
        let mut env = Environment::new("fancy-app-3000.csb.app", false);
        env.forced_class = Some(HostClass::Direct);
        let candidates = resolve_candidates(&env, &config());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].host, "fancy-app-3000.csb.app");
        assert_eq!(candidates[0].port, 8000);
    }

    #[test]
    fn test_scheme_follows_page_security() {
        let env = Environment::new("example.com", true);
        let candidates = resolve_candidates(&env, &config());
        assert_eq!(candidates[0].scheme, EndpointScheme::Wss);
        assert_eq!(candidates[0].url(), "wss://example.com:8000/");
    }

    proptest! {
        #[test]
        fn resolution_is_nonempty_deterministic_and_ordered(
            hostname in "[a-z0-9.-]{1,40}",
            secure in any::<bool>(),
        ) {
            let env = Environment::new(hostname, secure);
            let first = resolve_candidates(&env, &config());
            let second = resolve_candidates(&env, &config());

            prop_assert!(!first.is_empty());
            prop_assert_eq!(&first, &second);
            for (i, candidate) in first.iter().enumerate() {
                prop_assert_eq!(candidate.priority as usize, i);
            }
        }
    }
}
