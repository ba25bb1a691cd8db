//! Centralized configuration for Pairlink.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Pairlink components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct PairlinkConfig {
    pub network: NetworkConfig,
    pub endpoints: EndpointConfig,
    pub simulation: SimulationConfig,
}

/// Transport connection and reconnection configuration.
///
/// Controls connect timeouts, the bounded in-session reconnect policy,
/// and how the websocket session is established.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for a single endpoint connection attempt
    pub connect_timeout: Duration,
    /// Maximum automatic in-session reconnect attempts
    pub reconnect_max_attempts: u32,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Whether to send stored credentials with the connection handshake
    pub include_credentials: bool,
    /// Stored session credentials, attached as a cookie header when
    /// `include_credentials` is set
    pub credentials: Option<String>,
    /// Capacity of the transport event broadcast channel
    pub event_buffer: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            reconnect_max_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            include_credentials: true,
            credentials: None,
            event_buffer: 64,
        }
    }
}

/// Endpoint resolution configuration.
///
/// The resolver is a pure function over these values plus the runtime
/// environment descriptor; changing them never requires touching the
/// classification rules.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Fixed backend port the matching server listens on
    pub backend_port: u16,
    /// Secondary loopback port, attempted only if the primary fails
    pub loopback_fallback_port: u16,
    /// Development port token substituted in sandbox-preview hostnames
    pub dev_port: u16,
    /// Hostname suffixes identifying sandboxed-preview hosting
    pub sandbox_suffixes: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            backend_port: 8000,
            loopback_fallback_port: 8001,
            dev_port: 3000,
            sandbox_suffixes: vec![".csb.app".to_string(), ".webcontainer.io".to_string()],
        }
    }
}

/// Match simulation configuration for degraded mode.
///
/// Bounds every delay in the bot matchmaking loop so tests can shrink
/// the whole cycle to milliseconds while production keeps believable
/// human-scale pacing.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Deterministic seed for reproducible simulations
    pub deterministic_seed: Option<u64>,
    /// Minimum time spent in the Searching phase
    pub search_delay_min: Duration,
    /// Maximum time spent in the Searching phase
    pub search_delay_max: Duration,
    /// Pause between Matched and Chatting
    pub matched_delay: Duration,
    /// Minimum duration of the Chatting phase
    pub chat_duration_min: Duration,
    /// Maximum duration of the Chatting phase
    pub chat_duration_max: Duration,
    /// Interval between synthetic chat messages
    pub message_interval: Duration,
    /// Pause in Ended before looping back to Searching
    pub ended_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            search_delay_min: Duration::from_secs(2),
            search_delay_max: Duration::from_secs(6),
            matched_delay: Duration::from_secs(2),
            chat_duration_min: Duration::from_secs(20),
            chat_duration_max: Duration::from_secs(45),
            message_interval: Duration::from_secs(4),
            ended_delay: Duration::from_secs(3),
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic, fast-cycling tests.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42), // Fixed seed for reproducible tests
            search_delay_min: Duration::from_millis(5),
            search_delay_max: Duration::from_millis(15),
            matched_delay: Duration::from_millis(5),
            chat_duration_min: Duration::from_millis(20),
            chat_duration_max: Duration::from_millis(40),
            message_interval: Duration::from_millis(5),
            ended_delay: Duration::from_millis(5),
        }
    }

    /// Upper bound on the time from `Searching` to `Matched`.
    ///
    /// Consumers waiting for a simulated match can give up after this.
    pub fn max_time_to_match(&self) -> Duration {
        self.search_delay_max + self.matched_delay
    }
}

impl PairlinkConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Network configuration overrides
        if let Ok(timeout) = std::env::var("PAIRLINK_CONNECT_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.connect_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(attempts) = std::env::var("PAIRLINK_RECONNECT_ATTEMPTS") {
            if let Ok(count) = attempts.parse::<u32>() {
                config.network.reconnect_max_attempts = count;
            }
        }

        if let Ok(credentials) = std::env::var("PAIRLINK_CREDENTIALS") {
            config.network.credentials = Some(credentials);
        }

        // Endpoint configuration overrides
        if let Ok(port) = std::env::var("PAIRLINK_BACKEND_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.endpoints.backend_port = port;
            }
        }

        // Simulation configuration overrides
        if let Ok(seed) = std::env::var("PAIRLINK_SIMULATION_SEED") {
            if let Ok(seed_value) = seed.parse::<u64>() {
                config.simulation.deterministic_seed = Some(seed_value);
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            network: NetworkConfig {
                connect_timeout: Duration::from_millis(50),
                reconnect_max_attempts: 2,
                reconnect_delay: Duration::from_millis(10),
                ..Default::default()
            },
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = PairlinkConfig::default();

        assert_eq!(config.network.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.network.reconnect_max_attempts, 5);
        assert_eq!(config.network.reconnect_delay, Duration::from_secs(1));
        assert!(config.network.include_credentials);
        assert_eq!(config.endpoints.backend_port, 8000);
        assert_eq!(config.endpoints.loopback_fallback_port, 8001);
        assert!(config.simulation.deterministic_seed.is_none());
    }

    #[test]
    fn test_simulation_testing_preset() {
        let sim = SimulationConfig::deterministic_testing();
        assert_eq!(sim.deterministic_seed, Some(42));
        assert!(sim.search_delay_max < Duration::from_secs(1));
        assert!(sim.max_time_to_match() < Duration::from_secs(1));
    }

    #[test]
    fn test_max_time_to_match_bounds_search_and_matched() {
        let sim = SimulationConfig::default();
        assert_eq!(
            sim.max_time_to_match(),
            sim.search_delay_max + sim.matched_delay
        );
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("PAIRLINK_CONNECT_TIMEOUT", "60");
            std::env::set_var("PAIRLINK_RECONNECT_ATTEMPTS", "3");
            std::env::set_var("PAIRLINK_CREDENTIALS", "session=abc123");
            std::env::set_var("PAIRLINK_BACKEND_PORT", "9000");
            std::env::set_var("PAIRLINK_SIMULATION_SEED", "12345");
        }

        let config = PairlinkConfig::from_env();

        assert_eq!(config.network.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.network.reconnect_max_attempts, 3);
        assert_eq!(config.network.credentials.as_deref(), Some("session=abc123"));
        assert_eq!(config.endpoints.backend_port, 9000);
        assert_eq!(config.simulation.deterministic_seed, Some(12345));

        // Cleanup
        unsafe {
            std::env::remove_var("PAIRLINK_CONNECT_TIMEOUT");
            std::env::remove_var("PAIRLINK_RECONNECT_ATTEMPTS");
            std::env::remove_var("PAIRLINK_CREDENTIALS");
            std::env::remove_var("PAIRLINK_BACKEND_PORT");
            std::env::remove_var("PAIRLINK_SIMULATION_SEED");
        }
    }
}
