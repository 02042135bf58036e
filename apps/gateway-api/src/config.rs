use std::time::Duration;

use crate::gateway::GatewayConfig;

/// Gateway API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Shared bearer token required by the internal publish endpoints.
    pub internal_token: String,
    /// Development logins as `token:user_id` pairs.
    pub static_tokens: Vec<(String, String)>,
    /// Heartbeat interval advertised to clients in the READY frame.
    pub heartbeat_interval_ms: u64,
    /// Per-session outbound queue capacity.
    pub queue_capacity: usize,
    /// Seconds a thread viewer survives without a presence heartbeat.
    pub presence_ttl_secs: u64,
    /// Seconds a typing indicator lives without being refreshed.
    pub typing_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("GATEWAY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            internal_token: required_var("GATEWAY_INTERNAL_TOKEN"),
            static_tokens: parse_static_tokens(
                &std::env::var("GATEWAY_STATIC_TOKENS").unwrap_or_default(),
            ),
            heartbeat_interval_ms: std::env::var("GATEWAY_HEARTBEAT_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(41_250),
            queue_capacity: std::env::var("GATEWAY_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            presence_ttl_secs: std::env::var("GATEWAY_PRESENCE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            typing_ttl_secs: std::env::var("GATEWAY_TYPING_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
        }
    }

    /// Tunables handed to the gateway core.
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            queue_capacity: self.queue_capacity,
            presence_ttl: Duration::from_secs(self.presence_ttl_secs),
            typing_ttl: Duration::from_secs(self.typing_ttl_secs),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

/// Parse comma separated `token:user_id` pairs, skipping anything malformed.
fn parse_static_tokens(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user_id) = pair.trim().split_once(':')?;
            if token.is_empty() || user_id.is_empty() {
                return None;
            }
            Some((token.to_string(), user_id.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_static_tokens() {
        let pairs = parse_static_tokens("alpha:usr_1, beta:usr_2");
        assert_eq!(
            pairs,
            vec![
                ("alpha".to_string(), "usr_1".to_string()),
                ("beta".to_string(), "usr_2".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_static_tokens_skips_malformed() {
        let pairs = parse_static_tokens("alpha:usr_1,broken,:usr_2,gamma:");
        assert_eq!(pairs, vec![("alpha".to_string(), "usr_1".to_string())]);
        assert!(parse_static_tokens("").is_empty());
    }
}
