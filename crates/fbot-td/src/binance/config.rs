//! Binance futures client configuration.
//!
//! Holds API credentials, the endpoint selection, and request timing. Only
//! the credentials need to be supplied; they may come from the config file or
//! from the `BINANCE_API_KEY` / `BINANCE_API_SECRET` environment variables.

use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`BinanceFuturesConfig::api_key`].
pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
/// Environment variable overriding [`BinanceFuturesConfig::secret_key`].
pub const API_SECRET_ENV: &str = "BINANCE_API_SECRET";

/// Configuration for the Binance USDT-margined futures client.
#[derive(Clone, Deserialize)]
pub struct BinanceFuturesConfig {
    /// Binance API key.
    #[serde(default)]
    pub api_key: String,

    /// Binance API secret (HMAC-SHA256 signing).
    #[serde(default)]
    pub secret_key: String,

    /// Trade against the futures testnet instead of production.
    #[serde(default = "default_testnet")]
    pub testnet: bool,

    /// Explicit REST base URL; overrides the `testnet` selection.
    #[serde(default)]
    pub rest_url: Option<String>,

    /// `recvWindow` for signed requests (milliseconds, 0 = Binance default).
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BinanceFuturesConfig {
    /// REST base URL in effect.
    pub fn base_url(&self) -> &str {
        match self.rest_url.as_deref() {
            Some(url) => url,
            None if self.testnet => TESTNET_REST_URL,
            None => MAINNET_REST_URL,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether both credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    /// Replace credentials with values from the environment, when set.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.api_key = key;
        }
        if let Ok(secret) = std::env::var(API_SECRET_ENV) {
            self.secret_key = secret;
        }
    }
}

impl Default for BinanceFuturesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            testnet: default_testnet(),
            rest_url: None,
            recv_window: default_recv_window(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for BinanceFuturesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesConfig")
            .field("api_key", &mask(&self.api_key))
            .field("secret_key", &"<redacted>")
            .field("testnet", &self.testnet)
            .field("rest_url", &self.base_url())
            .field("recv_window", &self.recv_window)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// First eight characters of a key, for log output.
fn mask(key: &str) -> String {
    format!("{}…", key.chars().take(8).collect::<String>())
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

const MAINNET_REST_URL: &str = "https://fapi.binance.com";
const TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";

fn default_testnet() -> bool {
    true
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_testnet() {
        let cfg: BinanceFuturesConfig = serde_json::from_str(r#"{"api_key":"k","secret_key":"s"}"#).unwrap();
        assert!(cfg.testnet);
        assert_eq!(cfg.base_url(), TESTNET_REST_URL);
        assert!(cfg.has_credentials());
    }

    #[test]
    fn explicit_url_wins_over_testnet_flag() {
        let cfg = BinanceFuturesConfig {
            testnet: false,
            rest_url: Some("http://127.0.0.1:9000".into()),
            ..Default::default()
        };
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9000");
        assert!(!cfg.has_credentials());
    }

    #[test]
    fn debug_never_prints_secret() {
        let cfg = BinanceFuturesConfig {
            api_key: "abcdefghijkl".into(),
            secret_key: "topsecret".into(),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("topsecret"));
        assert!(!out.contains("ijkl"));
    }
}
