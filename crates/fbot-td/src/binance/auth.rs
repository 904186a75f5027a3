//! Binance request signing.
//!
//! Every `TRADE`/`USER_DATA` endpoint requires a `timestamp`, an optional
//! `recvWindow`, and an HMAC-SHA256 `signature` computed over the exact
//! URL-encoded query string that is sent.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signs query strings for one API secret.
#[derive(Clone)]
pub struct RequestSigner {
    secret_key: String,
    recv_window: u64,
}

impl RequestSigner {
    pub fn new(secret_key: String, recv_window: u64) -> Self {
        Self { secret_key, recv_window }
    }

    /// Build a signed query using the current wall-clock time.
    pub fn sign(&self, params: &[(&str, String)]) -> String {
        self.sign_at(params, fbot_core::time_util::now_ms())
    }

    /// Build a signed query for an explicit timestamp.
    ///
    /// Appends `recvWindow` (when non-zero) and `timestamp` to `params`, joins
    /// them URL-encoded with `&`, and appends `&signature=<hex>`.
    pub fn sign_at(&self, params: &[(&str, String)], timestamp_ms: u64) -> String {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        if self.recv_window > 0 {
            pairs.push(format!("recvWindow={}", self.recv_window));
        }
        pairs.push(format!("timestamp={timestamp_ms}"));

        let query = pairs.join("&");
        let signature = hmac_sha256_sign(&self.secret_key, &query);
        format!("{query}&signature={signature}")
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("secret_key", &"<redacted>")
            .field("recv_window", &self.recv_window)
            .finish()
    }
}
