use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request path signed by the private stream login
pub const LOGIN_VERIFY_PATH: &str = "/user/verify";

/// API credentials for signed requests
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(api_key: &str, api_secret: &str, passphrase: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            passphrase: passphrase.to_string(),
        }
    }

    /// True when all three parts are set
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.passphrase.is_empty()
    }

    /// Signature for a REST request
    pub fn sign_request(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &str,
    ) -> String {
        sign(&self.api_secret, &prehash(timestamp, method, path, query, body))
    }

    /// Signature for the private stream login (`timestamp` in seconds)
    pub fn login_signature(&self, timestamp: &str) -> String {
        self.sign_request(timestamp, "GET", LOGIN_VERIFY_PATH, None, "")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

fn redact(value: &str) -> String {
    match value.get(..4) {
        Some(prefix) if value.len() > 8 => format!("{}…", prefix),
        _ => "<redacted>".to_string(),
    }
}

/// `timestamp + METHOD + path [+ "?" + query] + body`
pub fn prehash(timestamp: &str, method: &str, path: &str, query: Option<&str>, body: &str) -> String {
    let mut payload = String::with_capacity(timestamp.len() + path.len() + body.len() + 16);
    payload.push_str(timestamp);
    payload.push_str(&method.to_ascii_uppercase());
    payload.push_str(path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        payload.push('?');
        payload.push_str(query);
    }
    payload.push_str(body);
    payload
}

/// base64(HMAC-SHA256(secret, payload))
pub fn sign(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        assert_eq!(
            sign("key", "The quick brown fox jumps over the lazy dog"),
            "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg="
        );
    }

    #[test]
    fn test_login_signature() {
        let creds = Credentials::new("key", "secret", "pass");
        assert_eq!(
            creds.login_signature("1700000000"),
            "asp8h2LSGzNFWF9BshQJj0WiZA5uDIWsAk9FCfz2Ilk="
        );
    }

    #[test]
    fn test_post_signature_includes_body() {
        let creds = Credentials::new("key", "secret", "pass");
        let sig = creds.sign_request(
            "1700000000000",
            "post",
            "/api/mix/v1/order/placeOrder",
            None,
            r#"{"a":1}"#,
        );
        assert_eq!(sig, "czxJnwZFA+4Mlo6N3uNA5xMnRHlFd5mmC/gc1U7hDl0=");
    }

    #[test]
    fn test_get_signature_includes_query() {
        assert_eq!(
            prehash("1", "GET", "/p", Some("a=1&b=2"), ""),
            "1GET/p?a=1&b=2"
        );
        assert_eq!(prehash("1", "GET", "/p", Some(""), ""), "1GET/p");

        let creds = Credentials::new("key", "secret", "pass");
        let sig = creds.sign_request(
            "1700000000000",
            "GET",
            "/api/mix/v1/market/candles",
            Some("symbol=BTCUSDT_UMCBL&limit=5"),
            "",
        );
        assert_eq!(sig, "zBVBaEln3werNxt6PxAFV63DpqOnJXtYrbKUMe3AvL0=");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("abcdefghijkl", "supersecret", "pw");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("supersecret"));
        assert!(!printed.contains("abcdefghijkl"));
        assert!(printed.contains("abcd"));
    }

    #[test]
    fn test_is_complete() {
        assert!(Credentials::new("k", "s", "p").is_complete());
        assert!(!Credentials::default().is_complete());
    }
}
