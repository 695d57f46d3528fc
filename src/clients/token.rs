use crate::clients::newstore::TokenResponse;
use crate::utils::error::{IntegrationError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Reads `exp` from a JWT without verifying its signature.
pub fn token_expiry(jwt: &str) -> Result<i64> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| IntegrationError::processing("token is not a JWT"))?;

    // 有些簽發端會保留 padding
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IntegrationError::processing(format!("invalid JWT payload: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;
    Ok(claims.exp)
}

/// Token kept across invocations of a warm container.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: Option<TokenResponse>,
    invocations: u64,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an invocation and returns the cached token when it can be
    /// reused, `None` when the caller has to fetch a new one.
    pub fn current(&mut self, now: i64, force: bool, expiry_offset: i64) -> Option<&TokenResponse> {
        self.invocations += 1;

        if force {
            tracing::info!("Token refresh forced");
            return None;
        }
        let expires_at = self.current.as_ref()?.expires_at.unwrap_or(0);
        if now >= expires_at - expiry_offset {
            tracing::info!("Token expired at {} (offset {}s)", expires_at, expiry_offset);
            return None;
        }
        tracing::info!("Token already exists, invocations with the same token: {}", self.invocations);
        self.current.as_ref()
    }

    /// Stores a fresh token with `expires_at` taken from its JWT claims.
    pub fn store(&mut self, mut response: TokenResponse) -> Result<&TokenResponse> {
        response.expires_at = Some(token_expiry(&response.access_token)?);
        self.invocations = 0;
        let cached = self.current.insert(response);
        Ok(&*cached)
    }

    /// The last stored token, whether or not it is still valid.
    pub fn last(&self) -> Option<&TokenResponse> {
        self.current.as_ref()
    }

    /// Invocations served since the token was stored.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

#[cfg(test)]
pub(crate) fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"integrations","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_reads_exp() {
        assert_eq!(token_expiry(&jwt_with_exp(1_700_000_000)).unwrap(), 1_700_000_000);
        assert!(token_expiry("opaque-token").is_err());
    }

    fn response(exp: i64) -> TokenResponse {
        TokenResponse {
            access_token: jwt_with_exp(exp),
            expires_in: Some(3600),
            expires_at: None,
            refresh_token: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_cache_reuse_and_refresh() {
        let mut cache = TokenCache::new();
        assert!(cache.current(1000, false, 60).is_none());

        let stored = cache.store(response(2000)).unwrap();
        assert_eq!(stored.expires_at, Some(2000));
        assert_eq!(cache.invocations(), 0);

        assert!(cache.current(1000, false, 60).is_some());
        // 1940 >= 2000 - 60
        assert!(cache.current(1940, false, 60).is_none());
        assert!(cache.current(1000, true, 60).is_none());
        assert_eq!(cache.invocations(), 3);
        assert!(cache.last().is_some());
    }
}
