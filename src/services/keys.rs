// Verification key resolution
// Static shared secret, or a cached JWKS fetched from the federation provider

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default freshness window for a fetched key set
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(600);
/// Stale key sets keep serving for this long past the TTL when refresh fails
pub const DEFAULT_JWKS_GRACE: Duration = Duration::from_secs(3600);
/// Upper bound on a single JWKS fetch
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum KeyError {
    /// The signer is not recognized; permanent for this token
    #[error("Unknown signing key: {0}")]
    Unknown(String),

    /// Keys cannot currently be obtained; transient, 503-class
    #[error("Verification keys unavailable: {0}")]
    Unavailable(String),
}

/// Supplies verification keys to the token codec.
/// The shared secret always verifies first-party HS256 tokens; when a JWKS
/// URL is configured, asymmetric federated signatures resolve by `kid`.
pub struct KeyResolver {
    secret: DecodingKey,
    jwks: Option<JwksCache>,
}

impl KeyResolver {
    /// Shared-secret-only resolver
    pub fn static_secret(secret: &str) -> Self {
        Self {
            secret: DecodingKey::from_secret(secret.as_bytes()),
            jwks: None,
        }
    }

    /// Resolver that additionally accepts keys from the issuer's JWKS endpoint
    pub fn with_jwks(secret: &str, jwks_url: &str) -> Self {
        Self {
            secret: DecodingKey::from_secret(secret.as_bytes()),
            jwks: Some(JwksCache::new(jwks_url)),
        }
    }

    pub fn shared_secret(&self) -> &DecodingKey {
        &self.secret
    }

    pub fn has_jwks(&self) -> bool {
        self.jwks.is_some()
    }

    /// Resolve the verification key for an asymmetric token header
    pub async fn resolve(
        &self,
        kid: Option<&str>,
        header_alg: Algorithm,
    ) -> Result<(DecodingKey, Algorithm), KeyError> {
        let cache = self.jwks.as_ref().ok_or_else(|| {
            KeyError::Unknown(format!(
                "no JWKS endpoint configured for {:?}-signed tokens",
                header_alg
            ))
        })?;

        cache.key_for(kid).await
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// JWKS cache: fetched on first use, refreshed on TTL expiry or unknown kid,
/// and served stale through a grace window while the endpoint is down.
pub struct JwksCache {
    url: String,
    client: reqwest::Client,
    ttl: Duration,
    grace: Duration,
    state: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new(url: &str) -> Self {
        Self::with_timings(url, DEFAULT_JWKS_TTL, DEFAULT_JWKS_GRACE)
    }

    pub fn with_timings(url: &str, ttl: Duration, grace: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.to_string(),
            client,
            ttl,
            grace,
            state: RwLock::new(None),
        }
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), KeyError> {
        // Fresh cache hit avoids the network entirely
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if cached.fetched_at.elapsed() <= self.ttl {
                    if let Some(jwk) = find_key(&cached.keys, kid) {
                        return decode_jwk(jwk);
                    }
                    // Unknown kid in a fresh set: refresh once below, the
                    // provider may have rotated keys
                }
            }
        }

        match self.fetch().await {
            Ok(keys) => {
                let result = match find_key(&keys, kid) {
                    Some(jwk) => decode_jwk(jwk),
                    None => Err(KeyError::Unknown(format!(
                        "kid {:?} not present in issuer key set",
                        kid
                    ))),
                };
                let mut state = self.state.write().await;
                *state = Some(CachedKeys {
                    keys,
                    fetched_at: Instant::now(),
                });
                result
            },
            Err(fetch_err) => {
                // Serve the last good set until TTL + grace elapses
                let state = self.state.read().await;
                if let Some(cached) = state.as_ref() {
                    if cached.fetched_at.elapsed() <= self.ttl + self.grace {
                        warn!(
                            error = %fetch_err,
                            "JWKS refresh failed, serving cached key set"
                        );
                        if let Some(jwk) = find_key(&cached.keys, kid) {
                            return decode_jwk(jwk);
                        }
                    }
                }
                Err(KeyError::Unavailable(fetch_err))
            },
        }
    }

    async fn fetch(&self) -> Result<JwkSet, String> {
        debug!(url = %self.url, "Fetching JWKS");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("JWKS fetch failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("JWKS endpoint returned {}", response.status()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| format!("JWKS payload malformed: {}", e))
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, keys: JwkSet, fetched_at: Instant) {
        let mut state = self.state.write().await;
        *state = Some(CachedKeys { keys, fetched_at });
    }
}

fn find_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        // Without a kid the set must be unambiguous
        None => {
            if keys.keys.len() == 1 {
                keys.keys.first()
            } else {
                None
            }
        },
    }
}

fn decode_jwk(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), KeyError> {
    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| KeyError::Unknown(format!("unusable key material: {}", e)))?;
    Ok((key, jwk_algorithm(jwk)))
}

fn jwk_algorithm(jwk: &Jwk) -> Algorithm {
    match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::HS256) => Algorithm::HS256,
        Some(KeyAlgorithm::HS384) => Algorithm::HS384,
        Some(KeyAlgorithm::HS512) => Algorithm::HS512,
        // Fall back on the key type when the set omits alg
        _ => match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => Algorithm::RS256,
            AlgorithmParameters::EllipticCurve(_) => Algorithm::ES256,
            _ => Algorithm::HS256,
        },
    }
}
