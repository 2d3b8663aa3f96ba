// Bearer token codec
// Mints and parses the signed access/refresh pair; stateless apart from keys

use jsonwebtoken::{decode, decode_header, encode, Algorithm, EncodingKey, Header, Validation};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::app_config::JwtSettings;
use crate::models::auth::{IdentityClaims, TokenClaims, TokenType};
use crate::services::keys::{KeyError, KeyResolver};

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token audience mismatch")]
    WrongAudience,

    #[error("Token issuer mismatch")]
    WrongIssuer,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Token encoding error: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            ErrorKind::InvalidAudience => JwtError::WrongAudience,
            ErrorKind::InvalidIssuer => JwtError::WrongIssuer,
            ErrorKind::ImmatureSignature => JwtError::Expired,
            _ => JwtError::Malformed(err.to_string()),
        }
    }
}

/// Signing configuration with a prebuilt encoding key
#[derive(Clone)]
pub struct JwtConfig {
    pub access_expiry: u64,
    pub refresh_expiry: u64,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    /// Clock-skew tolerance applied to exp/nbf on parse, in seconds
    pub leeway: u64,
    pub algorithm: Algorithm,
    pub encoding_key: EncodingKey,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .field("algorithm", &self.algorithm)
            .field("encoding_key", &"<redacted>")
            .finish()
    }
}

impl JwtConfig {
    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::from_secret(
            &settings.secret,
            settings.access_expiry,
            settings.refresh_expiry,
            settings.audience.clone(),
            settings.issuer.clone(),
            settings.leeway,
        )
    }

    pub fn from_secret(
        secret: &str,
        access_expiry: u64,
        refresh_expiry: u64,
        audience: Option<String>,
        issuer: Option<String>,
        leeway: u64,
    ) -> Self {
        JwtConfig {
            access_expiry,
            refresh_expiry,
            audience,
            issuer,
            leeway,
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Token codec over the configured keys
pub struct JwtService {
    config: JwtConfig,
    keys: Arc<KeyResolver>,
}

impl JwtService {
    pub fn new(config: JwtConfig, keys: Arc<KeyResolver>) -> Self {
        Self { config, keys }
    }

    pub fn access_expiry(&self) -> u64 {
        self.config.access_expiry
    }

    pub fn refresh_expiry(&self) -> u64 {
        self.config.refresh_expiry
    }

    /// Mint an access token for the principal
    pub fn mint_access(
        &self,
        user_id: &str,
        email: &str,
        scope: Vec<String>,
    ) -> Result<(String, TokenClaims), JwtError> {
        self.mint(user_id, email, scope, TokenType::Access, self.config.access_expiry)
    }

    /// Mint a refresh token for the principal
    pub fn mint_refresh(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<(String, TokenClaims), JwtError> {
        self.mint(user_id, email, Vec::new(), TokenType::Refresh, self.config.refresh_expiry)
    }

    fn mint(
        &self,
        user_id: &str,
        email: &str,
        scope: Vec<String>,
        token_type: TokenType,
        expiry: u64,
    ) -> Result<(String, TokenClaims), JwtError> {
        let now = unix_now()?;

        let claims = TokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            jti: Some(Uuid::new_v4().to_string()),
            iat: now,
            exp: now + expiry,
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
            scope,
            token_type,
        };

        let header = Header::new(self.config.algorithm);
        let token = encode(&header, &claims, &self.config.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok((token, claims))
    }

    /// Verify a first-party bearer token and return its claims
    pub async fn parse(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let (key, alg) = self.resolve_key(token).await?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway;
        match &self.config.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.config.issuer {
            validation.set_issuer(&[iss]);
        }

        let data = decode::<TokenClaims>(token, &key, &validation)?;
        Ok(data.claims)
    }

    /// Verify a federated identity token presented at sign-in completion.
    /// Audience and issuer belong to the federation provider and are not
    /// checked against the first-party values.
    pub async fn parse_identity_token(&self, token: &str) -> Result<IdentityClaims, JwtError> {
        let (key, alg) = self.resolve_key(token).await?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway;
        validation.validate_aud = false;

        let data = decode::<IdentityClaims>(token, &key, &validation)?;
        Ok(data.claims)
    }

    /// Pick the verification key from the token header: the shared secret for
    /// HS256, the JWKS-resolved key for asymmetric signatures.
    async fn resolve_key(
        &self,
        token: &str,
    ) -> Result<(jsonwebtoken::DecodingKey, Algorithm), JwtError> {
        let header = decode_header(token).map_err(|e| JwtError::Malformed(e.to_string()))?;

        match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok((self.keys.shared_secret().clone(), header.alg))
            },
            asymmetric => {
                let (key, _) = self.keys.resolve(header.kid.as_deref(), asymmetric).await?;
                Ok((key, asymmetric))
            },
        }
    }
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| JwtError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> JwtService {
        let secret = "test-signing-secret-hs256-minimum-32-characters";
        let config = JwtConfig::from_secret(
            secret,
            86400,
            604800,
            Some("test.bocchi.example".to_string()),
            Some("test.bocchi.example".to_string()),
            30,
        );
        JwtService::new(config, Arc::new(KeyResolver::static_secret(secret)))
    }

    #[tokio::test]
    async fn test_access_token_roundtrip() {
        let service = test_service();
        let (token, minted) = service
            .mint_access("user-1", "alice@example.com", vec![])
            .unwrap();

        let claims = service.parse(&token).await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, minted.jti);
        assert!(claims.jti.is_some());
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[tokio::test]
    async fn test_refresh_token_roundtrip() {
        let service = test_service();
        let (token, _) = service.mint_refresh("user-2", "bob@example.com").unwrap();

        let claims = service.parse(&token).await.unwrap();
        assert_eq!(claims.sub, "user-2");
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 604800);
    }

    #[tokio::test]
    async fn test_fresh_mints_get_distinct_jtis() {
        let service = test_service();
        let (_, a) = service.mint_access("u", "u@example.com", vec![]).unwrap();
        let (_, b) = service.mint_access("u", "u@example.com", vec![]).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let service = test_service();
        let result = service.parse("definitely-not-a-jwt").await;
        assert!(matches!(result, Err(JwtError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let service = test_service();
        let (token, _) = service.mint_access("user-3", "c@example.com", vec![]).unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_sig = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        parts[2] = tampered_sig;
        let tampered = parts.join(".");

        let result = service.parse(&tampered).await;
        assert!(matches!(result, Err(JwtError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let secret = "test-signing-secret-hs256-minimum-32-characters";
        let minting = JwtService::new(
            JwtConfig::from_secret(
                secret,
                86400,
                604800,
                Some("other-service".to_string()),
                None,
                30,
            ),
            Arc::new(KeyResolver::static_secret(secret)),
        );
        let (token, _) = minting.mint_access("user-4", "d@example.com", vec![]).unwrap();

        let result = test_service().parse(&token).await;
        assert!(matches!(result, Err(JwtError::WrongAudience)));
    }

    #[tokio::test]
    async fn test_expired_token_within_leeway_still_parses() {
        // exp a second in the past is inside the 30 s clock-skew tolerance
        let secret = "test-signing-secret-hs256-minimum-32-characters";
        let service = test_service();

        let now = unix_now().unwrap();
        let claims = TokenClaims {
            sub: "user-5".to_string(),
            email: "e@example.com".to_string(),
            jti: Some(Uuid::new_v4().to_string()),
            iat: now - 100,
            exp: now - 1,
            aud: Some("test.bocchi.example".to_string()),
            iss: Some("test.bocchi.example".to_string()),
            scope: vec![],
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        assert!(service.parse(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_past_leeway_is_expired() {
        let secret = "test-signing-secret-hs256-minimum-32-characters";
        let service = test_service();

        let now = unix_now().unwrap();
        let claims = TokenClaims {
            sub: "user-6".to_string(),
            email: "f@example.com".to_string(),
            jti: Some(Uuid::new_v4().to_string()),
            iat: now - 600,
            exp: now - 120,
            aud: Some("test.bocchi.example".to_string()),
            iss: Some("test.bocchi.example".to_string()),
            scope: vec![],
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let result = service.parse(&token).await;
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[tokio::test]
    async fn test_token_without_jti_parses() {
        let secret = "test-signing-secret-hs256-minimum-32-characters";
        let service = test_service();

        let now = unix_now().unwrap();
        // Legacy tokens predate the jti claim
        let legacy = serde_json::json!({
            "sub": "user-7",
            "email": "g@example.com",
            "iat": now,
            "exp": now + 3600,
            "aud": "test.bocchi.example",
            "iss": "test.bocchi.example",
            "type": "access"
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &legacy,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let claims = service.parse(&token).await.unwrap();
        assert!(claims.jti.is_none());
    }

    #[tokio::test]
    async fn test_asymmetric_token_without_jwks_fails_key_resolution() {
        let service = test_service();
        // RS256 header with nonsense body; key resolution fails before decode
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"federated-key"}"#;
        use base64ct::{Base64UrlUnpadded, Encoding};
        let token = format!(
            "{}.{}.{}",
            Base64UrlUnpadded::encode_string(header.as_bytes()),
            Base64UrlUnpadded::encode_string(b"{}"),
            Base64UrlUnpadded::encode_string(b"sig")
        );

        let result = service.parse(&token).await;
        assert!(matches!(result, Err(JwtError::Key(KeyError::Unknown(_)))));
    }
}
