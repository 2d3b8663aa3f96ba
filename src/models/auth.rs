// Signed token payloads for the authentication pipeline

use serde::{Deserialize, Serialize};

/// Bearer token variant carried in the `type` claim
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by every first-party bearer token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Principal id (subject)
    pub sub: String,

    /// Principal email address
    pub email: String,

    /// Token identifier used for revocation. Absent on legacy tokens, which
    /// are accepted but cannot be individually revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,

    /// Expires at timestamp (Unix epoch seconds)
    pub exp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Granted capabilities; "admin" gates the administrative surface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// Claims of a federated identity token presented at sign-in completion.
/// Only the standard OIDC profile claims the upsert consumes are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Provider-scoped subject identifier
    pub sub: String,

    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,

    pub exp: u64,

    #[serde(default)]
    pub iat: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_claims() -> TokenClaims {
        TokenClaims {
            sub: "user-123".to_string(),
            email: "user@example.com".to_string(),
            jti: Some(Uuid::new_v4().to_string()),
            iat: 1_640_995_200,
            exp: 1_641_081_600,
            aud: Some("bocchi.example".to_string()),
            iss: Some("bocchi.example".to_string()),
            scope: vec!["admin".to_string()],
            token_type: TokenType::Access,
        }
    }

    #[test]
    fn test_token_type_claim_serializes_as_type() {
        let json = serde_json::to_value(sample_claims()).expect("Should serialize");
        assert_eq!(json["type"], "access");
        assert_eq!(
            serde_json::to_value(TokenType::Refresh).unwrap(),
            serde_json::Value::String("refresh".to_string())
        );
    }

    #[test]
    fn test_claims_roundtrip() {
        let claims = sample_claims();
        let json = serde_json::to_string(&claims).expect("Should serialize");
        let decoded: TokenClaims = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(claims, decoded);
    }

    #[test]
    fn test_missing_jti_is_accepted() {
        let json = r#"{
            "sub": "user-456",
            "email": "user@example.com",
            "iat": 1640995200,
            "exp": 1641081600,
            "type": "refresh"
        }"#;
        let decoded: TokenClaims = serde_json::from_str(json).expect("Should deserialize");
        assert!(decoded.jti.is_none());
        assert_eq!(decoded.token_type, TokenType::Refresh);
        assert!(decoded.scope.is_empty());
    }
}
