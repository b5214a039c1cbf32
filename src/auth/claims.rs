use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JWT claims shared by Cognito tokens and locally issued tokens
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub iss: Option<String>,

    /// String or array; Cognito access tokens carry `client_id` instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        default,
        rename = "cognito:username",
        skip_serializing_if = "Option::is_none"
    )]
    pub cognito_username: Option<String>,

    /// `id` or `access` for Cognito tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,

    /// Set on local tokens; `magic_link` tokens are only good for exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl Claims {
    /// True when `aud` (or `client_id`) names the given client
    pub fn has_audience(&self, client_id: &str) -> bool {
        let in_aud = match &self.aud {
            Some(Value::String(aud)) => aud == client_id,
            Some(Value::Array(values)) => values.iter().any(|v| v.as_str() == Some(client_id)),
            _ => false,
        };
        in_aud || self.client_id.as_deref() == Some(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cognito_claims_deserialize() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "abc-123",
            "exp": 1700000000,
            "iss": "https://cognito-idp.us-east-1.amazonaws.com/pool",
            "cognito:username": "jdoe",
            "token_use": "access",
            "client_id": "client-1"
        }))
        .unwrap();
        assert_eq!(claims.cognito_username.as_deref(), Some("jdoe"));
        assert!(claims.has_audience("client-1"));
        assert!(!claims.has_audience("other"));
    }

    #[test]
    fn test_audience_array() {
        let claims = Claims {
            aud: Some(json!(["a", "b"])),
            ..Default::default()
        };
        assert!(claims.has_audience("b"));
    }
}
