//! HS256 tokens signed with `LOCAL_JWT_SECRET`.
//!
//! Used for development sessions and the magic-link login flow.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::Claims;

pub const LOCAL_ISSUER: &str = "estimation-local";
pub const MAGIC_LINK_PURPOSE: &str = "magic_link";
pub const SESSION_PURPOSE: &str = "session";
const MAGIC_LINK_TTL_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct LocalTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
}

impl LocalTokens {
    pub fn new(secret: &str, session_ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl: Duration::seconds(session_ttl_seconds as i64),
        }
    }

    fn issue(&self, email: &str, purpose: &str, ttl: Duration) -> Result<(String, DateTime<Utc>)> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            bail!("email is required");
        }
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: email.clone(),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
            iss: Some(LOCAL_ISSUER.to_string()),
            email: Some(email),
            purpose: Some(purpose.to_string()),
            ..Default::default()
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign token")?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);
        Ok((token, expires_at))
    }

    pub fn issue_session(&self, email: &str) -> Result<(String, DateTime<Utc>)> {
        self.issue(email, SESSION_PURPOSE, self.session_ttl)
    }

    pub fn issue_magic_link(&self, email: &str) -> Result<(String, DateTime<Utc>)> {
        self.issue(
            email,
            MAGIC_LINK_PURPOSE,
            Duration::minutes(MAGIC_LINK_TTL_MINUTES),
        )
    }

    /// Signature, expiry and issuer check; any purpose
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[LOCAL_ISSUER]);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .context("Local token validation failed")?;
        Ok(data.claims)
    }

    /// Session tokens only; magic-link tokens are refused
    pub fn verify_session(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token)?;
        if claims.purpose.as_deref() == Some(MAGIC_LINK_PURPOSE) {
            bail!("Magic-link tokens cannot be used as session tokens");
        }
        Ok(claims)
    }

    pub fn verify_magic_link(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token)?;
        if claims.purpose.as_deref() != Some(MAGIC_LINK_PURPOSE) {
            bail!("Not a magic-link token");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> LocalTokens {
        LocalTokens::new("test-secret", 3600)
    }

    #[test]
    fn test_session_token_round_trip() {
        let (token, expires_at) = tokens().issue_session(" Jane@Agency.gov ").unwrap();
        assert!(expires_at > Utc::now());
        let claims = tokens().verify_session(&token).unwrap();
        assert_eq!(claims.email.as_deref(), Some("jane@agency.gov"));
        assert_eq!(claims.purpose.as_deref(), Some(SESSION_PURPOSE));
    }

    #[test]
    fn test_magic_link_not_accepted_as_session() {
        let (token, expires_at) = tokens().issue_magic_link("a@x.gov").unwrap();
        assert!(expires_at <= Utc::now() + Duration::minutes(15));
        assert!(tokens().verify_session(&token).is_err());
        assert!(tokens().verify_magic_link(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = tokens().issue_session("a@x.gov").unwrap();
        assert!(LocalTokens::new("other", 3600).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = LocalTokens::new("test-secret", 0);
        let (token, _) = expired
            .issue("a@x.gov", SESSION_PURPOSE, Duration::minutes(-5))
            .unwrap();
        assert!(tokens().verify(&token).is_err());
    }

    #[test]
    fn test_empty_email_rejected() {
        assert!(tokens().issue_session("   ").is_err());
    }
}
