//! Routes bearer tokens to the verifier matching their signing algorithm.

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::{decode_header, Algorithm};

use super::{AuthContext, JwksCache, LocalTokens};
use crate::config::Settings;
use crate::domain::auth::AuthMethod;

#[derive(Clone, Default)]
pub struct Authenticator {
    cognito: Option<JwksCache>,
    local: Option<LocalTokens>,
}

impl Authenticator {
    pub fn new(cognito: Option<JwksCache>, local: Option<LocalTokens>) -> Self {
        Self { cognito, local }
    }

    /// Cognito when the user pool is configured, local when a secret is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let cognito = settings
            .cognito_issuer()
            .map(|issuer| {
                JwksCache::new(
                    issuer,
                    settings.cognito_app_client_id.clone(),
                    settings.jwks_cache_ttl_seconds,
                )
            })
            .transpose()?;
        let local = settings
            .local_jwt_secret
            .as_deref()
            .map(|secret| LocalTokens::new(secret, settings.local_jwt_ttl_seconds));
        Ok(Self { cognito, local })
    }

    pub fn cognito(&self) -> Option<&JwksCache> {
        self.cognito.as_ref()
    }

    pub fn local(&self) -> Option<&LocalTokens> {
        self.local.as_ref()
    }

    pub async fn verify(&self, token: &str) -> Result<AuthContext> {
        let header = decode_header(token).context("Invalid JWT header")?;
        let (claims, method) = match header.alg {
            Algorithm::RS256 => {
                let cognito = self
                    .cognito
                    .as_ref()
                    .ok_or_else(|| anyhow!("Cognito is not configured"))?;
                (cognito.verify_token(token).await?, AuthMethod::Cognito)
            }
            Algorithm::HS256 => {
                let local = self
                    .local
                    .as_ref()
                    .ok_or_else(|| anyhow!("Local tokens are not enabled"))?;
                (local.verify_session(token)?, AuthMethod::Local)
            }
            other => bail!("Unsupported token algorithm {other:?}"),
        };
        AuthContext::from_claims(claims, method).map_err(|e| anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_session_verifies() {
        let local = LocalTokens::new("secret", 600);
        let (token, _) = local.issue_session("Pm@Agency.gov").unwrap();
        let auth = Authenticator::new(None, Some(local));
        let ctx = auth.verify(&token).await.unwrap();
        assert_eq!(ctx.owner_email, "pm@agency.gov");
        assert_eq!(ctx.method, AuthMethod::Local);
    }

    #[tokio::test]
    async fn test_hs256_rejected_without_local_secret() {
        let (token, _) = LocalTokens::new("secret", 600).issue_session("a@x.gov").unwrap();
        assert!(Authenticator::default().verify(&token).await.is_err());
    }

    #[test]
    fn test_from_default_settings_enables_local_only() {
        let auth = Authenticator::from_settings(&Settings::default()).unwrap();
        assert!(auth.cognito().is_none());
        assert!(auth.local().is_some());
    }
}
