use super::Claims;
use crate::domain::auth::AuthMethod;

/// Authenticated caller, extracted from a verified bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Lower-cased identity every owned record is keyed by
    pub owner_email: String,

    pub sub: String,

    pub issuer: String,

    pub method: AuthMethod,
}

impl AuthContext {
    /// Owner is the `email` claim, else `cognito:username`, else `sub`.
    pub fn from_claims(claims: Claims, method: AuthMethod) -> Result<Self, &'static str> {
        let owner = [
            claims.email.as_deref(),
            claims.cognito_username.as_deref(),
            Some(claims.sub.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or("Token has no usable identity")?
        .to_lowercase();

        Ok(Self {
            owner_email: owner,
            sub: claims.sub,
            issuer: claims.iss.unwrap_or_default(),
            method,
        })
    }
}
