pub mod claims;
pub mod context;
pub mod jwks;
pub mod local;
pub mod middleware;
pub mod verifier;

pub use claims::Claims;
pub use context::AuthContext;
pub use jwks::JwksCache;
pub use local::LocalTokens;
pub use middleware::RequireAuth;
pub use verifier::Authenticator;
