/// Principal tokens
///
/// Upstream controllers identify the caller with a signed JWT whose subject is
/// the principal name (the account email). This module only issues and checks
/// those tokens; it does not authenticate credentials.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Validation**: Signature, expiration, not-before, and issuer checks
/// - **Secret Management**: Secrets should be at least 32 bytes (256 bits)
///
/// # Example
///
/// ```
/// use userdir_shared::auth::jwt::{create_token, validate_token, Claims};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-secret-that-is-at-least-32-bytes-long";
/// let token = create_token(&Claims::new("editor@example.com"), secret)?;
///
/// let principal = validate_token(&token, secret)?.principal();
/// assert_eq!(principal.name, "editor@example.com");
/// # Ok(())
/// # }
/// ```

use crate::context::Principal;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Issuer written into and required from every token
pub const ISSUER: &str = "userdir";

/// Default token lifetime
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Invalid issuer
    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer {
        /// Issuer this service accepts
        expected: String,
    },
}

/// JWT claims
///
/// - `sub`: principal name (email)
/// - `iss`: always [`ISSUER`]
/// - `iat` / `nbf` / `exp`: Unix timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - principal name (email)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,
}

impl Claims {
    /// Creates claims for `principal` with the default lifetime
    pub fn new(principal: impl Into<String>) -> Self {
        Self::with_expiration(principal, Duration::hours(DEFAULT_TTL_HOURS))
    }

    /// Creates claims with a custom lifetime
    pub fn with_expiration(principal: impl Into<String>, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: principal.into(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }

    /// The principal these claims identify
    pub fn principal(&self) -> Principal {
        Principal::new(self.sub.clone())
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a token and returns its claims
///
/// # Errors
///
/// Returns an error if the signature is invalid, the token has expired or is
/// not yet valid, or the issuer doesn't match.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
            expected: ISSUER.to_string(),
        },
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
