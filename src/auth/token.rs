use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::role::Role;
use crate::error::{GatewayError, Result};

/// JWT claims carried by a bearer credential
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity-store user id)
    pub sub: String,
    /// Username at issuance time
    pub username: String,
    /// Role claimed at issuance time (verified against the identity store)
    pub role: Option<Role>,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
}

impl Claims {
    /// Creates new claims for a user, valid for 24 hours.
    pub fn new(subject_id: String, username: String, role: Option<Role>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as usize)
            .unwrap_or(0);

        Self {
            sub: subject_id,
            username,
            role,
            exp: now + 86400,
            iat: now,
        }
    }
}

/// Verifies opaque bearer credentials and extracts the subject.
///
/// Token issuance lives outside the gateway; `issue` exists so tests
/// and the dev binary can mint credentials against the same secret.
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Validates a bearer credential and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| GatewayError::AuthenticationFailure(format!("invalid token: {}", e)))
    }

    /// Validates a credential and checks that it belongs to the claimed subject.
    pub fn verify_subject(&self, token: &str, claimed_subject: &str) -> Result<Claims> {
        let claims = self.verify(token)?;
        if claims.sub != claimed_subject {
            return Err(GatewayError::AuthenticationFailure(
                "token subject does not match claimed user id".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Signs claims into a token string.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| GatewayError::AuthenticationFailure(format!("failed to sign: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_roundtrip() {
        let verifier = TokenVerifier::new("test-secret-key");
        let claims = Claims::new("user123".to_string(), "alice".to_string(), Some(Role::Member));

        let token = verifier.issue(&claims).unwrap();
        let decoded = verifier.verify(&token).unwrap();
        assert_eq!(decoded.sub, "user123");
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.role, Some(Role::Member));
    }

    #[test]
    fn test_subject_mismatch_rejected() {
        let verifier = TokenVerifier::new("test-secret-key");
        let claims = Claims::new("user123".to_string(), "alice".to_string(), None);
        let token = verifier.issue(&claims).unwrap();

        assert!(verifier.verify_subject(&token, "user123").is_ok());
        assert!(verifier.verify_subject(&token, "user456").is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let verifier = TokenVerifier::new("test-secret-key");
        assert!(verifier.verify("not-a-token").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenVerifier::new("secret-a");
        let verifier = TokenVerifier::new("secret-b");
        let claims = Claims::new("user123".to_string(), "alice".to_string(), None);
        let token = issuer.issue(&claims).unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
