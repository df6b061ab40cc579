//! Session verification. The core treats authentication as an external
//! collaborator — the bcrypt-heavy credential worker pool is out of scope —
//! and consumes only the verifier contract: decode a bearer token into the
//! caller's identity, or fail with `Unauthorized`.

use crate::error::{AppError, Result};
use crate::types::UserId;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub email: String,
    pub display_name: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<Session>;
}

pub struct JwtSessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 5;
        Self { decoding_key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<Session> {
        let token = bearer_token.strip_prefix("Bearer ").unwrap_or(bearer_token);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid session token: {e}")))?;
        Ok(Session {
            user_id: data.claims.sub,
            email: data.claims.email,
            display_name: data.claims.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    #[tokio::test]
    async fn verifies_a_well_formed_token() {
        let secret = "test-secret-at-least-32-bytes-long!";
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            email: "trader@example.com".to_string(),
            display_name: "Trader".to_string(),
            exp: (Utc::now().timestamp()) + 3600,
            iat: Utc::now().timestamp(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();

        let verifier = JwtSessionVerifier::new(secret);
        let session = verifier.verify(&format!("Bearer {token}")).await.unwrap();
        assert_eq!(session.user_id, claims.sub);
    }

    #[tokio::test]
    async fn rejects_an_expired_token() {
        let secret = "test-secret-at-least-32-bytes-long!";
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            email: "trader@example.com".to_string(),
            display_name: "Trader".to_string(),
            exp: (Utc::now().timestamp()) - 3600,
            iat: Utc::now().timestamp() - 7200,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();

        let verifier = JwtSessionVerifier::new(secret);
        assert!(verifier.verify(&token).await.is_err());
    }
}
