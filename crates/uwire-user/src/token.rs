//! Signed bearer tokens carrying subject and expiry.

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::UserError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: usize,
    iat: usize,
}

/// HS256 token issuer.
///
/// The signing secret comes from configuration only; construction fails on
/// an empty secret so startup is fail-closed.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, UserError> {
        if secret.is_empty() {
            return Err(UserError::Internal(
                "token signing secret is empty".to_string(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Mint a token with subject `user_id` and expiry `now + ttl`.
    pub fn sign(&self, user_id: Uuid) -> Result<String, UserError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now.unix_timestamp() + self.ttl.as_secs() as i64) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(UserError::internal)
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<Uuid, UserError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| UserError::Auth("unverified token".to_string()))?;
        Ok(data.claims.sub)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenIssuer::new("", Duration::from_secs(60)).is_err());
    }

    #[test]
    fn sign_verify_round_trip() {
        let issuer = TokenIssuer::new("s3cret", Duration::from_secs(3600)).unwrap();
        let user_id = Uuid::new_v4();
        let token = issuer.sign(user_id).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let issuer = TokenIssuer::new("secret-a", Duration::from_secs(3600)).unwrap();
        let other = TokenIssuer::new("secret-b", Duration::from_secs(3600)).unwrap();
        let token = issuer.sign(Uuid::new_v4()).unwrap();
        assert!(matches!(other.verify(&token), Err(UserError::Auth(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new("s3cret", Duration::from_secs(0)).unwrap();
        let token = issuer.sign(Uuid::new_v4()).unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let issuer = TokenIssuer::new("s3cret", Duration::from_secs(3600)).unwrap();
        assert!(issuer.verify("not.a.token").is_err());
    }
}
