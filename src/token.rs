use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::BotError;

/// Verification tokens stay valid for one hour after issuance.
const TOKEN_VALIDITY_SECS: i64 = 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Email address the token was issued for.
    email: String,
    /// Issued-at (seconds since epoch).
    iat: i64,
    /// Expiry (seconds since epoch).
    exp: i64,
}

/// Issues and verifies the signed tokens that bind a claimed email to an
/// expiry. Stateless apart from the shared signing secret; there is no
/// revocation list, expiry is the only invalidation mechanism.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, email: &str, now: DateTime<Utc>) -> crate::error::Result<String> {
        let claims = Claims {
            email: email.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_VALIDITY_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|_| BotError::InvalidToken)
    }

    /// Checks signature, embedded email and expiry. Expiry is compared
    /// against the caller-supplied `now` rather than the wall clock so the
    /// workflow (and its tests) control time.
    pub fn verify(
        &self,
        token: &str,
        expected_email: &str,
        now: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| BotError::InvalidToken)?;

        if data.claims.email != expected_email {
            return Err(BotError::InvalidToken);
        }
        if now.timestamp() > data.claims.exp {
            return Err(BotError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> TokenService {
        TokenService::new("test-signing-secret")
    }

    #[test]
    fn verify_succeeds_right_after_issuance() {
        let tokens = service();
        let now = Utc::now();
        let token = tokens.issue("lea.martin@etu.example.fr", now).unwrap();

        assert!(tokens
            .verify(&token, "lea.martin@etu.example.fr", now)
            .is_ok());
    }

    #[test]
    fn verify_fails_expired_after_one_hour() {
        let tokens = service();
        let now = Utc::now();
        let token = tokens.issue("lea.martin@etu.example.fr", now).unwrap();

        // Still fine at the boundary, expired past it.
        let at_limit = now + Duration::hours(1);
        assert!(tokens
            .verify(&token, "lea.martin@etu.example.fr", at_limit)
            .is_ok());

        let past = now + Duration::hours(1) + Duration::seconds(1);
        let err = tokens
            .verify(&token, "lea.martin@etu.example.fr", past)
            .unwrap_err();
        assert!(matches!(err, BotError::Expired));
    }

    #[test]
    fn verify_fails_invalid_on_email_mismatch() {
        let tokens = service();
        let now = Utc::now();
        let token = tokens.issue("lea.martin@etu.example.fr", now).unwrap();

        let err = tokens
            .verify(&token, "paul.durand@etu.example.fr", now)
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidToken));
    }

    #[test]
    fn verify_fails_invalid_on_wrong_secret() {
        let now = Utc::now();
        let token = service().issue("lea.martin@etu.example.fr", now).unwrap();

        let other = TokenService::new("another-secret");
        let err = other
            .verify(&token, "lea.martin@etu.example.fr", now)
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidToken));
    }

    #[test]
    fn verify_rejects_garbage() {
        let tokens = service();
        let err = tokens
            .verify("not-a-token", "lea.martin@etu.example.fr", Utc::now())
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidToken));
    }
}
