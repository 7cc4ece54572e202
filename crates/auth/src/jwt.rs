//! HS256 signing and verification of [`SessionClaims`].

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::{AuthError, SessionClaims, TokenValidationError, validate_claims};

/// Issues a signed token for a claims payload.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError>;
}

/// Verifies a token's signature and time window, returning its claims.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenValidationError>;
}

/// Shared-secret JWT signer/verifier.
///
/// The library's own `exp` check is disabled so that time validation goes
/// through [`validate_claims`] against the caller-supplied `now`.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt").finish_non_exhaustive()
    }
}

impl TokenSigner for Hs256Jwt {
    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("token signing failed: {e}")))
    }
}

impl TokenVerifier for Hs256Jwt {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenValidationError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use warden_core::UserId;

    use super::*;
    use crate::{Principal, Role};

    fn issued_by(issuer: &str, now: DateTime<Utc>) -> SessionClaims {
        let p = Principal::new(UserId::new(), None, vec![Role::SUPER_ADMIN], vec![]);
        SessionClaims::issue(&p, "superadmin", issuer, now, Duration::hours(1))
    }

    fn issued(now: DateTime<Utc>) -> SessionClaims {
        issued_by("warden", now)
    }

    #[test]
    fn sign_then_verify() {
        let jwt = Hs256Jwt::new(b"test-secret", "warden");
        let now = Utc::now();
        let claims = issued(now);
        let token = jwt.sign(&claims).unwrap();
        assert_eq!(jwt.verify(&token, now).unwrap(), claims);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256Jwt::new(b"a", "warden").sign(&issued(now)).unwrap();
        let err = Hs256Jwt::new(b"b", "warden").verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let now = Utc::now();
        let foreign = Hs256Jwt::new(b"s", "someone-else");
        let token = foreign.sign(&issued_by("someone-else", now)).unwrap();
        assert!(foreign.verify(&token, now).is_ok());

        let err = Hs256Jwt::new(b"s", "warden").verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn expiry_uses_supplied_clock() {
        let jwt = Hs256Jwt::new(b"s", "warden");
        let now = Utc::now();
        let token = jwt.sign(&issued(now)).unwrap();
        let later = now + Duration::hours(2);
        assert_eq!(jwt.verify(&token, later), Err(TokenValidationError::Expired));
    }
}
