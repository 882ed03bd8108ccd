//! Signed, time-bounded session credentials.
//!
//! Token layout: `base64url(claims_json) "." base64url(hmac_sha256(claims_part))`,
//! both parts unpadded. Validation needs nothing but the token, the clock and
//! the server secret.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use mimir_config::SessionConfig;
use mimir_core::error::SessionError;
use mimir_core::session::{AuthenticatedUser, SessionClaims, SessionCredential};
use rand::Rng;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const SECRET_LEN: usize = 32;

pub struct SessionIssuer {
    secret: Vec<u8>,
    validity_secs: i64,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("secret", &"[REDACTED]")
            .field("validity_secs", &self.validity_secs)
            .finish()
    }
}

impl SessionIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, validity_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            validity_secs,
        }
    }

    /// Uses the configured secret, or a random per-process one. With a random
    /// secret every credential dies with the process.
    pub fn from_config(config: &SessionConfig) -> Self {
        let validity_secs = i64::try_from(config.validity_minutes.saturating_mul(60)).unwrap_or(i64::MAX);
        match config.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret.as_bytes(), validity_secs),
            None => {
                warn!("No session secret configured; generated an ephemeral one");
                let mut secret = vec![0u8; SECRET_LEN];
                rand::rng().fill(&mut secret[..]);
                Self::new(secret, validity_secs)
            }
        }
    }

    pub fn validity_secs(&self) -> i64 {
        self.validity_secs
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| SessionError::Invalid(format!("signing key: {e}")))
    }

    pub fn issue(&self, user_id: &str, display_name: &str, role: &str) -> Result<SessionCredential, SessionError> {
        self.issue_at(user_id, display_name, role, Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        display_name: &str,
        role: &str,
        now: i64,
    ) -> Result<SessionCredential, SessionError> {
        let claims = SessionClaims {
            sid: uuid::Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            name: display_name.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now.saturating_add(self.validity_secs),
        };
        let payload = serde_json::to_vec(&claims).map_err(|e| SessionError::Invalid(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(SessionCredential::from_claims(format!("{body}.{signature}"), &claims))
    }

    /// Verify signature, then expiry. A token whose signature is fine but
    /// whose payload is not a claims object is also `Invalid`.
    pub fn decode_at(&self, token: &str, now: i64) -> Result<SessionClaims, SessionError> {
        let (body, signature) = token
            .split_once('.')
            .ok_or_else(|| SessionError::Invalid("malformed token".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Invalid("malformed signature".into()))?;

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::Invalid("signature mismatch".into()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| SessionError::Invalid("malformed payload".into()))?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Invalid("malformed claims".into()))?;

        if claims.is_expired_at(now) {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, SessionError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub fn validate_at(&self, token: &str, now: i64) -> Result<AuthenticatedUser, SessionError> {
        self.decode_at(token, now).map(AuthenticatedUser::from)
    }
}
