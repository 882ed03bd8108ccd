//! Session credential types.
//!
//! A credential is a signed, time-bounded token. Validity depends only on the
//! signature, the expiry and the server secret; signing lives in
//! `mimir-security`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The signed payload of a session token. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Credential id, used as the revocation key
    pub sid: String,
    /// User id
    pub sub: String,
    pub name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Expired at or after `exp`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// A freshly issued credential: the opaque token plus its decoded claims.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCredential {
    pub token: String,
    pub session_id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn from_claims(token: String, claims: &SessionClaims) -> Self {
        Self {
            token,
            session_id: claims.sid.clone(),
            user_id: claims.sub.clone(),
            display_name: claims.name.clone(),
            role: claims.role.clone(),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        }
    }
}

/// The outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionClaims> for AuthenticatedUser {
    fn from(claims: SessionClaims) -> Self {
        let expires_at = claims.expires_at();
        Self {
            user_id: claims.sub,
            display_name: claims.name,
            role: claims.role,
            session_id: claims.sid,
            expires_at,
        }
    }
}
