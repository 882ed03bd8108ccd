//! Revoked session ids, held until the credential would have expired anyway.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct RevocationList {
    /// sid -> exp (unix seconds)
    revoked: DashMap<String, i64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries whose credential has expired are dropped on every insert.
    pub fn revoke(&self, session_id: &str, expires_at: i64, now: i64) {
        self.revoked.retain(|_, exp| *exp > now);
        if expires_at > now {
            self.revoked.insert(session_id.to_string(), expires_at);
        }
    }

    pub fn is_revoked(&self, session_id: &str, now: i64) -> bool {
        self.revoked.get(session_id).is_some_and(|exp| *exp > now)
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}
