//! Face login, registration and session lifecycle.
//!
//! `AuthService` ties the face analyzer, the identity store, the matcher and
//! the session issuer together and records every decision in the audit log.

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::matcher::{FaceMatcher, MatchPolicy};
use crate::revocation::RevocationList;
use crate::session::SessionIssuer;
use chrono::Utc;
use mimir_config::AppConfig;
use mimir_core::error::{AuthError, SessionError};
use mimir_core::face::FaceAnalyzer;
use mimir_core::identity::{IdentityStore, UserIdentity};
use mimir_core::knowledge::KnowledgeIndex;
use mimir_core::session::{AuthenticatedUser, SessionCredential};
use mimir_store::naming::personal_collection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const ANONYMOUS: &str = "anonymous";

/// What `purge_all` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub identities: usize,
    pub personal_collections: usize,
    pub passages: usize,
}

pub struct AuthService {
    faces: Arc<dyn FaceAnalyzer>,
    identities: Arc<dyn IdentityStore>,
    knowledge: Arc<dyn KnowledgeIndex>,
    matcher: FaceMatcher,
    issuer: SessionIssuer,
    revocations: RevocationList,
    strict_logout: bool,
    roles: Vec<String>,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("faces", &self.faces.name())
            .field("identities", &self.identities.name())
            .field("matcher", &self.matcher)
            .field("strict_logout", &self.strict_logout)
            .field("roles", &self.roles)
            .finish()
    }
}

impl AuthService {
    pub fn new(
        faces: Arc<dyn FaceAnalyzer>,
        identities: Arc<dyn IdentityStore>,
        knowledge: Arc<dyn KnowledgeIndex>,
        matcher: FaceMatcher,
        issuer: SessionIssuer,
    ) -> Self {
        Self {
            faces,
            identities,
            knowledge,
            matcher,
            issuer,
            revocations: RevocationList::new(),
            strict_logout: false,
            roles: Vec::new(),
            audit: Arc::new(AuditLogger::tracing()),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        faces: Arc<dyn FaceAnalyzer>,
        identities: Arc<dyn IdentityStore>,
        knowledge: Arc<dyn KnowledgeIndex>,
    ) -> Self {
        Self::new(
            faces,
            identities,
            knowledge,
            FaceMatcher::new(MatchPolicy::from(&config.face)),
            SessionIssuer::from_config(&config.session),
        )
        .with_roles(config.sources.role_names())
        .with_strict_logout(config.session.strict_logout)
    }

    /// Roles accepted at registration. Empty means any role.
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_strict_logout(mut self, strict: bool) -> Self {
        self.strict_logout = strict;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    /// Photo login: detect, embed, match, issue.
    pub async fn authenticate(&self, photo: &[u8]) -> Result<SessionCredential, AuthError> {
        let observation = match self.faces.analyze(photo).await {
            Ok(Some(observation)) => observation,
            Ok(None) => return Err(self.reject_login(AuthError::NoFaceDetected)),
            Err(e) => return Err(self.reject_login(AuthError::FaceService(e))),
        };
        self.authenticate_embedding(&observation.embedding).await
    }

    /// Login with an embedding already produced by the face service.
    pub async fn authenticate_embedding(&self, probe: &[f32]) -> Result<SessionCredential, AuthError> {
        let references = match self.identities.snapshot().await {
            Ok(references) => references,
            Err(e) => return Err(self.reject_login(AuthError::Store(e))),
        };
        let matched = self
            .matcher
            .find_match(probe, &references)
            .map_err(|e| self.reject_login(e))?;

        let credential = self
            .issuer
            .issue(&matched.user_id, &matched.display_name, &matched.role)
            .map_err(|e| self.reject_login(e.into()))?;

        self.audit.log(
            AuditEvent::LoginAttempt,
            &matched.user_id,
            &credential.session_id,
            AuditOutcome::Success,
            Some(format!("distance={:.4}", matched.distance)),
        );
        info!(user_id = %matched.user_id, role = %matched.role, "Face login accepted");
        Ok(credential)
    }

    fn reject_login(&self, error: AuthError) -> AuthError {
        let outcome = if error.is_rejection() {
            AuditOutcome::Denied
        } else {
            AuditOutcome::Failure
        };
        self.audit
            .log(AuditEvent::LoginAttempt, ANONYMOUS, "session", outcome, Some(error.code().to_string()));
        warn!(reason = error.code(), "Face login rejected");
        error
    }

    /// Register (or re-register) an identity from a photo.
    pub async fn register_identity(
        &self,
        photo: &[u8],
        user_id: &str,
        display_name: &str,
        role: &str,
    ) -> Result<UserIdentity, AuthError> {
        self.check_registration(user_id, display_name, role)
            .map_err(|e| self.reject_registration(user_id, role, e))?;
        let observation = match self.faces.analyze(photo).await {
            Ok(Some(observation)) => observation,
            Ok(None) => return Err(self.reject_registration(user_id, role, AuthError::NoFaceDetected)),
            Err(e) => return Err(self.reject_registration(user_id, role, e.into())),
        };
        self.register_embedding(user_id, display_name, role, observation.embedding)
            .await
    }

    /// Register with a precomputed reference embedding.
    pub async fn register_embedding(
        &self,
        user_id: &str,
        display_name: &str,
        role: &str,
        embedding: Vec<f32>,
    ) -> Result<UserIdentity, AuthError> {
        self.check_registration(user_id, display_name, role)
            .map_err(|e| self.reject_registration(user_id, role, e))?;
        if embedding.is_empty() {
            return Err(self.reject_registration(user_id, role, AuthError::NoFaceDetected));
        }

        let identity = UserIdentity::new(user_id.trim(), display_name.trim(), role, embedding);
        let stored = self
            .identities
            .upsert(identity)
            .await
            .map_err(|e| self.reject_registration(user_id, role, e.into()))?;

        self.audit.log(
            AuditEvent::Registration { role: role.to_string() },
            "admin",
            &stored.user_id,
            AuditOutcome::Success,
            None,
        );
        info!(user_id = %stored.user_id, role, "Identity registered");
        Ok(stored)
    }

    fn check_registration(&self, user_id: &str, display_name: &str, role: &str) -> Result<(), AuthError> {
        if user_id.trim().is_empty() {
            return Err(AuthError::EmptyIdentity("user_id"));
        }
        if display_name.trim().is_empty() {
            return Err(AuthError::EmptyIdentity("display_name"));
        }
        if role.trim().is_empty() {
            return Err(AuthError::EmptyIdentity("role"));
        }
        if !self.roles.is_empty() && !self.roles.iter().any(|r| r == role) {
            return Err(AuthError::UnknownRole(role.to_string()));
        }
        Ok(())
    }

    fn reject_registration(&self, user_id: &str, role: &str, error: AuthError) -> AuthError {
        self.audit.log(
            AuditEvent::Registration { role: role.to_string() },
            "admin",
            user_id,
            AuditOutcome::Failure,
            Some(error.code().to_string()),
        );
        error
    }

    /// Validate a presented token. Revocations are only enforced in strict mode.
    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, SessionError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub fn validate_at(&self, token: &str, now: i64) -> Result<AuthenticatedUser, SessionError> {
        let result = self.issuer.decode_at(token, now).and_then(|claims| {
            if self.strict_logout && self.revocations.is_revoked(&claims.sid, now) {
                Err(SessionError::Revoked)
            } else {
                Ok(AuthenticatedUser::from(claims))
            }
        });
        if let Err(e) = &result {
            self.audit.log(
                AuditEvent::SessionRejected { reason: e.code().to_string() },
                ANONYMOUS,
                "session",
                AuditOutcome::Denied,
                None,
            );
        }
        result
    }

    /// Record a logout. An already-expired token is a no-op.
    pub fn logout(&self, token: &str) -> Result<(), SessionError> {
        let now = Utc::now().timestamp();
        let claims = match self.issuer.decode_at(token, now) {
            Ok(claims) => claims,
            Err(SessionError::Expired) => return Ok(()),
            Err(e) => return Err(e),
        };
        self.revocations.revoke(&claims.sid, claims.exp, now);
        self.audit.log(
            AuditEvent::Logout { session_id: claims.sid.clone() },
            &claims.sub,
            &claims.sid,
            AuditOutcome::Success,
            (!self.strict_logout).then(|| "advisory".to_string()),
        );
        Ok(())
    }

    /// Remove every identity and its personal collection.
    pub async fn purge_all(&self) -> Result<PurgeReport, AuthError> {
        let identities = self.identities.snapshot().await?;
        let mut report = PurgeReport::default();
        for identity in &identities {
            let removed = self
                .knowledge
                .delete_collection(&personal_collection(&identity.user_id))
                .await?;
            if removed > 0 {
                report.personal_collections += 1;
                report.passages += removed;
            }
        }
        report.identities = self.identities.clear().await?;

        self.audit.log(
            AuditEvent::IdentityPurge,
            "admin",
            "identities",
            AuditOutcome::Success,
            Some(format!(
                "identities={} collections={}",
                report.identities, report.personal_collections
            )),
        );
        warn!(identities = report.identities, "All identities purged");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mimir_core::error::FaceServiceError;
    use mimir_core::face::FaceObservation;
    use mimir_core::knowledge::Passage;
    use mimir_store::{InMemoryIdentityStore, InMemoryKnowledgeIndex};

    /// Treats the photo bytes as the embedding: each byte is one dimension.
    struct BytesAnalyzer;

    #[async_trait]
    impl FaceAnalyzer for BytesAnalyzer {
        fn name(&self) -> &str {
            "bytes"
        }

        async fn analyze(&self, image: &[u8]) -> Result<Option<FaceObservation>, FaceServiceError> {
            if image == b"down" {
                return Err(FaceServiceError::Unreachable("connection refused".into()));
            }
            if image.is_empty() || image.iter().all(|b| *b == 0) {
                return Ok(None);
            }
            Ok(Some(FaceObservation {
                bounding_box: None,
                embedding: image.iter().map(|b| f32::from(*b)).collect(),
            }))
        }
    }

    struct Fixture {
        service: AuthService,
        knowledge: Arc<InMemoryKnowledgeIndex>,
    }

    fn fixture(strict: bool) -> Fixture {
        let knowledge = Arc::new(InMemoryKnowledgeIndex::new());
        let service = AuthService::new(
            Arc::new(BytesAnalyzer),
            Arc::new(InMemoryIdentityStore::new()),
            knowledge.clone(),
            FaceMatcher::new(MatchPolicy { threshold: 0.85, tie_epsilon: 1e-3 }),
            SessionIssuer::new(b"secret".to_vec(), 3600),
        )
        .with_roles(vec!["analyst".into(), "auditor".into()])
        .with_strict_logout(strict)
        .with_audit(Arc::new(AuditLogger::new()));
        Fixture { service, knowledge }
    }

    #[tokio::test]
    async fn register_then_authenticate_by_photo() {
        let f = fixture(false);
        f.service
            .register_identity(&[10, 0, 0], "u1", "User One", "auditor")
            .await
            .unwrap();
        f.service
            .register_identity(&[0, 10, 0], "u2", "User Two", "analyst")
            .await
            .unwrap();

        let credential = f.service.authenticate(&[9, 1, 0]).await.unwrap();
        assert_eq!(credential.user_id, "u1");
        assert_eq!(credential.role, "auditor");

        let user = f.service.validate(&credential.token).unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.role, "auditor");

        assert_eq!(f.service.audit().entries_by_outcome(&AuditOutcome::Success).len(), 3);
    }

    #[tokio::test]
    async fn rejections_carry_reason_and_are_audited() {
        let f = fixture(false);
        f.service
            .register_identity(&[10, 0], "u1", "User One", "analyst")
            .await
            .unwrap();

        assert!(matches!(f.service.authenticate(&[0, 0]).await, Err(AuthError::NoFaceDetected)));
        assert!(matches!(f.service.authenticate(&[0, 10]).await, Err(AuthError::NoMatch)));
        assert!(matches!(
            f.service.authenticate(b"down").await,
            Err(AuthError::FaceService(FaceServiceError::Unreachable(_)))
        ));

        let denied = f.service.audit().entries_by_outcome(&AuditOutcome::Denied);
        let reasons: Vec<_> = denied.iter().filter_map(|e| e.details.clone()).collect();
        assert_eq!(reasons, vec!["no_face_detected", "no_match"]);
        assert_eq!(f.service.audit().entries_by_outcome(&AuditOutcome::Failure).len(), 1);
    }

    #[tokio::test]
    async fn registration_validates_inputs() {
        let f = fixture(false);
        assert!(matches!(
            f.service.register_embedding("u1", "U", "wizard", vec![1.0]).await,
            Err(AuthError::UnknownRole(_))
        ));
        assert!(matches!(
            f.service.register_embedding(" ", "U", "analyst", vec![1.0]).await,
            Err(AuthError::EmptyIdentity("user_id"))
        ));
        assert!(matches!(
            f.service.register_embedding("u1", "", "analyst", vec![1.0]).await,
            Err(AuthError::EmptyIdentity("display_name"))
        ));
        assert!(matches!(
            f.service.register_identity(&[0], "u1", "U", "analyst").await,
            Err(AuthError::NoFaceDetected)
        ));
        assert_eq!(f.service.identities().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn advisory_logout_keeps_token_valid() {
        let f = fixture(false);
        f.service.register_embedding("u1", "U", "analyst", vec![1.0, 0.0]).await.unwrap();
        let token = f.service.authenticate_embedding(&[1.0, 0.0]).await.unwrap().token;

        f.service.logout(&token).unwrap();
        assert!(f.service.validate(&token).is_ok());
    }

    #[tokio::test]
    async fn strict_logout_revokes_token() {
        let f = fixture(true);
        f.service.register_embedding("u1", "U", "analyst", vec![1.0, 0.0]).await.unwrap();
        let token = f.service.authenticate_embedding(&[1.0, 0.0]).await.unwrap().token;
        let other = f.service.authenticate_embedding(&[1.0, 0.0]).await.unwrap().token;

        f.service.logout(&token).unwrap();
        assert_eq!(f.service.validate(&token), Err(SessionError::Revoked));
        assert!(f.service.validate(&other).is_ok());
        assert!(matches!(f.service.logout("garbage"), Err(SessionError::Invalid(_))));
    }

    #[tokio::test]
    async fn purge_removes_identities_and_personal_collections() {
        let f = fixture(false);
        f.service.register_embedding("u1", "U", "analyst", vec![1.0, 0.0]).await.unwrap();
        f.service.register_embedding("u2", "V", "auditor", vec![0.0, 1.0]).await.unwrap();
        let collection = personal_collection("u1");
        f.knowledge
            .append(&collection, vec![Passage::new(&collection, "policy", vec![1.0], "personal:u1")])
            .await
            .unwrap();
        f.knowledge
            .append("common", vec![Passage::new("common", "handbook", vec![1.0], "common")])
            .await
            .unwrap();

        let report = f.service.purge_all().await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                identities: 2,
                personal_collections: 1,
                passages: 1
            }
        );
        assert!(f.knowledge.collection_stats("common").await.unwrap().is_some());
        assert!(matches!(
            f.service.authenticate_embedding(&[1.0, 0.0]).await,
            Err(AuthError::NoMatch)
        ));
    }
}
