//! Identity verification for Mimir.
//!
//! - **Matcher**: nearest-identity face matching with an inclusive threshold
//!   and ambiguity rejection
//! - **Sessions**: HMAC-signed, time-bounded credentials plus an optional
//!   logout denylist
//! - **Audit**: structured record of login, registration and admin events
//! - **AuthService**: the operations the web layer calls

pub mod audit;
pub mod auth;
pub mod matcher;
pub mod revocation;
pub mod session;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use auth::{AuthService, PurgeReport};
pub use matcher::{FaceMatcher, MatchPolicy, MatchResult};
pub use revocation::RevocationList;
pub use session::SessionIssuer;
