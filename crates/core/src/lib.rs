//! # Mimir Core
//!
//! Domain types, traits, and error definitions for the Mimir assistant.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the completion service
//! ([`Provider`]), the face-embedding service ([`FaceAnalyzer`]), the
//! identity store ([`IdentityStore`]) and the per-collection similarity
//! index ([`KnowledgeIndex`]). Implementations live in their respective
//! crates, so tests can swap in scripted stand-ins.

pub mod error;
pub mod face;
pub mod identity;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{
    AuthError, ChatError, Error, FaceServiceError, ProviderError, Result, SessionError,
    SourceError, StoreError,
};
pub use face::{BoundingBox, FaceAnalyzer, FaceObservation};
pub use identity::{IdentityStore, UserIdentity};
pub use knowledge::{CollectionStats, KnowledgeIndex, Passage, RetrievalResult, Scope};
pub use message::{Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{AuthenticatedUser, SessionClaims, SessionCredential};
