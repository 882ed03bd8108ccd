//! External service clients for Mimir.
//!
//! LLM providers implement `mimir_core::Provider`; the face service client
//! implements `mimir_core::FaceAnalyzer`. The router selects the completion
//! and embedding providers based on configuration.

pub mod face_service;
pub mod openai_compat;
pub mod router;

pub use face_service::HttpFaceAnalyzer;
pub use openai_compat::{AuthStyle, OpenAiCompatProvider};
pub use router::ProviderRouter;
