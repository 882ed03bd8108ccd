//! Storage for Mimir: identities, knowledge collections, and the text
//! preparation that feeds them.

pub mod chunking;
pub mod data_mart;
pub mod in_memory;
pub mod naming;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunking::split_text;
pub use data_mart::format_record;
pub use in_memory::{InMemoryIdentityStore, InMemoryKnowledgeIndex};
pub use naming::{personal_collection, role_collection, sanitize_collection_name};
pub use vector::{cosine_similarity, l2_distance, normalize};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
