//! # Mimir Agent
//!
//! Role-scoped retrieval and answering. A chat request resolves the
//! session role to its sources, searches every source concurrently, merges
//! the hits into one bounded context and asks the completion service for
//! an answer whose citations come from that context.

pub mod composer;
pub mod engine;
pub mod generator;
pub mod ingest;
pub mod retriever;
pub mod sources;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use composer::{ComposedContext, ContextComposer, estimate_tokens};
pub use engine::{AvailableSources, ChatEngine, ChatResponse, ChatStage, StageTrail};
pub use generator::{AnswerGenerator, GeneratedAnswer};
pub use ingest::{IngestReport, IngestTarget, Ingestor};
pub use retriever::{Retrieval, Retriever, SkippedSource, SourceResults};
pub use sources::{CollectionSelector, ResolvedSource, SourceDescriptor, SourceRegistry, SourceSlot, source_label};
