//! `agrolens-inference`
//!
//! **Responsibility:** boundary traits for the external collaborators of the
//! pipeline — the inference engine, the blob store and the optional
//! growth-stage enrichment provider.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not mutate domain state.
//! - It returns opaque label maps; decoding is the engine's job.
//! - Production implementations live in deployment-specific crates; the
//!   in-memory/static implementations here exist for tests and dev mode.

pub mod blob;
pub mod engine;
pub mod enrich;

pub use blob::{BlobError, BlobStore, BlobUrls, InMemoryBlobStore};
#[cfg(feature = "http")]
pub use blob::HttpBlobStore;
pub use engine::{EngineError, InferenceEngine, StaticEngine};
pub use enrich::{EnrichError, GrowthStageProvider, NoEnrichment, StaticGrowthStage};
