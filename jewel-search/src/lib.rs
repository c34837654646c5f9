//! jewel-search library interface
//!
//! Multimodal jewelry search: text, image, audio, or image+text queries are
//! normalized, embedded, retrieved from a similarity index, reranked, checked
//! for facet conflicts, and returned as a ranked list.
//!
//! External services are reached only through the traits in
//! [`capabilities`]; [`clients`] provides HTTP implementations and tests use
//! in-memory mocks.

pub mod assembler;
pub mod capabilities;
pub mod cli;
pub mod clients;
pub mod conflict;
pub mod error;
pub mod fusion;
pub mod normalizer;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod types;
pub mod utils;

pub use crate::capabilities::Capabilities;
pub use crate::error::{SearchError, SearchResult};
pub use crate::pipeline::{SearchOutcome, SearchPipeline, StageTimings};
pub use crate::types::{AudioClip, Modality, Query, QueryInput, RankedResult};
