//! Attribute conflict detection and resolution
//!
//! [`vocabulary`] turns text into canonical facet values; [`resolver`]
//! compares requested values against each candidate's catalog values and
//! applies the penalty policy.

pub mod resolver;
pub mod vocabulary;

pub use resolver::{ConflictPolicy, ConflictResolver, Resolution, DESCRIPTION_KEY};
pub use vocabulary::{FacetRequirement, FacetVocabulary};
