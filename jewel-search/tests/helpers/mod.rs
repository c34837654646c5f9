//! Test Helper Utilities
//!
//! Shared utilities for testing jewel-search: in-memory capabilities and a
//! small test configuration.

#![allow(dead_code)]

pub mod mock_services;

pub use mock_services::*;

use jewel_common::config::TomlConfig;

/// Embedding dimension used by every mock embedder
pub const TEST_DIMENSION: usize = 4;

/// Default configuration shrunk for tests
///
/// Small vectors, a 1 ms retry backoff and a generous call timeout so slow
/// CI machines never trip it by accident.
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.search.embedding_dimension = TEST_DIMENSION;
    config.search.top_n = 10;
    config.search.result_count = 5;
    config.search.retry_backoff_ms = 1;
    config.services.call_timeout_ms = 2_000;
    config.rerank.concurrency = 4;
    config
}
