//! Utility modules for jewel-search

pub mod retry;

pub use retry::{retry_on_timeout, retry_transient, with_timeout};
