//! Utility modules.

pub mod file;
pub mod http;
pub mod retry;

pub use file::read_keywords;
pub use retry::{RetryPolicy, RetryResult, Retryable, with_retry};
