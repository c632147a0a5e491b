//! Shared building blocks: filename hygiene and the retry policy.

pub mod filename;
pub mod retry;

pub use filename::sanitize_filename;
pub use retry::RetryPolicy;
