//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, check_file_size, extension, read_file_content, store_upload};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
pub use text::{preview, truncate_chars};
