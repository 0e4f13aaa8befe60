// Public modules
pub mod batch;
pub mod cloudflare;
pub mod cpanel;
pub mod defaults;
pub mod deploy;
pub mod distribute;
pub mod error;
pub mod job;
pub mod migrate;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod ssh;

// Internal modules - not part of public API
pub(crate) mod http;
pub(crate) mod paths;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, FailureKind, Result};
pub use output::{BatchResult, BatchResultItem, BulkSummary};
