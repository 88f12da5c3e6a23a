use thiserror::Error;

/// Failure taxonomy for the collection pipeline.
///
/// `Upstream` is recoverable by the caller (retry or degrade the provider's
/// contribution to an empty set). `Persistence` is fatal for the batch it
/// occurred in. `MalformedRecord` covers raw payload entries that cannot be
/// normalized; the record is dropped and reported, the run continues.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Remote API returned a non-success status, timed out, or the
    /// transport failed.
    #[error("upstream failure from {provider}: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    /// Store write failure unrelated to ignored duplicates.
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Local filesystem failure while storing photo assets.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Raw record is missing a field we cannot proceed without.
    #[error("malformed {provider} record: missing {field}")]
    MalformedRecord {
        provider: &'static str,
        field: &'static str,
    },
}

impl PipelineError {
    /// Wrap a reqwest error (timeouts included) as an upstream failure for
    /// the given provider.
    pub fn upstream(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            provider,
            message: err.to_string(),
        }
    }
}
