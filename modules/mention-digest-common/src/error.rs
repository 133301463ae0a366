use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Mention search failed: {0}")]
    Search(String),

    #[error("Malformed mention: {0}")]
    Malformed(String),

    #[error("Thread fetch failed: {0}")]
    Fetch(String),

    #[error("Generation failed: {0}")]
    Generate(String),

    #[error("No candidates in model response")]
    NoCandidates,

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("{stage} call timed out after {limit:?}")]
    Timeout {
        stage: &'static str,
        limit: std::time::Duration,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Digest delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
