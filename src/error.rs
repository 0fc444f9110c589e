#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("Unknown test: {0}")]
    UnknownTest(String),

    #[error("Test already registered: {0}")]
    DuplicateTest(String),

    #[error("A test run is already in progress")]
    RunInProgress,

    #[error("Report encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
