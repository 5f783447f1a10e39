use thiserror::Error;

/// Failure of the fingerprint / similar-players request (or of the position player list).
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("unknown position code `{0}`")]
    UnknownPosition(String),
    #[error("player name is empty")]
    EmptyPlayerName,
    #[error("no analysis data for `{player}` at {position}")]
    UnknownPlayer { position: String, player: String },
    #[error("analysis service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("empty analysis response")]
    EmptyResponse,
    #[error("analysis request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("invalid analysis json: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure of a detailed comparison request.
#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("unknown position code `{0}`")]
    UnknownPosition(String),
    #[error("target player name is empty")]
    EmptyTarget,
    #[error("comparison service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("empty comparison response")]
    EmptyResponse,
    #[error("comparison request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("invalid comparison json: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure inside the two-phase portrait lookup. Never leaves the resolver.
#[derive(Debug, Error)]
pub enum ImageResolutionError {
    #[error("title search failed: {0:#}")]
    Search(anyhow::Error),
    #[error("page image lookup failed: {0:#}")]
    PageImage(anyhow::Error),
    #[error("invalid lookup json: {0}")]
    Payload(#[from] serde_json::Error),
}
