use thiserror::Error;

/// Failure modes surfaced to a view. None of them are fatal: the caller logs
/// the message, keeps its previous state, and waits for the next poll.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned HTTP {0}")]
    Status(u16),

    #[error("source returned no data")]
    Empty,

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid source url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SheetError {
    /// Short human-readable text for the degraded view state.
    pub fn user_message(&self) -> String {
        match self {
            SheetError::Http(_) | SheetError::Status(_) => "Failed to fetch CSV".to_string(),
            SheetError::Empty => "No data available".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_read_as_fetch_failures() {
        assert_eq!(SheetError::Status(503).user_message(), "Failed to fetch CSV");
        assert_eq!(SheetError::Status(404).to_string(), "source returned HTTP 404");
    }

    #[test]
    fn empty_source_has_its_own_message() {
        assert_eq!(SheetError::Empty.user_message(), "No data available");
    }
}
