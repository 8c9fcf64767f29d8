use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("completion contained no message content")]
    EmptyCompletion,

    #[error("completion is not a question object: {0}")]
    MalformedQuestion(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("generated question rejected: {0}")]
    InvalidQuestion(String),

    #[error("no usable questions generated (requested {requested})")]
    NoQuestions { requested: usize },
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("invalid quiz state: {0}")]
    InvalidState(String),
}

/// Outcome of a failed quiz build. Each upstream failure keeps its own
/// variant so a caller can tell "nothing to read" from "nothing relevant".
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid quiz request: {0}")]
    InvalidRequest(String),

    #[error("no documents processed ({} skipped)", skipped.len())]
    NoDocumentsProcessed { skipped: Vec<String> },

    #[error("no relevant context found for topic {topic:?}")]
    NoRelevantContext { topic: String },

    #[error("collection error: {0}")]
    Collection(#[from] SearchError),

    #[error("generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error(transparent)]
    InvalidState(#[from] QuizError),
}

impl SearchError {
    pub(crate) fn ensure_success(backend: &str, status: StatusCode) -> Result<(), Self> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::BackendResponse {
                backend: backend.to_string(),
                details: status.to_string(),
            })
        }
    }
}

impl GenerationError {
    pub(crate) fn ensure_success(backend: &str, status: StatusCode) -> Result<(), Self> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::BackendResponse {
                backend: backend.to_string(),
                details: status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_names_the_backend() {
        assert!(SearchError::ensure_success("chroma", StatusCode::OK).is_ok());
        match SearchError::ensure_success("chroma", StatusCode::INTERNAL_SERVER_ERROR) {
            Err(SearchError::BackendResponse { backend, details }) => {
                assert_eq!(backend, "chroma");
                assert!(details.contains("500"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            GenerationError::ensure_success("chat-completion", StatusCode::SERVICE_UNAVAILABLE),
            Err(GenerationError::BackendResponse { .. })
        ));
    }
}
