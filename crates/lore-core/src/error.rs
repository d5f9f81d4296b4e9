use thiserror::Error;

/// Top-level error type for the lore system.
///
/// Subsystem crates return this type directly; library errors from
/// `toml`, `serde_json` and `std::io` convert through `From` so the `?`
/// operator works across crate boundaries. Storage code maps driver errors
/// into [`LoreError::Storage`] at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoreError {
    #[error("Corpus is empty: no documents were parsed")]
    CorpusEmpty,

    #[error("Duplicate document id {doc_id}: first seen in {first_source}, repeated in {duplicate_source}")]
    DuplicateDocumentId {
        doc_id: String,
        first_source: String,
        duplicate_source: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown query mode: {0} (expected semantic, keyword or hybrid)")]
    UnknownQueryMode(String),

    #[error("Embedder mismatch: index built with {built}, queried with {configured}")]
    EmbedderMismatch { built: String, configured: String },

    #[error("Embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("Index not built: {0}")]
    IndexNotBuilt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<toml::de::Error> for LoreError {
    fn from(err: toml::de::Error) -> Self {
        LoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LoreError {
    fn from(err: toml::ser::Error) -> Self {
        LoreError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LoreError {
    fn from(err: serde_json::Error) -> Self {
        LoreError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for lore operations.
pub type Result<T> = std::result::Result<T, LoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoreError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = LoreError::DimensionMismatch {
            expected: 384,
            actual: 128,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 128");
    }

    #[test]
    fn test_duplicate_id_lists_both_sources() {
        let err = LoreError::DuplicateDocumentId {
            doc_id: "def-functor-001".into(),
            first_source: "functors.md".into(),
            duplicate_source: "laws.md".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("def-functor-001"));
        assert!(msg.contains("functors.md"));
        assert!(msg.contains("laws.md"));
    }

    #[test]
    fn test_unknown_query_mode_display() {
        let err = LoreError::UnknownQueryMode("fuzzy".into());
        assert!(err.to_string().contains("fuzzy"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoreError = io_err.into();
        assert!(matches!(err, LoreError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let lore_err: LoreError = err.unwrap_err().into();
        assert!(matches!(lore_err, LoreError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let lore_err: LoreError = err.unwrap_err().into();
        assert!(matches!(lore_err, LoreError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
