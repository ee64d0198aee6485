use std::io;
use std::path::{Path, PathBuf};

pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{}: {source}", path.display())]
    FileIo { path: PathBuf, source: io::Error },

    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown file type '{0}'")]
    UnknownType(String),

    #[error("file type '{prefix}' is ambiguous (matches {})", candidates.join(", "))]
    AmbiguousType {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error("invalid filter specification '{0}'")]
    FilterSpec(String),
}

impl SearchError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        SearchError::Config(msg.into())
    }

    pub fn pattern_error(msg: impl Into<String>) -> Self {
        SearchError::Pattern(msg.into())
    }

    pub fn file_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        SearchError::FileIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for errors a scanner worker may log and swallow without
    /// aborting the run.
    pub fn is_per_file(&self) -> bool {
        matches!(self, SearchError::FileIo { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_io_carries_path() {
        let err = SearchError::file_io(
            "/tmp/missing.txt",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.txt"));
        assert!(err.is_per_file());
    }

    #[test]
    fn test_ambiguous_type_lists_candidates() {
        let err = SearchError::AmbiguousType {
            prefix: "c".to_string(),
            candidates: vec!["cc".to_string(), "cpp".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("cc"));
        assert!(msg.contains("cpp"));
        assert!(!err.is_per_file());
    }
}
