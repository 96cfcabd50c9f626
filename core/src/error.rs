use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("unsupported content type: {0}")]
    Unsupported(String),

    #[error("no text could be extracted")]
    Empty,

    #[error("decode failed: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("index corrupted: {0}")]
    IndexCorruption(String),

    #[error("storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl SearchError {
    /// Short machine-readable name, used by front ends when reporting errors.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::QuerySyntax(_) => "query_syntax",
            Self::Extraction(_) => "extraction",
            Self::IndexCorruption(_) => "index_corruption",
            Self::StorageIo(_) => "storage_io",
            Self::Encoding(_) => "encoding",
            Self::NotFound(_) => "not_found",
        }
    }
}

impl From<bincode::Error> for SearchError {
    fn from(err: bincode::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<sled::Error> for SearchError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => Self::StorageIo(io),
            other => Self::StorageIo(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
