use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The endpoint answered but reported the server or model as not ready.
    #[error("endpoint {endpoint} - model {model} - version {version} is not ready: {reason}")]
    Unavailable {
        endpoint: String,
        model: String,
        version: String,
        reason: String,
    },

    #[error("{}:{line}: invalid test case: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} request failed: {message}")]
    Transport { op: &'static str, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
