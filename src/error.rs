use std::fmt;

/// Errors surfaced while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid url for {field}: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Errors returned by the pool/wallet HTTP client.
///
/// Mirrors the Http/Pool split creepMiner-derived miners use: a transport
/// failure never carries pool-side semantics, a pool error always does.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("pool error {code}: {message}")]
    Pool { code: i32, message: String },
    #[error("malformed pool response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Reasons a plot file was skipped during registry scanning. Never fatal.
#[derive(Debug)]
pub enum PlotError {
    BadFilename(String),
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },
    Io(std::io::Error),
}

impl fmt::Display for PlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotError::BadFilename(name) => {
                write!(f, "filename doesn't match account_start_nonces_stagger grammar: {}", name)
            }
            PlotError::SizeMismatch { path, expected, actual } => write!(
                f,
                "{}: size mismatch, expected {} bytes from filename, found {}",
                path, expected, actual
            ),
            PlotError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for PlotError {}

impl From<std::io::Error> for PlotError {
    fn from(e: std::io::Error) -> Self {
        PlotError::Io(e)
    }
}
