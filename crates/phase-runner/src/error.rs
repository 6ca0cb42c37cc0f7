use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("page check client error: {0}")]
    PageClient(String),
}
