use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown stream library '{0}': expected one of xstream, most, rxjs, rx")]
    UnknownStreamLib(String),

    #[error("no combinations selected: check flavors, stream_libs and filters")]
    EmptyMatrix,

    #[error(transparent)]
    Runner(#[from] phase_runner::RunnerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
