use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnemoError {
    #[error("Front-end error: {0}")]
    FrontEnd(String),

    #[error("Recorder error on {path}: {source}")]
    Recorder {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnemoError>;
