use thiserror::Error;

#[derive(Debug, Error)]
pub enum EepromError {
    #[error("Unknown settings command: {0}")]
    UnknownCommand(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Serial error: {0}")]
    Serial(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<serialport::Error> for EepromError {
    fn from(err: serialport::Error) -> Self {
        Self::Serial(err.to_string())
    }
}
