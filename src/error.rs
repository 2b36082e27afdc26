use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store operation failed: {message}")]
    Store { message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[cfg(feature = "neo4j")]
    #[error("Graph query failed: {0}")]
    Graph(#[from] neo4rs::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
