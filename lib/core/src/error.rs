use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Seed item or user absent from an identity map. Query paths degrade to
    /// an empty result instead of returning this.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Model not found: {model_id} (stage={stage})")]
    ModelNotFound { model_id: String, stage: String },

    #[error("Unsupported artifact location scheme: {0}")]
    UnsupportedLocationScheme(String),

    #[error(
        "Factor orientation cannot be resolved: first={first_rows} rows, second={second_rows} rows, \
         users={num_users}, items={num_items}"
    )]
    OrientationUnresolvable {
        first_rows: usize,
        second_rows: usize,
        num_users: usize,
        num_items: usize,
    },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("Artifact already exists: {0}")]
    ArtifactExists(String),

    #[error("Format mismatch: expected {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    #[error("Empty training set: {0}")]
    EmptyTrainingSet(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptArtifact(msg.into())
    }

    /// Integrity violations abort the operation; everything else is either a
    /// lookup miss or an environment problem.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::OrientationUnresolvable { .. }
                | Error::ShapeMismatch { .. }
                | Error::CorruptArtifact(_)
        )
    }
}
