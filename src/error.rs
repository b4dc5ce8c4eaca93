use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Execution { message: String },

    #[error("timeout: command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Rollback failed while the connection was still usable, so the
    /// transaction's effects may be visible to other sessions.
    #[error(
        "rollback failed, data may be partially modified in the database: {message} (while handling: {cause})"
    )]
    Rollback {
        message: String,
        cause: Box<TaskError>,
    },

    #[error("cancelled: operation was cancelled {stage}")]
    Cancelled { stage: &'static str },

    #[error("config: {message}")]
    Config { message: String },

    #[error("format: {message}")]
    Format { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TaskError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled { .. })
    }
}
