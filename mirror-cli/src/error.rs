use mirror_engine::MirrorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Mirror(e) => e.exit_code(),
            AppError::InvalidInput(_) => 2,
            AppError::Logging(_) => 1,
        }
    }
}
