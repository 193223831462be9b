use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("stream unreachable or invalid: {0}")]
    StreamUnreachable(String),
    #[error("no write permission for {0}")]
    WritePermission(String),
    #[error("unexpected capture error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("no captures found for the requested range")]
    NoCaptures,
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("job {0} not found")]
    JobNotFound(i64),
    #[error("capture ids do not all belong to job {0}")]
    CaptureMismatch(i64),
}

/// Maps request handling failures onto the three status codes the HTTP
/// surface actually needs (SPEC_FULL.md §7); every handler returns one of
/// these explicitly rather than relying on a blanket 500 conversion.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<MaintenanceError> for ApiError {
    fn from(e: MaintenanceError) -> Self {
        let message = e.to_string();
        match e {
            MaintenanceError::JobNotFound(id) => ApiError::NotFound(format!("job {id} not found")),
            MaintenanceError::CaptureMismatch(_) => ApiError::Validation(message),
        }
    }
}
