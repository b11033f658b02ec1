use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("video source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl CaptureError {
    pub fn unavailable(source_id: impl ToString, reason: impl ToString) -> Self {
        CaptureError::Unavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}
