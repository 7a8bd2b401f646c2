use thiserror::Error;

pub type Result<T> = std::result::Result<T, CastError>;

#[derive(Error, Debug)]
pub enum CastError {
    #[error("Display error: {0}")]
    Display(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Show error: {0}")]
    Show(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Unknown(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Unknown(s.to_string())
    }
}
