use lasershot_session::{ConfigError, StoreError};
use lasershot_vision::TargetError;

/// Errors surfaced by the facade helpers and the CLI.
#[derive(thiserror::Error, Debug)]
pub enum LaserShotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("image {path} has zero size")]
    EmptyImage { path: String },

    #[error("{path} does not exist")]
    Missing { path: String },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
