use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied data is inconsistent (length mismatch, bad top-K,
    /// empty image size). Results must not be displayed when this is returned.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Unsupported layer type: {0}")]
    UnsupportedLayer(String),

    #[error("Unsupported activation: {0}")]
    UnsupportedActivation(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "keras")]
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[cfg(feature = "keras")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
