//! Error Handling Module
//!
//! Defines the central error type for the classifier service.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The weight container could not be opened (missing path or invalid file)
    #[error("Failed to open weight container '{0}': {1}")]
    ContainerOpen(PathBuf, String),

    /// Error reading groups, attributes, or datasets inside the container
    #[error("Weight container error: {0}")]
    Container(String),

    /// Error decoding an uploaded image
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Error during a forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hdf5::Error> for ClassifierError {
    fn from(err: hdf5::Error) -> Self {
        ClassifierError::Container(err.to_string())
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::ImageDecode(err.to_string())
    }
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;
