use std::fmt;

use thiserror::Error;

/// Which of the three radar layers a fetch was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Base,
    Overlay,
    Mask,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Base => write!(f, "base"),
            Layer::Overlay => write!(f, "overlay"),
            Layer::Mask => write!(f, "mask"),
        }
    }
}

/// Failure while building a radar composite.
///
/// `NotFound` means the overlay frame for the requested time has not been
/// published yet; callers can match on it to tell "no data" apart from a
/// broken upstream.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to get {layer} image from {url}: {source}")]
    Transient {
        layer: Layer,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} is not found")]
    NotFound { url: String },

    #[error("failed to decode {layer} image from {url}: {source}")]
    Decode {
        layer: Layer,
        url: String,
        #[source]
        source: image::ImageError,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// The layer the failure belongs to. A missing frame is always the overlay.
    pub fn layer(&self) -> Layer {
        match self {
            FetchError::Transient { layer, .. } | FetchError::Decode { layer, .. } => *layer,
            FetchError::NotFound { .. } => Layer::Overlay,
        }
    }
}
