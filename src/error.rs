/// Result type alias using MapError
pub type Result<T> = std::result::Result<T, MapError>;

/// Error taxonomy for the choropleth engine
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Data source request failed; retryable on the next region selection
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Source payload could not be decoded into records
    #[error("malformed source payload: {0}")]
    Parse(String),

    /// Operation called with nothing to work on (e.g. a zero-size raster)
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Coordinate handed to the projector outside its representable domain
    #[error("projection domain error: {axis} = {value}")]
    Domain { axis: &'static str, value: f64 },

    /// Raster could not be encoded into the export format
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Filesystem error from the offline GeoJSON source
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapError {
    /// Whether a retry on the next user action can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MapError::Fetch(_) | MapError::Io(_))
    }
}
