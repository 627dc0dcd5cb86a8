use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeocubeError>;

#[derive(Debug, Error)]
pub enum GeocubeError {
    /// The grid could not be resolved from the supplied configuration.
    #[error("Invalid grid configuration: {0}")]
    Configuration(String),

    /// The vector data is empty, lacks geometry or is otherwise malformed.
    #[error("Invalid vector data: {0}")]
    VectorData(String),

    #[error("CRS error: {0}")]
    Crs(String),

    #[error("Invalid GeoJSON geometry: {0}")]
    GeoJson(String),

    #[error("Failed to convert attribute '{measurement}': {reason}")]
    Conversion { measurement: String, reason: String },

    #[error("Interpolation failed: {0}")]
    Interpolation(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeocubeError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn vector_data(msg: impl Into<String>) -> Self {
        Self::VectorData(msg.into())
    }

    pub fn crs(msg: impl Into<String>) -> Self {
        Self::Crs(msg.into())
    }

    pub fn interpolation(msg: impl Into<String>) -> Self {
        Self::Interpolation(msg.into())
    }
}
