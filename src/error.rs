//! Engine-wide error type
//!
//! Parallel passes never fail: per-voxel and per-pixel problems are absorbed
//! inside the pass and reported through counts. Everything below is for the
//! host-level operations around them (construction, config, dump/reload).

/// Result type for fallible map operations
pub type MapResult<T> = Result<T, MapError>;

/// Errors raised by host-level map operations
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Capacity mismatch for {field}: expected {expected}, found {found}")]
    CapacityMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupted map data: {0}")]
    CorruptedData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Thread pool creation failed: {0}")]
    ThreadPool(String),
}

impl From<bincode::Error> for MapError {
    fn from(err: bincode::Error) -> Self {
        MapError::Serialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for MapError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MapError::ThreadPool(err.to_string())
    }
}

impl MapError {
    /// Capacity and layout mismatches on reload are the only fatal class;
    /// the caller is expected to abort rather than continue with a partial map.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MapError::CapacityMismatch { .. } | MapError::VersionMismatch { .. }
        )
    }
}
