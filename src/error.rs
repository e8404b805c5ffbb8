//! Error types for packet ordering and length-marker handling.

use core::fmt;

/// The main error type for packet ordering operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Errors related to tile and precinct geometry.
    Geometry(GeometryError),
    /// Errors related to resource limits.
    Resource(ResourceError),
    /// Errors related to PLT/PLM/TLM marker segments.
    Marker(MarkerError),
}

/// Errors related to tile and precinct geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// A precinct coordinate fell outside its resolution grid.
    PrecinctIndexUnderflow,
}

/// Errors related to resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// The packet inclusion bitmap would exceed addressable memory.
    InclusionBitmapTooLarge,
    /// The marker byte cache cannot hold another segment.
    MarkerCacheExhausted,
}

/// Errors related to PLT/PLM/TLM marker segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerError {
    /// A marker segment body was shorter than its length field claims.
    Truncated(&'static str),
    /// Failed to read or parse a marker segment.
    ParseFailure(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry(e) => write!(f, "{e}"),
            Self::Resource(e) => write!(f, "{e}"),
            Self::Marker(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrecinctIndexUnderflow => {
                write!(f, "precinct coordinate outside its resolution grid")
            }
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InclusionBitmapTooLarge => write!(f, "packet inclusion bitmap is too large"),
            Self::MarkerCacheExhausted => write!(f, "marker byte cache is exhausted"),
        }
    }
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated(marker) => write!(f, "truncated {marker} marker segment"),
            Self::ParseFailure(marker) => write!(f, "failed to parse {marker} marker segment"),
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for GeometryError {}
impl std::error::Error for ResourceError {}
impl std::error::Error for MarkerError {}

impl From<GeometryError> for Error {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

impl From<MarkerError> for Error {
    fn from(e: MarkerError) -> Self {
        Self::Marker(e)
    }
}

/// Result type for packet ordering operations.
pub type Result<T> = core::result::Result<T, Error>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
