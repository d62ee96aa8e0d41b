use thiserror::Error;

/// Failures of the pure geometry core.
///
/// All of these are deterministic: the same input always fails the same
/// way, so callers should report them rather than retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Unknown plane letter {0:?} (expected 'T', 'C' or 'S')")]
    InvalidPlane(char),

    #[error("Normal vector is zero-length or not finite: {0:?}")]
    DegenerateNormal([f64; 3]),

    #[error("Direction cosines are not orthonormal (row {row}, deviation {deviation:.3e})")]
    NonOrthonormalFrame { row: usize, deviation: f64 },

    #[error("Singular matrix: {0}")]
    SingularMatrix(&'static str),

    #[error("Voxel spacing mismatch: {moving:?} mm vs {fixed:?} mm")]
    SpacingMismatch { moving: [f64; 3], fixed: [f64; 3] },

    #[error("Invalid voxel spacing {0:?}: all components must be positive and finite")]
    InvalidSpacing([f64; 3]),

    #[error("Mask shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch([usize; 3], [usize; 3]),

    #[error("Both masks are empty")]
    EmptyMasks,
}

#[derive(Debug, Error)]
pub enum MatrixParseError {
    #[error("Expected 4 matrix rows, found {0}")]
    RowCount(usize),

    #[error("Row {row}: expected 4 values, found {found}")]
    ColumnCount { row: usize, found: usize },

    #[error("Row {row}: cannot parse {token:?} as a number")]
    Number { row: usize, token: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GeometryError>;
