//! 4x4 homogeneous affine transforms and the plain-text matrix format
//! registration tools write them in.

use std::{fmt, fs, ops::Mul, path::Path};

use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use crate::error::{GeometryError, MatrixParseError, Result};

/// Determinants smaller than this are treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub Matrix4<f64>);

impl Affine {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self(Matrix4::from_row_slice(&flat))
    }

    pub fn from_linear_translation(linear: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self(m)
    }

    /// Diagonal scaling with 1 in the homogeneous slot.
    pub fn scaling(diag: [f64; 3]) -> Self {
        Self(Matrix4::new_nonuniform_scaling(&Vector3::from(diag)))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Rotation/scale/shear part.
    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Determinant of the linear part. Its sign tells whether the index
    /// axes form a right- or left-handed triad in world space.
    pub fn determinant(&self) -> f64 {
        self.linear().determinant()
    }

    /// Invert, naming the matrix in the error so a failed composition says
    /// which input was degenerate.
    pub fn try_inverse(&self, label: &'static str) -> Result<Self> {
        let finite = self.0.iter().all(|v| v.is_finite());
        if !finite || self.0.determinant().abs() < SINGULAR_DETERMINANT {
            return Err(GeometryError::SingularMatrix(label));
        }
        self.0
            .try_inverse()
            .map(Self)
            .ok_or(GeometryError::SingularMatrix(label))
    }

    pub fn compose(&self, rhs: &Affine) -> Self {
        Self(self.0 * rhs.0)
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let h = self.0 * Vector4::new(point.x, point.y, point.z, 1.0);
        Point3::new(h.x, h.y, h.z)
    }

    /// Largest absolute element-wise difference is at most `tolerance`.
    pub fn approx_eq(&self, other: &Affine, tolerance: f64) -> bool {
        (self.0 - other.0).amax() <= tolerance
    }

    pub fn rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.0[(r, c)];
            }
        }
        rows
    }

    /// Four lines of four whitespace-separated values.
    pub fn to_matrix_text(&self) -> String {
        self.rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{v:.6}"))
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .map(|line| line + "\n")
            .collect()
    }

    pub fn save_matrix(&self, path: impl AsRef<Path>) -> std::result::Result<(), MatrixParseError> {
        fs::write(path, self.to_matrix_text())?;
        Ok(())
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Affine {
        self.compose(&rhs)
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_matrix_text())
    }
}

/// Parse a 4x4 matrix written as plain text (e.g. a FLIRT `.mat` file).
/// Blank lines and `#` comments are skipped.
pub fn parse_matrix(text: &str) -> std::result::Result<Affine, MatrixParseError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() != 4 {
        return Err(MatrixParseError::RowCount(lines.len()));
    }

    let mut rows = [[0.0; 4]; 4];
    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 {
            return Err(MatrixParseError::ColumnCount { row, found: tokens.len() });
        }
        for (col, token) in tokens.iter().enumerate() {
            rows[row][col] = token.parse().map_err(|_| MatrixParseError::Number {
                row,
                token: token.to_string(),
            })?;
        }
    }
    Ok(Affine::from_rows(rows))
}

pub fn load_matrix(path: impl AsRef<Path>) -> std::result::Result<Affine, MatrixParseError> {
    parse_matrix(&fs::read_to_string(path)?)
}
