//! Direction-cosine frame of a voxel prescription.
//!
//! NIfTI headers describe world space as RAS+, scanner consoles report
//! prescriptions in the DICOM LPS+ gantry convention. The two sign
//! corrections below reconcile them. They were established against
//! single- and double-oblique acquisitions; whether they hold for every
//! possible orientation is not proven.

use nalgebra::{Matrix3, Vector3};

use crate::affine::Affine;
use crate::error::{GeometryError, Result};
use crate::volume::Spacing;

/// Signs applied to the linear part's columns (x, y, z) after dividing
/// out the voxel spacing.
pub const NIFTI_TO_DICOM_AXIS_SIGNS: [f64; 3] = [-1.0, -1.0, 1.0];

/// Sign applied to the third column of the stacked `[z; y; x]` frame.
pub const THIRD_COLUMN_SIGN: f64 = -1.0;

/// Allowed deviation from unit length and from orthogonality.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Rows are `[normal, phase, readout]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionCosines(Matrix3<f64>);

impl DirectionCosines {
    pub fn from_affine(affine: &Affine, spacing: &Spacing) -> Result<Self> {
        let linear = affine.linear();
        let axis = |i: usize| -> Vector3<f64> {
            linear.column(i) * NIFTI_TO_DICOM_AXIS_SIGNS[i] / spacing.0[i]
        };
        let (dircos_x, dircos_y, dircos_z) = (axis(0), axis(1), axis(2));

        let mut frame = Matrix3::from_rows(&[
            dircos_z.transpose(),
            dircos_y.transpose(),
            dircos_x.transpose(),
        ]);
        frame.column_mut(2).scale_mut(THIRD_COLUMN_SIGN);

        Self::from_matrix(frame)
    }

    /// Wrap an already assembled frame, checking it is orthonormal.
    pub fn from_matrix(frame: Matrix3<f64>) -> Result<Self> {
        for row in 0..3 {
            let deviation = (frame.row(row).norm() - 1.0).abs();
            if !deviation.is_finite() || deviation > ORTHONORMAL_TOLERANCE {
                return Err(GeometryError::NonOrthonormalFrame { row, deviation });
            }
        }
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let deviation = frame.row(a).dot(&frame.row(b)).abs();
            if deviation > ORTHONORMAL_TOLERANCE {
                return Err(GeometryError::NonOrthonormalFrame { row: b, deviation });
            }
        }
        Ok(Self(frame))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.0.row(0).transpose()
    }

    pub fn phase(&self) -> Vector3<f64> {
        self.0.row(1).transpose()
    }

    pub fn readout(&self) -> Vector3<f64> {
        self.0.row(2).transpose()
    }
}
