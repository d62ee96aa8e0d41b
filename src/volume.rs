use crate::affine::Affine;
use crate::error::{GeometryError, Result};

use nalgebra::{Matrix3, Point3, Vector3};

/// Voxel size in mm along each index axis, as stored in the image header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing(pub [f64; 3]);

impl Spacing {
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        let values = [x, y, z];
        if values.iter().all(|v| v.is_finite() && *v > 0.0) {
            Ok(Self(values))
        } else {
            Err(GeometryError::InvalidSpacing(values))
        }
    }

    pub fn isotropic(size: f64) -> Result<Self> {
        Self::new(size, size, size)
    }

    pub fn x(&self) -> f64 {
        self.0[0]
    }

    pub fn y(&self) -> f64 {
        self.0[1]
    }

    pub fn z(&self) -> f64 {
        self.0[2]
    }

    pub fn approx_eq(&self, other: &Spacing, tolerance: f64) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// The geometric part of a volumetric image header: everything but the
/// voxel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    pub affine: Affine,
    pub spacing: Spacing,
    pub dim: [usize; 3],
}

impl VolumeGeometry {
    pub fn new(affine: Affine, spacing: Spacing, dim: [usize; 3]) -> Self {
        Self { affine, spacing, dim }
    }

    /// A single-voxel volume, the shape a spectroscopy voxel takes once it
    /// is converted to an image.
    pub fn placeholder(affine: Affine, spacing: Spacing) -> Self {
        Self::new(affine, spacing, [1, 1, 1])
    }

    /// Get the grid size (x, y, z)
    pub fn dim(&self) -> [usize; 3] {
        self.dim
    }

    pub fn voxel_count(&self) -> usize {
        self.dim.iter().product()
    }

    /// Same field of view, re-gridded at an isotropic resolution.
    ///
    /// The outer corner of voxel 0 stays where it was, so the new grid covers
    /// `floor(dim * spacing / resolution)` voxels per axis.
    pub fn isotropic(&self, resolution_mm: f64) -> Result<Self> {
        let spacing = Spacing::isotropic(resolution_mm)?;
        let ratio = [
            resolution_mm / self.spacing.x(),
            resolution_mm / self.spacing.y(),
            resolution_mm / self.spacing.z(),
        ];
        let mut dim = [0usize; 3];
        for (axis, d) in dim.iter_mut().enumerate() {
            *d = ((self.dim[axis] as f64) / ratio[axis]).floor().max(1.0) as usize;
        }

        // new index i sits at old continuous index (i + 0.5) * ratio - 0.5
        let mut index_map = Affine::scaling(ratio);
        for (axis, r) in ratio.iter().enumerate() {
            index_map.0[(axis, 3)] = 0.5 * r - 0.5;
        }

        Ok(Self::new(self.affine * index_map, spacing, dim))
    }

    /// Sub-grid of `dim` voxels whose voxel 0 is voxel `start` of this one.
    pub fn crop(&self, start: [usize; 3], dim: [usize; 3]) -> Self {
        let shift = Affine::from_linear_translation(
            &Matrix3::identity(),
            &Vector3::from(start.map(|s| s as f64)),
        );
        Self::new(self.affine * shift, self.spacing, dim)
    }

    pub fn voxel_to_world(&self, index: &Point3<f64>) -> Point3<f64> {
        self.affine.transform_point(index)
    }

    pub fn world_to_voxel(&self, point: &Point3<f64>) -> Result<Point3<f64>> {
        Ok(self.affine.try_inverse("image affine")?.transform_point(point))
    }
}

#[cfg(test)]
mod test_volume_geometry {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    #[rstest(/**/ x, y, z,
             case(0.0, 1.0, 1.0),
             case(1.0, -1.0, 1.0),
             case(1.0, 1.0, f64::NAN),
             case(1.0, f64::INFINITY, 1.0),
    )]
    fn rejects_bad_spacing(x: f64, y: f64, z: f64) {
        assert!(matches!(Spacing::new(x, y, z), Err(GeometryError::InvalidSpacing(_))));
    }

    #[test]
    fn isotropic_regrid_keeps_outer_corner() {
        let affine = Affine::from_rows([
            [-1.0, 0.0, 0.0, 90.0],
            [0.0, 1.0, 0.0, -126.0],
            [0.0, 0.0, 2.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let geometry =
            VolumeGeometry::new(affine, Spacing::new(1.0, 1.0, 2.0).unwrap(), [10, 12, 5]);
        let fine = geometry.isotropic(0.5).unwrap();
        assert_eq!(fine.dim(), [20, 24, 20]);

        let corner = Point3::new(-0.5, -0.5, -0.5);
        let a = geometry.voxel_to_world(&corner);
        let b = fine.voxel_to_world(&corner);
        assert_float_eq!([a.x, a.y, a.z], [b.x, b.y, b.z], abs <= [1e-9; 3]);

        let far = fine.voxel_to_world(&Point3::new(19.5, 23.5, 19.5));
        let expected = geometry.voxel_to_world(&Point3::new(9.5, 11.5, 4.5));
        assert_float_eq!(
            [far.x, far.y, far.z],
            [expected.x, expected.y, expected.z],
            abs <= [1e-9; 3]
        );
    }

    #[test]
    fn crop_keeps_world_positions() {
        let affine = Affine::from_rows([
            [-0.5, 0.0, 0.0, 40.0],
            [0.0, 0.5, 0.0, -20.0],
            [0.0, 0.0, 0.5, 10.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let geometry = VolumeGeometry::new(affine, Spacing::isotropic(0.5).unwrap(), [80, 80, 80]);
        let cropped = geometry.crop([10, 20, 30], [4, 5, 6]);
        assert_eq!(cropped.dim(), [4, 5, 6]);
        assert_eq!(cropped.spacing, geometry.spacing);

        let a = cropped.voxel_to_world(&Point3::new(1.0, 2.0, 3.0));
        let b = geometry.voxel_to_world(&Point3::new(11.0, 22.0, 33.0));
        assert_float_eq!([a.x, a.y, a.z], [b.x, b.y, b.z], abs <= [1e-12; 3]);
    }

    #[test]
    fn world_voxel_round_trip() {
        let spacing = Spacing::isotropic(2.0).unwrap();
        let geometry = VolumeGeometry::new(Affine::scaling([2.0, 2.0, 2.0]), spacing, [4, 4, 4]);
        let p = Point3::new(1.0, 2.0, 3.0);
        let back = geometry.voxel_to_world(&geometry.world_to_voxel(&p).unwrap());
        assert_float_eq!([back.x, back.y, back.z], [1.0, 2.0, 3.0], abs <= [1e-12; 3]);
    }
}
