//! FSL FLIRT's scaled-voxel coordinate convention.
//!
//! FLIRT matrices map between *scaled voxel* coordinates (voxel index times
//! voxel size), not between the images' world spaces. FLIRT also assumes a
//! radiological (negative determinant) voxel layout; images stored the
//! other way round get their first axis mirrored.

use crate::affine::Affine;
use crate::volume::VolumeGeometry;

/// Mirror of the first axis for images with a positive determinant:
/// `x -> (nx - 1) - x`. Identity otherwise.
///
/// The offset is in voxel units but the mirror is applied after scaling,
/// so the two agree only for 1 mm voxels along x.
pub fn flip_matrix(geometry: &VolumeGeometry) -> Affine {
    if geometry.affine.determinant() > 0.0 {
        let last_index = geometry.dim[0] as f64 - 1.0;
        Affine::from_rows([
            [-1.0, 0.0, 0.0, last_index],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    } else {
        Affine::identity()
    }
}

/// Voxel index coordinates to FLIRT scaled-voxel coordinates.
pub fn voxel_to_scaled_voxel(geometry: &VolumeGeometry) -> Affine {
    flip_matrix(geometry) * Affine::scaling(geometry.spacing.0)
}

#[cfg(test)]
mod test_flirt_convention {
    use super::*;
    use crate::volume::Spacing;
    use float_eq::assert_float_eq;
    use nalgebra::Point3;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn geometry(diag: [f64; 3], dim: [usize; 3]) -> VolumeGeometry {
        let spacing = Spacing::new(diag[0].abs(), diag[1].abs(), diag[2].abs()).unwrap();
        VolumeGeometry::new(Affine::scaling(diag), spacing, dim)
    }

    #[rstest(/**/ nx, case(1), case(176), case(256))]
    fn positive_determinant_flips_first_axis(nx: usize) {
        let flip = flip_matrix(&geometry([1.0, 1.0, 1.0], [nx, 240, 256]));
        assert_eq!(flip.0[(0, 3)], (nx - 1) as f64);
        assert_eq!(flip.0[(0, 0)], -1.0);
    }

    #[test]
    fn negative_determinant_is_identity() {
        let flip = flip_matrix(&geometry([-1.0, 1.0, 1.0], [176, 240, 256]));
        assert_eq!(flip, Affine::identity());
    }

    #[test]
    fn scaled_voxel_coordinates() {
        let g = geometry([-0.9, 0.9, 1.2], [10, 10, 10]);
        let p = voxel_to_scaled_voxel(&g).transform_point(&Point3::new(2.0, 3.0, 4.0));
        assert_float_eq!([p.x, p.y, p.z], [1.8, 2.7, 4.8], abs <= [1e-12; 3]);

        let g = geometry([0.9, 0.9, 1.2], [10, 10, 10]);
        let p = voxel_to_scaled_voxel(&g).transform_point(&Point3::new(2.0, 3.0, 4.0));
        // mirrored after scaling: (nx - 1) - 0.9 * 2
        assert_float_eq!([p.x, p.y, p.z], [7.2, 2.7, 4.8], abs <= [1e-12; 3]);
    }
}
