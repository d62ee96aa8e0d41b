//! Carry a voxel of interest from one session's image space into another's.
//!
//! World coordinates of the source image are taken back to voxel indices,
//! into FLIRT's scaled-voxel space, through the registration, out of the
//! destination's scaled-voxel space and finally into destination world
//! coordinates:
//!
//! `A_dst · F_dst⁻¹ · R · F_src · A_src⁻¹`

use nalgebra::Point3;
use rayon::prelude::*;

use crate::affine::Affine;
use crate::error::{GeometryError, Result};
use crate::flirt::voxel_to_scaled_voxel;
use crate::volume::VolumeGeometry;

/// Per-axis tolerance when comparing voxel sizes, in mm.
pub const SPACING_TOLERANCE_MM: f64 = 1e-6;

/// A rigid registration is only meaningful here between images that share
/// a voxel size; anything else is refused before composing.
pub fn check_matching_spacing(source: &VolumeGeometry, destination: &VolumeGeometry) -> Result<()> {
    if source.spacing.approx_eq(&destination.spacing, SPACING_TOLERANCE_MM) {
        Ok(())
    } else {
        Err(GeometryError::SpacingMismatch {
            moving: source.spacing.0,
            fixed: destination.spacing.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationChain {
    source_to_destination: Affine,
}

impl RegistrationChain {
    /// `registration` maps source scaled-voxel coordinates to destination
    /// scaled-voxel coordinates, as written by `flirt -omat`.
    pub fn new(
        source: &VolumeGeometry,
        destination: &VolumeGeometry,
        registration: &Affine,
    ) -> Result<Self> {
        check_matching_spacing(source, destination)?;

        registration.try_inverse("registration matrix")?;
        destination.affine.try_inverse("destination image affine")?;
        let world_to_source_voxel = source.affine.try_inverse("source image affine")?;
        let destination_from_scaled =
            voxel_to_scaled_voxel(destination).try_inverse("destination scaled-voxel frame")?;

        let source_to_destination = destination.affine
            * destination_from_scaled
            * *registration
            * voxel_to_scaled_voxel(source)
            * world_to_source_voxel;

        tracing::debug!(
            determinant = source_to_destination.determinant(),
            "source to destination world transform:\n{source_to_destination}"
        );

        Ok(Self { source_to_destination })
    }

    pub fn source_to_destination(&self) -> &Affine {
        &self.source_to_destination
    }

    /// Re-express a voxel-of-interest header affine in the destination frame.
    pub fn apply_to_affine(&self, roi_affine: &Affine) -> Affine {
        self.source_to_destination * *roi_affine
    }

    pub fn apply_to_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.source_to_destination.transform_point(point)
    }

    /// Destination world back to source world.
    pub fn inverse(&self) -> Result<Affine> {
        self.source_to_destination.try_inverse("combined transform")
    }

    pub fn realign_all(&self, roi_affines: &[Affine]) -> Vec<Affine> {
        roi_affines
            .par_iter()
            .map(|roi| self.apply_to_affine(roi))
            .collect()
    }
}

#[cfg(test)]
mod test_registration_chain {
    use super::*;
    use crate::volume::Spacing;
    use float_eq::assert_float_eq;
    use nalgebra::{Matrix3, Rotation3, Vector3};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn radiological_t1() -> VolumeGeometry {
        let affine = Affine::from_rows([
            [-1.0, 0.0, 0.0, 90.0],
            [0.0, 1.0, 0.0, -126.0],
            [0.0, 0.0, 1.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        VolumeGeometry::new(affine, Spacing::isotropic(1.0).unwrap(), [182, 218, 182])
    }

    fn rigid(axis: Vector3<f64>, degrees: f64, shift: [f64; 3]) -> Affine {
        let rotation = Rotation3::new(axis.normalize() * degrees.to_radians());
        Affine::from_linear_translation(rotation.matrix(), &Vector3::from(shift))
    }

    #[test]
    fn mismatched_spacing_is_refused_first() {
        let source = radiological_t1();
        let mut destination = radiological_t1();
        destination.spacing = Spacing::new(1.0, 1.0, 1.5).unwrap();
        let singular = Affine::scaling([0.0, 0.0, 0.0]);
        assert_eq!(
            RegistrationChain::new(&source, &destination, &singular),
            Err(GeometryError::SpacingMismatch {
                moving: [1.0, 1.0, 1.0],
                fixed: [1.0, 1.0, 1.5],
            })
        );
    }

    #[test]
    fn identity_registration_of_same_image() {
        let t1 = radiological_t1();
        let chain = RegistrationChain::new(&t1, &t1, &Affine::identity()).unwrap();
        assert!(chain.source_to_destination().approx_eq(&Affine::identity(), 1e-12));
    }

    #[test]
    fn identity_registration_with_positive_determinant() {
        let mut t1 = radiological_t1();
        t1.affine.0[(0, 0)] = 1.0;
        let chain = RegistrationChain::new(&t1, &t1, &Affine::identity()).unwrap();
        assert!(chain.source_to_destination().approx_eq(&Affine::identity(), 1e-12));
    }

    #[test]
    fn scaled_voxel_shift_moves_world_position() {
        let t1 = radiological_t1();
        let shift = rigid(Vector3::z(), 0.0, [2.0, 0.0, 0.0]);
        let chain = RegistrationChain::new(&t1, &t1, &shift).unwrap();
        let roi = Affine::from_linear_translation(
            &Matrix3::from_diagonal_element(20.0),
            &Vector3::new(10.0, 20.0, 30.0),
        );
        let moved = chain.apply_to_affine(&roi).translation();
        // +2 along index x is -2 mm in world x for a radiological layout
        assert_float_eq!([moved.x, moved.y, moved.z], [8.0, 20.0, 30.0], abs <= [1e-9; 3]);
    }

    #[test]
    fn singular_source_affine() {
        let mut t1 = radiological_t1();
        let destination = radiological_t1();
        t1.affine.0[(2, 2)] = 0.0;
        assert_eq!(
            RegistrationChain::new(&t1, &destination, &Affine::identity()),
            Err(GeometryError::SingularMatrix("source image affine"))
        );
    }

    #[test]
    fn batch_matches_sequential() {
        let t1 = radiological_t1();
        let registration = rigid(Vector3::new(1.0, 2.0, 3.0), 7.0, [1.0, -2.0, 3.0]);
        let chain = RegistrationChain::new(&t1, &t1, &registration).unwrap();
        let rois: Vec<Affine> = (0..16)
            .map(|i| {
                let t = Vector3::new(i as f64, 0.0, -(i as f64));
                Affine::from_linear_translation(&Matrix3::identity(), &t)
            })
            .collect();
        let batch = chain.realign_all(&rois);
        for (roi, realigned) in rois.iter().zip(&batch) {
            assert_eq!(*realigned, chain.apply_to_affine(roi));
        }
    }

    proptest! {
        #[test]
        fn there_and_back_again(
            ax in -1.0..1.0f64, ay in -1.0..1.0f64, az in 0.1..1.0f64,
            degrees in -20.0..20.0f64,
            tx in -10.0..10.0f64, ty in -10.0..10.0f64, tz in -10.0..10.0f64,
            px in -80.0..80.0f64, py in -80.0..80.0f64, pz in -80.0..80.0f64,
            positive_source in any::<bool>(),
        ) {
            let mut source = radiological_t1();
            if positive_source {
                source.affine.0[(0, 0)] = 1.0;
            }
            let mut destination = radiological_t1();
            destination.affine =
                rigid(Vector3::new(0.0, 0.0, 1.0), 5.0, [3.0, -4.0, 2.0]) * destination.affine;

            let registration = rigid(Vector3::new(ax, ay, az), degrees, [tx, ty, tz]);
            let forward = RegistrationChain::new(&source, &destination, &registration).unwrap();
            let undo = registration.try_inverse("registration").unwrap();
            let backward = RegistrationChain::new(&destination, &source, &undo).unwrap();

            let p = Point3::new(px, py, pz);
            let round_trip = backward.apply_to_point(&forward.apply_to_point(&p));
            prop_assert!((round_trip - p).norm() < 1e-6);

            let inverse = forward.inverse().unwrap();
            prop_assert!(inverse.approx_eq(backward.source_to_destination(), 1e-6));
        }
    }
}
