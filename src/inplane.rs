//! In-plane rotation of a prescription about its slice normal.
//!
//! A reference phase vector is laid in the anatomical plane that the
//! console uses for the principal orientation; the rotation is the signed
//! angle from that reference to the frame's actual phase direction.

use nalgebra::{Matrix3, Vector3};

use crate::enums::PlaneAxis;
use crate::error::{GeometryError, Result};

/// Reference phase direction for a principal plane.
///
/// Transverse slices take it in the sagittal plane, coronal and sagittal
/// slices in the transverse plane.
fn reference_phase(normal: &Vector3<f64>, plane: PlaneAxis) -> Result<Vector3<f64>> {
    let n = normal;
    let (raw, length) = match plane {
        PlaneAxis::Transverse => (Vector3::new(0.0, n.z, -n.y), n.y.hypot(n.z)),
        PlaneAxis::Coronal => (Vector3::new(n.y, -n.x, 0.0), n.x.hypot(n.y)),
        PlaneAxis::Sagittal => (Vector3::new(-n.y, n.x, 0.0), n.x.hypot(n.y)),
    };
    if length == 0.0 || !length.is_finite() {
        return Err(GeometryError::DegenerateNormal([n.x, n.y, n.z]));
    }
    Ok(raw / length)
}

/// Signed in-plane rotation in degrees.
///
/// `frame` rows are `[normal, phase, readout]`; `plane_letter` is the
/// first character of the principal orientation label (`T`, `C` or `S`).
pub fn inplane_rotation(frame: &Matrix3<f64>, plane_letter: char) -> Result<f64> {
    inplane_rotation_for(frame, PlaneAxis::from_letter(plane_letter)?)
}

pub fn inplane_rotation_for(frame: &Matrix3<f64>, plane: PlaneAxis) -> Result<f64> {
    let normal: Vector3<f64> = frame.row(0).transpose();
    let phase_rot: Vector3<f64> = frame.row(1).transpose();
    let phase = reference_phase(&normal, plane)?;

    let angle = phase.dot(&phase_rot).clamp(-1.0, 1.0).acos().to_degrees();
    if phase.cross(&phase_rot).dot(&normal) <= 0.0 {
        Ok(angle)
    } else {
        Ok(-angle)
    }
}

#[cfg(test)]
mod test_inplane_rotation {
    use super::*;
    use float_eq::assert_float_eq;
    use nalgebra::{Rotation3, Unit};
    use rstest::rstest;

    /// Axial frame with the phase direction rotated by `degrees` about the normal.
    fn rotated_axial_frame(degrees: f64) -> Matrix3<f64> {
        let (s, c) = degrees.to_radians().sin_cos();
        let normal = Vector3::new(0.0, 0.0, -1.0);
        let phase = Vector3::new(s, -c, 0.0);
        let readout = normal.cross(&phase);
        Matrix3::from_rows(&[normal.transpose(), phase.transpose(), readout.transpose()])
    }

    #[rstest(/**/ degrees,
             case(0.0),
             case(15.0),
             case(-30.0),
             case(90.0),
             case(-120.0),
    )]
    fn recovers_rotation_magnitude_and_sign(degrees: f64) {
        let frame = rotated_axial_frame(degrees);
        let rotation = inplane_rotation(&frame, 'T').unwrap();
        assert_float_eq!(rotation, degrees, abs <= 1e-6);
    }

    /// Phase equal to `reference` turned right-handedly by `degrees` about
    /// `normal`, which reads as a rotation of `-degrees`.
    #[rstest(/**/ plane, normal, reference, degrees,
             case('C', [0.0, 1.0, 0.0], [1.0, 0.0, 0.0],   15.0),
             case('C', [0.0, 1.0, 0.0], [1.0, 0.0, 0.0],  -15.0),
             case('C', [0.0, 1.0, 0.0], [1.0, 0.0, 0.0],  120.0),
             case('C', [0.0, 1.0, 0.0], [1.0, 0.0, 0.0], -120.0),
             case('C', [0.0, -1.0, 0.0], [-1.0, 0.0, 0.0], 15.0),
             case('S', [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],   15.0),
             case('S', [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],  -15.0),
             case('S', [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],  120.0),
             case('S', [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], -120.0),
    )]
    fn coronal_and_sagittal_rotation_sign(
        plane: char,
        normal: [f64; 3],
        reference: [f64; 3],
        degrees: f64,
    ) {
        let normal = Vector3::from(normal);
        let spin = Rotation3::from_axis_angle(&Unit::new_normalize(normal), degrees.to_radians());
        let phase = spin * Vector3::from(reference);
        let readout = normal.cross(&phase);
        let frame =
            Matrix3::from_rows(&[normal.transpose(), phase.transpose(), readout.transpose()]);
        assert_float_eq!(inplane_rotation(&frame, plane).unwrap(), -degrees, abs <= 1e-6);
    }

    #[test]
    fn rejects_unknown_plane_letter() {
        let frame = rotated_axial_frame(0.0);
        assert_eq!(inplane_rotation(&frame, 'X'), Err(GeometryError::InvalidPlane('X')));
        assert_eq!(inplane_rotation(&frame, 't'), Err(GeometryError::InvalidPlane('t')));
    }

    #[test]
    fn coronal_and_sagittal_references_lie_in_transverse_plane() {
        let n = Vector3::new(0.2, 0.9, 0.1).normalize();
        for plane in [PlaneAxis::Coronal, PlaneAxis::Sagittal] {
            let p = reference_phase(&n, plane).unwrap();
            assert_float_eq!(p.z, 0.0, abs <= 1e-15);
            assert_float_eq!(p.norm(), 1.0, abs <= 1e-12);
            assert_float_eq!(p.dot(&n), 0.0, abs <= 1e-12);
        }
    }

    #[test]
    fn mismatched_plane_with_degenerate_projection_fails() {
        let frame = rotated_axial_frame(0.0);
        // axial normal has no x/y component to project for a coronal reference
        assert!(matches!(
            inplane_rotation(&frame, 'C'),
            Err(GeometryError::DegenerateNormal(_))
        ));
    }
}
