//! Scanner-style slice orientation labels from a slice normal.
//!
//! Given the normal of the imaging plane, find the principal plane it is
//! closest to and the angulations away from it, the way scanner consoles
//! report them: `Transverse`, `T > C-12.0` or `T > C-12.0 > S3.5`.

use std::fmt;

use nalgebra::Vector3;

use crate::enums::{Obliquity, PlaneAxis};
use crate::error::{GeometryError, Result};

/// Angles (degrees) closer than this to 0 or ±180 count as no angulation.
pub const ANGLE_TOLERANCE_DEG: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct SliceOrientation {
    /// e.g. `"T > C-12.0 > S3.5"`
    pub angle_label: String,
    /// e.g. `"Transverse-Coronal-Sagittal"`
    pub orientation_label: String,
    pub principal: PlaneAxis,
    pub secondary: PlaneAxis,
    pub ternary: PlaneAxis,
    /// Angulation from the principal towards the secondary axis, degrees
    pub angle_1: f64,
    /// Angulation out of the principal/secondary plane, degrees
    pub angle_2: f64,
    pub obliquity: Obliquity,
}

impl fmt::Display for SliceOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.angle_label)
    }
}

/// Order axis indices as `[ternary, secondary, principal]`.
///
/// Stable ascending sort on |component|: of two equal magnitudes the later
/// axis ranks higher. Exactly diagonal normals are genuinely ambiguous and
/// this is only a deterministic choice.
pub fn rank_axes(normal: &Vector3<f64>) -> [usize; 3] {
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| normal[a].abs().total_cmp(&normal[b].abs()));
    order
}

fn is_flat(angle: f64) -> bool {
    angle.abs() < ANGLE_TOLERANCE_DEG || (angle.abs() - 180.0).abs() < ANGLE_TOLERANCE_DEG
}

pub fn decode_normal(normal: &Vector3<f64>) -> Result<SliceOrientation> {
    if !normal.iter().all(|v| v.is_finite()) || normal.norm() == 0.0 {
        return Err(GeometryError::DegenerateNormal([normal.x, normal.y, normal.z]));
    }

    let [ternary, secondary, principal] = rank_axes(normal);

    let angle_1 = normal[secondary].atan2(normal[principal]).to_degrees();
    let in_plane = normal[principal].hypot(normal[secondary]);
    let angle_2 = normal[ternary].atan2(in_plane).to_degrees();

    let (p, s, t) = (
        PlaneAxis::ALL[principal],
        PlaneAxis::ALL[secondary],
        PlaneAxis::ALL[ternary],
    );

    // Consoles report the angulation with the opposite sign to atan2.
    let (angle_label, orientation_label, obliquity) = match (is_flat(angle_1), is_flat(angle_2)) {
        (true, true) => (p.name().to_string(), p.name().to_string(), Obliquity::NonOblique),
        (false, true) => (
            format!("{} > {}{:.1}", p.letter(), s.letter(), -angle_1),
            format!("{}-{}", p.name(), s.name()),
            Obliquity::SingleOblique,
        ),
        (_, false) => (
            format!(
                "{} > {}{:.1} > {}{:.1}",
                p.letter(),
                s.letter(),
                -angle_1,
                t.letter(),
                -angle_2
            ),
            format!("{}-{}-{}", p.name(), s.name(), t.name()),
            Obliquity::DoubleOblique,
        ),
    };

    tracing::trace!(?normal, angle_1, angle_2, %angle_label, "decoded slice normal");

    Ok(SliceOrientation {
        angle_label,
        orientation_label,
        principal: p,
        secondary: s,
        ternary: t,
        angle_1,
        angle_2,
        obliquity,
    })
}
