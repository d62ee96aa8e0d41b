use std::fmt;

use nalgebra::Vector3;

use crate::affine::Affine;
use crate::direction::DirectionCosines;
use crate::error::Result;
use crate::inplane::inplane_rotation_for;
use crate::orientation::{SliceOrientation, decode_normal};
use crate::volume::{Spacing, VolumeGeometry};

/// Letters for negative / positive values along each world axis.
const POSITION_LETTERS: [(char, char); 3] = [('L', 'R'), ('P', 'A'), ('F', 'H')];

/// Position, orientation and size of a voxel as it would be entered on
/// the scanner console.
#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    pub orientation: SliceOrientation,
    pub inplane_rotation_deg: f64,
    pub dimensions_mm: [u32; 3],
    pub position_mm: [f64; 3],
}

impl Prescription {
    pub fn from_affine(affine: &Affine, spacing: &Spacing) -> Result<Self> {
        let frame = DirectionCosines::from_affine(affine, spacing)?;
        let orientation = decode_normal(&frame.normal())?;
        let inplane_rotation_deg = inplane_rotation_for(frame.matrix(), orientation.principal)?;

        let dimensions_mm = spacing.0.map(|s| s.round_ties_even() as u32);
        let t: Vector3<f64> = affine.translation();

        Ok(Self {
            orientation,
            inplane_rotation_deg,
            dimensions_mm,
            position_mm: [t.x, t.y, t.z],
        })
    }

    pub fn from_geometry(geometry: &VolumeGeometry) -> Result<Self> {
        Self::from_affine(&geometry.affine, &geometry.spacing)
    }

    /// Console position string, to the nearest 0.1 mm.
    pub fn position_label(&self) -> String {
        position_letters(self.position_mm.map(|v| round_to(v, 1)))
    }
}

impl fmt::Display for Prescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.dimensions_mm;
        writeln!(f, "Position: {}", self.position_label())?;
        writeln!(f, "Orientation: {}", self.orientation)?;
        writeln!(f, "Rotation: {:.2} deg", self.inplane_rotation_deg)?;
        write!(f, "Dimensions: {x} mm x {y} mm x {z} mm")
    }
}

/// `[-12.34, 4.0, -8.5]` becomes `"L12.34 A4.0 F8.5"`.
///
/// Magnitudes are printed as given; round them first if needed.
pub fn position_letters(position: [f64; 3]) -> String {
    position
        .iter()
        .zip(POSITION_LETTERS)
        .map(|(&t, (negative, positive))| {
            let letter = if t < 0.0 { negative } else { positive };
            format!("{letter}{}", format_magnitude(t.abs()))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// Whole numbers keep a trailing ".0"; everything else uses the shortest
// representation that reads back to the same value.
fn format_magnitude(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Round to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}
