use crate::error::{GeometryError, Result};

/// Anatomical planes, indexed by the physical axis they are normal to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneAxis {
    Sagittal,
    Coronal,
    Transverse,
}

impl PlaneAxis {
    /// Axis order used throughout: 0 = Sagittal, 1 = Coronal, 2 = Transverse.
    pub const ALL: [PlaneAxis; 3] =
        [PlaneAxis::Sagittal, PlaneAxis::Coronal, PlaneAxis::Transverse];

    /// `None` for anything past the three physical axes.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            PlaneAxis::Sagittal => 0,
            PlaneAxis::Coronal => 1,
            PlaneAxis::Transverse => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlaneAxis::Sagittal => "Sagittal",
            PlaneAxis::Coronal => "Coronal",
            PlaneAxis::Transverse => "Transverse",
        }
    }

    pub fn letter(self) -> char {
        match self {
            PlaneAxis::Sagittal => 'S',
            PlaneAxis::Coronal => 'C',
            PlaneAxis::Transverse => 'T',
        }
    }

    /// Parse the leading letter of an orientation label.
    pub fn from_letter(letter: char) -> Result<Self> {
        match letter {
            'S' => Ok(PlaneAxis::Sagittal),
            'C' => Ok(PlaneAxis::Coronal),
            'T' => Ok(PlaneAxis::Transverse),
            other => Err(GeometryError::InvalidPlane(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obliquity {
    NonOblique,
    SingleOblique,
    DoubleOblique,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Distance of ImagePositionPatient along the slice normal
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod test_plane_axis {
    use super::*;

    #[test]
    fn index_round_trip() {
        for plane in PlaneAxis::ALL {
            assert_eq!(PlaneAxis::from_index(plane.index()), Some(plane));
            assert_eq!(PlaneAxis::from_letter(plane.letter()), Ok(plane));
        }
        assert_eq!(PlaneAxis::from_index(3), None);
        assert_eq!(PlaneAxis::from_index(usize::MAX), None);
    }
}
