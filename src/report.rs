//! The prescription text file handed to the scanner operator.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use dicom::object::OpenFileOptions;
use dicom_dictionary_std::tags;

use crate::prescription::Prescription;
use crate::volume_loader::HeaderLoaderError;

const SEPARATOR: &str = "---------------------------";

/// Who and what a session belongs to, taken from a DICOM header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyInfo {
    pub description: String,
    pub date: String,
    pub participant: String,
}

impl StudyInfo {
    /// Attributes missing from the header are left empty.
    pub fn from_dicom(path: impl AsRef<Path>) -> Result<Self, HeaderLoaderError> {
        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path.as_ref())?;
        let text = |tag| {
            object
                .element(tag)
                .ok()
                .and_then(|element| element.to_str().ok())
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        Ok(Self {
            description: text(tags::STUDY_DESCRIPTION),
            date: text(tags::STUDY_DATE),
            participant: text(tags::PATIENT_ID),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrescriptionReport {
    pub study: StudyInfo,
    pub source_image: PathBuf,
    pub destination_image: PathBuf,
    pub roi_image: PathBuf,
    pub roi_name: String,
    pub prescription: Prescription,
    pub overlap: Option<f64>,
}

impl PrescriptionReport {
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        fs::write(path, self.to_string())
    }
}

impl fmt::Display for PrescriptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Study: {}", self.study.description)?;
        writeln!(f, "Date: {}", self.study.date)?;
        writeln!(f, "Participant: {}", self.study.participant)?;
        writeln!(f, "Session 1 image: {}", file_name(&self.source_image))?;
        writeln!(f, "Session 2 image: {}", file_name(&self.destination_image))?;
        writeln!(f, "Session 1 voxel: {}", file_name(&self.roi_image))?;
        write!(f, "\n{SEPARATOR}\n\n")?;
        writeln!(f, "NEW {} PRESCRIPTION", self.roi_name)?;
        write!(f, "{}", self.prescription)?;
        if let Some(dice) = self.overlap {
            write!(f, "\nOverlap (Dice): {dice:.2}")?;
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
