//! A realignment session: one previous acquisition, one new acquisition, the
//! registration between them and the voxels of interest to carry across.
//!
//! Sessions are described in TOML:
//!
//! ```toml
//! output_dir = "out"
//! source_image = "session1/T1_brain.nii.gz"
//! destination_image = "session2/T1_brain.nii.gz"
//! registration_matrix = "session1_to_session2.mat"
//! destination_dicom = "session2/T1/IM_0001.dcm"
//!
//! [[roi]]
//! path = "session1/acc_voxel.nii.gz"
//! name = "acc"
//! follow_up = "session2/acc_voxel.nii.gz"
//! ```
//!
//! Relative paths are taken relative to the session file. Every NIfTI path
//! (images, voxels of interest, follow-ups) must be a NIfTI-1 file, plain or
//! gzipped; NIfTI-2 headers are rejected.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::affine::{Affine, load_matrix};
use crate::compose::RegistrationChain;
use crate::error::{GeometryError, MatrixParseError};
use crate::mask::voxel_overlap;
use crate::prescription::Prescription;
use crate::report::{PrescriptionReport, StudyInfo};
use crate::volume::VolumeGeometry;
use crate::volume_loader::{HeaderLoader, HeaderLoaderError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Could not read session file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid session file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Session lists no [[roi]] entries")]
    NoRois,

    #[error("Overlap resolution must be positive, got {0} mm")]
    InvalidResolution(f64),

    #[error("Could not write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Header(#[from] HeaderLoaderError),

    #[error(transparent)]
    Matrix(#[from] MatrixParseError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// One voxel of interest that could not be carried across.
#[derive(Debug, Error)]
#[error("voxel of interest '{name}': {source}")]
pub struct RoiFailure {
    pub name: String,
    pub source: SessionError,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Session {
    pub output_dir: PathBuf,

    /// Anatomical image of the earlier session
    pub source_image: PathBuf,

    /// Anatomical image of today's session
    pub destination_image: PathBuf,

    /// `flirt -omat` output, source to destination
    pub registration_matrix: PathBuf,

    /// Any DICOM file of today's session, for the report header
    #[serde(default)]
    pub destination_dicom: Option<PathBuf>,

    #[serde(default = "default_overlap_resolution")]
    pub overlap_resolution_mm: f64,

    #[serde(default, rename = "roi")]
    pub rois: Vec<RoiEntry>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoiEntry {
    /// Voxel-of-interest image in the source session's space
    pub path: PathBuf,

    #[serde(default)]
    pub name: Option<String>,

    /// The same voxel as actually acquired today, to score the overlap
    #[serde(default)]
    pub follow_up: Option<PathBuf>,
}

fn default_overlap_resolution() -> f64 {
    0.25
}

impl RoiEntry {
    /// Explicit name, or the file name without its NIfTI extension.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        file_name
            .strip_suffix(".nii.gz")
            .or_else(|| file_name.strip_suffix(".nii"))
            .unwrap_or(&file_name)
            .to_string()
    }
}

/// Result of carrying one voxel of interest across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiOutcome {
    pub name: String,
    pub previous: Prescription,
    pub realigned: Prescription,
    pub realigned_affine: Affine,
    pub overlap: Option<f64>,
}

impl Session {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&text, base_dir)
    }

    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, SessionError> {
        let mut session: Session = toml::from_str(text)?;

        if session.rois.is_empty() {
            return Err(SessionError::NoRois);
        }
        let resolution = session.overlap_resolution_mm;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SessionError::InvalidResolution(resolution));
        }

        session.resolve_paths(base_dir);
        Ok(session)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        resolve(&mut self.output_dir);
        resolve(&mut self.source_image);
        resolve(&mut self.destination_image);
        resolve(&mut self.registration_matrix);
        if let Some(dicom) = &mut self.destination_dicom {
            resolve(dicom);
        }
        for roi in &mut self.rois {
            resolve(&mut roi.path);
            if let Some(follow_up) = &mut roi.follow_up {
                resolve(follow_up);
            }
        }
    }

    /// Carry every voxel of interest into today's session and write
    /// `<name>_aligned.mat` and `<name>_prescription.txt` for each.
    ///
    /// Errors shared by all voxels (unreadable images, mismatched voxel
    /// sizes, singular matrices) abort the run. A voxel that fails on its
    /// own is reported in the returned list and the rest carry on.
    pub fn run(&self) -> Result<Vec<Result<RoiOutcome, RoiFailure>>, SessionError> {
        tracing::info!(
            source = %self.source_image.display(),
            destination = %self.destination_image.display(),
            "loading session headers"
        );
        let source = HeaderLoader::load(&self.source_image)?;
        let destination = HeaderLoader::load(&self.destination_image)?;
        let registration = load_matrix(&self.registration_matrix)?;
        let chain = RegistrationChain::new(&source, &destination, &registration)?;

        let study = match &self.destination_dicom {
            Some(path) => StudyInfo::from_dicom(path)?,
            None => StudyInfo::default(),
        };

        fs::create_dir_all(&self.output_dir).map_err(|source| SessionError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        let outcomes: Vec<_> = self
            .rois
            .par_iter()
            .map(|roi| {
                self.realign_roi(roi, &chain, &destination)
                    .map_err(|source| RoiFailure { name: roi.name(), source })
            })
            .collect();

        let written = outcomes
            .into_iter()
            .zip(&self.rois)
            .map(|(outcome, roi)| {
                let outcome = outcome.and_then(|outcome| {
                    self.write_outputs(roi, &outcome, &study)
                        .map(|()| outcome)
                        .map_err(|source| RoiFailure { name: roi.name(), source })
                });
                if let Err(failure) = &outcome {
                    tracing::warn!("{failure}");
                }
                outcome
            })
            .collect();

        Ok(written)
    }

    fn realign_roi(
        &self,
        roi: &RoiEntry,
        chain: &RegistrationChain,
        destination: &VolumeGeometry,
    ) -> Result<RoiOutcome, SessionError> {
        let name = roi.name();
        let geometry = HeaderLoader::load(&roi.path)?;
        let previous = Prescription::from_geometry(&geometry)?;

        let realigned_affine = chain.apply_to_affine(&geometry.affine);
        let realigned_geometry =
            VolumeGeometry::new(realigned_affine, geometry.spacing, geometry.dim());
        let realigned = Prescription::from_geometry(&realigned_geometry)?;

        let overlap = match &roi.follow_up {
            Some(path) => {
                let follow_up = HeaderLoader::load(path)?;
                let dice = voxel_overlap(
                    &realigned_geometry,
                    &follow_up,
                    destination,
                    self.overlap_resolution_mm,
                )?;
                tracing::info!(roi = %name, dice, "overlap with follow-up voxel");
                Some(dice)
            }
            None => None,
        };

        tracing::debug!(
            roi = %name,
            previous = %previous.orientation,
            today = %realigned.orientation,
            "realigned"
        );

        Ok(RoiOutcome {
            name,
            previous,
            realigned,
            realigned_affine,
            overlap,
        })
    }

    fn write_outputs(
        &self,
        roi: &RoiEntry,
        outcome: &RoiOutcome,
        study: &StudyInfo,
    ) -> Result<(), SessionError> {
        let matrix_path = self.output_dir.join(format!("{}_aligned.mat", outcome.name));
        outcome.realigned_affine.save_matrix(&matrix_path)?;

        let report_path = self.output_dir.join(format!("{}_prescription.txt", outcome.name));
        let report = PrescriptionReport {
            study: study.clone(),
            source_image: self.source_image.clone(),
            destination_image: self.destination_image.clone(),
            roi_image: roi.path.clone(),
            roi_name: outcome.name.clone(),
            prescription: outcome.realigned.clone(),
            overlap: outcome.overlap,
        };
        report.write_to(&report_path).map_err(|source| SessionError::Write {
            path: report_path.clone(),
            source,
        })?;

        tracing::info!(path = %report_path.display(), "prescription written");
        Ok(())
    }
}

#[cfg(test)]
mod test_session {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        output_dir = "out"
        source_image = "s1/T1.nii.gz"
        destination_image = "/abs/s2/T1.nii.gz"
        registration_matrix = "s1_to_s2.mat"

        [[roi]]
        path = "s1/acc_voxel.nii.gz"

        [[roi]]
        path = "s1/pcc.nii"
        name = "posterior"
        follow_up = "s2/pcc.nii"
    "#;

    #[test]
    fn defaults_and_relative_paths() {
        let session = Session::from_toml_str(MINIMAL, Path::new("/study")).unwrap();
        assert_eq!(session.output_dir, PathBuf::from("/study/out"));
        assert_eq!(session.source_image, PathBuf::from("/study/s1/T1.nii.gz"));
        assert_eq!(session.destination_image, PathBuf::from("/abs/s2/T1.nii.gz"));
        assert_eq!(session.destination_dicom, None);
        assert_eq!(session.overlap_resolution_mm, 0.25);
        assert_eq!(session.rois.len(), 2);
        assert_eq!(session.rois[1].follow_up, Some(PathBuf::from("/study/s2/pcc.nii")));
    }

    #[test]
    fn roi_names() {
        let session = Session::from_toml_str(MINIMAL, Path::new("")).unwrap();
        let names: Vec<_> = session.rois.iter().map(RoiEntry::name).collect();
        assert_eq!(names, ["acc_voxel", "posterior"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = format!("{MINIMAL}\nthreshold = 3\n");
        // the stray key lands in the last [[roi]] table
        assert!(matches!(
            Session::from_toml_str(&text, Path::new("")),
            Err(SessionError::Parse(_))
        ));
    }

    #[test]
    fn session_needs_rois() {
        let text = r#"
            output_dir = "out"
            source_image = "a.nii"
            destination_image = "b.nii"
            registration_matrix = "m.mat"
        "#;
        assert!(matches!(Session::from_toml_str(text, Path::new("")), Err(SessionError::NoRois)));
    }

    #[test]
    fn overlap_resolution_must_be_positive() {
        let text = MINIMAL.replace(
            "output_dir = \"out\"",
            "output_dir = \"out\"\noverlap_resolution_mm = 0.0",
        );
        assert!(matches!(
            Session::from_toml_str(&text, Path::new("")),
            Err(SessionError::InvalidResolution(r)) if r == 0.0
        ));
    }

    #[test]
    fn missing_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SessionError::Read { .. }));
    }
}
