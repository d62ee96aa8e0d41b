use crate::{
    affine::Affine,
    enums::SortBy,
    error::GeometryError,
    volume::{Spacing, VolumeGeometry},
};

use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use nifti::NiftiHeader;
use std::{fs, path::Path};
use thiserror::Error;

/// Two slices belong to the same stack if their orientations agree this well.
const ORIENTATION_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum HeaderLoaderError {
    #[error("No DICOM files found")]
    NoDicomFiles,

    #[error("Missing or unreadable DICOM attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Slices do not share one orientation")]
    InconsistentOrientation,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Expected a volume with at least 3 dimensions, header has {0}")]
    NotVolumetric(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Geometry attributes of one DICOM image.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceHeader {
    pub orientation: [f64; 6],
    pub position: [f64; 3],
    /// (row spacing, column spacing)
    pub pixel_spacing: [f64; 2],
    pub rows: usize,
    pub columns: usize,
    pub slice_thickness: Option<f64>,
    pub instance_number: Option<i32>,
}

pub struct HeaderLoader;

impl HeaderLoader {
    /// Load whatever `path` points at: a directory of `.dcm` files, a
    /// single `.dcm` file, or a NIfTI image.
    pub fn load(path: impl AsRef<Path>) -> Result<VolumeGeometry, HeaderLoaderError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_from_directory(path, SortBy::default())
        } else if has_extension(path, "dcm") {
            Self::load_dicom_series(&[path], SortBy::default())
        } else {
            Self::load_nifti(path)
        }
    }

    /// Load the geometry of a `.nii` / `.nii.gz` image.
    ///
    /// Only the NIfTI-1 header is read; voxel data is never touched. NIfTI-2
    /// files are rejected by the header parser.
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<VolumeGeometry, HeaderLoaderError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading NIfTI header");
        let header = NiftiHeader::from_file(path)?;
        Self::geometry_from_nifti_header(&header)
    }

    /// Affine priority follows the NIfTI standard: sform, then qform, then
    /// plain pixdim scaling.
    pub fn geometry_from_nifti_header(
        header: &NiftiHeader,
    ) -> Result<VolumeGeometry, HeaderLoaderError> {
        let ndim = header.dim[0] as usize;
        if ndim < 3 {
            return Err(HeaderLoaderError::NotVolumetric(ndim));
        }
        let dim = [header.dim[1], header.dim[2], header.dim[3]].map(|d| d as usize);
        let [dx, dy, dz] = [header.pixdim[1], header.pixdim[2], header.pixdim[3]].map(f64::from);
        let spacing = Spacing::new(dx, dy, dz)?;

        let affine = if header.sform_code > 0 {
            let row = |r: [f32; 4]| r.map(f64::from);
            Affine::from_rows([
                row(header.srow_x),
                row(header.srow_y),
                row(header.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ])
        } else if header.qform_code > 0 {
            let [b, c, d] = [header.quatern_b, header.quatern_c, header.quatern_d].map(f64::from);
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let rotation =
                UnitQuaternion::from_quaternion(Quaternion::new(a, b, c, d)).to_rotation_matrix();
            let linear =
                rotation.matrix() * Matrix3::from_diagonal(&Vector3::new(dx, dy, qfac * dz));
            let offset = Vector3::new(
                f64::from(header.quatern_x),
                f64::from(header.quatern_y),
                f64::from(header.quatern_z),
            );
            Affine::from_linear_translation(&linear, &offset)
        } else {
            tracing::warn!("NIfTI header has neither sform nor qform; using voxel size only");
            Affine::scaling([dx, dy, dz])
        };

        Ok(VolumeGeometry::new(affine, spacing, dim))
    }

    /// Load a volume geometry from DICOM file paths
    ///
    /// # Arguments
    ///
    /// * `paths` - One file per slice of a single series
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be read, a geometry attribute is
    /// missing, or the slices do not form one stack
    pub fn load_dicom_series(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<VolumeGeometry, HeaderLoaderError> {
        let open = |path: &Path| {
            OpenFileOptions::new()
                .read_until(tags::PIXEL_DATA)
                .open_file(path)
        };
        let objects: Result<Vec<_>, _> = paths.iter().map(|path| open(path.as_ref())).collect();
        let slices: Result<Vec<_>, _> =
            objects?.iter().map(Self::extract_slice_header).collect();
        Self::geometry_from_slices(slices?, sort_by)
    }

    /// Load a volume geometry from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<VolumeGeometry, HeaderLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| has_extension(path, "dcm"))
            .collect();

        if paths.is_empty() {
            return Err(HeaderLoaderError::NoDicomFiles);
        }

        Self::load_dicom_series(&paths, sort_by)
    }

    fn extract_slice_header(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<SliceHeader, HeaderLoaderError> {
        let floats = |tag, name: &'static str, count: usize| {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|element| element.to_multi_float64().ok())
                .filter(|values| values.len() >= count)
                .ok_or(HeaderLoaderError::MissingAttribute(name))
        };
        let unsigned = |tag, name: &'static str| -> Result<usize, HeaderLoaderError> {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|element| element.to_int::<u32>().ok())
                .map(|n| n as usize)
                .ok_or(HeaderLoaderError::MissingAttribute(name))
        };

        let iop = floats(tags::IMAGE_ORIENTATION_PATIENT, "ImageOrientationPatient", 6)?;
        let ipp = floats(tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient", 3)?;
        let spacing = floats(tags::PIXEL_SPACING, "PixelSpacing", 2)?;

        Ok(SliceHeader {
            orientation: [iop[0], iop[1], iop[2], iop[3], iop[4], iop[5]],
            position: [ipp[0], ipp[1], ipp[2]],
            pixel_spacing: [spacing[0], spacing[1]],
            rows: unsigned(tags::ROWS, "Rows")?,
            columns: unsigned(tags::COLUMNS, "Columns")?,
            slice_thickness: dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|element| element.to_float64().ok()),
            instance_number: dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok()),
        })
    }

    /// Assemble a stack of slices into one geometry in NIfTI (RAS+) world
    /// coordinates. Index axes follow the DICOM pixel layout: column, row,
    /// slice.
    pub fn geometry_from_slices(
        mut slices: Vec<SliceHeader>,
        sort_by: SortBy,
    ) -> Result<VolumeGeometry, HeaderLoaderError> {
        let first = slices.first().ok_or(HeaderLoaderError::NoDicomFiles)?.clone();

        if slices.iter().any(|s| s.rows != first.rows || s.columns != first.columns) {
            return Err(HeaderLoaderError::InconsistentDimensions);
        }
        let same_orientation = |s: &SliceHeader| {
            s.orientation
                .iter()
                .zip(first.orientation.iter())
                .all(|(a, b)| (a - b).abs() < ORIENTATION_TOLERANCE)
        };
        if !slices.iter().all(same_orientation) {
            return Err(HeaderLoaderError::InconsistentOrientation);
        }

        let [r0, r1, r2, c0, c1, c2] = first.orientation;
        let row_cosine = Vector3::new(r0, r1, r2);
        let column_cosine = Vector3::new(c0, c1, c2);
        let normal = row_cosine.cross(&column_cosine);

        Self::sort_slices(&mut slices, &normal, sort_by);

        let origin = Vector3::from(slices[0].position);
        let step = if slices.len() > 1 {
            let last = Vector3::from(slices[slices.len() - 1].position);
            (last - origin) / (slices.len() - 1) as f64
        } else {
            let thickness = first
                .slice_thickness
                .ok_or(HeaderLoaderError::MissingAttribute("SliceThickness"))?;
            normal * thickness
        };

        let [row_spacing, column_spacing] = first.pixel_spacing;
        let spacing = Spacing::new(column_spacing, row_spacing, step.norm())?;
        let linear = Matrix3::from_columns(&[
            row_cosine * column_spacing,
            column_cosine * row_spacing,
            step,
        ]);
        let lps = Affine::from_linear_translation(&linear, &origin);

        Ok(VolumeGeometry::new(
            lps_to_ras() * lps,
            spacing,
            [first.columns, first.rows, slices.len()],
        ))
    }

    fn sort_slices(slices: &mut [SliceHeader], normal: &Vector3<f64>, sort_by: SortBy) {
        match sort_by {
            SortBy::ImagePositionPatient => {
                slices.sort_by(|a, b| {
                    let da = normal.dot(&Vector3::from(a.position));
                    let db = normal.dot(&Vector3::from(b.position));
                    da.total_cmp(&db)
                });
            }
            SortBy::InstanceNumber => slices.sort_by_key(|s| s.instance_number),
            SortBy::None => {}
        }
    }
}

/// DICOM patient space is LPS+, NIfTI world space is RAS+.
fn lps_to_ras() -> Affine {
    Affine::scaling([-1.0, -1.0, 1.0])
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
