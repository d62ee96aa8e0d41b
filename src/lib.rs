//! # voxalign
//!
//! Voxel prescription geometry for longitudinal MR spectroscopy.
//!
//! A spectroscopy voxel placed in one session has to be placed at the same
//! anatomical location in the next one. This crate takes the image headers
//! of both sessions and the rigid registration between them (an FSL FLIRT
//! matrix), carries each voxel of interest across, and reports it the way
//! the scanner console wants it entered:
//!  - Position as signed letters (`L12.3 A4.0 H8.5`)
//!  - Orientation label (`Transverse`, `T > C-10.0`, `T > C18.4 > S-6.0`)
//!  - In-plane rotation in degrees
//!  - Voxel dimensions in mm
//!
//! Headers are read from NIfTI images or DICOM series; voxel data is never
//! loaded. Registration itself, skull-stripping and format conversion are
//! left to external tools.
//!
//! Voxels of interest in a batch are processed in parallel using rayon.
//!
//! # Examples
//!
//! ## Decoding a prescription
//!
//! ```no_run
//! # use voxalign::{HeaderLoader, Prescription};
//! let geometry = HeaderLoader::load_nifti("acc_voxel.nii.gz")
//!     .expect("should have read the NIfTI header");
//! let prescription = Prescription::from_geometry(&geometry)
//!     .expect("voxel affine should be orthonormal");
//! println!("{prescription}");
//! ```
//!
//! ## Carrying a voxel into today's session
//!
//! ```no_run
//! # use voxalign::{HeaderLoader, Prescription, RegistrationChain, load_matrix};
//! let previous = HeaderLoader::load_nifti("session1/T1.nii.gz").unwrap();
//! let today = HeaderLoader::load_nifti("session2/T1.nii.gz").unwrap();
//! let flirt = load_matrix("session1_to_session2.mat").unwrap();
//! let chain = RegistrationChain::new(&previous, &today, &flirt).unwrap();
//!
//! let voxel = HeaderLoader::load_nifti("session1/acc_voxel.nii.gz").unwrap();
//! let realigned = chain.apply_to_affine(&voxel.affine);
//! let prescription = Prescription::from_affine(&realigned, &voxel.spacing).unwrap();
//! println!("{}", prescription.position_label());
//! ```

pub mod affine;
pub mod compose;
pub mod direction;
pub mod enums;
pub mod error;
pub mod flirt;
pub mod inplane;
pub mod mask;
pub mod orientation;
pub mod prescription;
pub mod report;
pub mod session;
pub mod volume;
pub mod volume_loader;

pub use affine::{Affine, load_matrix, parse_matrix};
pub use compose::RegistrationChain;
pub use enums::{Obliquity, PlaneAxis, SortBy};
pub use error::{GeometryError, MatrixParseError};
pub use orientation::{SliceOrientation, decode_normal};
pub use prescription::{Prescription, position_letters};
pub use session::Session;
pub use volume::{Spacing, VolumeGeometry};
pub use volume_loader::HeaderLoader;
