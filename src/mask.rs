//! Overlap between two voxel prescriptions, scored on a common grid.

use nalgebra::Point3;
use ndarray::{Array3, Zip};

use crate::affine::Affine;
use crate::error::{GeometryError, Result};
use crate::volume::VolumeGeometry;

/// Mark every reference voxel whose centre falls inside the box covered by
/// `roi` (all of its voxels, edges at ±0.5 in index space).
///
/// The mask is indexed `[x, y, z]` like the reference grid.
pub fn rasterize_box(
    roi: &VolumeGeometry,
    reference: &VolumeGeometry,
) -> Result<Array3<bool>> {
    let to_roi: Affine = roi.affine.try_inverse("voxel-of-interest affine")? * reference.affine;
    let upper = roi.dim.map(|d| d as f64 - 0.5);

    let [nx, ny, nz] = reference.dim;
    let mut mask = Array3::from_elem((nx, ny, nz), false);
    Zip::indexed(&mut mask).par_for_each(|(i, j, k), inside| {
        let p = to_roi.transform_point(&Point3::new(i as f64, j as f64, k as f64));
        *inside = (0..3).all(|axis| p[axis] >= -0.5 && p[axis] < upper[axis]);
    });
    Ok(mask)
}

/// `2 |A ∩ B| / (|A| + |B|)`
pub fn dice_coefficient(a: &Array3<bool>, b: &Array3<bool>) -> Result<f64> {
    if a.dim() != b.dim() {
        let (ad, bd) = (a.dim(), b.dim());
        return Err(GeometryError::ShapeMismatch([ad.0, ad.1, ad.2], [bd.0, bd.1, bd.2]));
    }
    let (both, count_a, count_b) =
        Zip::from(a).and(b).fold((0usize, 0usize, 0usize), |(n, na, nb), &x, &y| {
            (n + usize::from(x && y), na + usize::from(x), nb + usize::from(y))
        });
    if count_a + count_b == 0 {
        return Err(GeometryError::EmptyMasks);
    }
    Ok(2.0 * both as f64 / (count_a + count_b) as f64)
}

/// Corners of the box covered by `roi`, in its own index space.
fn box_corners(roi: &VolumeGeometry) -> [Point3<f64>; 8] {
    let upper = roi.dim.map(|d| d as f64 - 0.5);
    std::array::from_fn(|n| {
        let pick = |axis: usize| if (n >> axis) & 1 == 0 { -0.5 } else { upper[axis] };
        Point3::new(pick(0), pick(1), pick(2))
    })
}

/// `reference` re-gridded at `resolution_mm`, cropped to the voxels that
/// can fall inside either box.
///
/// Grid voxels outside the crop are empty in both masks, so they never
/// change the Dice score. Boxes entirely outside the reference field of
/// view leave nothing to score.
pub fn overlap_grid(
    a: &VolumeGeometry,
    b: &VolumeGeometry,
    reference: &VolumeGeometry,
    resolution_mm: f64,
) -> Result<VolumeGeometry> {
    let grid = reference.isotropic(resolution_mm)?;
    let to_grid = grid.affine.try_inverse("overlap grid affine")?;

    let mut lower = [f64::INFINITY; 3];
    let mut upper = [f64::NEG_INFINITY; 3];
    for roi in [a, b] {
        for corner in box_corners(roi) {
            let p = to_grid.transform_point(&roi.voxel_to_world(&corner));
            for (axis, (lo, hi)) in lower.iter_mut().zip(upper.iter_mut()).enumerate() {
                *lo = lo.min(p[axis]);
                *hi = hi.max(p[axis]);
            }
        }
    }

    let mut start = [0usize; 3];
    let mut dim = [0usize; 3];
    for (axis, (s, d)) in start.iter_mut().zip(dim.iter_mut()).enumerate() {
        let first = lower[axis].floor().max(0.0);
        let last = upper[axis].ceil().min(grid.dim[axis] as f64 - 1.0);
        if first > last {
            return Err(GeometryError::EmptyMasks);
        }
        *s = first as usize;
        *d = (last - first) as usize + 1;
    }
    Ok(grid.crop(start, dim))
}

/// Dice overlap of two voxels of interest, both already expressed in the
/// reference image's world space, rasterized at `resolution_mm`.
pub fn voxel_overlap(
    a: &VolumeGeometry,
    b: &VolumeGeometry,
    reference: &VolumeGeometry,
    resolution_mm: f64,
) -> Result<f64> {
    let grid = overlap_grid(a, b, reference, resolution_mm)?;
    tracing::debug!(dim = ?grid.dim(), resolution_mm, "rasterizing voxels for overlap");
    let (mask_a, mask_b) =
        rayon::join(|| rasterize_box(a, &grid), || rasterize_box(b, &grid));
    dice_coefficient(&mask_a?, &mask_b?)
}
