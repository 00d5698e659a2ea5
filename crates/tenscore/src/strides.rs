//! Stride computation utilities.
//!
//! Uses row-major (C) order: the last dimension is the fastest varying.
//! Strides are counted in elements, not bytes.

use smallvec::SmallVec;

/// Per-dimension sizes or strides. Inline for up to six dimensions.
pub type Dims = SmallVec<[i64; 6]>;

/// Compute row-major strides from sizes.
///
/// For sizes [d0, d1, ..., dn], returns strides [d1*...*dn, ..., dn, 1].
///
/// # Examples
///
/// ```
/// use tenscore::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]).as_slice(), &[20, 5, 1]);
/// assert_eq!(compute_strides(&[2, 3]).as_slice(), &[3, 1]);
/// assert_eq!(compute_strides(&[5]).as_slice(), &[1]);
/// assert!(compute_strides(&[]).is_empty());
/// ```
pub fn compute_strides(sizes: &[i64]) -> Dims {
    let mut strides: Dims = SmallVec::from_elem(0, sizes.len());
    let mut stride = 1i64;

    for (slot, &size) in strides.iter_mut().zip(sizes).rev() {
        *slot = stride;
        stride = stride.saturating_mul(size);
    }

    strides
}

/// True if `strides` is the dense row-major layout for `sizes`.
///
/// Dimensions of size one can carry any stride without changing the layout.
pub fn is_row_major(sizes: &[i64], strides: &[i64]) -> bool {
    sizes.len() == strides.len()
        && compute_strides(sizes)
            .iter()
            .zip(sizes.iter().zip(strides))
            .all(|(&dense, (&size, &stride))| size == 1 || dense == stride)
}
