//! Flat index <-> N-dimensional index mapping over a fixed grid.

/// Map a flat index onto per-dimension offsets for a grid with cardinalities `dim`.
///
/// `idx[0]` cycles the fastest and `idx[D-1]` the slowest, so for `dim = [5, 4, 3]`:
/// `idx[0] = i % 5`, `idx[1] = (i / 5) % 4`, `idx[2] = (i / 20) % 3`.
/// Callers keep `i` below the product of `dim`.
pub fn unravel_index(i: usize, dim: &[usize]) -> Vec<usize> {
    let mut idx = Vec::with_capacity(dim.len());
    let mut stride = 1usize;
    for &d in dim {
        idx.push((i / stride) % d);
        stride = stride.saturating_mul(d);
    }
    idx
}

/// Inverse of [`unravel_index`].
pub fn ravel_index(idx: &[usize], dim: &[usize]) -> usize {
    let mut i = 0usize;
    let mut stride = 1usize;
    for (&k, &d) in idx.iter().zip(dim) {
        i += k * stride;
        stride *= d;
    }
    i
}
