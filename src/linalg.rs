//! ndarray ↔ nalgebra conversions for the dense decompositions (symmetric
//! eigendecomposition, inverse, pseudo-inverse) that ndarray does not
//! provide.
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

pub(crate) fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    let (r, c) = a.dim();
    DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Symmetric eigendecomposition with eigenpairs sorted by descending
/// eigenvalue. Returns `(values, vectors)` with eigenvectors as columns.
pub(crate) fn sorted_symmetric_eigen(a: ArrayView2<'_, f64>) -> (Vec<f64>, Array2<f64>) {
    let eig = nalgebra::SymmetricEigen::new(to_dmatrix(a));
    let n = eig.eigenvalues.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j]
            .partial_cmp(&eig.eigenvalues[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| eig.eigenvectors[(r, order[c])]);
    (values, vectors)
}

/// Inverse of a square matrix, `None` when singular.
pub(crate) fn inverse(a: ArrayView2<'_, f64>) -> Option<Array2<f64>> {
    to_dmatrix(a).try_inverse().map(|m| from_dmatrix(&m))
}
