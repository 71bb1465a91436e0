// ============================================================
// Layer 5: Host-side Linear Algebra
// ============================================================
// Burn has no QR, SVD or determinant, and these are only needed
// a handful of times per run (rotation init, the closed-form
// baselines, diagnostics). They run on the CPU in f64 over
// nalgebra matrices, then go back to the device.
//
// What's here:
//   tensor_to_matrix / matrix_to_tensor   device ⇄ host transfer
//   haar_orthogonal                       QR with the sign of diag(R) fixed
//   polar_factor                          U Vᵀ of the SVD
//   orthogonality_error                   max |MᵀM − I|
//
// Reference: nalgebra docs (QR, SVD, Cholesky)

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;
use nalgebra::{DMatrix, DVector, SVD};

const RANK_EPS: f64 = 1e-12;

pub fn tensor_to_matrix<B: Backend>(tensor: Tensor<B, 2>) -> Result<DMatrix<f64>> {
    let [rows, cols] = tensor.dims();
    let values: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read tensor data: {e:?}"))?;
    if values.len() != rows * cols {
        bail!("tensor holds {} values, expected {rows}x{cols}", values.len());
    }
    Ok(DMatrix::from_row_iterator(rows, cols, values.into_iter().map(f64::from)))
}

pub fn matrix_to_tensor<B: Backend>(matrix: &DMatrix<f64>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = matrix.shape();
    // nalgebra is column-major; the transpose's storage is our row-major order
    let values: Vec<f32> = matrix.transpose().iter().map(|&v| v as f32).collect();
    Tensor::from_data(TensorData::new(values, [rows, cols]), device)
}

pub fn vector_to_tensor<B: Backend>(vector: &DVector<f64>, device: &B::Device) -> Tensor<B, 1> {
    let values: Vec<f32> = vector.iter().map(|&v| v as f32).collect();
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len]), device)
}

/// Orthogonal factor of a square Gaussian sample. Flipping each column of
/// Q to make diag(R) positive gives a Haar-distributed result; its
/// determinant is ±1. Fails on (numerically) dependent columns.
pub fn haar_orthogonal(sample: DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !sample.is_square() {
        bail!("expected a square matrix, got {}x{}", sample.nrows(), sample.ncols());
    }
    let n = sample.nrows();
    let qr = sample.qr();
    let r = qr.r();
    let mut q = qr.q();
    for j in 0..n {
        let d = r[(j, j)];
        if d.abs() < RANK_EPS * n as f64 {
            bail!("column {j} is linearly dependent, cannot orthonormalise");
        }
        if d < 0.0 {
            for i in 0..n {
                q[(i, j)] = -q[(i, j)];
            }
        }
    }
    Ok(q)
}

/// Closest orthogonal matrix to `m` in Frobenius norm: U Vᵀ where
/// m = U Σ Vᵀ. Defined for every matrix, including rank-deficient ones.
pub fn polar_factor(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let svd = SVD::new(m.clone(), true, true);
    let u = svd.u.ok_or_else(|| anyhow!("SVD failed to compute U"))?;
    let v_t = svd.v_t.ok_or_else(|| anyhow!("SVD failed to compute Vᵀ"))?;
    Ok(u * v_t)
}

/// Determinant, or NaN for a non-square matrix.
pub fn determinant(m: &DMatrix<f64>) -> f64 {
    if m.is_square() { m.determinant() } else { f64::NAN }
}

/// Largest absolute entry of `MᵀM − I`; 0 for an exactly orthogonal matrix.
pub fn orthogonality_error(m: &DMatrix<f64>) -> f64 {
    let gram = m.transpose() * m;
    let eye = DMatrix::<f64>::identity(gram.nrows(), gram.ncols());
    (gram - eye).amax()
}

/// Mean over rows, as a column vector.
pub fn column_mean(m: &DMatrix<f64>) -> Result<DVector<f64>> {
    if m.nrows() == 0 {
        bail!("mean of an empty matrix");
    }
    Ok(m.row_mean().transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_tensor_round_trip_keeps_row_major_order() {
        let device = Default::default();
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = matrix_to_tensor::<NdArray>(&m, &device);
        let first_row: Vec<f32> = t.clone().slice([0..1, 0..3]).into_data().to_vec().unwrap();
        assert_eq!(first_row, vec![1.0, 2.0, 3.0]);
        assert_eq!(tensor_to_matrix(t).unwrap(), m);
    }

    #[test]
    fn test_haar_orthogonal_gives_orthogonal_columns() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let q = haar_orthogonal(m).unwrap();
        assert!(orthogonality_error(&q) < 1e-10);
        assert!((determinant(&q).abs() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_haar_orthogonal_rejects_dependent_columns() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 1.0, 2.0]);
        assert!(haar_orthogonal(m).is_err());
    }

    #[test]
    fn test_polar_factor_recovers_rotation() {
        // A rotation by 30° scaled by a symmetric positive definite factor
        let (s, c) = (30f64.to_radians().sin(), 30f64.to_radians().cos());
        let r = DMatrix::from_row_slice(2, 2, &[c, -s, s, c]);
        let p = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
        let q = polar_factor(&(&r * &p)).unwrap();
        assert!((q - r).amax() < 1e-10);
    }

    #[test]
    fn test_polar_factor_of_a_singular_matrix_is_orthogonal() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        let q = polar_factor(&m).unwrap();
        assert!(orthogonality_error(&q) < 1e-10);
    }

    #[test]
    fn test_determinant_and_diagnostics() {
        let swap = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        assert!((determinant(&swap) + 1.0).abs() < 1e-12);
        assert!(determinant(&DMatrix::<f64>::zeros(2, 3)).is_nan());
        let stretch = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]);
        assert!((orthogonality_error(&stretch) - 3.0).abs() < 1e-12);
    }
}
