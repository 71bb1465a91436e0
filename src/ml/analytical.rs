// ============================================================
// Layer 5: Closed-form Baselines
// ============================================================
// Transforms fitted without gradient descent, from the train split
// stacked into X (sources) and Y (targets), both [n, d_model]:
//
//   mean_difference    t = mean(Y) − mean(X)
//   least_squares_map  W = (XᵀX + εI)⁻¹ XᵀY        (Cholesky solve)
//   procrustes         R = U Vᵀ where XcᵀYc = U Σ Vᵀ,  t = mean(Y) − mean(X) R
//
// All maps use the row-vector convention y = x M. The SVD form of
// Procrustes needs no inverse, so it also holds when the train
// split has fewer pairs than dimensions.
//
// Reference: Schönemann (1966), orthogonal Procrustes problem

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};

use crate::data::dataset::EmbeddingPair;
use crate::ml::linalg::{column_mean, polar_factor};

pub const DEFAULT_RIDGE: f64 = 1e-6;

/// Stack the pairs into (X, Y).
pub fn stack_pairs(pairs: &[EmbeddingPair]) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let Some(first) = pairs.first() else {
        bail!("cannot fit a baseline on zero pairs");
    };
    let d = first.d_model();
    if let Some((i, p)) = pairs.iter().enumerate().find(|(_, p)| p.source.len() != d || p.target.len() != d) {
        bail!("pair {i} has width {}/{}, expected {d}", p.source.len(), p.target.len());
    }
    let x = DMatrix::from_row_iterator(pairs.len(), d, pairs.iter().flat_map(|p| p.source.iter().map(|&v| f64::from(v))));
    let y = DMatrix::from_row_iterator(pairs.len(), d, pairs.iter().flat_map(|p| p.target.iter().map(|&v| f64::from(v))));
    Ok((x, y))
}

pub fn mean_difference(pairs: &[EmbeddingPair]) -> Result<DVector<f64>> {
    let (x, y) = stack_pairs(pairs)?;
    Ok(column_mean(&y)? - column_mean(&x)?)
}

pub fn least_squares_map(pairs: &[EmbeddingPair], ridge: f64) -> Result<DMatrix<f64>> {
    let (x, y) = stack_pairs(pairs)?;
    let d = x.ncols();
    let gram = x.transpose() * &x + DMatrix::<f64>::identity(d, d) * ridge;
    let cholesky = gram
        .cholesky()
        .ok_or_else(|| anyhow!("XᵀX + {ridge}·I is not positive definite; raise the ridge"))?;
    Ok(cholesky.solve(&(x.transpose() * &y)))
}

/// Best orthogonal map between the centred clouds, plus the translation
/// that maps the source mean onto the target mean.
pub fn procrustes(pairs: &[EmbeddingPair]) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let (x, y) = stack_pairs(pairs)?;
    let (mx, my) = (column_mean(&x)?, column_mean(&y)?);
    let xc = center(&x, &mx);
    let yc = center(&y, &my);

    let rotation = polar_factor(&(xc.transpose() * &yc))?;
    let translation = &my - (mx.transpose() * &rotation).transpose();
    Ok((rotation, translation))
}

fn center(m: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] - mean[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::word_pair::WordPair;
    use crate::ml::linalg::orthogonality_error;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn embedding_pair(i: usize, x: &[f64], y: &[f64]) -> EmbeddingPair {
        EmbeddingPair {
            pair:      WordPair::new(format!("s{i}"), format!("t{i}")),
            source_id: i as u32,
            target_id: i as u32,
            source:    x.iter().map(|&v| v as f32).collect(),
            target:    y.iter().map(|&v| v as f32).collect(),
        }
    }

    fn pairs_from(f: impl Fn(&DVector<f64>) -> DVector<f64>, n: usize) -> Vec<EmbeddingPair> {
        let mut rng = StdRng::seed_from_u64(17);
        (0..n)
            .map(|i| {
                let x = DVector::from_fn(3, |_, _| rng.gen_range(-1.0..1.0));
                embedding_pair(i, x.as_slice(), f(&x).as_slice())
            })
            .collect()
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_mean_difference_recovers_shift() {
        let shift = DVector::from_vec(vec![0.5, -1.0, 2.0]);
        let pairs = pairs_from(|x| x + &shift, 30);
        let t = mean_difference(&pairs).unwrap();
        assert_close(t.as_slice(), shift.as_slice(), 1e-5);
    }

    #[test]
    fn test_least_squares_recovers_linear_map() {
        let w = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.0, 0.0, 1.0, -1.0, 0.5, 0.0, 3.0]);
        let pairs = pairs_from(|x| (x.transpose() * &w).transpose(), 40);
        let fitted = least_squares_map(&pairs, 1e-9).unwrap();
        assert!((fitted - w).amax() < 1e-3);
    }

    #[test]
    fn test_procrustes_recovers_rotation_and_translation() {
        let (s, c) = (0.6f64, 0.8f64);
        let r = DMatrix::from_row_slice(3, 3, &[c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0]);
        let t = DVector::from_vec(vec![1.0, 0.0, -0.5]);
        let pairs = pairs_from(|x| (x.transpose() * &r).transpose() + &t, 40);

        let (rotation, translation) = procrustes(&pairs).unwrap();
        assert!((rotation - r).amax() < 1e-4);
        assert_close(translation.as_slice(), t.as_slice(), 1e-4);
    }

    #[test]
    fn test_procrustes_with_fewer_pairs_than_dimensions() {
        // 3 pairs in 5 dims: XcᵀYc has rank 2, but a cyclic shift of the
        // coordinates maps every source exactly onto its target
        let sources = [
            [1.0, 0.2, -0.5, 0.0, 0.3],
            [0.0, 1.0, 0.4, -0.2, 0.1],
            [-0.3, 0.1, 1.0, 0.6, -0.4],
        ];
        let pairs: Vec<EmbeddingPair> = sources
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let y: Vec<f64> = (0..5).map(|j| x[(j + 4) % 5]).collect();
                embedding_pair(i, x, &y)
            })
            .collect();

        let (rotation, translation) = procrustes(&pairs).unwrap();
        assert!(orthogonality_error(&rotation) < 1e-8);
        for p in &pairs {
            let x = DVector::from_iterator(5, p.source.iter().map(|&v| f64::from(v)));
            let mapped = (x.transpose() * &rotation).transpose() + &translation;
            let target: Vec<f64> = p.target.iter().map(|&v| f64::from(v)).collect();
            assert_close(mapped.as_slice(), &target, 1e-5);
        }
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(mean_difference(&[]).is_err());
        assert!(least_squares_map(&[], DEFAULT_RIDGE).is_err());
        assert!(procrustes(&[]).is_err());
    }
}
