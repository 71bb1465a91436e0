// ============================================================
// Layer 5: Geometric Transform Modules (Burn)
// ============================================================
// Every transform maps a batch of embeddings [batch, d_model] to
// a batch of the same shape. They all share one capability, the
// EmbeddingTransform trait, so the trainer and evaluator are
// written once and monomorphised per variant.
//
// Families:
//   IdentityTransform       x
//   LinearTransform         x W (+ b), optionally uncentered: (x + c) W − c
//   TranslationTransform    x + t
//   RotationTransform       x R (+ b), optionally uncentered: (x + c) R − c
//   ManualMatMul            x M          (fixed)
//   ManualRotateTranslate   x R + t      (fixed)
//   ManualMatAdd            x + v        (fixed)
//
// Every family takes an `apply_ln` flag that normalises each
// output row to zero mean and unit variance (no affine terms).
//
// Rotations are parameterised as R = B · exp(G − Gᵀ):
//   - G − Gᵀ is skew-symmetric, so exp(G − Gᵀ) is orthogonal with
//     determinant +1 for any G, and gradient steps on G never leave
//     the rotation group
//   - B is a frozen random orthogonal base, the sign-corrected Q of
//     a Gaussian sample's QR. Such bases have det = ±1 with equal
//     odds; bases with det < 0 are rejected and re-drawn, at most
//     MAX_ROTATION_ATTEMPTS times
//
// Reference: Burn Book §3 (Building Blocks)
//            Lezcano-Casado & Martínez-Rubio (2019), cheap orthogonal constraints

use anyhow::{bail, Result};
use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::Distribution,
};
use nalgebra::DMatrix;

use crate::ml::linalg::{determinant, haar_orthogonal, matrix_to_tensor, tensor_to_matrix};

pub const LN_EPS: f64 = 1e-5;
pub const MAX_ROTATION_ATTEMPTS: usize = 64;

// Taylor terms for exp() after scaling the argument below EXPM_SCALE
const EXPM_TERMS: usize = 12;
const EXPM_SCALE: f64 = 0.5;

// ─── EmbeddingTransform ───────────────────────────────────────────────────────
/// A map from a batch of embeddings to a batch of embeddings.
pub trait EmbeddingTransform<B: Backend> {
    /// x: [batch, d_model] → [batch, d_model]
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2>;

    /// The matrix part of the map (W, R or M), if the family has one.
    fn linear_part(&self) -> Option<Tensor<B, 2>> {
        None
    }
}

/// Normalise each row to zero mean and unit variance.
pub fn layer_norm<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let mean = x.clone().mean_dim(1);
    let centered = x - mean;
    let var = centered.clone().powf_scalar(2.0).mean_dim(1);
    centered / (var + LN_EPS).sqrt()
}

fn finish<B: Backend>(x: Tensor<B, 2>, apply_ln: bool) -> Tensor<B, 2> {
    if apply_ln { layer_norm(x) } else { x }
}

fn row<B: Backend>(v: Tensor<B, 1>) -> Tensor<B, 2> {
    v.unsqueeze::<2>()
}

/// Trainable vector initialised like a linear layer's bias: U(−1/√d, 1/√d).
fn uniform_vector<B: Backend>(d_model: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    let bound = 1.0 / (d_model as f64).sqrt();
    Param::from_tensor(Tensor::random([d_model], Distribution::Uniform(-bound, bound), device))
}

fn frozen<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Param<Tensor<B, D>> {
    Param::from_tensor(tensor).set_require_grad(false)
}

// ─── Config ───────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TransformConfig {
    pub d_model: usize,
    #[config(default = false)]
    pub apply_ln: bool,
}

impl TransformConfig {
    pub fn init_identity(&self) -> IdentityTransform {
        IdentityTransform { apply_ln: self.apply_ln }
    }

    pub fn init_linear<B: Backend>(
        &self,
        bias:       bool,
        uncentered: bool,
        device:     &B::Device,
    ) -> LinearTransform<B> {
        let linear = LinearConfig::new(self.d_model, self.d_model)
            .with_bias(bias)
            .init(device);
        let center = uncentered.then(|| uniform_vector(self.d_model, device));
        LinearTransform { linear, center, apply_ln: self.apply_ln }
    }

    pub fn init_translation<B: Backend>(&self, device: &B::Device) -> TranslationTransform<B> {
        TranslationTransform {
            translation: Param::from_tensor(Tensor::zeros([self.d_model], device)),
            apply_ln:    self.apply_ln,
        }
    }

    /// Rotation with a random proper base drawn from the backend RNG.
    pub fn init_rotation<B: Backend>(
        &self,
        bias:       bool,
        uncentered: bool,
        device:     &B::Device,
    ) -> Result<RotationTransform<B>> {
        let d = self.d_model;
        let base = sample_proper_rotation(MAX_ROTATION_ATTEMPTS, || {
            tensor_to_matrix(Tensor::<B, 2>::random([d, d], Distribution::Normal(0.0, 1.0), device))
        })?;
        Ok(self.init_rotation_with_base(&base, bias, uncentered, device))
    }

    pub fn init_rotation_with_base<B: Backend>(
        &self,
        base:       &DMatrix<f64>,
        bias:       bool,
        uncentered: bool,
        device:     &B::Device,
    ) -> RotationTransform<B> {
        let d = self.d_model;
        RotationTransform {
            generator: Param::from_tensor(Tensor::zeros([d, d], device)),
            base:      frozen(matrix_to_tensor(base, device)),
            bias:      bias.then(|| uniform_vector(d, device)),
            center:    uncentered.then(|| uniform_vector(d, device)),
            apply_ln:  self.apply_ln,
        }
    }

    pub fn init_mat_mul<B: Backend>(&self, matrix: Tensor<B, 2>) -> ManualMatMul<B> {
        ManualMatMul { matrix: frozen(matrix), apply_ln: self.apply_ln }
    }

    pub fn init_rotate_translate<B: Backend>(
        &self,
        rotation:    Tensor<B, 2>,
        translation: Tensor<B, 1>,
    ) -> ManualRotateTranslate<B> {
        ManualRotateTranslate {
            rotation:    frozen(rotation),
            translation: frozen(translation),
            apply_ln:    self.apply_ln,
        }
    }

    pub fn init_mat_add<B: Backend>(&self, offset: Tensor<B, 1>) -> ManualMatAdd<B> {
        ManualMatAdd { offset: frozen(offset), apply_ln: self.apply_ln }
    }
}

/// Draw orthogonal bases until one has a positive determinant.
///
/// `sample` produces a raw square matrix; its QR factor is kept only if
/// it is a proper rotation. Fails after `max_attempts` rejections.
pub fn sample_proper_rotation<F>(max_attempts: usize, mut sample: F) -> Result<DMatrix<f64>>
where
    F: FnMut() -> Result<DMatrix<f64>>,
{
    for attempt in 1..=max_attempts {
        let q = haar_orthogonal(sample()?)?;
        let det = determinant(&q);
        if det > 0.0 {
            tracing::debug!("Proper rotation base found on attempt {}", attempt);
            return Ok(q);
        }
        tracing::debug!("Attempt {}: base has det {:.3}, resampling", attempt, det);
    }
    bail!("no rotation base with positive determinant after {max_attempts} attempts")
}

/// exp(A) by scaling and squaring with a truncated Taylor series.
/// Built from matmuls only, so it is differentiable in A.
pub fn matrix_exp<B: Backend>(a: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, _] = a.dims();
    let device = a.device();

    let norm: f64 = a.clone().powf_scalar(2.0).sum().sqrt().into_scalar().elem();
    let squarings = if norm > EXPM_SCALE {
        (norm / EXPM_SCALE).log2().ceil() as i32
    } else {
        0
    };
    let scaled = a / 2f64.powi(squarings);

    let eye = Tensor::<B, 2>::eye(n, &device);
    let mut term = eye.clone();
    let mut sum = eye;
    for k in 1..=EXPM_TERMS {
        term = term.matmul(scaled.clone()) / k as f64;
        sum = sum + term.clone();
    }
    for _ in 0..squarings {
        sum = sum.clone().matmul(sum);
    }
    sum
}

// ─── Identity ─────────────────────────────────────────────────────────────────
#[derive(Module, Clone, Debug)]
pub struct IdentityTransform {
    pub apply_ln: bool,
}

impl<B: Backend> EmbeddingTransform<B> for IdentityTransform {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        finish(x, self.apply_ln)
    }
}

// ─── Linear map ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LinearTransform<B: Backend> {
    pub linear:   Linear<B>,
    pub center:   Option<Param<Tensor<B, 1>>>,
    pub apply_ln: bool,
}

impl<B: Backend> EmbeddingTransform<B> for LinearTransform<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let y = match &self.center {
            Some(center) => {
                let c = row(center.val());
                self.linear.forward(x + c.clone()) - c
            }
            None => self.linear.forward(x),
        };
        finish(y, self.apply_ln)
    }

    fn linear_part(&self) -> Option<Tensor<B, 2>> {
        Some(self.linear.weight.val())
    }
}

// ─── Translation ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TranslationTransform<B: Backend> {
    pub translation: Param<Tensor<B, 1>>,
    pub apply_ln:    bool,
}

impl<B: Backend> EmbeddingTransform<B> for TranslationTransform<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        finish(x + row(self.translation.val()), self.apply_ln)
    }
}

// ─── Rotation ─────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct RotationTransform<B: Backend> {
    pub generator: Param<Tensor<B, 2>>,
    pub base:      Param<Tensor<B, 2>>,
    pub bias:      Option<Param<Tensor<B, 1>>>,
    pub center:    Option<Param<Tensor<B, 1>>>,
    pub apply_ln:  bool,
}

impl<B: Backend> RotationTransform<B> {
    /// R = B · exp(G − Gᵀ)
    pub fn rotation(&self) -> Tensor<B, 2> {
        let g = self.generator.val();
        let skew = g.clone() - g.transpose();
        self.base.val().matmul(matrix_exp(skew))
    }
}

impl<B: Backend> EmbeddingTransform<B> for RotationTransform<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let r = self.rotation();
        let mut y = match &self.center {
            Some(center) => {
                let c = row(center.val());
                (x + c.clone()).matmul(r) - c
            }
            None => x.matmul(r),
        };
        if let Some(bias) = &self.bias {
            y = y + row(bias.val());
        }
        finish(y, self.apply_ln)
    }

    fn linear_part(&self) -> Option<Tensor<B, 2>> {
        Some(self.rotation())
    }
}

// ─── Manual (fixed) transforms ────────────────────────────────────────────────
// Closed-form baselines. Their parameters are frozen; the optimiser
// never sees them.

#[derive(Module, Debug)]
pub struct ManualMatMul<B: Backend> {
    pub matrix:   Param<Tensor<B, 2>>,
    pub apply_ln: bool,
}

impl<B: Backend> EmbeddingTransform<B> for ManualMatMul<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        finish(x.matmul(self.matrix.val()), self.apply_ln)
    }

    fn linear_part(&self) -> Option<Tensor<B, 2>> {
        Some(self.matrix.val())
    }
}

#[derive(Module, Debug)]
pub struct ManualRotateTranslate<B: Backend> {
    pub rotation:    Param<Tensor<B, 2>>,
    pub translation: Param<Tensor<B, 1>>,
    pub apply_ln:    bool,
}

impl<B: Backend> EmbeddingTransform<B> for ManualRotateTranslate<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let y = x.matmul(self.rotation.val()) + row(self.translation.val());
        finish(y, self.apply_ln)
    }

    fn linear_part(&self) -> Option<Tensor<B, 2>> {
        Some(self.rotation.val())
    }
}

#[derive(Module, Debug)]
pub struct ManualMatAdd<B: Backend> {
    pub offset:   Param<Tensor<B, 1>>,
    pub apply_ln: bool,
}

impl<B: Backend> EmbeddingTransform<B> for ManualMatAdd<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        finish(x + row(self.offset.val()), self.apply_ln)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::linalg::orthogonality_error;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    const D: usize = 6;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    fn batch() -> Tensor<TestBackend, 2> {
        Tensor::random([4, D], Distribution::Normal(0.0, 1.0), &device())
    }

    fn max_abs_diff(a: Tensor<TestBackend, 2>, b: Tensor<TestBackend, 2>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn test_identity_passes_input_through() {
        let t = TransformConfig::new(D).init_identity();
        let x = batch();
        let y = EmbeddingTransform::<TestBackend>::forward(&t, x.clone());
        assert_eq!(max_abs_diff(x, y), 0.0);
    }

    #[test]
    fn test_layer_norm_gives_zero_mean_unit_variance() {
        let t = TransformConfig::new(D).with_apply_ln(true).init_identity();
        let x = batch() * 5.0 + 3.0;
        let y = EmbeddingTransform::<TestBackend>::forward(&t, x);
        let mean = y.clone().mean_dim(1).abs().max().into_scalar();
        let var = y.clone().powf_scalar(2.0).mean_dim(1);
        assert!(mean < 1e-5);
        assert!((var - 1.0).abs().max().into_scalar() < 1e-3);
        assert_eq!(y.dims(), [4, D]);
    }

    #[test]
    fn test_rotation_is_proper_and_orthogonal() {
        let t = TransformConfig::new(D)
            .init_rotation::<TestBackend>(false, false, &device())
            .unwrap();
        let r = tensor_to_matrix(t.rotation()).unwrap();
        assert!(orthogonality_error(&r) < 1e-4);
        assert!((determinant(&r) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rotation_stays_orthogonal_for_any_generator() {
        let device = device();
        let mut t = TransformConfig::new(D).init_rotation::<TestBackend>(false, false, &device).unwrap();
        t.generator = Param::from_tensor(
            Tensor::random([D, D], Distribution::Normal(0.0, 2.0), &device),
        );
        let r = tensor_to_matrix(t.rotation()).unwrap();
        assert!(orthogonality_error(&r) < 1e-3);
        assert!((determinant(&r) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rotation_preserves_norms() {
        let t = TransformConfig::new(D)
            .init_rotation::<TestBackend>(false, false, &device())
            .unwrap();
        let x = batch();
        let y = t.forward(x.clone());
        let nx = x.powf_scalar(2.0).sum_dim(1);
        let ny = y.powf_scalar(2.0).sum_dim(1);
        assert!(max_abs_diff(nx, ny) < 1e-3);
    }

    #[test]
    fn test_uncentered_rotation_is_shifted_rotation() {
        let t = TransformConfig::new(D)
            .init_rotation::<TestBackend>(false, true, &device())
            .unwrap();
        let c = row(t.center.as_ref().unwrap().val());
        let x = batch();
        let expected = (x.clone() + c.clone()).matmul(t.rotation()) - c;
        assert!(max_abs_diff(t.forward(x), expected) < 1e-5);
    }

    #[test]
    fn test_uncentered_linear_is_shifted_linear() {
        let t = TransformConfig::new(D).init_linear::<TestBackend>(false, true, &device());
        let c = row(t.center.as_ref().unwrap().val());
        let x = batch();
        let expected = t.linear.forward(x.clone() + c.clone()) - c;
        assert!(max_abs_diff(t.forward(x), expected) < 1e-5);
    }

    #[test]
    fn test_translation_starts_as_identity() {
        let t = TransformConfig::new(D).init_translation::<TestBackend>(&device());
        let x = batch();
        assert_eq!(max_abs_diff(t.forward(x.clone()), x), 0.0);
    }

    #[test]
    fn test_manual_rotate_translate() {
        let device = device();
        let cfg = TransformConfig::new(2);
        let rot = matrix_to_tensor::<TestBackend>(&DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]), &device);
        let t = cfg.init_rotate_translate(rot, Tensor::from_floats([1.0, 2.0], &device));
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);
        // [1, 0] · R = [0, 1], then + [1, 2]
        let expected = Tensor::<TestBackend, 2>::from_floats([[1.0, 3.0]], &device);
        assert!(max_abs_diff(t.forward(x), expected) < 1e-6);
    }

    #[test]
    fn test_rejection_sampling_is_bounded() {
        let mut calls = 0;
        let result = sample_proper_rotation(5, || {
            calls += 1;
            Ok(DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]))
        });
        assert!(result.is_err());
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_rejection_sampling_accepts_first_proper_base() {
        let mut calls = 0;
        let q = sample_proper_rotation(5, || {
            calls += 1;
            if calls < 3 {
                Ok(DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]))
            } else {
                Ok(DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]))
            }
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert!(determinant(&q) > 0.0);
    }

    #[test]
    fn test_matrix_exp_of_zero_is_identity() {
        let device = device();
        let e = matrix_exp(Tensor::<TestBackend, 2>::zeros([3, 3], &device));
        assert!(max_abs_diff(e, Tensor::eye(3, &device)) < 1e-6);
    }
}
