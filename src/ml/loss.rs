// ============================================================
// Layer 5: Loss Functions
// ============================================================
// Four interchangeable objectives over (prediction, target)
// batches of shape [batch, d_model]. All return a 1-element
// tensor so `.backward()` can be called on the result.
//
//   cos_sim     −mean(cos(p, t))
//   l1_cos_sim  cos_sim + λ · mean|p − t|
//   l2_cos_sim  cos_sim + λ · mean((p − t)²)
//   mse_loss    mean((p − t)²)

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
};

use crate::domain::kinds::LossKind;

const COS_EPS: f64 = 1e-8;
pub const DEFAULT_LAMBDA: f64 = 0.5;

/// Row-wise cosine similarity: [batch, d] × [batch, d] → [batch, 1]
pub fn cosine_similarity<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let dot = (a.clone() * b.clone()).sum_dim(1);
    let norm_a = a.powf_scalar(2.0).sum_dim(1).sqrt();
    let norm_b = b.powf_scalar(2.0).sum_dim(1).sqrt();
    dot / (norm_a * norm_b).clamp_min(COS_EPS)
}

/// A configured loss: the kind plus the weight of its distance term.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingLoss {
    pub kind:   LossKind,
    pub lambda: f64,
}

impl EmbeddingLoss {
    pub fn new(kind: LossKind) -> Self {
        Self { kind, lambda: DEFAULT_LAMBDA }
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        match self.kind {
            LossKind::CosSim => cosine_loss(predictions, targets),
            LossKind::L1CosSim => {
                let l1 = (predictions.clone() - targets.clone()).abs().mean();
                cosine_loss(predictions, targets) + l1 * self.lambda
            }
            LossKind::L2CosSim => {
                let l2 = mse(predictions.clone(), targets.clone());
                cosine_loss(predictions, targets) + l2 * self.lambda
            }
            LossKind::Mse => mse(predictions, targets),
        }
    }
}

fn cosine_loss<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    cosine_similarity(predictions, targets).mean().neg()
}

fn mse<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    MseLoss::new().forward(predictions, targets, Reduction::Mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    fn random(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::random([8, 5], Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_cosine_loss_of_identical_inputs_is_minus_one() {
        let device = Default::default();
        let x = random(&device);
        let loss = EmbeddingLoss::new(LossKind::CosSim).forward(x.clone(), x);
        assert!((scalar(loss) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_loss_of_opposite_inputs_is_plus_one() {
        let device = Default::default();
        let x = random(&device);
        let loss = EmbeddingLoss::new(LossKind::CosSim).forward(x.clone(), x.neg());
        assert!((scalar(loss) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_loss_ignores_scale_but_not_direction() {
        let device = Default::default();
        let p = random(&device);
        let t = random(&device);
        let loss = EmbeddingLoss::new(LossKind::CosSim);
        let base = scalar(loss.forward(p.clone(), t.clone()));
        let scaled = scalar(loss.forward(p.clone() * 3.0, t.clone() * 0.25));
        assert!((base - scaled).abs() < 1e-5);

        let turned = scalar(loss.forward(p.clone(), t.clone() + p * 0.5));
        assert!((base - turned).abs() > 1e-3);
    }

    #[test]
    fn test_mse_matches_hand_computation() {
        let device = Default::default();
        let p = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let t = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [3.0, 2.0]], &device);
        // squared errors 0, 4, 0, 4 → mean 2
        let loss = EmbeddingLoss::new(LossKind::Mse).forward(p, t);
        assert!((scalar(loss) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_terms_are_weighted() {
        let device = Default::default();
        let p = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0]], &device);
        let t = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);
        // same direction → cos term −1; |p − t| mean = 0.5, squared mean = 0.5
        let l1 = EmbeddingLoss::new(LossKind::L1CosSim).with_lambda(2.0).forward(p.clone(), t.clone());
        let l2 = EmbeddingLoss::new(LossKind::L2CosSim).forward(p, t);
        assert!((scalar(l1) - 0.0).abs() < 1e-5);
        assert!((scalar(l2) + 0.75).abs() < 1e-5);
    }
}
