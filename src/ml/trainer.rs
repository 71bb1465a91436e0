// ============================================================
// Layer 5: Training Loop
// ============================================================
// Plain mini-batch gradient descent for any trainable transform:
//
//   for each epoch:
//     for each shuffled train batch:
//       prediction = transform(source)
//       loss       = loss_fn(prediction, target)
//       backward, AdamW step, record loss
//     test loss on the held-out pairs (no autodiff)
//
// No early stopping, LR schedule or convergence check.
//
// Key Burn insight (same as any Burn training loop):
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - The test batcher must also use B::InnerBackend
//
// Reference: Burn Book §5
//            Loshchilov & Hutter (2019) Decoupled Weight Decay (AdamW)

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::EmbeddingBatcher,
    dataset::{EmbeddingPair, EmbeddingPairDataset},
};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::loss::EmbeddingLoss;
use crate::ml::transforms::EmbeddingTransform;

#[derive(Debug, Clone)]
pub struct FitConfig {
    pub epochs:           usize,
    pub lr:               f64,
    pub weight_decay:     f64,
    pub train_batch_size: usize,
    pub test_batch_size:  usize,
    pub seed:             u64,
    pub loss:             EmbeddingLoss,
}

/// Train `model` on `train`, scoring `test` after every epoch.
/// Returns the trained model and one EpochMetrics per epoch.
pub fn fit<B, M>(
    mut model: M,
    train:     &[EmbeddingPair],
    test:      &[EmbeddingPair],
    cfg:       &FitConfig,
    metrics:   Option<&MetricsLogger>,
    device:    &B::Device,
) -> Result<(M, Vec<EpochMetrics>)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EmbeddingTransform<B>,
    M::InnerModule: EmbeddingTransform<B::InnerBackend>,
{
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();

    let train_loader = DataLoaderBuilder::new(EmbeddingBatcher::<B>::new(device.clone()))
        .batch_size(cfg.train_batch_size.max(1))
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(EmbeddingPairDataset::new(train.to_vec()));

    let mut history = Vec::with_capacity(cfg.epochs);
    let mut best_test_loss = f64::INFINITY;

    for epoch in 1..=cfg.epochs {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in train_loader.iter() {
            let prediction = model.forward(batch.source);
            let loss = cfg.loss.forward(prediction, batch.target);

            loss_sum += loss.clone().into_scalar().elem::<f64>();
            batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let test_loss = mean_loss::<B::InnerBackend, _>(&model.valid(), test, &cfg.loss, cfg.test_batch_size, device);
        let m = EpochMetrics::new(epoch, train_loss, test_loss);

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | test_loss={:.4}",
            epoch, cfg.epochs, train_loss, test_loss,
        );
        if m.is_improvement(best_test_loss) {
            best_test_loss = test_loss;
            tracing::debug!("New best test loss {:.4} at epoch {}", test_loss, epoch);
        }
        if let Some(logger) = metrics {
            logger.log(&m)?;
        }
        history.push(m);
    }

    tracing::info!("Training complete after {} epochs", cfg.epochs);
    Ok((model, history))
}

/// Mean loss over `pairs`, weighted by batch size. NaN when empty.
pub fn mean_loss<B, M>(
    model:      &M,
    pairs:      &[EmbeddingPair],
    loss:       &EmbeddingLoss,
    batch_size: usize,
    device:     &B::Device,
) -> f64
where
    B: Backend,
    M: EmbeddingTransform<B>,
{
    use burn::data::dataloader::batcher::Batcher;

    if pairs.is_empty() {
        return f64::NAN;
    }
    let batcher = EmbeddingBatcher::<B>::new(device.clone());
    let mut weighted = 0.0f64;
    for chunk in pairs.chunks(batch_size.max(1)) {
        let batch = batcher.batch(chunk.to_vec());
        let value: f64 = loss
            .forward(model.forward(batch.source), batch.target)
            .into_scalar()
            .elem();
        weighted += value * chunk.len() as f64;
    }
    weighted / pairs.len() as f64
}
