// ============================================================
// Layer 4: Train/Test Splitter
// ============================================================
// Shuffles embedding pairs with a seeded RNG and splits them into
// a training set (fits the transform) and a held-out test set
// (measures translation accuracy on words never trained on).
//
// The seed comes from the run config, so `evaluate` can rebuild
// exactly the test set a saved transform was scored on.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, test).
///
/// `train_fraction` is clamped into [0, 1]; 0.8 keeps 80% for training.
pub fn split_train_test<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;

    let test = samples.split_off(split_at.min(total));

    tracing::debug!(
        "Dataset split: {} train, {} test (seed {})",
        samples.len(),
        test.len(),
        seed,
    );

    (samples, test)
}
