use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a shuffled train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Shuffles `0..len` with a seeded generator and reserves
    /// `ceil(len * test_fraction)` indices for testing. At least one row is
    /// always kept for training.
    pub fn shuffled(len: usize, test_fraction: f64, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let test_len = ((len as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
        let test_len = test_len.min(len.saturating_sub(1));

        let train = indices.split_off(test_len);
        Self {
            train,
            test: indices,
        }
    }
}

/// Clones the items at `indices`.
pub fn take<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&idx| items[idx].clone()).collect()
}
