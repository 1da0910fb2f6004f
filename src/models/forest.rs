use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, DecisionTree, TreeParams};
use super::{validate_matrix, Classifier, Regressor};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            seed: 42,
        }
    }
}

/// Bagged ensemble of CART trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Forest {
    params: ForestParams,
    criterion: Criterion,
    trees: Vec<DecisionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl Forest {
    fn new(params: ForestParams, criterion: Criterion) -> Self {
        Self {
            params,
            criterion,
            trees: Vec::new(),
            n_features: 0,
            importances: Vec::new(),
        }
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64], max_features: fn(usize) -> usize) -> Result<()> {
        let n_features = validate_matrix(x, y.len())?;
        let n_samples = x.len();
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: max_features(n_features),
        };

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let trees: Vec<DecisionTree> = (0..self.params.n_estimators.max(1))
            .map(|_| {
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();
                DecisionTree::fit(x, y, bootstrap, self.criterion, tree_params, &mut rng)
            })
            .collect();

        self.importances = average_importances(&trees, n_features);
        self.trees = trees;
        self.n_features = n_features;

        log::debug!(
            "Fitted forest of {} trees over {n_samples} samples and {n_features} features",
            self.trees.len()
        );

        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict_value(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        total / self.trees.len() as f64
    }
}

/// Per-tree importances normalized to 1, averaged, then renormalized.
#[allow(clippy::cast_precision_loss)]
fn average_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut totals = vec![0.0; n_features];

    for tree in trees {
        let raw = tree.raw_importances();
        let sum: f64 = raw.iter().sum();
        if sum > 0.0 {
            for (total, value) in totals.iter_mut().zip(raw) {
                *total += value / sum;
            }
        }
    }

    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        for total in &mut totals {
            *total /= sum;
        }
    }
    totals
}

fn sqrt_features(n_features: usize) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let k = (n_features as f64).sqrt().floor() as usize;
    k.max(1)
}

fn all_features(n_features: usize) -> usize {
    n_features
}

/// Success/failure classifier: Gini trees over `sqrt(n_features)` candidate
/// features per split; predictions average leaf probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    forest: Forest,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParams) -> Self {
        Self {
            forest: Forest::new(params, Criterion::Gini),
        }
    }

    /// Probability of label 1 for each row.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.forest.predict_value(row)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.forest.n_features
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<()> {
        let targets: Vec<f64> = y.iter().map(|&label| f64::from(label.min(1))).collect();
        self.forest.fit(x, &targets, sqrt_features)
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<u8> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect()
    }
}

/// Variance-reduction forest; every feature is considered at each split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    forest: Forest,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            forest: Forest::new(params, Criterion::Variance),
        }
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        self.forest.fit(x, y, all_features)
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.forest.predict_value(row)).collect()
    }

    fn feature_importances(&self) -> &[f64] {
        &self.forest.importances
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::RuncastError;
    use crate::models::accuracy;

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 15,
            max_depth: None,
            seed: 42,
        }
    }

    /// Label is 1 when the execution time (column 1) is under 60s.
    fn separable_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let x: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![f64::from(i % 3), f64::from(i * 2)])
            .collect();
        let y: Vec<u8> = (0..80).map(|i| u8::from(i * 2 < 60)).collect();
        (x, y)
    }

    #[test]
    fn test_classifier_learns_separable_data() {
        let (x, y) = separable_data();
        let mut model = RandomForestClassifier::new(small_params());

        model.fit(&x, &y).unwrap();
        let predictions = model.predict(&x);

        assert!(accuracy(&y, &predictions) > 0.95);
        assert_eq!(model.predict(&[vec![0.0, 4.0]]), vec![1]);
        assert_eq!(model.predict(&[vec![0.0, 150.0]]), vec![0]);
    }

    #[test]
    fn test_classifier_probabilities_are_bounded() {
        let (x, y) = separable_data();
        let mut model = RandomForestClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        assert!(model
            .predict_proba(&x)
            .iter()
            .all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = separable_data();
        let mut first = RandomForestClassifier::new(small_params());
        let mut second = RandomForestClassifier::new(small_params());
        first.fit(&x, &y).unwrap();
        second.fit(&x, &y).unwrap();

        let probe: Vec<Vec<f64>> = (0..40).map(|i| vec![1.0, f64::from(i * 3)]).collect();
        assert_eq!(first.predict_proba(&probe), second.predict_proba(&probe));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let mut model = RandomForestClassifier::new(small_params());

        assert!(matches!(
            model.fit(&[], &[]),
            Err(RuncastError::InsufficientData(_))
        ));
        assert!(matches!(
            model.fit(&[vec![1.0], vec![2.0]], &[1]),
            Err(RuncastError::Model(_))
        ));
        assert!(matches!(
            model.fit(&[vec![1.0], vec![2.0, 3.0]], &[1, 0]),
            Err(RuncastError::Model(_))
        ));
    }

    #[test]
    fn test_regressor_importances_sum_to_one() {
        // Target depends only on feature 1
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![f64::from(i % 2), f64::from(i % 5), 1.0])
            .collect();
        let y: Vec<f64> = (0..60).map(|i| f64::from(i % 5) * 100.0).collect();
        let mut model = RandomForestRegressor::new(small_params());

        model.fit(&x, &y).unwrap();
        let importances = model.feature_importances();

        assert_eq!(importances.len(), 3);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[1] > 0.9);
        assert_eq!(importances[2], 0.0);
    }

    #[test]
    fn test_regressor_predicts_target_levels() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i % 2)]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 10.0 } else { 300.0 }).collect();
        let mut model = RandomForestRegressor::new(small_params());

        model.fit(&x, &y).unwrap();
        let predictions = model.predict(&[vec![0.0], vec![1.0]]);

        assert!((predictions[0] - 10.0).abs() < 1e-9);
        assert!((predictions[1] - 300.0).abs() < 1e-9);
    }
}
