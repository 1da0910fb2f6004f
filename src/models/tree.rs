use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    /// Gini impurity over 0/1 targets
    Gini,
    /// Mean squared deviation from the node mean
    Variance,
}

impl Criterion {
    fn impurity(self, stats: &NodeStats) -> f64 {
        if stats.count == 0.0 {
            return 0.0;
        }
        let mean = stats.sum / stats.count;
        match self {
            Self::Gini => 2.0 * mean * (1.0 - mean),
            Self::Variance => (stats.sum_sq / stats.count - mean * mean).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered at each split
    pub max_features: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary CART tree stored as a flat node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Weighted impurity decrease per feature, not normalized
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    count: f64,
    sum: f64,
    sum_sq: f64,
}

impl NodeStats {
    fn add(&mut self, y: f64) {
        self.count += 1.0;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn minus(self, other: Self) -> Self {
        Self {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

struct PendingNode {
    slot: usize,
    samples: Vec<usize>,
    depth: usize,
}

impl DecisionTree {
    /// Grows a tree on the rows of `x` listed in `samples` (duplicates allowed,
    /// as produced by bootstrap sampling).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        samples: Vec<usize>,
        criterion: Criterion,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut tree = Self {
            nodes: vec![Node::Leaf { value: 0.0 }],
            importances: vec![0.0; n_features],
        };

        let mut pending = vec![PendingNode {
            slot: 0,
            samples,
            depth: 0,
        }];

        while let Some(node) = pending.pop() {
            let stats = collect_stats(y, &node.samples);
            let impurity = criterion.impurity(&stats);
            let value = if stats.count > 0.0 {
                stats.sum / stats.count
            } else {
                0.0
            };

            let can_split = node.samples.len() >= params.min_samples_split.max(2)
                && params.max_depth.map_or(true, |max| node.depth < max)
                && impurity > MIN_IMPURITY_DECREASE;

            let best = if can_split {
                find_best_split(x, y, &node.samples, &stats, criterion, params, rng)
            } else {
                None
            };

            let Some(best) = best else {
                tree.nodes[node.slot] = Node::Leaf { value };
                continue;
            };

            tree.importances[best.feature] += best.decrease;

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = node
                .samples
                .iter()
                .partition(|&&idx| x[idx][best.feature] <= best.threshold);

            let left = tree.nodes.len();
            let right = left + 1;
            tree.nodes.push(Node::Leaf { value });
            tree.nodes.push(Node::Leaf { value });
            tree.nodes[node.slot] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left,
                right,
            };

            pending.push(PendingNode {
                slot: left,
                samples: left_samples,
                depth: node.depth + 1,
            });
            pending.push(PendingNode {
                slot: right,
                samples: right_samples,
                depth: node.depth + 1,
            });
        }

        tree
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn collect_stats(y: &[f64], samples: &[usize]) -> NodeStats {
    let mut stats = NodeStats::default();
    for &idx in samples {
        stats.add(y[idx]);
    }
    stats
}

#[allow(clippy::cast_precision_loss)]
fn find_best_split(
    x: &[Vec<f64>],
    y: &[f64],
    samples: &[usize],
    parent: &NodeStats,
    criterion: Criterion,
    params: TreeParams,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let n_features = x.first().map_or(0, Vec::len);
    if n_features == 0 {
        return None;
    }

    // Constant features do not count towards max_features, so keep drawing
    // from a full permutation until enough usable ones were examined.
    let k = params.max_features.clamp(1, n_features);
    let candidates = rand::seq::index::sample(rng, n_features, n_features).into_vec();

    let parent_weighted = parent.count * criterion.impurity(parent);
    let min_leaf = params.min_samples_leaf.max(1);
    let mut best: Option<BestSplit> = None;
    let mut order = samples.to_vec();
    let mut examined = 0;

    for feature in candidates {
        if examined == k {
            break;
        }

        order.sort_by(|&a, &b| super::cmp_f64(x[a][feature], x[b][feature]));
        let first = x[order[0]][feature];
        let last = x[order[order.len() - 1]][feature];
        if first >= last {
            continue;
        }
        examined += 1;

        let mut left = NodeStats::default();
        for pos in 0..order.len() - 1 {
            left.add(y[order[pos]]);

            let current = x[order[pos]][feature];
            let next = x[order[pos + 1]][feature];
            if current >= next {
                continue;
            }

            let left_len = pos + 1;
            let right_len = order.len() - left_len;
            if left_len < min_leaf || right_len < min_leaf {
                continue;
            }

            let right = parent.minus(left);
            let children_weighted =
                left.count * criterion.impurity(&left) + right.count * criterion.impurity(&right);
            let decrease = parent_weighted - children_weighted;

            if decrease > MIN_IMPURITY_DECREASE
                && best.as_ref().map_or(true, |b| decrease > b.decrease)
            {
                best = Some(BestSplit {
                    feature,
                    threshold: current + (next - current) / 2.0,
                    decrease,
                });
            }
        }
    }

    best
}
