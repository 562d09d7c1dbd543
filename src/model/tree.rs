//! CART decision tree with weighted Gini impurity.
//!
//! Trees are grown on a sample index list (bootstrap draws may repeat an
//! index) and store nodes in a flat vector. A sample goes left when
//! `x[feature] <= threshold`.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of candidate features drawn at each split
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Weighted fraction of positive samples reaching this leaf
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted binary classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

/// Training data shared by every node of one tree.
pub(crate) struct TrainingView<'a> {
    pub rows: &'a [Vec<f64>],
    pub labels: &'a [bool],
    /// Weight of the negative and positive class
    pub class_weight: [f64; 2],
}

impl TrainingView<'_> {
    fn weight(&self, i: usize) -> f64 {
        self.class_weight[usize::from(self.labels[i])]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassTally {
    negative: f64,
    positive: f64,
    count: usize,
}

impl ClassTally {
    fn add(&mut self, label: bool, weight: f64) {
        if label {
            self.positive += weight;
        } else {
            self.negative += weight;
        }
        self.count += 1;
    }

    fn remove(&mut self, label: bool, weight: f64) {
        if label {
            self.positive -= weight;
        } else {
            self.negative -= weight;
        }
        self.count -= 1;
    }

    fn total(&self) -> f64 {
        self.negative + self.positive
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p = self.positive / total;
        let q = self.negative / total;
        1.0 - p * p - q * q
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity: w_left * gini_left + w_right * gini_right
    child_impurity: f64,
}

struct Builder<'a, 'b, R: Rng> {
    data: &'b TrainingView<'a>,
    params: TreeParams,
    rng: &'b mut R,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<R: Rng> Builder<'_, '_, R> {
    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let mut tally = ClassTally::default();
        for &i in &samples {
            tally.add(self.data.labels[i], self.data.weight(i));
        }

        let is_pure = tally.negative <= 0.0 || tally.positive <= 0.0;
        if depth >= self.params.max_depth || samples.len() < self.params.min_samples_split || is_pure {
            return self.leaf(&tally);
        }

        let Some(best) = self.best_split(&samples, &tally) else {
            return self.leaf(&tally);
        };

        self.importances[best.feature] += tally.total() * tally.gini() - best.child_impurity;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.data.rows[i][best.feature] <= best.threshold);

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { positive: 0.0 });
        let left_id = self.build(left, depth + 1);
        let right_id = self.build(right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn leaf(&mut self, tally: &ClassTally) -> usize {
        let total = tally.total();
        let positive = if total > 0.0 { tally.positive / total } else { 0.0 };
        self.nodes.push(Node::Leaf { positive });
        self.nodes.len() - 1
    }

    fn best_split(&mut self, samples: &[usize], parent: &ClassTally) -> Option<BestSplit> {
        let n_features = self.importances.len();
        let k = self.params.max_features.clamp(1, n_features);
        let candidates = index::sample(&mut *self.rng, n_features, k).into_vec();
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<BestSplit> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(samples.len());

        for feature in candidates {
            sorted.clear();
            sorted.extend(samples.iter().map(|&i| (self.data.rows[i][feature], i)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = ClassTally::default();
            let mut right = *parent;
            for pos in 0..sorted.len() - 1 {
                let (value, i) = sorted[pos];
                let label = self.data.labels[i];
                let w = self.data.weight(i);
                left.add(label, w);
                right.remove(label, w);

                let next = sorted[pos + 1].0;
                if next <= value || left.count < min_leaf || right.count < min_leaf {
                    continue;
                }

                let child_impurity = left.total() * left.gini() + right.total() * right.gini();
                if best
                    .as_ref()
                    .map_or(true, |b| child_impurity < b.child_impurity)
                {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        child_impurity,
                    });
                }
            }
        }

        best
    }
}

impl DecisionTree {
    /// Grow a tree on `samples` (indices into `data.rows`).
    ///
    /// Adds the unnormalized impurity decrease of every split to
    /// `importances`, which must have one slot per feature.
    pub(crate) fn fit<R: Rng>(
        data: &TrainingView<'_>,
        samples: Vec<usize>,
        params: TreeParams,
        rng: &mut R,
        importances: &mut [f64],
    ) -> Self {
        let n_features = importances.len();
        let mut builder = Builder {
            data,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.build(samples, 0);

        for (acc, v) in importances.iter_mut().zip(&builder.importances) {
            *acc += v;
        }

        Self {
            nodes: builder.nodes,
            n_features,
        }
    }

    /// Positive-class probability of the leaf `row` falls into.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { positive } => return positive,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Structural validity of a deserialized tree.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { positive } => {
                    if !(0.0..=1.0).contains(&positive) {
                        return Err(format!("leaf {id} probability {positive} out of range"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // Children are always pushed after their parent, so this
                    // also rules out cycles.
                    if feature >= self.n_features
                        || !threshold.is_finite()
                        || left <= id
                        || right <= id
                        || left >= self.nodes.len()
                        || right >= self.nodes.len()
                    {
                        return Err(format!("split node {id} is malformed"));
                    }
                }
            }
        }
        Ok(())
    }
}
