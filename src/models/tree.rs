//! CART decision tree with Gini impurity

use crate::types::transaction::{FeatureVector, Label, LabeledSample, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    /// Candidate features drawn per split
    pub max_features: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: default_max_features(),
        }
    }
}

/// `max(1, floor(sqrt(n_features)))`
pub fn default_max_features() -> usize {
    ((FEATURE_COUNT as f64).sqrt() as usize).max(1)
}

/// Node in the flattened tree; children always sit after their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf {
        /// Training samples that reached this leaf, as `[legitimate, fraud]`
        counts: [u32; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the samples selected by `indices` (duplicates allowed).
    pub fn fit(
        samples: &[LabeledSample],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = TreeBuilder {
            samples,
            params,
            rng,
            nodes: Vec::new(),
        };
        builder.grow(indices, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Class with the most training samples in the reached leaf; a tie goes to legitimate.
    pub fn predict(&self, features: &FeatureVector) -> Label {
        let counts = self.leaf_counts(features);
        if counts[1] > counts[0] {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    fn leaf_counts(&self, features: &FeatureVector) -> [u32; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { counts } => return *counts,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features.get(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Structural check for trees that came from outside this process.
    ///
    /// Prediction walks from index 0 and only ever moves forward, so a tree
    /// that passes this check always terminates.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { counts } => {
                    if counts[0] == 0 && counts[1] == 0 {
                        return Err(format!("leaf {} has no samples", idx));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {} splits on unknown feature {}", idx, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {} points to invalid child {}", idx, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

struct TreeBuilder<'a> {
    samples: &'a [LabeledSample],
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let counts = self.class_counts(&indices);
        self.nodes.push(Node::Leaf { counts });

        let pure = counts[0] == 0 || counts[1] == 0;
        let too_deep = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || too_deep || indices.len() < self.params.min_samples_split {
            return id;
        }

        let Some(split) = self.best_split(&indices, counts) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.samples[i].features.get(split.feature) <= split.threshold);

        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn class_counts(&self, indices: &[usize]) -> [u32; 2] {
        let mut counts = [0u32; 2];
        for &i in indices {
            counts[self.samples[i].label.index()] += 1;
        }
        counts
    }

    /// Draws `max_features` candidates; keeps looking at the rest only while nothing splits.
    fn best_split(&mut self, indices: &[usize], parent: [u32; 2]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(indices, feature, parent) {
                if best.map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_split_on(
        &self,
        indices: &[usize],
        feature: usize,
        parent: [u32; 2],
    ) -> Option<SplitCandidate> {
        let mut sorted: Vec<(f64, Label)> = indices
            .iter()
            .map(|&i| (self.samples[i].features.get(feature), self.samples[i].label))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut left = [0u32; 2];
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n.saturating_sub(1) {
            left[sorted[i].1.index()] += 1;

            let (lo, hi) = (sorted[i].0, sorted[i + 1].0);
            if lo == hi {
                continue;
            }
            let left_n = i + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let right = [parent[0] - left[0], parent[1] - left[1]];
            let impurity =
                (left_n as f64 * gini(left) + right_n as f64 * gini(right)) / n as f64;

            if best.map_or(true, |b| impurity < b.impurity) {
                let mut threshold = lo + (hi - lo) / 2.0;
                // midpoint of adjacent floats can round up onto `hi`
                if threshold >= hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }

        best
    }
}

fn gini(counts: [u32; 2]) -> f64 {
    let total = (counts[0] + counts[1]) as f64;
    if total == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / total;
    let p1 = counts[1] as f64 / total;
    1.0 - p0 * p0 - p1 * p1
}
