//! Random-forest classifier for a binary presence label.
//!
//! Breiman's algorithm with the usual classification defaults:
//!   - each tree is grown on a bootstrap sample (n draws with replacement);
//!   - at every node `mtry = floor(sqrt(p))` candidate features are drawn;
//!   - the split maximising the Gini decrease is taken;
//!   - nodes are split until pure (minimum node size 1).
//!
//! Categorical features are split by ordering their levels on the
//! proportion of positives at the node and scanning the ordered levels like
//! a numeric feature, which finds the optimal subset split for two classes.
//!
//! Each tree draws from its own RNG stream derived from the master seed, so
//! the fitted forest does not depend on whether trees are grown in parallel.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Salt for the per-tree RNG streams.
const TREE_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

// ── Feature schema ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    Numeric,
    /// Values are indices into `levels`; an index outside it (a level unseen
    /// during training) always falls to the right branch.
    Categorical { levels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub trees: usize,
    /// Candidate features per split; `floor(sqrt(p))` when `None`.
    pub mtry: Option<usize>,
    pub min_node_size: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { trees: 500, mtry: None, min_node_size: 1 }
    }
}

// ── Trees ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Rule {
    /// Left when `x <= threshold`.
    Threshold(f64),
    /// Left when the level index is in the set.
    Levels(Vec<usize>),
}

impl Rule {
    fn goes_left(&self, x: f64) -> bool {
        match self {
            Rule::Threshold(t) => x <= *t,
            Rule::Levels(set) => x >= 0.0 && set.contains(&(x as usize)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf { positive: bool },
    Split { feature: usize, rule: Rule, left: usize, right: usize },
}

/// A fitted tree as a flat node list; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn vote(&self, row: &[f64]) -> bool {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { positive } => return *positive,
                Node::Split { feature, rule, left, right } => {
                    i = if rule.goes_left(row[*feature]) { *left } else { *right };
                }
            }
        }
    }
}

/// Gini impurity of a node holding `pos` positives out of `n`.
#[inline]
fn gini(pos: f64, n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let p = pos / n;
    2.0 * p * (1.0 - p)
}

struct Candidate {
    feature: usize,
    rule: Rule,
    /// n·G(parent) − n_L·G(L) − n_R·G(R)
    decrease: f64,
}

/// Best split of `idx` on one feature, if the feature varies at the node.
fn best_split(
    x: &[Vec<f64>],
    y: &[bool],
    idx: &[usize],
    feature: usize,
    kind: &FeatureKind,
    min_node_size: usize,
) -> Option<Candidate> {
    let n = idx.len() as f64;
    let pos = idx.iter().filter(|&&i| y[i]).count() as f64;
    let parent = n * gini(pos, n);

    // Ordered (key, label) pairs. For numeric features the key is the value;
    // for categorical ones it is the level's rank by positive proportion.
    let (order, level_rank): (Vec<(f64, bool)>, Option<Vec<usize>>) = match kind {
        FeatureKind::Numeric => {
            let mut v: Vec<(f64, bool)> = idx.iter().map(|&i| (x[i][feature], y[i])).collect();
            v.sort_by(|a, b| a.0.total_cmp(&b.0));
            (v, None)
        }
        FeatureKind::Categorical { levels } => {
            let mut counts = vec![(0usize, 0usize); levels.len() + 1];
            for &i in idx {
                let l = (x[i][feature] as usize).min(levels.len());
                counts[l].1 += 1;
                if y[i] {
                    counts[l].0 += 1;
                }
            }
            let mut present: Vec<usize> = (0..counts.len()).filter(|&l| counts[l].1 > 0).collect();
            present.sort_by(|&a, &b| {
                let pa = counts[a].0 as f64 / counts[a].1 as f64;
                let pb = counts[b].0 as f64 / counts[b].1 as f64;
                pa.total_cmp(&pb).then(a.cmp(&b))
            });
            let mut rank = vec![usize::MAX; counts.len()];
            for (r, &l) in present.iter().enumerate() {
                rank[l] = r;
            }
            let mut v: Vec<(f64, bool)> = idx
                .iter()
                .map(|&i| {
                    let l = (x[i][feature] as usize).min(levels.len());
                    (rank[l] as f64, y[i])
                })
                .collect();
            v.sort_by(|a, b| a.0.total_cmp(&b.0));
            (v, Some(present))
        }
    };

    let mut best: Option<(usize, f64)> = None;
    let mut left_pos = 0.0;
    for k in 0..order.len() - 1 {
        if order[k].1 {
            left_pos += 1.0;
        }
        if order[k].0 == order[k + 1].0 {
            continue;
        }
        let nl = (k + 1) as f64;
        let nr = n - nl;
        if (nl as usize) < min_node_size || (nr as usize) < min_node_size {
            continue;
        }
        let decrease = parent - nl * gini(left_pos, nl) - nr * gini(pos - left_pos, nr);
        if best.map_or(true, |(_, d)| decrease > d) {
            best = Some((k, decrease));
        }
    }

    let (k, decrease) = best?;
    let rule = match level_rank {
        None => Rule::Threshold(0.5 * (order[k].0 + order[k + 1].0)),
        Some(present) => {
            let cut = order[k].0 as usize;
            let mut left: Vec<usize> = present[..=cut].to_vec();
            left.sort_unstable();
            Rule::Levels(left)
        }
    };
    Some(Candidate { feature, rule, decrease })
}

/// Grow one tree on the bootstrap rows `sample`, accumulating the Gini
/// decrease of each split into `importance`.
fn grow_tree(
    x: &[Vec<f64>],
    y: &[bool],
    sample: Vec<usize>,
    features: &[FeatureSpec],
    mtry: usize,
    min_node_size: usize,
    rng: &mut StdRng,
    importance: &mut [f64],
) -> Tree {
    let mut nodes = vec![Node::Leaf { positive: false }];
    let mut stack = vec![(0usize, sample)];
    let mut order: Vec<usize> = (0..features.len()).collect();

    while let Some((slot, idx)) = stack.pop() {
        let pos = idx.iter().filter(|&&i| y[i]).count();
        let majority = 2 * pos > idx.len();
        if pos == 0 || pos == idx.len() || idx.len() < 2 * min_node_size {
            nodes[slot] = Node::Leaf { positive: majority };
            continue;
        }

        // Draw mtry candidates; when none of them varies at this node, keep
        // looking through the remaining features in the drawn order.
        order.shuffle(rng);
        let mut best: Option<Candidate> = None;
        for (tried, &f) in order.iter().enumerate() {
            if tried >= mtry && best.is_some() {
                break;
            }
            if let Some(c) = best_split(x, y, &idx, f, &features[f].kind, min_node_size) {
                if best.as_ref().map_or(true, |b| c.decrease > b.decrease) {
                    best = Some(c);
                }
            }
        }

        let Some(split) = best else {
            nodes[slot] = Node::Leaf { positive: majority };
            continue;
        };
        importance[split.feature] += split.decrease;

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            idx.iter().partition(|&&i| split.rule.goes_left(x[i][split.feature]));
        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf { positive: false });
        nodes.push(Node::Leaf { positive: false });
        nodes[slot] = Node::Split { feature: split.feature, rule: split.rule, left, right };
        stack.push((right, right_idx));
        stack.push((left, left_idx));
    }
    Tree { nodes }
}

// ── Forest ────────────────────────────────────────────────────────────────────

/// Per-row out-of-bag tallies from fitting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OobVotes {
    pub positive: Vec<u32>,
    pub total: Vec<u32>,
}

impl OobVotes {
    /// Fraction of OOB trees voting positive; `None` for rows that were in
    /// every bootstrap sample.
    pub fn fraction(&self, row: usize) -> Option<f64> {
        (self.total[row] > 0).then(|| self.positive[row] as f64 / self.total[row] as f64)
    }

    /// Share of rows with OOB votes whose majority vote is wrong.
    pub fn error_rate(&self, labels: &[bool]) -> f64 {
        let mut wrong = 0usize;
        let mut counted = 0usize;
        for (row, &label) in labels.iter().enumerate() {
            if let Some(f) = self.fraction(row) {
                counted += 1;
                if (f > 0.5) != label {
                    wrong += 1;
                }
            }
        }
        if counted == 0 { f64::NAN } else { wrong as f64 / counted as f64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    features: Vec<FeatureSpec>,
    trees: Vec<Tree>,
    mtry: usize,
    /// Mean decrease in Gini per feature (summed over trees / tree count).
    importance: Vec<f64>,
    #[serde(skip)]
    oob: OobVotes,
}

impl RandomForest {
    /// Fit on rows `x` (one value per feature, categorical values as level
    /// indices) with labels `y`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[bool],
        features: Vec<FeatureSpec>,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self> {
        let n = x.len();
        let p = features.len();
        if n == 0 || n != y.len() {
            return Err(Error::EmptyDataset(format!("{n} rows for {} labels", y.len())));
        }
        if p == 0 || x.iter().any(|row| row.len() != p) {
            return Err(Error::Config(format!("every row must hold {p} feature values")));
        }
        if params.trees == 0 {
            return Err(Error::Config("forest needs at least one tree".into()));
        }
        if y.iter().all(|&l| l) || y.iter().all(|&l| !l) {
            return Err(Error::SingleClass("training labels".into()));
        }
        let mtry = params
            .mtry
            .unwrap_or_else(|| (p as f64).sqrt().floor() as usize)
            .clamp(1, p);
        let min_node_size = params.min_node_size.max(1);

        let grow = |t: usize| {
            let mut rng = StdRng::seed_from_u64(seed ^ (t as u64 + 1).wrapping_mul(TREE_STREAM));
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut in_bag = vec![false; n];
            for &i in &sample {
                in_bag[i] = true;
            }
            let mut importance = vec![0.0; p];
            let tree = grow_tree(x, y, sample, &features, mtry, min_node_size, &mut rng, &mut importance);
            (tree, in_bag, importance)
        };

        #[cfg(feature = "threading")]
        let grown: Vec<(Tree, Vec<bool>, Vec<f64>)> = (0..params.trees).into_par_iter().map(grow).collect();
        #[cfg(not(feature = "threading"))]
        let grown: Vec<(Tree, Vec<bool>, Vec<f64>)> = (0..params.trees).map(grow).collect();

        let mut oob = OobVotes { positive: vec![0; n], total: vec![0; n] };
        let mut importance = vec![0.0; p];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, in_bag, imp) in grown {
            for row in (0..n).filter(|&i| !in_bag[i]) {
                oob.total[row] += 1;
                if tree.vote(&x[row]) {
                    oob.positive[row] += 1;
                }
            }
            for (acc, v) in importance.iter_mut().zip(imp) {
                *acc += v;
            }
            trees.push(tree);
        }
        let tree_count = trees.len() as f64;
        importance.iter_mut().for_each(|v| *v /= tree_count);

        let forest = Self { features, trees, mtry, importance, oob };
        debug!(
            nodes = forest.trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "forest grown"
        );
        info!(
            trees = forest.trees.len(),
            rows = n,
            mtry,
            oob_error = forest.oob.error_rate(y),
            "random forest fitted"
        );
        Ok(forest)
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn mtry(&self) -> usize {
        self.mtry
    }

    /// Out-of-bag votes of the training rows. Empty for a forest read back
    /// from JSON.
    pub fn oob(&self) -> &OobVotes {
        &self.oob
    }

    /// `(feature name, mean decrease in Gini)`, highest first.
    pub fn importance(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .features
            .iter()
            .zip(&self.importance)
            .map(|(f, v)| (f.name.clone(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Fraction of trees voting positive.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let votes = self.trees.iter().filter(|t| t.vote(row)).count();
        votes as f64 / self.trees.len() as f64
    }

    /// Majority vote; a tie is negative.
    pub fn predict(&self, row: &[f64]) -> bool {
        self.predict_proba(row) > 0.5
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(names: &[&str]) -> Vec<FeatureSpec> {
        names
            .iter()
            .map(|n| FeatureSpec { name: n.to_string(), kind: FeatureKind::Numeric })
            .collect()
    }

    /// Positives where x0 > 5; x1 is noise.
    fn threshold_data(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<bool>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x: Vec<Vec<f64>> = (0..n)
            .map(|_| vec![rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)])
            .collect();
        let y = x.iter().map(|r| r[0] > 5.0).collect();
        (x, y)
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = threshold_data(200, 1);
        let params = ForestParams { trees: 50, ..Default::default() };
        let forest = RandomForest::fit(&x, &y, numeric(&["signal", "noise"]), &params, 7).unwrap();
        assert!(forest.predict(&[8.0, 2.0]));
        assert!(!forest.predict(&[2.0, 8.0]));
        assert!(forest.oob().error_rate(&y) < 0.1);
        assert_eq!(forest.importance()[0].0, "signal");
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = threshold_data(100, 2);
        let params = ForestParams { trees: 20, ..Default::default() };
        let a = RandomForest::fit(&x, &y, numeric(&["a", "b"]), &params, 42).unwrap();
        let b = RandomForest::fit(&x, &y, numeric(&["a", "b"]), &params, 42).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.oob().positive, b.oob().positive);
    }

    #[test]
    fn categorical_levels_split_by_positive_share() {
        // Levels 0 and 2 are positive, 1 and 3 negative: no single numeric
        // threshold on the index separates them, a level subset does.
        let levels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let features = vec![FeatureSpec { name: "rock".into(), kind: FeatureKind::Categorical { levels } }];
        let x: Vec<Vec<f64>> = (0..80).map(|i| vec![(i % 4) as f64]).collect();
        let y: Vec<bool> = (0..80).map(|i| i % 2 == 0).collect();
        let params = ForestParams { trees: 10, ..Default::default() };
        let forest = RandomForest::fit(&x, &y, features, &params, 3).unwrap();
        assert!(forest.predict(&[0.0]));
        assert!(forest.predict(&[2.0]));
        assert!(!forest.predict(&[1.0]));
        assert!(!forest.predict(&[3.0]));
        // Unseen level goes right; the vote is still a valid probability.
        let p = forest.predict_proba(&[4.0]);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn json_round_trip_predicts_identically() {
        let (x, y) = threshold_data(60, 4);
        let params = ForestParams { trees: 15, ..Default::default() };
        let forest = RandomForest::fit(&x, &y, numeric(&["a", "b"]), &params, 9).unwrap();
        let back = RandomForest::from_json(&forest.to_json().unwrap()).unwrap();
        for row in &x {
            assert_eq!(forest.predict_proba(row), back.predict_proba(row));
        }
        assert_eq!(back.n_trees(), 15);
        assert!(back.oob().total.is_empty());
    }

    #[test]
    fn single_class_is_rejected() {
        let x = vec![vec![1.0], vec![2.0]];
        let r = RandomForest::fit(&x, &[true, true], numeric(&["a"]), &ForestParams::default(), 1);
        assert!(matches!(r, Err(Error::SingleClass(_))));
    }

    #[test]
    fn mtry_defaults_to_root_p() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64; 9]).collect();
        let y: Vec<bool> = (0..20).map(|i| i >= 10).collect();
        let names: Vec<String> = (0..9).map(|i| format!("f{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let params = ForestParams { trees: 3, ..Default::default() };
        let forest = RandomForest::fit(&x, &y, numeric(&refs), &params, 5).unwrap();
        assert_eq!(forest.mtry(), 3);
    }
}
