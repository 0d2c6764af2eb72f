use super::model::{Node, Tree, TreeEnsemble};
use super::FEATURE_COUNT;

/// Exact Shapley attribution for a tree ensemble.
///
/// The value of a coalition `S` is the ensemble margin when features in `S` take the row's
/// values and the remaining features are integrated out using the training cover recorded at
/// each split. With five features every coalition is enumerated directly, so
/// `baseline + sum(contributions)` equals the margin up to rounding.
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    /// Shapley weight indexed by coalition size: |S|! (M - |S| - 1)! / M!
    weights: [f64; FEATURE_COUNT],
}

/// Additive explanation of one prediction, in log-odds space.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub baseline: f64,
    pub contributions: [f64; FEATURE_COUNT],
}

impl Default for TreeExplainer {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeExplainer {
    pub fn new() -> Self {
        let factorial = |n: usize| (1..=n).map(|k| k as f64).product::<f64>();
        let total = factorial(FEATURE_COUNT);
        let mut weights = [0.0; FEATURE_COUNT];
        for (size, weight) in weights.iter_mut().enumerate() {
            *weight = factorial(size) * factorial(FEATURE_COUNT - size - 1) / total;
        }
        Self { weights }
    }

    pub fn explain(&self, model: &TreeEnsemble, features: &[f64; FEATURE_COUNT]) -> Explanation {
        let coalitions = 1usize << FEATURE_COUNT;
        let values: Vec<f64> = (0..coalitions)
            .map(|mask| coalition_value(model, features, mask))
            .collect();

        let mut contributions = [0.0; FEATURE_COUNT];
        for (feature, contribution) in contributions.iter_mut().enumerate() {
            let bit = 1usize << feature;
            *contribution = (0..coalitions)
                .filter(|mask| mask & bit == 0)
                .map(|mask| {
                    let size = mask.count_ones() as usize;
                    self.weights[size] * (values[mask | bit] - values[mask])
                })
                .sum();
        }

        Explanation {
            baseline: values[0],
            contributions,
        }
    }
}

fn coalition_value(model: &TreeEnsemble, features: &[f64; FEATURE_COUNT], mask: usize) -> f64 {
    model.base_score()
        + model
            .trees
            .iter()
            .map(|tree| conditional_expectation(tree, 0, features, mask))
            .sum::<f64>()
}

fn conditional_expectation(
    tree: &Tree,
    index: usize,
    features: &[f64; FEATURE_COUNT],
    mask: usize,
) -> f64 {
    match &tree.nodes[index] {
        Node::Leaf { value, .. } => *value,
        Node::Split {
            feature,
            threshold,
            yes,
            no,
            cover,
        } => {
            if mask & (1 << feature) != 0 {
                let next = if features[*feature] < *threshold {
                    *yes
                } else {
                    *no
                };
                conditional_expectation(tree, next, features, mask)
            } else {
                let yes_cover = tree.nodes[*yes].cover();
                let no_cover = tree.nodes[*no].cover();
                let weight_total = if yes_cover + no_cover > 0.0 {
                    yes_cover + no_cover
                } else {
                    *cover
                };
                (yes_cover * conditional_expectation(tree, *yes, features, mask)
                    + no_cover * conditional_expectation(tree, *no, features, mask))
                    / weight_total
            }
        }
    }
}
