use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{EligibilityFeature, FEATURE_COUNT};

/// On-disk layout of a trained gradient-boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    /// Prior log-odds added to every prediction.
    pub base_score: f64,
    pub trees: Vec<TreeArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub nodes: Vec<NodeArtifact>,
}

/// A node carries either a `split` or a `leaf` value, plus the training cover that reached it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<f64>,
    pub cover: f64,
}

/// Rows with `feature < threshold` follow `yes`, others `no`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitArtifact {
    pub feature: usize,
    pub threshold: f64,
    pub yes: usize,
    pub no: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("model artifact is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("model features {found:?} do not match the expected {expected:?}")]
    FeatureMismatch {
        expected: Vec<&'static str>,
        found: Vec<String>,
    },
    #[error("model artifact contains no trees")]
    Empty,
    #[error("tree {tree} node {node} is malformed: {reason}")]
    MalformedNode {
        tree: usize,
        node: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub(crate) fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// Validated tree; every child index is greater than its parent's, so walks terminate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tree {
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    fn leaf_value(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    ..
                } => {
                    index = if features[*feature] < *threshold {
                        *yes
                    } else {
                        *no
                    };
                }
            }
        }
    }
}

/// Boosted tree ensemble producing a log-odds margin.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    version: String,
    base_score: f64,
    pub(crate) trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelLoadError> {
        let artifact: ModelArtifact = serde_json::from_str(raw)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
        let expected: Vec<&'static str> = EligibilityFeature::ordered()
            .iter()
            .map(|feature| feature.model_name())
            .collect();
        if artifact.feature_names != expected {
            return Err(ModelLoadError::FeatureMismatch {
                expected,
                found: artifact.feature_names,
            });
        }

        if artifact.trees.is_empty() {
            return Err(ModelLoadError::Empty);
        }

        let trees = artifact
            .trees
            .into_iter()
            .enumerate()
            .map(|(tree_index, tree)| build_tree(tree_index, tree))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: artifact.version,
            base_score: artifact.base_score,
            trees,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Raw log-odds output for one feature vector.
    pub fn margin(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.leaf_value(features))
                .sum::<f64>()
    }

    /// Positive-class probability.
    pub fn predict_proba(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        logistic(self.margin(features))
    }
}

pub(crate) fn logistic(margin: f64) -> f64 {
    (1.0 / (1.0 + (-margin).exp())).clamp(0.0, 1.0)
}

fn build_tree(tree_index: usize, tree: TreeArtifact) -> Result<Tree, ModelLoadError> {
    let node_count = tree.nodes.len();
    if node_count == 0 {
        return Err(ModelLoadError::MalformedNode {
            tree: tree_index,
            node: 0,
            reason: "tree has no nodes".to_string(),
        });
    }

    let malformed = |node: usize, reason: String| ModelLoadError::MalformedNode {
        tree: tree_index,
        node,
        reason,
    };

    let mut nodes = Vec::with_capacity(node_count);
    for (index, node) in tree.nodes.into_iter().enumerate() {
        if !(node.cover.is_finite() && node.cover > 0.0) {
            return Err(malformed(index, format!("cover {} must be positive", node.cover)));
        }

        let built = match (node.split, node.leaf) {
            (Some(split), None) => {
                if split.feature >= FEATURE_COUNT {
                    return Err(malformed(
                        index,
                        format!("feature index {} out of range", split.feature),
                    ));
                }
                if !split.threshold.is_finite() {
                    return Err(malformed(index, "threshold is not finite".to_string()));
                }
                for child in [split.yes, split.no] {
                    if child <= index || child >= node_count {
                        return Err(malformed(index, format!("invalid child index {child}")));
                    }
                }
                Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    yes: split.yes,
                    no: split.no,
                    cover: node.cover,
                }
            }
            (None, Some(value)) if value.is_finite() => Node::Leaf {
                value,
                cover: node.cover,
            },
            (None, Some(_)) => return Err(malformed(index, "leaf value is not finite".to_string())),
            _ => {
                return Err(malformed(
                    index,
                    "node must define exactly one of split or leaf".to_string(),
                ))
            }
        };
        nodes.push(built);
    }

    Ok(Tree { nodes })
}
