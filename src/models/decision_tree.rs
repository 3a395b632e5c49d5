//! A tier-3 model loaded from a JSON decision-tree artifact. No ONNX or LLM
//! runtime dependency — a plain recursive tree is sufficient for a scored
//! classifier over a twelve-element feature vector.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureVector;
use crate::models::{AnomalyModel, ModelScore};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TreeNode {
    Split {
        feature_index: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        score: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeArtifact {
    pub root: TreeNode,
    pub trained_at_ms: u64,
    pub feature_names: Vec<String>,
}

pub struct JsonDecisionTreeModel {
    artifact: DecisionTreeArtifact,
}

impl JsonDecisionTreeModel {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        let artifact: DecisionTreeArtifact = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self { artifact })
    }

    fn evaluate(node: &TreeNode, features: &FeatureVector) -> f64 {
        match node {
            TreeNode::Leaf { score } => *score,
            TreeNode::Split {
                feature_index,
                threshold,
                left,
                right,
            } => {
                let value = features.values.get(*feature_index).copied().unwrap_or(0.0);
                if value <= *threshold {
                    Self::evaluate(left, features)
                } else {
                    Self::evaluate(right, features)
                }
            }
        }
    }
}

impl AnomalyModel for JsonDecisionTreeModel {
    fn score_with_explanation(&self, features: &FeatureVector) -> ModelScore {
        let score = Self::evaluate(&self.artifact.root, features).clamp(0.0, 100.0);
        let mut explanation = HashMap::new();
        for (i, name) in self.artifact.feature_names.iter().enumerate() {
            if let Some(value) = features.values.get(i) {
                explanation.insert(name.clone(), *value);
            }
        }
        ModelScore { score, explanation }
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "json_decision_tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_tree_always_scores_the_same() {
        let artifact = DecisionTreeArtifact {
            root: TreeNode::Leaf { score: 33.0 },
            trained_at_ms: 0,
            feature_names: vec![],
        };
        let model = JsonDecisionTreeModel { artifact };
        let score = model.score_with_explanation(&FeatureVector::zeroed());
        assert_eq!(score.score, 33.0);
    }

    #[test]
    fn split_routes_by_feature_value() {
        let artifact = DecisionTreeArtifact {
            root: TreeNode::Split {
                feature_index: 0,
                threshold: 0.0,
                left: Box::new(TreeNode::Leaf { score: 10.0 }),
                right: Box::new(TreeNode::Leaf { score: 90.0 }),
            },
            trained_at_ms: 0,
            feature_names: vec![],
        };
        let model = JsonDecisionTreeModel { artifact };

        let mut high = FeatureVector::zeroed();
        high.values[0] = 1.0;
        assert_eq!(model.score_with_explanation(&high).score, 90.0);

        let low = FeatureVector::zeroed();
        assert_eq!(model.score_with_explanation(&low).score, 10.0);
    }
}
