//! Rule definitions and exercise configuration.
//!
//! An exercise is described by a static list of rules, authored as JSON or
//! TOML and compiled once into typed [`Rule`] values. Compilation is the
//! only place rule data can be rejected; once a rule engine holds the
//! compiled set it never changes.
//!
//! # File format
//!
//! ```json
//! {
//!   "exercise": "squat",
//!   "rules": [
//!     {
//!       "id": "depth",
//!       "error_type": "insufficient_depth",
//!       "type": "range",
//!       "feature": "knee_flexion",
//!       "comparator": "max",
//!       "evaluation": "REP",
//!       "thresholds": { "front": 110, "side": 100 }
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregation::Statistic;
use crate::error::{FormError, Result};
use crate::types::{FeatureId, Phase, View};

/// How a measured value is judged against its threshold.
///
/// MIN and MAX apply the same test (`value <= threshold`); the tag only
/// records which statistic the author meant to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Min,
    Max,
    Mean,
    Std,
}

impl Comparator {
    /// Aggregate statistic this comparator reads at rep and phase scope.
    pub fn statistic(self) -> Statistic {
        match self {
            Comparator::Min => Statistic::Min,
            Comparator::Max => Statistic::Max,
            Comparator::Mean => Statistic::Mean,
            Comparator::Std => Statistic::Std,
        }
    }
}

/// When a rule is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    /// Every frame, on instantaneous or rolling values, with debouncing.
    Frame,
    /// Once per rep, on the aggregate of the rule's target phase.
    Phase,
    /// Once per rep, on the whole-repetition aggregate.
    Rep,
}

/// Rule kind as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Range,
    Symmetry,
    Stability,
}

/// Per-view threshold table. A missing entry makes the rule inapplicable
/// for that view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<f32>,
}

impl ViewThresholds {
    pub fn new(front: Option<f32>, side: Option<f32>) -> Self {
        Self { front, side }
    }

    /// Same threshold for every view.
    pub fn uniform(value: f32) -> Self {
        Self::new(Some(value), Some(value))
    }

    pub fn get(&self, view: View) -> Option<f32> {
        match view {
            View::Front => self.front,
            View::Side => self.side,
        }
    }

    fn entries(&self) -> [(View, Option<f32>); 2] {
        [(View::Front, self.front), (View::Side, self.side)]
    }
}

/// A rule as authored, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub error_type: String,
    #[serde(rename = "type")]
    pub kind: RuleType,
    pub comparator: Comparator,
    pub evaluation: Granularity,
    #[serde(
        default,
        rename = "targetPhase",
        alias = "target_phase",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ViewThresholds>,
    #[serde(
        default,
        rename = "maxDiff",
        alias = "max_diff",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_diff: Option<ViewThresholds>,
    #[serde(
        default,
        rename = "maxStd",
        alias = "max_std",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_std: Option<ViewThresholds>,
}

/// What a rule measures, with the threshold table matching its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// One feature against one threshold.
    Range {
        feature: FeatureId,
        thresholds: ViewThresholds,
    },
    /// Absolute left/right difference against a maximum.
    Symmetry {
        left: FeatureId,
        right: FeatureId,
        max_diff: ViewThresholds,
    },
    /// Standard deviation of a feature against a maximum.
    Stability {
        feature: FeatureId,
        max_std: ViewThresholds,
    },
}

impl RuleKind {
    pub fn thresholds(&self) -> &ViewThresholds {
        match self {
            RuleKind::Range { thresholds, .. } => thresholds,
            RuleKind::Symmetry { max_diff, .. } => max_diff,
            RuleKind::Stability { max_std, .. } => max_std,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleKind::Range { .. } => RuleType::Range,
            RuleKind::Symmetry { .. } => RuleType::Symmetry,
            RuleKind::Stability { .. } => RuleType::Stability,
        }
    }
}

/// A validated, immutable rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub error_type: String,
    pub kind: RuleKind,
    pub comparator: Comparator,
    pub granularity: Granularity,
    pub target_phase: Option<Phase>,
}

impl Rule {
    /// Threshold for the given view, if the rule applies there.
    pub fn threshold(&self, view: View) -> Option<f32> {
        self.kind.thresholds().get(view)
    }
}

impl TryFrom<&RuleSpec> for Rule {
    type Error = FormError;

    fn try_from(spec: &RuleSpec) -> Result<Self> {
        let feature = |field: &'static str, value: &Option<String>| -> Result<FeatureId> {
            let name = value.as_deref().ok_or_else(|| FormError::MissingField {
                rule: spec.id.clone(),
                field,
            })?;
            name.parse().map_err(|_| FormError::RuleFeature {
                rule: spec.id.clone(),
                name: name.to_string(),
            })
        };

        let kind = match spec.kind {
            RuleType::Range => RuleKind::Range {
                feature: feature("feature", &spec.feature)?,
                thresholds: spec.thresholds.unwrap_or_default(),
            },
            RuleType::Symmetry => RuleKind::Symmetry {
                left: feature("feature_left", &spec.feature_left)?,
                right: feature("feature_right", &spec.feature_right)?,
                max_diff: spec.max_diff.unwrap_or_default(),
            },
            RuleType::Stability => RuleKind::Stability {
                feature: feature("feature", &spec.feature)?,
                max_std: spec.max_std.unwrap_or_default(),
            },
        };

        for (view, value) in kind.thresholds().entries() {
            if matches!(value, Some(v) if !v.is_finite()) {
                return Err(FormError::InvalidThreshold {
                    rule: spec.id.clone(),
                    view: view.to_string(),
                });
            }
        }

        if spec.evaluation == Granularity::Phase && spec.target_phase.is_none() {
            return Err(FormError::MissingTargetPhase(spec.id.clone()));
        }

        Ok(Rule {
            id: spec.id.clone(),
            error_type: spec.error_type.clone(),
            kind,
            comparator: spec.comparator,
            granularity: spec.evaluation,
            target_phase: spec.target_phase,
        })
    }
}

/// Static rule set for one exercise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    #[serde(default, alias = "name")]
    pub exercise: String,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl ExerciseConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a `.json` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FormError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Err(FormError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Validate every rule and return the compiled set in authoring order.
    pub fn compile(&self) -> Result<Vec<Rule>> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());

        for spec in &self.rules {
            if !seen.insert(spec.id.as_str()) {
                return Err(FormError::DuplicateRuleId(spec.id.clone()));
            }
            rules.push(Rule::try_from(spec)?);
        }

        Ok(rules)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SQUAT_JSON: &str = r#"{
        "exercise": "squat",
        "rules": [
            {
                "id": "depth",
                "error_type": "insufficient_depth",
                "type": "range",
                "feature": "knee_flexion",
                "comparator": "max",
                "evaluation": "REP",
                "thresholds": { "front": 110, "side": 100 }
            },
            {
                "id": "knee_balance",
                "error_type": "asymmetric_knees",
                "type": "symmetry",
                "feature_left": "knee_flexion_left",
                "feature_right": "knee_flexion_right",
                "comparator": "max",
                "evaluation": "FRAME",
                "maxDiff": { "front": 15 }
            },
            {
                "id": "trunk_wobble",
                "error_type": "unstable_trunk",
                "type": "stability",
                "feature": "trunk_angle",
                "comparator": "std",
                "evaluation": "PHASE",
                "targetPhase": "DESCENDING",
                "maxStd": { "side": 4 }
            }
        ]
    }"#;

    fn spec(id: &str) -> RuleSpec {
        RuleSpec {
            id: id.to_string(),
            error_type: "err".to_string(),
            kind: RuleType::Range,
            comparator: Comparator::Max,
            evaluation: Granularity::Rep,
            target_phase: None,
            feature: Some("trunk_angle".to_string()),
            feature_left: None,
            feature_right: None,
            thresholds: Some(ViewThresholds::uniform(30.0)),
            max_diff: None,
            max_std: None,
        }
    }

    #[test]
    fn test_parse_and_compile_json() {
        let config = ExerciseConfig::from_json_str(SQUAT_JSON).unwrap();
        assert_eq!(config.exercise, "squat");

        let rules = config.compile().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].threshold(View::Front), Some(110.0));
        assert_eq!(rules[1].threshold(View::Side), None);
        assert_eq!(rules[2].target_phase, Some(Phase::Descending));
        assert!(matches!(
            rules[1].kind,
            RuleKind::Symmetry {
                left: FeatureId::KneeFlexionLeft,
                right: FeatureId::KneeFlexionRight,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            exercise = "squat"

            [[rules]]
            id = "lean"
            error_type = "forward_lean"
            type = "range"
            feature = "trunk_angle"
            comparator = "max"
            evaluation = "FRAME"
            target_phase = "ASCENDING"
            thresholds = { side = 35.0 }
        "#;
        let rules = ExerciseConfig::from_toml_str(text).unwrap().compile().unwrap();
        assert_eq!(rules[0].granularity, Granularity::Frame);
        assert_eq!(rules[0].target_phase, Some(Phase::Ascending));
        assert_eq!(rules[0].threshold(View::Side), Some(35.0));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let mut bad = spec("typo");
        bad.feature = Some("trunk_angel".to_string());
        let config = ExerciseConfig {
            exercise: "squat".into(),
            rules: vec![bad],
        };
        let err = config.compile().unwrap_err();
        assert!(matches!(err, FormError::RuleFeature { name, .. } if name == "trunk_angel"));
    }

    #[test]
    fn test_missing_feature_field_rejected() {
        let mut bad = spec("sym");
        bad.kind = RuleType::Symmetry;
        bad.feature_left = Some("knee_flexion_left".into());
        let err = Rule::try_from(&bad).unwrap_err();
        assert!(matches!(
            err,
            FormError::MissingField {
                field: "feature_right",
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = ExerciseConfig {
            exercise: "squat".into(),
            rules: vec![spec("a"), spec("a")],
        };
        assert!(matches!(
            config.compile().unwrap_err(),
            FormError::DuplicateRuleId(id) if id == "a"
        ));
    }

    #[test]
    fn test_phase_rule_requires_target_phase() {
        let mut bad = spec("p");
        bad.evaluation = Granularity::Phase;
        assert!(matches!(
            Rule::try_from(&bad).unwrap_err(),
            FormError::MissingTargetPhase(_)
        ));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut bad = spec("inf");
        bad.thresholds = Some(ViewThresholds::new(Some(f32::INFINITY), None));
        assert!(matches!(
            Rule::try_from(&bad).unwrap_err(),
            FormError::InvalidThreshold { .. }
        ));
    }

    #[test]
    fn test_missing_table_means_inapplicable() {
        let mut rule_spec = spec("no_table");
        rule_spec.thresholds = None;
        let rule = Rule::try_from(&rule_spec).unwrap();
        assert_eq!(rule.threshold(View::Front), None);
        assert_eq!(rule.threshold(View::Side), None);
    }

    #[test]
    fn test_table_follows_kind() {
        // A range table on a stability rule is ignored
        let mut rule_spec = spec("stab");
        rule_spec.kind = RuleType::Stability;
        rule_spec.max_std = Some(ViewThresholds::new(None, Some(3.0)));
        let rule = Rule::try_from(&rule_spec).unwrap();
        assert_eq!(rule.threshold(View::Front), None);
        assert_eq!(rule.threshold(View::Side), Some(3.0));
        assert_eq!(rule.kind.rule_type(), RuleType::Stability);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("squat.json");
        std::fs::write(&path, SQUAT_JSON).unwrap();
        assert_eq!(ExerciseConfig::load(&path).unwrap().rules.len(), 3);

        let path = dir.path().join("squat.yaml");
        std::fs::write(&path, SQUAT_JSON).unwrap();
        assert!(matches!(
            ExerciseConfig::load(&path).unwrap_err(),
            FormError::UnsupportedFormat(_)
        ));

        assert!(matches!(
            ExerciseConfig::load(dir.path().join("missing.json")).unwrap_err(),
            FormError::Io { .. }
        ));
    }

    #[test]
    fn test_comparator_statistic() {
        assert_eq!(Comparator::Min.statistic(), Statistic::Min);
        assert_eq!(Comparator::Std.statistic(), Statistic::Std);
    }
}
