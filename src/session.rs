//! Exercise session orchestration.
//!
//! An [`ExerciseSession`] owns one phase detector, one feature aggregator
//! and one rule engine, and runs them in the fixed per-frame order:
//!
//! 1. **Phase**: feed the tracking coordinate to the detector
//! 2. **Aggregation**: tag the aggregator with the detected phase and record
//!    the frame's measurements
//! 3. **Frame rules**: evaluate FRAME rules on the same measurements
//! 4. **Rep boundary**: when the detector reports a finished repetition,
//!    evaluate PHASE and REP rules on the collected aggregates, then clear
//!    the per-rep state (debounce state is kept)
//!
//! Sessions share nothing. A host coaching several users builds one
//! session per user.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregation::{AggregateRecord, FeatureAggregator, PhaseAggregates};
use crate::error::{FormError, Result};
use crate::features::{FeatureExtractor, FeatureExtractorConfig};
use crate::phase_detection::{PhaseDetector, PhaseDetectorConfig};
use crate::rule_engine::{RuleEngine, RuleEngineConfig};
use crate::rules::{ExerciseConfig, Rule};
use crate::types::{FeatureFrame, Feedback, Phase, PhaseUpdate, PoseFrame, View};

/// Configuration for a complete session.
///
/// Bundles all sub-component configurations. Loaded from and saved to TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera placement selecting the threshold variant.
    pub view: View,
    pub detector: PhaseDetectorConfig,
    pub engine: RuleEngineConfig,
    pub extractor: FeatureExtractorConfig,
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| FormError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| FormError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        self.engine.validate()?;
        self.extractor.validate()
    }
}

/// Everything judged at one repetition boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepReport {
    /// 1-based repetition number within the session.
    pub index: u32,
    pub rep_aggregates: AggregateRecord,
    pub phase_aggregates: PhaseAggregates,
    pub feedback: Vec<Feedback>,
}

/// Result of one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameOutcome {
    pub update: PhaseUpdate,
    /// Debounced FRAME rule feedback.
    pub feedback: Vec<Feedback>,
    /// Present only on the frame that completes a repetition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rep: Option<RepReport>,
}

/// One user's exercise session.
pub struct ExerciseSession {
    detector: PhaseDetector,
    aggregator: FeatureAggregator,
    engine: RuleEngine,
    extractor: FeatureExtractor,
    reps_completed: u32,
}

impl ExerciseSession {
    /// Create a session over compiled rules.
    pub fn new(rules: Vec<Rule>, config: SessionConfig) -> Self {
        let mut engine = RuleEngine::with_config(rules, config.engine);
        engine.set_view(config.view);

        Self {
            detector: PhaseDetector::new(config.detector),
            aggregator: FeatureAggregator::new(),
            engine,
            extractor: FeatureExtractor::new(config.extractor),
            reps_completed: 0,
        }
    }

    /// Validate both configurations and build a session.
    pub fn from_exercise(exercise: &ExerciseConfig, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let rules = exercise.compile()?;
        debug!(exercise = %exercise.exercise, rules = rules.len(), "session created");
        Ok(Self::new(rules, config))
    }

    /// Run one frame of precomputed measurements through the pipeline.
    pub fn process_frame(&mut self, tracking: f32, frame: &FeatureFrame) -> FrameOutcome {
        let update = self.detector.detect(tracking);

        self.aggregator.set_phase(update.state);
        self.aggregator.record_frame(frame);

        let feedback = self.engine.evaluate_frame(frame, update.state);

        let rep = if update.is_rep_finished {
            Some(self.finish_rep())
        } else {
            None
        };

        FrameOutcome {
            update,
            feedback,
            rep,
        }
    }

    /// Extract features from a pose and process them.
    pub fn process_pose(&mut self, pose: &PoseFrame) -> FrameOutcome {
        let features = self.extractor.extract(pose);
        self.process_frame(features.tracking, &features.frame)
    }

    /// Start a new set. Keeps debounce state and the rep counter.
    pub fn start_set(&mut self) {
        self.detector.reset();
        self.aggregator.reset();
        self.engine.reset();
    }

    /// Drop the repetition in progress without judging it.
    pub fn abandon_rep(&mut self) {
        debug!(samples_phase = %self.aggregator.phase(), "repetition abandoned");
        self.aggregator.reset();
        self.engine.reset();
    }

    /// Return to a freshly constructed state.
    pub fn reset_session(&mut self) {
        self.detector.reset();
        self.aggregator.reset();
        self.engine.full_reset();
        self.reps_completed = 0;
    }

    pub fn set_view(&mut self, view: View) {
        self.engine.set_view(view);
    }

    pub fn view(&self) -> View {
        self.engine.view()
    }

    pub fn phase(&self) -> Phase {
        self.detector.state()
    }

    pub fn reps_completed(&self) -> u32 {
        self.reps_completed
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn aggregator(&self) -> &FeatureAggregator {
        &self.aggregator
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn finish_rep(&mut self) -> RepReport {
        let rep_aggregates = self.aggregator.rep_aggregates();
        let phase_aggregates = self.aggregator.phase_aggregates();
        let feedback = self
            .engine
            .evaluate_with_phases(&rep_aggregates, Some(&phase_aggregates));

        self.aggregator.reset();
        self.engine.reset();
        self.reps_completed += 1;

        let failed = feedback.iter().filter(|f| !f.passed).count();
        info!(
            rep = self.reps_completed,
            rules = feedback.len(),
            failed,
            "repetition evaluated"
        );

        RepReport {
            index: self.reps_completed,
            rep_aggregates,
            phase_aggregates,
            feedback,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureId;
    use tempfile::tempdir;

    const RULES: &str = r#"{
        "exercise": "squat",
        "rules": [
            {"id": "depth", "error_type": "shallow", "type": "range",
             "feature": "knee_flexion", "comparator": "max", "evaluation": "REP",
             "thresholds": {"front": 200, "side": 200}},
            {"id": "lean", "error_type": "lean", "type": "range",
             "feature": "trunk_angle", "comparator": "max", "evaluation": "FRAME",
             "thresholds": {"front": 30}}
        ]
    }"#;

    fn session() -> ExerciseSession {
        let exercise = ExerciseConfig::from_json_str(RULES).unwrap();
        ExerciseSession::from_exercise(&exercise, SessionConfig::default()).unwrap()
    }

    fn squat_profile() -> Vec<f32> {
        let mut values = vec![100.0; 10];
        values.extend((1..=10).map(|i| 100.0 + 10.0 * i as f32));
        values.extend((1..=10).map(|i| 200.0 - 10.0 * i as f32));
        values.extend(std::iter::repeat(100.0).take(15));
        values
    }

    fn frame(trunk: f32) -> FeatureFrame {
        FeatureFrame::new()
            .with(FeatureId::TrunkAngle, trunk)
            .with(FeatureId::KneeFlexion, 90.0)
    }

    #[test]
    fn test_rep_report_emitted_once() {
        let mut session = session();
        let reports: Vec<_> = squat_profile()
            .into_iter()
            .filter_map(|y| session.process_frame(y, &frame(10.0)).rep)
            .collect();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].index, 1);
        assert_eq!(session.reps_completed(), 1);

        let ids: Vec<_> = reports[0].feedback.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["depth", "lean"]);
        assert!(reports[0].feedback.iter().all(|f| f.passed));
    }

    #[test]
    fn test_aggregator_cleared_after_rep() {
        let mut session = session();
        for y in squat_profile() {
            let outcome = session.process_frame(y, &frame(10.0));
            if outcome.rep.is_some() {
                assert_eq!(session.aggregator().sample_count(FeatureId::TrunkAngle), 0);
                return;
            }
        }
        panic!("no repetition finished");
    }

    #[test]
    fn test_debounced_error_survives_rep_boundary() {
        let mut session = session();
        for y in squat_profile() {
            session.process_frame(y, &frame(45.0));
        }
        assert!(session.engine().is_error_active("lean"));

        session.start_set();
        assert!(session.engine().is_error_active("lean"));

        session.reset_session();
        assert!(!session.engine().is_error_active("lean"));
        assert_eq!(session.reps_completed(), 0);
    }

    #[test]
    fn test_view_switch_hides_front_only_rule() {
        let mut session = session();
        session.set_view(View::Side);
        let outcome = session.process_frame(100.0, &frame(45.0));
        assert!(outcome.feedback.is_empty());
    }

    #[test]
    fn test_abandon_rep_discards_samples() {
        let mut session = session();
        for _ in 0..5 {
            session.process_frame(100.0, &frame(10.0));
        }
        session.abandon_rep();
        assert_eq!(session.aggregator().sample_count(FeatureId::KneeFlexion), 0);
        assert_eq!(session.reps_completed(), 0);
    }

    #[test]
    fn test_session_config_toml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.toml");

        let config = SessionConfig {
            view: View::Side,
            detector: PhaseDetectorConfig {
                movement_threshold: 5.0,
                ..Default::default()
            },
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = SessionConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_session_config_partial_toml() {
        let config = SessionConfig::from_toml_str("view = \"side\"\n[engine]\nerror_trigger_frames = 3\n").unwrap();
        assert_eq!(config.view, View::Side);
        assert_eq!(config.engine.error_trigger_frames, 3);
        assert_eq!(config.engine.error_clear_frames, 10);
        assert_eq!(config.detector, PhaseDetectorConfig::default());
    }

    #[test]
    fn test_invalid_session_config_rejected() {
        let err = SessionConfig::from_toml_str("[detector]\nrecent_frames = 0\n").unwrap_err();
        assert!(matches!(err, FormError::InvalidValue { field: "recent_frames", .. }));
    }
}
