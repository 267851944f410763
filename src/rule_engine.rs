//! Movement-quality rule evaluation.
//!
//! The rule engine judges measurements against the exercise's static rule
//! set and returns one [`Feedback`] record per applicable rule:
//!
//! - **FRAME** rules run every frame on instantaneous values (RANGE,
//!   SYMMETRY) or on a rolling window (STABILITY). Their reported verdict is
//!   debounced: an error must persist for several consecutive frames before
//!   it is raised, and must be absent for longer before it clears. This
//!   turns noisy per-frame pose estimates into feedback that does not
//!   flicker.
//! - **PHASE** and **REP** rules run once at the repetition boundary on the
//!   aggregates collected by the feature aggregator.
//!
//! Thresholds are resolved per camera view. A rule with no threshold for the
//! active view is inapplicable: it produces no feedback and touches no
//! debounce state.
//!
//! Missing data never raises an error. A value that cannot be resolved just
//! removes that rule from the current result.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::aggregation::{AggregateRecord, PhaseAggregates};
use crate::error::{FormError, Result};
use crate::rules::{Comparator, ExerciseConfig, Granularity, Rule, RuleKind};
use crate::types::{Direction, FeatureFrame, FeatureId, FeatureMap, Feedback, Phase, View};

/// Tunables for debouncing and comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// Consecutive failing frames before a frame error becomes active.
    pub error_trigger_frames: u32,
    /// Consecutive passing frames before an active error clears.
    pub error_clear_frames: u32,
    /// Relative band around the threshold accepted by MEAN rules.
    pub mean_tolerance: f32,
    /// Samples needed before a FRAME stability rule produces a verdict.
    pub stability_window: usize,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            error_trigger_frames: 5,
            error_clear_frames: 10,
            mean_tolerance: 0.2, // ±20% around the target
            stability_window: 10,
        }
    }
}

impl RuleEngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.error_trigger_frames == 0 {
            return Err(FormError::invalid_value("error_trigger_frames", "must be > 0"));
        }
        if self.error_clear_frames == 0 {
            return Err(FormError::invalid_value("error_clear_frames", "must be > 0"));
        }
        if !(self.mean_tolerance.is_finite() && (0.0..1.0).contains(&self.mean_tolerance)) {
            return Err(FormError::invalid_value("mean_tolerance", "must be in [0, 1)"));
        }
        if self.stability_window == 0 {
            return Err(FormError::invalid_value("stability_window", "must be > 0"));
        }
        Ok(())
    }
}

/// Hysteresis state of one FRAME rule. Lives for the whole session.
///
/// The two counters reset each other, so at most one is nonzero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DebounceState {
    pub fail_count: u32,
    pub pass_count: u32,
    pub error_active: bool,
}

impl DebounceState {
    /// Feed one instantaneous result and return the debounced verdict.
    pub fn update(&mut self, instant_passed: bool, trigger_frames: u32, clear_frames: u32) -> bool {
        if instant_passed {
            self.fail_count = 0;
            self.pass_count = self.pass_count.saturating_add(1);
            if self.error_active && self.pass_count >= clear_frames {
                self.error_active = false;
            }
        } else {
            self.pass_count = 0;
            self.fail_count = self.fail_count.saturating_add(1);
            if self.fail_count >= trigger_frames {
                self.error_active = true;
            }
        }
        self.passed()
    }

    /// Externally visible verdict.
    pub fn passed(&self) -> bool {
        !self.error_active
    }
}

/// Outcome of a single comparison, before any debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub direction: Option<Direction>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            direction: None,
        }
    }

    fn fail(direction: Option<Direction>) -> Self {
        Self {
            passed: false,
            direction,
        }
    }
}

/// Apply a comparator. MIN, MAX and STD all test `value <= threshold`.
pub fn compare(comparator: Comparator, value: f32, threshold: f32, mean_tolerance: f32) -> Verdict {
    match comparator {
        Comparator::Min | Comparator::Max | Comparator::Std => {
            if value <= threshold {
                Verdict::pass()
            } else {
                Verdict::fail(None)
            }
        }
        Comparator::Mean => {
            let lower = threshold * (1.0 - mean_tolerance);
            let upper = threshold * (1.0 + mean_tolerance);
            if value < lower {
                Verdict::fail(Some(Direction::Low))
            } else if value > upper {
                Verdict::fail(Some(Direction::High))
            } else {
                Verdict::pass()
            }
        }
    }
}

/// Rule evaluation engine for one exercise session.
pub struct RuleEngine {
    rules: Vec<Rule>,
    config: RuleEngineConfig,
    view: View,

    // Indexed by rule position; survives `reset()`
    debounce: Vec<DebounceState>,

    // Per-rep state
    stability_buffers: FeatureMap<VecDeque<f32>>,
    frame_feedback: Vec<Option<Feedback>>,
}

impl RuleEngine {
    /// Create an engine over a compiled rule set with default tunables.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self::with_config(rules, RuleEngineConfig::default())
    }

    pub fn with_config(rules: Vec<Rule>, config: RuleEngineConfig) -> Self {
        let rule_count = rules.len();
        Self {
            rules,
            stability_buffers: FeatureMap::from_fn(|_| {
                VecDeque::with_capacity(config.stability_window + 1)
            }),
            config,
            view: View::Front,
            debounce: vec![DebounceState::default(); rule_count],
            frame_feedback: vec![None; rule_count],
        }
    }

    /// Compile an exercise configuration and build an engine from it.
    pub fn from_exercise(exercise: &ExerciseConfig) -> Result<Self> {
        Ok(Self::new(exercise.compile()?))
    }

    /// Select the threshold variant used from now on.
    pub fn set_view(&mut self, view: View) {
        if view != self.view {
            debug!(from = %self.view, to = %view, "camera view changed");
        }
        self.view = view;
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &RuleEngineConfig {
        &self.config
    }

    /// Debounce state of a rule, by id.
    pub fn debounce_state(&self, rule_id: &str) -> Option<DebounceState> {
        self.rule_index(rule_id).map(|i| self.debounce[i])
    }

    pub fn is_error_active(&self, rule_id: &str) -> bool {
        self.debounce_state(rule_id)
            .map(|state| state.error_active)
            .unwrap_or(false)
    }

    /// Samples currently held in a feature's stability window.
    pub fn stability_samples(&self, feature: FeatureId) -> usize {
        self.stability_buffers[feature].len()
    }

    /// Feedback cached by the most recent frame evaluation, in rule order.
    pub fn frame_feedback(&self) -> impl Iterator<Item = &Feedback> {
        self.frame_feedback.iter().flatten()
    }

    /// Evaluate every FRAME rule against one frame's measurements.
    ///
    /// Updates debounce state and caches the result for the end-of-rep
    /// evaluation.
    pub fn evaluate_frame(&mut self, frame: &FeatureFrame, current_phase: Phase) -> Vec<Feedback> {
        let mut feedbacks = Vec::new();
        let mut sampled: FeatureMap<bool> = FeatureMap::default();
        self.frame_feedback.iter_mut().for_each(|slot| *slot = None);

        for index in 0..self.rules.len() {
            let rule = &self.rules[index];
            if rule.granularity != Granularity::Frame {
                continue;
            }

            let Some(threshold) = rule.threshold(self.view) else {
                trace!(rule = %rule.id, view = %self.view, "no threshold for view");
                continue;
            };

            // IDLE as a target means "any phase"
            if let Some(target) = rule.target_phase {
                if target != Phase::Idle && target != current_phase {
                    self.update_debounce(index, true);
                    continue;
                }
            }

            let rule = &self.rules[index];
            let value = match rule.kind {
                RuleKind::Range { feature, .. } => frame.get(feature),
                RuleKind::Symmetry { left, right, .. } => match (frame.get(left), frame.get(right)) {
                    (Some(l), Some(r)) => Some((l - r).abs()),
                    _ => None,
                },
                RuleKind::Stability { feature, .. } => {
                    let Some(sample) = frame.get(feature) else {
                        continue;
                    };
                    if !sampled[feature] {
                        sampled[feature] = true;
                        let window = self.config.stability_window;
                        let buffer = &mut self.stability_buffers[feature];
                        buffer.push_back(sample);
                        if buffer.len() > window {
                            buffer.pop_front();
                        }
                    }
                    let buffer = &self.stability_buffers[feature];
                    if buffer.len() < self.config.stability_window {
                        None
                    } else {
                        Some(population_std(buffer)).filter(|std| !std.is_nan())
                    }
                }
            };

            let Some(value) = value else {
                continue;
            };

            let rule = &self.rules[index];
            let verdict = compare(rule.comparator, value, threshold, self.config.mean_tolerance);
            let passed = self.update_debounce(index, verdict.passed);

            let rule = &self.rules[index];
            let feedback = Feedback::new(
                rule.id.clone(),
                rule.error_type.clone(),
                passed,
                value,
                threshold,
                verdict.direction,
            );
            self.frame_feedback[index] = Some(feedback.clone());
            feedbacks.push(feedback);
        }

        feedbacks
    }

    /// End-of-rep evaluation.
    ///
    /// Returns the cached FRAME results, REP rules judged on `rep`, and PHASE
    /// rules judged on `phases` (all PHASE rules are skipped when it is
    /// `None`), in rule order.
    pub fn evaluate_with_phases(
        &self,
        rep: &AggregateRecord,
        phases: Option<&PhaseAggregates>,
    ) -> Vec<Feedback> {
        let mut feedbacks = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            let Some(threshold) = rule.threshold(self.view) else {
                continue;
            };

            let record = match rule.granularity {
                Granularity::Frame => {
                    if let Some(feedback) = &self.frame_feedback[index] {
                        feedbacks.push(feedback.clone());
                    }
                    continue;
                }
                Granularity::Phase => {
                    match (phases, rule.target_phase) {
                        (Some(phases), Some(target)) => phases.get(target),
                        _ => continue,
                    }
                }
                Granularity::Rep => rep,
            };

            let Some(value) = aggregate_value(rule, record) else {
                trace!(rule = %rule.id, "no aggregate value");
                continue;
            };

            let compared = match rule.kind {
                RuleKind::Symmetry { .. } => value.abs(),
                _ => value,
            };
            let verdict = compare(rule.comparator, compared, threshold, self.config.mean_tolerance);

            feedbacks.push(Feedback::new(
                rule.id.clone(),
                rule.error_type.clone(),
                verdict.passed,
                value,
                threshold,
                verdict.direction,
            ));
        }

        feedbacks
    }

    /// REP rules plus cached FRAME results, without phase aggregates.
    pub fn evaluate_rep(&self, rep: &AggregateRecord) -> Vec<Feedback> {
        self.evaluate_with_phases(rep, None)
    }

    /// Clear per-rep buffers. Debounce state is kept across reps.
    pub fn reset(&mut self) {
        for (_, buffer) in self.stability_buffers.iter_mut() {
            buffer.clear();
        }
        self.frame_feedback.iter_mut().for_each(|slot| *slot = None);
    }

    /// Clear everything, including debounce state. Call once per session.
    pub fn full_reset(&mut self) {
        self.reset();
        self.debounce.fill(DebounceState::default());
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn rule_index(&self, rule_id: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.id == rule_id)
    }

    fn update_debounce(&mut self, index: usize, instant_passed: bool) -> bool {
        let state = &mut self.debounce[index];
        let was_active = state.error_active;
        let passed = state.update(
            instant_passed,
            self.config.error_trigger_frames,
            self.config.error_clear_frames,
        );

        if was_active != state.error_active {
            let rule = &self.rules[index];
            if state.error_active {
                debug!(rule = %rule.id, error_type = %rule.error_type, "form error raised");
            } else {
                debug!(rule = %rule.id, error_type = %rule.error_type, "form error cleared");
            }
        }

        passed
    }
}

/// Value a REP or PHASE rule is judged on.
///
/// SYMMETRY yields the signed `left - right` of the bare means; the other
/// kinds read the statistic named by the comparator, falling back to the
/// bare mean.
fn aggregate_value(rule: &Rule, record: &AggregateRecord) -> Option<f32> {
    let value = match rule.kind {
        RuleKind::Symmetry { left, right, .. } => {
            Some(record.alias(left)? - record.alias(right)?)
        }
        RuleKind::Range { feature, .. } | RuleKind::Stability { feature, .. } => {
            record.resolve(feature, rule.comparator.statistic())
        }
    };
    value.filter(|v| !v.is_nan())
}

fn population_std(values: &VecDeque<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    variance.sqrt()
}

// ============================================================================
// TESTS
// ============================================================================
