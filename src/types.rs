//! Core data types for the form sensing engine.
//!
//! This module defines the vocabulary shared by the phase detector, the
//! feature aggregator and the rule engine. Anything that crosses a module
//! boundary gets a type here: phases, camera views, feature identifiers,
//! landmark frames and feedback records.
//!
//! Design principle: a measurement that could not be computed is carried as
//! a not-a-number sentinel at the outer boundary only. Inside the crate it is
//! an absent entry, so a missing landmark can never be mistaken for a value.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormError;

// ============================================================================
// PHASE AND VIEW
// ============================================================================

/// Direction of motion within a repetition.
///
/// The cycle is IDLE → DESCENDING → ASCENDING → IDLE. There is no terminal
/// state; returning to IDLE after a completed repetition restarts the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Standing still between repetitions.
    #[default]
    Idle,
    /// Tracked coordinate moving down the image (hips lowering).
    Descending,
    /// Tracked coordinate moving back up.
    Ascending,
}

impl Phase {
    /// All phases in their canonical order.
    pub const ALL: [Phase; 3] = [Phase::Idle, Phase::Descending, Phase::Ascending];

    /// Position of this phase in [`Phase::ALL`].
    pub fn index(self) -> usize {
        match self {
            Phase::Idle => 0,
            Phase::Descending => 1,
            Phase::Ascending => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Descending => "DESCENDING",
            Phase::Ascending => "ASCENDING",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera placement relative to the athlete.
///
/// Selects which threshold variant of a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Camera faces the athlete.
    #[default]
    Front,
    /// Camera sees the athlete in profile.
    Side,
}

impl FromStr for View {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(View::Front),
            "side" => Ok(View::Side),
            _ => Err(FormError::UnknownView(s.to_string())),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Front => f.write_str("front"),
            View::Side => f.write_str("side"),
        }
    }
}

/// Which side of the tolerance band a MEAN comparison fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Low,
    High,
}

// ============================================================================
// FEATURE IDENTIFIERS
// ============================================================================

/// A derived measurement the engine knows how to accumulate and judge.
///
/// The set is closed: configuration that names anything else is rejected at
/// load time instead of silently creating an orphan series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureId {
    /// Mean of left and right knee flexion (degrees).
    KneeFlexion,
    KneeFlexionLeft,
    KneeFlexionRight,
    /// Mean of left and right hip flexion (degrees).
    HipFlexion,
    HipFlexionLeft,
    HipFlexionRight,
    /// Lean of the hip→shoulder line from vertical (degrees).
    TrunkAngle,
    /// Ankle separation relative to shoulder separation (ratio).
    StanceWidth,
}

impl FeatureId {
    /// Number of known features.
    pub const COUNT: usize = 8;

    /// All features in table order.
    pub const ALL: [FeatureId; FeatureId::COUNT] = [
        FeatureId::KneeFlexion,
        FeatureId::KneeFlexionLeft,
        FeatureId::KneeFlexionRight,
        FeatureId::HipFlexion,
        FeatureId::HipFlexionLeft,
        FeatureId::HipFlexionRight,
        FeatureId::TrunkAngle,
        FeatureId::StanceWidth,
    ];

    /// Position of this feature in [`FeatureId::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The snake_case name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            FeatureId::KneeFlexion => "knee_flexion",
            FeatureId::KneeFlexionLeft => "knee_flexion_left",
            FeatureId::KneeFlexionRight => "knee_flexion_right",
            FeatureId::HipFlexion => "hip_flexion",
            FeatureId::HipFlexionLeft => "hip_flexion_left",
            FeatureId::HipFlexionRight => "hip_flexion_right",
            FeatureId::TrunkAngle => "trunk_angle",
            FeatureId::StanceWidth => "stance_width",
        }
    }
}

impl FromStr for FeatureId {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| FormError::UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fixed-size table with one slot per [`FeatureId`].
///
/// Iteration always follows [`FeatureId::ALL`], so anything built from a
/// map (aggregate records, feedback) comes out in a stable order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap<T> {
    slots: [T; FeatureId::COUNT],
}

impl<T: Default> Default for FeatureMap<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| T::default()),
        }
    }
}

impl<T> FeatureMap<T> {
    /// Build a map by computing each slot from its feature.
    pub fn from_fn(mut f: impl FnMut(FeatureId) -> T) -> Self {
        Self {
            slots: std::array::from_fn(|i| f(FeatureId::ALL[i])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &T)> {
        FeatureId::ALL.iter().copied().zip(self.slots.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FeatureId, &mut T)> {
        FeatureId::ALL.iter().copied().zip(self.slots.iter_mut())
    }
}

impl<T> Index<FeatureId> for FeatureMap<T> {
    type Output = T;

    fn index(&self, id: FeatureId) -> &T {
        &self.slots[id.index()]
    }
}

impl<T> IndexMut<FeatureId> for FeatureMap<T> {
    fn index_mut(&mut self, id: FeatureId) -> &mut T {
        &mut self.slots[id.index()]
    }
}

/// Measurements computed for a single frame.
///
/// Unset and not-a-number entries both read back as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    values: FeatureMap<f32>,
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self {
            values: FeatureMap::from_fn(|_| f32::NAN),
        }
    }
}

impl FeatureFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, id: FeatureId, value: f32) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: FeatureId, value: f32) {
        self.values[id] = value;
    }

    /// The measured value, or `None` when it could not be computed.
    pub fn get(&self, id: FeatureId) -> Option<f32> {
        let value = self.values[id];
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    /// Raw value including the not-a-number sentinel.
    pub fn raw(&self, id: FeatureId) -> f32 {
        self.values[id]
    }

    /// All entries, including those that are not-a-number.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, f32)> + '_ {
        self.values.iter().map(|(id, v)| (id, *v))
    }

    /// Number of entries holding a usable value.
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|(_, v)| !v.is_nan()).count()
    }
}

// ============================================================================
// LANDMARK INPUT
// ============================================================================

/// A single body landmark in source pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Depth, when the pose model provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    /// Detection confidence in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
        }
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// True when both planar coordinates are finite numbers.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Landmark indices in the 33-point BlazePose topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landmark {
    Nose = 0,
    LeftEar = 7,
    RightEar = 8,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

impl Landmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One frame of pose output, already mapped to source pixel space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    pub keypoints: Vec<Keypoint>,
    /// World-space keypoints, preferred for joint angles when present.
    #[serde(default, rename = "keypoints3D", skip_serializing_if = "Option::is_none")]
    pub keypoints_3d: Option<Vec<Keypoint>>,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl PoseFrame {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            keypoints_3d: None,
            timestamp_ms: None,
        }
    }

    /// Planar keypoint for a landmark, if the model reported it.
    pub fn get(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.keypoints.get(landmark.index())
    }

    /// World-space keypoint for a landmark, if supplied.
    pub fn get_3d(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.keypoints_3d.as_ref()?.get(landmark.index())
    }
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// Result of feeding one tracked coordinate to the phase detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseUpdate {
    /// Phase after this frame's transition, if any.
    pub state: Phase,
    /// True only on the frame that completes a repetition.
    pub is_rep_finished: bool,
    /// Smoothed velocity in pixels (positive = moving down).
    pub velocity: f32,
}

impl PhaseUpdate {
    pub fn new(state: Phase, is_rep_finished: bool, velocity: f32) -> Self {
        Self {
            state,
            is_rep_finished,
            velocity,
        }
    }
}

/// Verdict of a single rule for one evaluation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub rule_id: String,
    pub error_type: String,
    /// Debounced for frame rules, direct for phase and rep rules.
    pub passed: bool,
    /// Measured value the rule was judged on.
    pub value: f32,
    /// Threshold resolved for the active view.
    pub threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl Feedback {
    pub fn new(
        rule_id: impl Into<String>,
        error_type: impl Into<String>,
        passed: bool,
        value: f32,
        threshold: f32,
        direction: Option<Direction>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            error_type: error_type.into(),
            passed,
            value,
            threshold,
            direction,
        }
    }
}
