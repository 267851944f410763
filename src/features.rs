//! Squat Feature Extraction Module.
//!
//! Turns one frame of BlazePose landmarks into the measurements the rule
//! engine judges, plus the coordinate the phase detector tracks:
//! - Knee flexion per side: `180 - angle(hip, knee, ankle)`
//! - Hip flexion per side: `180 - angle(shoulder, hip, knee)`
//! - Trunk angle: lean of the mid-hip → mid-shoulder line from vertical
//! - Stance width: ankle spread relative to shoulder width
//!
//! Angles prefer world-space keypoints when the pose model supplies them.
//! Landmarks below the visibility floor are treated as absent, which leaves
//! every dependent feature absent for the frame.

use serde::{Deserialize, Serialize};

use crate::error::{FormError, Result};
use crate::geometry::{angle_3d, angle_from_vertical, distance_2d, is_visible, midpoint};
use crate::types::{FeatureFrame, FeatureId, Keypoint, Landmark, PoseFrame};

/// Configuration for feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    /// Minimum landmark visibility to be used.
    pub min_visibility: f32,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            min_visibility: 0.5,
        }
    }
}

impl FeatureExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_visibility) {
            return Err(FormError::invalid_value("min_visibility", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Features of one pose frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFeatures {
    /// Mid-hip `y` in source pixels, NaN when the hips are not visible.
    pub tracking: f32,
    pub frame: FeatureFrame,
}

/// Stateless squat feature extractor.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Extract the feature frame and tracking coordinate from a pose.
    pub fn extract(&self, pose: &PoseFrame) -> PoseFeatures {
        let mut frame = FeatureFrame::new();

        let knee_left = self.flexion(pose, Landmark::LeftHip, Landmark::LeftKnee, Landmark::LeftAnkle);
        let knee_right = self.flexion(pose, Landmark::RightHip, Landmark::RightKnee, Landmark::RightAnkle);
        frame.set(FeatureId::KneeFlexionLeft, knee_left);
        frame.set(FeatureId::KneeFlexionRight, knee_right);
        frame.set(FeatureId::KneeFlexion, side_mean(knee_left, knee_right));

        let hip_left = self.flexion(pose, Landmark::LeftShoulder, Landmark::LeftHip, Landmark::LeftKnee);
        let hip_right = self.flexion(pose, Landmark::RightShoulder, Landmark::RightHip, Landmark::RightKnee);
        frame.set(FeatureId::HipFlexionLeft, hip_left);
        frame.set(FeatureId::HipFlexionRight, hip_right);
        frame.set(FeatureId::HipFlexion, side_mean(hip_left, hip_right));

        let mid_hip = self.pair_midpoint(pose, Landmark::LeftHip, Landmark::RightHip);
        let mid_shoulder = self.pair_midpoint(pose, Landmark::LeftShoulder, Landmark::RightShoulder);
        if let (Some(hip), Some(shoulder)) = (&mid_hip, &mid_shoulder) {
            frame.set(FeatureId::TrunkAngle, angle_from_vertical(hip, shoulder));
        }

        frame.set(FeatureId::StanceWidth, self.stance_width(pose));

        PoseFeatures {
            tracking: mid_hip.map_or(f32::NAN, |hip| hip.y),
            frame,
        }
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn visible(&self, pose: &PoseFrame, landmark: Landmark) -> Option<Keypoint> {
        pose.get(landmark)
            .filter(|kp| is_visible(kp, self.config.min_visibility))
            .copied()
    }

    /// World-space point when available, otherwise the planar one.
    /// Visibility is always judged on the planar landmark.
    fn angle_point(&self, pose: &PoseFrame, landmark: Landmark) -> Option<Keypoint> {
        let planar = self.visible(pose, landmark)?;
        match pose.get_3d(landmark) {
            Some(world) if world.is_valid() => Some(*world),
            _ => Some(planar),
        }
    }

    fn flexion(&self, pose: &PoseFrame, a: Landmark, b: Landmark, c: Landmark) -> f32 {
        match (
            self.angle_point(pose, a),
            self.angle_point(pose, b),
            self.angle_point(pose, c),
        ) {
            (Some(a), Some(b), Some(c)) => 180.0 - angle_3d(&a, &b, &c),
            _ => f32::NAN,
        }
    }

    fn pair_midpoint(&self, pose: &PoseFrame, left: Landmark, right: Landmark) -> Option<Keypoint> {
        let left = self.visible(pose, left)?;
        let right = self.visible(pose, right)?;
        Some(midpoint(&left, &right))
    }

    fn stance_width(&self, pose: &PoseFrame) -> f32 {
        let points = (
            self.visible(pose, Landmark::LeftAnkle),
            self.visible(pose, Landmark::RightAnkle),
            self.visible(pose, Landmark::LeftShoulder),
            self.visible(pose, Landmark::RightShoulder),
        );
        let (Some(la), Some(ra), Some(ls), Some(rs)) = points else {
            return f32::NAN;
        };

        let shoulders = distance_2d(&ls, &rs);
        if shoulders == 0.0 {
            return f32::NAN;
        }
        distance_2d(&la, &ra) / shoulders
    }
}

/// Bilateral mean; NaN when either side is missing.
fn side_mean(left: f32, right: f32) -> f32 {
    (left + right) / 2.0
}

// ============================================================================
// TESTS
// ============================================================================
