//! Repetition Phase Detection Module.
//!
//! Tracks a single vertical reference coordinate (normally the mid-hip `y`
//! in source pixels) and turns it into a repetition phase:
//! IDLE → DESCENDING → ASCENDING → IDLE.
//!
//! Velocity is the difference between the mean of the most recent frames
//! and the mean of the older frames still in the window. Comparing two
//! sliding sub-window averages instead of a single-frame derivative keeps
//! pose-estimation jitter from flipping the phase, while still reacting
//! within a few frames.
//!
//! A repetition only completes when motion has stopped *near where the
//! window started*, so a brief pause mid-ascent does not count as a rep.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FormError, Result};
use crate::types::{Phase, PhaseUpdate};

/// Configuration for phase detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDetectorConfig {
    /// Capacity of the reference-position window (frames).
    pub window_size: usize,
    /// Number of newest frames forming the "recent" sub-window.
    pub recent_frames: usize,
    /// Minimum smoothed velocity that counts as movement (pixels).
    pub movement_threshold: f32,
}

impl Default for PhaseDetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,         // ~330ms at 30fps
            recent_frames: 3,
            movement_threshold: 7.0, // pixels between sub-window means
        }
    }
}

impl PhaseDetectorConfig {
    /// Check that the window can hold a recent sub-window plus history.
    pub fn validate(&self) -> Result<()> {
        if self.recent_frames == 0 {
            return Err(FormError::invalid_value("recent_frames", "must be > 0"));
        }
        if self.window_size < self.recent_frames {
            return Err(FormError::invalid_value(
                "window_size",
                format!("must be >= recent_frames ({})", self.recent_frames),
            ));
        }
        if !(self.movement_threshold.is_finite() && self.movement_threshold > 0.0) {
            return Err(FormError::invalid_value(
                "movement_threshold",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

/// Repetition phase detector driven by one coordinate per frame.
pub struct PhaseDetector {
    config: PhaseDetectorConfig,

    // Reference-position window, oldest first
    window: VecDeque<f32>,

    state: Phase,
}

impl PhaseDetector {
    /// Create a new phase detector with the given configuration.
    pub fn new(config: PhaseDetectorConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size + 1),
            config,
            state: Phase::Idle,
        }
    }

    /// Create a phase detector with default configuration.
    pub fn default_detector() -> Self {
        Self::new(PhaseDetectorConfig::default())
    }

    /// Feed one frame's reference coordinate and get the resulting phase.
    ///
    /// A not-a-number coordinate is still pushed into the window so frame
    /// timing stays aligned, but it never changes state and reports zero
    /// velocity.
    pub fn detect(&mut self, value: f32) -> PhaseUpdate {
        self.window.push_back(value);
        if self.window.len() > self.config.window_size {
            self.window.pop_front();
        }

        if value.is_nan() {
            return PhaseUpdate::new(self.state, false, 0.0);
        }

        if self.window.len() < self.config.recent_frames {
            return PhaseUpdate::new(self.state, false, 0.0);
        }

        let velocity = self.velocity();
        let is_rep_finished = self.transition(value, velocity);

        PhaseUpdate::new(self.state, is_rep_finished, velocity)
    }

    /// Get the current phase.
    pub fn state(&self) -> Phase {
        self.state
    }

    /// Number of coordinates currently held in the window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Reset for a new set of repetitions.
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = Phase::Idle;
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn velocity(&self) -> f32 {
        self.recent_mean() - self.older_mean()
    }

    fn recent_mean(&self) -> f32 {
        let n = self.config.recent_frames;
        let recent = self.window.iter().skip(self.window.len() - n);
        recent.sum::<f32>() / n as f32
    }

    fn older_mean(&self) -> f32 {
        let older_len = self.window.len() - self.config.recent_frames;
        if older_len == 0 {
            // Only the recent sub-window exists yet
            return self.window[0];
        }
        self.window.iter().take(older_len).sum::<f32>() / older_len as f32
    }

    /// Apply the transition table. Returns true when a repetition completes.
    fn transition(&mut self, value: f32, velocity: f32) -> bool {
        let threshold = self.config.movement_threshold;
        let previous = self.state;
        let mut is_rep_finished = false;

        match self.state {
            Phase::Idle => {
                if velocity > threshold {
                    self.state = Phase::Descending;
                }
            }
            Phase::Descending => {
                if velocity < -threshold {
                    self.state = Phase::Ascending;
                }
            }
            Phase::Ascending => {
                if velocity > threshold {
                    // Went back down before finishing
                    self.state = Phase::Descending;
                } else if velocity.abs() < threshold / 2.0 {
                    let start = self.window[0];
                    if (value - start).abs() < threshold * 2.0 {
                        self.state = Phase::Idle;
                        is_rep_finished = true;
                    }
                }
            }
        }

        if previous != self.state {
            debug!(from = %previous, to = %self.state, velocity, "phase transition");
        }
        if is_rep_finished {
            info!(velocity, "repetition finished");
        }

        is_rep_finished
    }
}

impl Default for PhaseDetector {
    fn default() -> Self {
        Self::default_detector()
    }
}

// ============================================================================
// TESTS
// ============================================================================
