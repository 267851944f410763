//! Form Sensing Engine Library
//!
//! A real-time repetition and movement-quality kernel that converts a stream
//! of body-landmark frames into repetition boundaries and pass/fail form
//! feedback for a single exercise.
//!
//! # Design Philosophy
//!
//! This library is built on several core principles:
//!
//! - **Fail-soft per frame**: A landmark that cannot be seen removes only the
//!   measurements that depend on it. The per-frame path never returns errors.
//! - **Stable feedback**: Frame-level errors are debounced so they do not
//!   flicker with pose-estimation noise.
//! - **Static rules**: An exercise is described by data, validated once, and
//!   never changes while a session runs.
//! - **Isolated sessions**: Every session owns its own detector, aggregator
//!   and rule engine. Nothing is process-wide.
//!
//! # Example
//!
//! ```ignore
//! use form_sensing::{ExerciseConfig, ExerciseSession, SessionConfig};
//!
//! let exercise = ExerciseConfig::load("squat.json")?;
//! let mut session = ExerciseSession::from_exercise(&exercise, SessionConfig::default())?;
//!
//! for pose in frames {
//!     let outcome = session.process_pose(&pose);
//!     if let Some(rep) = outcome.rep {
//!         println!("rep {} feedback: {:?}", rep.index, rep.feedback);
//!     }
//! }
//! ```

pub mod aggregation;
pub mod error;
pub mod features;
pub mod geometry;
pub mod metrics;
pub mod phase_detection;
pub mod preprocess;
pub mod rule_engine;
pub mod rules;
pub mod session;
pub mod types;

mod integration_tests;

// Re-export commonly used types
pub use aggregation::{AggregateKey, AggregateRecord, FeatureAggregator, PhaseAggregates, Statistic};
pub use error::{FormError, Result};
pub use features::{FeatureExtractor, FeatureExtractorConfig, PoseFeatures};
pub use phase_detection::{PhaseDetector, PhaseDetectorConfig};
pub use rule_engine::{DebounceState, RuleEngine, RuleEngineConfig};
pub use rules::{Comparator, ExerciseConfig, Granularity, Rule, RuleKind, RuleSpec, ViewThresholds};
pub use session::{ExerciseSession, FrameOutcome, RepReport, SessionConfig};
pub use types::{
    Direction, FeatureFrame, FeatureId, FeatureMap, Feedback, Keypoint, Landmark, Phase,
    PhaseUpdate, PoseFrame, View,
};
