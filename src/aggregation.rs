//! Feature aggregation over repetitions and movement phases.
//!
//! Every usable measurement is appended to two series: one spanning the
//! whole repetition and one for the phase that was active when it was
//! recorded. At the repetition boundary the series are summarised into
//! descriptive statistics (min, max, mean, population standard deviation)
//! and the aggregator is reset for the next rep.
//!
//! Design: series are growth-only within a rep and live in fixed-size
//! tables keyed by [`FeatureId`], so a typo in a feature name is a
//! compile-time or load-time error rather than a silently empty series.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::types::{FeatureFrame, FeatureId, FeatureMap, Phase};

// ============================================================================
// AGGREGATE RECORDS
// ============================================================================

/// A summary statistic over a measurement series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Min,
    Max,
    Mean,
    Std,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [
        Statistic::Min,
        Statistic::Max,
        Statistic::Mean,
        Statistic::Std,
    ];

    /// Suffix appended to the feature name in flat records.
    pub fn suffix(self) -> &'static str {
        match self {
            Statistic::Min => "_min",
            Statistic::Max => "_max",
            Statistic::Mean => "_mean",
            Statistic::Std => "_std",
        }
    }
}

/// Key of one entry in an [`AggregateRecord`].
///
/// `stat == None` is the bare-name alias, which always carries the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    pub feature: FeatureId,
    pub stat: Option<Statistic>,
}

impl AggregateKey {
    pub fn stat(feature: FeatureId, stat: Statistic) -> Self {
        Self {
            feature,
            stat: Some(stat),
        }
    }

    pub fn alias(feature: FeatureId) -> Self {
        Self {
            feature,
            stat: None,
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stat {
            Some(stat) => write!(f, "{}{}", self.feature.name(), stat.suffix()),
            None => f.write_str(self.feature.name()),
        }
    }
}

/// Descriptive statistics of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// Population standard deviation.
    pub std: f32,
}

impl FeatureStats {
    /// Summarise a series. Returns `None` for an empty one.
    pub fn from_samples(samples: &[f32]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f32;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in samples {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / n;
        let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;

        Some(Self {
            min,
            max,
            mean,
            std: variance.sqrt(),
        })
    }

    pub fn get(&self, stat: Statistic) -> f32 {
        match stat {
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Mean => self.mean,
            Statistic::Std => self.std,
        }
    }
}

/// Flat statistic record for one scope (a whole rep or a single phase).
///
/// A feature that was never recorded in the scope is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRecord {
    entries: BTreeMap<AggregateKey, f32>,
}

impl AggregateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert all statistics for a feature plus its mean alias.
    pub fn insert_stats(&mut self, feature: FeatureId, stats: FeatureStats) {
        for stat in Statistic::ALL {
            self.entries
                .insert(AggregateKey::stat(feature, stat), stats.get(stat));
        }
        self.entries.insert(AggregateKey::alias(feature), stats.mean);
    }

    /// Insert a single entry. Used when replaying externally stored records.
    pub fn insert(&mut self, key: AggregateKey, value: f32) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: AggregateKey) -> Option<f32> {
        self.entries.get(&key).copied()
    }

    pub fn stat(&self, feature: FeatureId, stat: Statistic) -> Option<f32> {
        self.get(AggregateKey::stat(feature, stat))
    }

    /// The bare-name entry (the mean).
    pub fn alias(&self, feature: FeatureId) -> Option<f32> {
        self.get(AggregateKey::alias(feature))
    }

    /// Ordered lookup: the suffixed statistic, then the bare alias.
    pub fn resolve(&self, feature: FeatureId, stat: Statistic) -> Option<f32> {
        self.stat(feature, stat).or_else(|| self.alias(feature))
    }

    pub fn contains_feature(&self, feature: FeatureId) -> bool {
        self.entries.keys().any(|k| k.feature == feature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggregateKey, f32)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

impl Serialize for AggregateRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// One aggregate record per phase. Always holds exactly three records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseAggregates {
    records: [AggregateRecord; 3],
}

impl PhaseAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phase: Phase) -> &AggregateRecord {
        &self.records[phase.index()]
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut AggregateRecord {
        &mut self.records[phase.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &AggregateRecord)> {
        Phase::ALL.iter().copied().zip(self.records.iter())
    }
}

impl Index<Phase> for PhaseAggregates {
    type Output = AggregateRecord;

    fn index(&self, phase: Phase) -> &AggregateRecord {
        self.get(phase)
    }
}

impl Serialize for PhaseAggregates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Phase::ALL.len()))?;
        for (phase, record) in self.iter() {
            map.serialize_entry(phase.as_str(), record)?;
        }
        map.end()
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Accumulates measurements for the current repetition.
pub struct FeatureAggregator {
    current_phase: Phase,
    rep_series: FeatureMap<Vec<f32>>,
    phase_series: [FeatureMap<Vec<f32>>; 3],
}

impl FeatureAggregator {
    pub fn new() -> Self {
        Self {
            current_phase: Phase::Idle,
            rep_series: FeatureMap::default(),
            phase_series: Default::default(),
        }
    }

    /// Set the phase tag applied to subsequently recorded samples.
    ///
    /// No cross-check against the phase detector is made; a caller that
    /// forgets to update the tag simply attributes samples to the last phase.
    pub fn set_phase(&mut self, phase: Phase) {
        self.current_phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.current_phase
    }

    /// Record one measurement. Not-a-number means "not computable this
    /// frame" and is ignored.
    pub fn record_feature(&mut self, feature: FeatureId, value: f32) {
        if value.is_nan() {
            return;
        }
        self.rep_series[feature].push(value);
        self.phase_series[self.current_phase.index()][feature].push(value);
    }

    /// Record every entry of a frame's measurements.
    pub fn record_frame(&mut self, frame: &FeatureFrame) {
        for (feature, value) in frame.iter() {
            self.record_feature(feature, value);
        }
    }

    /// Number of rep-scoped samples recorded for a feature.
    pub fn sample_count(&self, feature: FeatureId) -> usize {
        self.rep_series[feature].len()
    }

    /// Number of samples recorded for a feature while `phase` was active.
    pub fn phase_sample_count(&self, phase: Phase, feature: FeatureId) -> usize {
        self.phase_series[phase.index()][feature].len()
    }

    /// Statistics over the whole repetition so far.
    pub fn rep_aggregates(&self) -> AggregateRecord {
        summarise(&self.rep_series)
    }

    /// Statistics per phase. A feature never seen in a phase is omitted
    /// from that phase only.
    pub fn phase_aggregates(&self) -> PhaseAggregates {
        let mut result = PhaseAggregates::new();
        for phase in Phase::ALL {
            *result.get_mut(phase) = summarise(&self.phase_series[phase.index()]);
        }
        result
    }

    /// Discard all series and return the tag to IDLE.
    pub fn reset(&mut self) {
        self.current_phase = Phase::Idle;
        for (_, series) in self.rep_series.iter_mut() {
            series.clear();
        }
        for table in self.phase_series.iter_mut() {
            for (_, series) in table.iter_mut() {
                series.clear();
            }
        }
    }
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn summarise(series: &FeatureMap<Vec<f32>>) -> AggregateRecord {
    let mut record = AggregateRecord::new();
    for (feature, samples) in series.iter() {
        if let Some(stats) = FeatureStats::from_samples(samples) {
            record.insert_stats(feature, stats);
        }
    }
    record
}

// ============================================================================
// TESTS
// ============================================================================
