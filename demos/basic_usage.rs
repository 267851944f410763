/// Basic usage example: Feed squat measurements, get rep and form feedback
use form_sensing::{
    ExerciseConfig, ExerciseSession, FeatureFrame, FeatureId, RepReport, SessionConfig,
};

const SQUAT: &str = r#"{
    "exercise": "squat",
    "rules": [
        {"id": "depth", "error_type": "insufficient_depth", "type": "range",
         "feature": "knee_flexion", "comparator": "mean", "evaluation": "PHASE",
         "targetPhase": "ASCENDING", "thresholds": {"front": 70, "side": 80}},
        {"id": "lean", "error_type": "forward_lean", "type": "range",
         "feature": "trunk_angle", "comparator": "max", "evaluation": "FRAME",
         "thresholds": {"front": 30, "side": 40}},
        {"id": "knees", "error_type": "uneven_knees", "type": "symmetry",
         "feature_left": "knee_flexion_left", "feature_right": "knee_flexion_right",
         "comparator": "max", "evaluation": "REP", "maxDiff": {"front": 10}}
    ]
}"#;

fn main() -> form_sensing::Result<()> {
    println!("=== Form Sensing Engine: Basic Example ===\n");

    let exercise = ExerciseConfig::from_json_str(SQUAT)?;
    let mut session = ExerciseSession::from_exercise(&exercise, SessionConfig::default())?;

    // Simulated mid-hip height: stand, squat 120px down, stand back up
    let mut tracking = vec![300.0; 10];
    tracking.extend((1..=10).map(|i| 300.0 + 12.0 * i as f32));
    tracking.extend((1..=10).map(|i| 420.0 - 12.0 * i as f32));
    tracking.extend(std::iter::repeat(300.0).take(15));

    println!("Processing {} frames...\n", tracking.len());

    for (i, &y) in tracking.iter().enumerate() {
        let depth = (y - 300.0) / 120.0;
        let frame = FeatureFrame::new()
            .with(FeatureId::KneeFlexion, 100.0 * depth)
            .with(FeatureId::KneeFlexionLeft, 100.0 * depth + 2.0)
            .with(FeatureId::KneeFlexionRight, 100.0 * depth - 2.0)
            .with(FeatureId::TrunkAngle, 15.0 + 20.0 * depth);

        let outcome = session.process_frame(y, &frame);

        for feedback in outcome.feedback.iter().filter(|f| !f.passed) {
            println!("frame {i:>3}: {} ({:.1} > {:.1})", feedback.error_type, feedback.value, feedback.threshold);
        }
        if let Some(report) = outcome.rep {
            print_report(&report);
        }
    }

    println!("\n=== Summary ===");
    println!("Repetitions: {}", session.reps_completed());
    Ok(())
}

fn print_report(report: &RepReport) {
    println!("\n--- Rep {} ---", report.index);
    for feedback in &report.feedback {
        let verdict = if feedback.passed { "ok" } else { "FAIL" };
        let hint = feedback
            .direction
            .map(|d| format!(" ({d:?})"))
            .unwrap_or_default();
        println!(
            "  {:<8} {:<20} value {:>7.2} threshold {:>6.1} {verdict}{hint}",
            feedback.rule_id, feedback.error_type, feedback.value, feedback.threshold
        );
    }
}
