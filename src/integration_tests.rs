/// Integration tests for the complete exercise session
/// Drives synthetic squat poses through landmark extraction, phase detection,
/// aggregation and rule evaluation to validate end-to-end behaviour.

#[cfg(test)]
mod integration_tests {
    use crate::rules::*;
    use crate::session::*;
    use crate::types::*;
    use approx::assert_relative_eq;

    const SQUAT_RULES: &str = r#"{
        "exercise": "squat",
        "rules": [
            {"id": "depth", "error_type": "over_flexion", "type": "range",
             "feature": "knee_flexion", "comparator": "max", "evaluation": "REP",
             "thresholds": {"front": 150, "side": 150}},
            {"id": "lean", "error_type": "forward_lean", "type": "range",
             "feature": "trunk_angle", "comparator": "max", "evaluation": "FRAME",
             "thresholds": {"front": 30, "side": 30}},
            {"id": "bottom_lean", "error_type": "forward_lean", "type": "range",
             "feature": "trunk_angle", "comparator": "max", "evaluation": "PHASE",
             "targetPhase": "DESCENDING", "thresholds": {"front": 35}},
            {"id": "knee_symmetry", "error_type": "uneven_knees", "type": "symmetry",
             "feature_left": "knee_flexion_left", "feature_right": "knee_flexion_right",
             "comparator": "max", "evaluation": "REP", "maxDiff": {"front": 10}},
            {"id": "trunk_wobble", "error_type": "unstable_trunk", "type": "stability",
             "feature": "trunk_angle", "comparator": "std", "evaluation": "FRAME",
             "maxStd": {"side": 5}}
        ]
    }"#;

    /// Helper: Shape of one synthetic squatter.
    #[derive(Clone, Copy)]
    struct Squatter {
        /// Horizontal shoulder shift at full depth (pixels)
        lean: f32,
        /// Fraction of the left knee's forward travel made by the right knee
        right_knee_travel: f32,
    }

    impl Squatter {
        fn good() -> Self {
            Self {
                lean: 80.0,
                right_knee_travel: 1.0,
            }
        }

        /// Helper: Pose at squat depth `d` in [0, 1]
        fn pose(&self, d: f32) -> PoseFrame {
            let mut keypoints = vec![Keypoint::new(0.0, 0.0).with_visibility(0.0); 33];
            let mut put = |landmark: Landmark, x: f32, y: f32| {
                keypoints[landmark.index()] = Keypoint::new(x, y).with_visibility(0.95);
            };

            let hip_y = 300.0 + 120.0 * d;
            put(Landmark::LeftAnkle, 170.0, 600.0);
            put(Landmark::RightAnkle, 230.0, 600.0);
            put(Landmark::LeftKnee, 170.0 + 80.0 * d, 450.0);
            put(Landmark::RightKnee, 230.0 - 80.0 * d * self.right_knee_travel, 450.0);
            put(Landmark::LeftHip, 170.0 - 40.0 * d, hip_y);
            put(Landmark::RightHip, 230.0 + 40.0 * d, hip_y);
            put(Landmark::LeftShoulder, 170.0 - 40.0 * d + self.lean * d, hip_y - 200.0);
            put(Landmark::RightShoulder, 230.0 + 40.0 * d + self.lean * d, hip_y - 200.0);

            PoseFrame::new(keypoints)
        }

        /// Helper: One repetition: stand, descend, ascend, stand
        fn rep(&self, idle_before: usize, idle_after: usize) -> Vec<PoseFrame> {
            let mut depths = vec![0.0; idle_before];
            depths.extend((1..=10).map(|i| i as f32 / 10.0));
            depths.extend((1..=10).map(|i| 1.0 - i as f32 / 10.0));
            depths.extend(std::iter::repeat(0.0).take(idle_after));
            depths.into_iter().map(|d| self.pose(d)).collect()
        }
    }

    fn session(view: View) -> ExerciseSession {
        let exercise = ExerciseConfig::from_json_str(SQUAT_RULES).unwrap();
        let config = SessionConfig {
            view,
            ..SessionConfig::default()
        };
        ExerciseSession::from_exercise(&exercise, config).unwrap()
    }

    fn run(session: &mut ExerciseSession, poses: &[PoseFrame]) -> Vec<(usize, FrameOutcome)> {
        poses
            .iter()
            .enumerate()
            .map(|(i, pose)| (i, session.process_pose(pose)))
            .collect()
    }

    fn feedback<'a>(report: &'a RepReport, id: &str) -> Option<&'a Feedback> {
        report.feedback.iter().find(|f| f.rule_id == id)
    }

    #[test]
    fn test_clean_squat_passes_every_rule() {
        let mut session = session(View::Front);
        let outcomes = run(&mut session, &Squatter::good().rep(10, 15));

        let reps: Vec<_> = outcomes.iter().filter_map(|(i, o)| o.rep.as_ref().map(|r| (*i, r))).collect();
        assert_eq!(reps.len(), 1);
        let (frame, report) = reps[0];
        assert_eq!(frame, 37);
        assert_eq!(report.index, 1);

        let ids: Vec<_> = report.feedback.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["depth", "lean", "bottom_lean", "knee_symmetry"]);
        assert!(report.feedback.iter().all(|f| f.passed), "{:?}", report.feedback);

        // Symmetric legs: signed difference is zero
        assert_relative_eq!(feedback(report, "knee_symmetry").unwrap().value, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_phases_visited_in_order() {
        let mut session = session(View::Front);
        let mut visited = vec![Phase::Idle];
        for (_, outcome) in run(&mut session, &Squatter::good().rep(10, 15)) {
            if *visited.last().unwrap() != outcome.update.state {
                visited.push(outcome.update.state);
            }
        }
        assert_eq!(
            visited,
            vec![Phase::Idle, Phase::Descending, Phase::Ascending, Phase::Idle]
        );
    }

    #[test]
    fn test_forward_lean_is_debounced_and_judged_at_bottom() {
        let squatter = Squatter {
            lean: 200.0,
            ..Squatter::good()
        };
        let mut session = session(View::Front);
        let outcomes = run(&mut session, &squatter.rep(10, 15));

        // Lean exceeds 30° from depth 0.6: frames 15..=23
        let lean_failed: Vec<_> = outcomes
            .iter()
            .filter(|(_, o)| o.feedback.iter().any(|f| f.rule_id == "lean" && !f.passed))
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(lean_failed.first(), Some(&19), "raised on the 5th failing frame");
        assert!(lean_failed.len() >= 10, "held until enough passing frames");

        let report = outcomes.iter().find_map(|(_, o)| o.rep.as_ref()).unwrap();

        // Cleared again by the time the athlete stood still
        assert!(feedback(report, "lean").unwrap().passed);

        let bottom = feedback(report, "bottom_lean").unwrap();
        assert!(!bottom.passed);
        assert_relative_eq!(bottom.value, 45.0, epsilon = 1e-2);
        assert_eq!(bottom.threshold, 35.0);
    }

    #[test]
    fn test_uneven_knees_fail_symmetry() {
        let squatter = Squatter {
            right_knee_travel: 0.0,
            ..Squatter::good()
        };
        let mut session = session(View::Front);
        let report = run(&mut session, &squatter.rep(10, 15))
            .into_iter()
            .find_map(|(_, o)| o.rep)
            .unwrap();

        let symmetry = feedback(&report, "knee_symmetry").unwrap();
        assert!(!symmetry.passed);
        // Left knee bends further, so left - right is positive
        assert!(symmetry.value > 10.0);
    }

    #[test]
    fn test_three_consecutive_reps() {
        let squatter = Squatter::good();
        let mut poses = squatter.rep(10, 15);
        poses.extend(squatter.rep(0, 15));
        poses.extend(squatter.rep(0, 15));

        let mut session = session(View::Front);
        let finished: Vec<_> = run(&mut session, &poses)
            .into_iter()
            .filter_map(|(i, o)| o.rep.map(|r| (i, r.index)))
            .collect();

        assert_eq!(finished, vec![(37, 1), (72, 2), (107, 3)]);
        assert_eq!(session.reps_completed(), 3);
    }

    #[test]
    fn test_side_view_selects_side_rules() {
        let mut session = session(View::Side);
        let outcomes = run(&mut session, &Squatter::good().rep(10, 15));

        // Stability needs ten samples before it speaks
        assert!(outcomes[..9]
            .iter()
            .all(|(_, o)| o.feedback.iter().all(|f| f.rule_id != "trunk_wobble")));
        assert!(outcomes[9].1.feedback.iter().any(|f| f.rule_id == "trunk_wobble"));

        let report = outcomes.iter().find_map(|(_, o)| o.rep.as_ref()).unwrap();
        let ids: Vec<_> = report.feedback.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["depth", "lean", "trunk_wobble"]);
    }

    #[test]
    fn test_occluded_knee_skips_only_dependent_rules() {
        let squatter = Squatter::good();
        let mut poses = squatter.rep(10, 15);
        for pose in &mut poses {
            pose.keypoints[Landmark::RightKnee.index()].visibility = Some(0.1);
        }

        let mut session = session(View::Front);
        let report = run(&mut session, &poses)
            .into_iter()
            .find_map(|(_, o)| o.rep)
            .unwrap();

        assert!(feedback(&report, "knee_symmetry").is_none());
        assert!(feedback(&report, "depth").is_none());
        assert!(feedback(&report, "bottom_lean").is_some());
        assert!(!report.rep_aggregates.contains_feature(FeatureId::KneeFlexionRight));
    }

    #[test]
    fn test_lost_tracking_at_start_still_counts_rep() {
        let mut poses = Squatter::good().rep(10, 15);
        for pose in &mut poses[..2] {
            pose.keypoints[Landmark::LeftHip.index()].visibility = Some(0.0);
        }

        let mut session = session(View::Front);
        let outcomes = run(&mut session, &poses);
        assert!(outcomes[0].1.update.velocity == 0.0);

        let finished: Vec<_> = outcomes.iter().filter(|(_, o)| o.rep.is_some()).map(|(i, _)| *i).collect();
        assert_eq!(finished, vec![37]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let squatter = Squatter {
            lean: 200.0,
            ..Squatter::good()
        };
        let mut leaning = session(View::Front);
        let mut upright = session(View::Front);

        for (bad, good) in squatter.rep(10, 0).iter().zip(Squatter::good().rep(10, 0).iter()) {
            leaning.process_pose(bad);
            upright.process_pose(good);
        }

        assert!(leaning.engine().is_error_active("lean"));
        assert!(!upright.engine().is_error_active("lean"));
    }

    #[test]
    fn test_start_set_mid_rep_discards_partial_rep() {
        let squatter = Squatter::good();
        let poses = squatter.rep(10, 15);

        let mut session = session(View::Front);
        run(&mut session, &poses[..20]);
        assert_ne!(session.phase(), Phase::Idle);

        session.start_set();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.aggregator().sample_count(FeatureId::TrunkAngle), 0);

        let finished = run(&mut session, &poses)
            .into_iter()
            .filter(|(_, o)| o.rep.is_some())
            .count();
        assert_eq!(finished, 1);
        assert_eq!(session.reps_completed(), 1);
    }
}
