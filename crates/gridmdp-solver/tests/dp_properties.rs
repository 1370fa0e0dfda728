use approx::assert_abs_diff_eq;
use gridmdp_core::{MdpModel, ProgressEvent};
use gridmdp_env::{make_env, PlainGrid, PlainGridConfig};
use gridmdp_solver::{DpAlgorithm, DpConfig, DpExport, DpSolver, InitialPolicy, JsonDocument};
use ndarray::Axis;
use serde_json::json;

fn plain(size: usize) -> PlainGrid {
    PlainGrid::new(PlainGridConfig {
        grid_size: size,
        ..Default::default()
    })
    .unwrap()
}

fn assert_rows_sum_to_one(solver: &DpSolver) {
    let sums = solver.policy().sum_axis(Axis(1));
    for (state, sum) in sums.iter().enumerate() {
        if solver.terminal_mask()[state] {
            assert_abs_diff_eq!(*sum, 0.0);
        } else {
            assert_abs_diff_eq!(*sum, 1.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn policy_and_value_iteration_agree() {
    let env = plain(4);
    let mut pi = DpSolver::new(&env, DpConfig::default()).unwrap();
    let mut vi = DpSolver::new(&env, DpConfig::default()).unwrap();
    let a = pi.run(DpAlgorithm::PolicyIteration).unwrap();
    let b = vi.run(DpAlgorithm::ValueIteration).unwrap();
    assert!(a.converged && b.converged);
    for (x, y) in a.final_values.iter().zip(b.final_values.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-4);
    }
}

#[test]
fn policy_iteration_from_first_action_matches_value_iteration() {
    let env = plain(4);
    let config = DpConfig {
        initial_policy: InitialPolicy::FirstAction,
        ..Default::default()
    };
    let mut pi = DpSolver::new(&env, config).unwrap();
    let mut vi = DpSolver::new(&env, DpConfig::default()).unwrap();
    let a = pi.run(DpAlgorithm::PolicyIteration).unwrap();
    let b = vi.run(DpAlgorithm::ValueIteration).unwrap();
    assert!(a.converged && b.converged);
    for (x, y) in a.final_values.iter().zip(b.final_values.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-4);
    }
}

#[test]
fn terminal_values_stay_zero() {
    for size in 3..=6 {
        let env = plain(size);
        for algorithm in [
            DpAlgorithm::PolicyEvaluation,
            DpAlgorithm::PolicyIteration,
            DpAlgorithm::ValueIteration,
        ] {
            let mut solver = DpSolver::new(&env, DpConfig::default()).unwrap();
            let result = solver.run(algorithm).unwrap();
            for terminal in env.terminal_states() {
                assert_eq!(result.final_values[terminal], 0.0, "{algorithm} size {size}");
            }
        }
    }
}

#[test]
fn policies_are_distributions() {
    let env = plain(5);
    let mut solver = DpSolver::new(&env, DpConfig::default()).unwrap();
    solver.policy_evaluation(None, true).unwrap();
    solver.policy_improvement();
    assert_rows_sum_to_one(&solver);

    solver.reset();
    solver.policy_iteration();
    assert_rows_sum_to_one(&solver);

    solver.reset();
    solver.value_iteration();
    assert_rows_sum_to_one(&solver);
}

#[test]
fn synchronous_deltas_shrink_with_discounting() {
    let env = plain(5);
    let config = DpConfig {
        gamma: 0.9,
        in_place: false,
        ..Default::default()
    };
    let mut solver = DpSolver::new(&env, config).unwrap();
    let evaluation = solver.policy_evaluation(None, false).unwrap();
    assert!(evaluation.converged);
    for pair in evaluation.deltas.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "{:?}", pair);
    }
}

#[test]
fn history_spans_cover_every_update() {
    let env = plain(4);
    let mut solver = DpSolver::new(&env, DpConfig::default()).unwrap();
    let result = solver.policy_iteration();
    let mut next = 0;
    for episode in &result.episode_history {
        assert_eq!(episode.first_record, next);
        next = episode.records().end;
    }
    assert_eq!(next, result.history.len());
}

#[test]
fn progress_streams_through_a_channel() {
    let env = plain(3);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let mut solver = DpSolver::new(&env, DpConfig::default()).unwrap().with_progress(Box::new(tx));
    let result = solver.policy_iteration();
    solver.set_progress(None);

    let mut updates = 0;
    let mut rounds = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ProgressEvent::Iteration(_) => updates += 1,
            ProgressEvent::DpEpisode(_) => rounds += 1,
            ProgressEvent::TdEpisode(_) => unreachable!(),
        }
    }
    assert_eq!(updates, result.total_updates);
    assert_eq!(rounds, result.total_episodes);
}

#[test]
fn export_roundtrip_keeps_six_decimals() {
    let env = make_env("grid", json!({ "grid_size": 5, "gamma": 0.9 })).unwrap();
    let config = DpConfig {
        gamma: 0.9,
        ..Default::default()
    };
    let mut solver = DpSolver::new(&env, config.clone()).unwrap();
    let result = solver.value_iteration();
    let doc = DpExport::new(env.describe(), &config, &result);

    let path = std::env::temp_dir().join(format!("gridmdp-dp-export-{}.json", std::process::id()));
    doc.write_to(&path).unwrap();
    let back = DpExport::read_from(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(back.summary.converged, result.converged);
    assert_eq!(back.summary.total_iterations, result.total_iterations);
    for (x, y) in back.values_array().iter().zip(result.final_values.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 5e-7);
    }
    let policy = back.policy_array().unwrap();
    for (x, y) in policy.iter().zip(result.final_policy.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 5e-7);
    }
    assert_eq!(back.iterations.len(), result.total_updates);
}
