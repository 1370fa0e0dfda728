//! Solve the plain grid exactly, then compare SARSA and Q-learning on the cliff.
//!
//! Run with `RUST_LOG=info cargo run --example cliff_comparison`.

use anyhow::Result;
use gridmdp_env::{make_env, render_policy, render_values, terminal_mask};
use gridmdp_solver::prelude::*;
use gridmdp_solver::{cliff_walking_comparison, experiment::learning_curve};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let grid = make_env("grid", serde_json::json!({ "grid_size": 4 }))?;
    let mut solver = DpSolver::new(&grid, DpConfig::default())?;
    let result = solver.run(DpAlgorithm::ValueIteration)?;
    let mask = terminal_mask(&grid);
    println!("Value iteration: {} sweeps, converged = {}", result.total_iterations, result.converged);
    println!("{}\n", render_values(grid.shape(), &result.final_values, &mask));
    println!("{}\n", render_policy(grid.shape(), &result.final_policy, &mask));

    let comparison = cliff_walking_comparison(500, 5, 0)?;
    for (algorithm, summary) in &comparison.summaries {
        let curve = learning_curve(summary.avg_episode_rewards.clone(), 50);
        println!(
            "{algorithm:>10}: avg reward {:8.2} ± {:5.2}, success {:5.1}%, last window {:8.2}",
            summary.avg_reward,
            summary.std_reward,
            summary.avg_success_rate * 100.0,
            curve.smoothed.last().copied().unwrap_or_default(),
        );
    }
    println!("Winners: {:?}", comparison.winners);
    Ok(())
}
