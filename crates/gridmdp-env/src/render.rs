//! Plain-text rendering of grids, value functions and policies

use std::fmt::Write;

use ndarray::{Array1, Array2};

use gridmdp_core::{policy::policy_arrows, Environment, GridShape, MdpModel, Position, StateId};

use crate::GridWorld;

fn cell(env: &GridWorld, state: StateId) -> String {
    if env.current_state() == Some(state) {
        return " A ".to_string();
    }
    match env {
        GridWorld::Plain(grid) if grid.is_terminal(state) => " T ".to_string(),
        GridWorld::Plain(_) => format!("{state:3}"),
        GridWorld::Windy(grid) if state == grid.goal_state() => " G ".to_string(),
        GridWorld::Windy(grid) if state == grid.start_state() => " S ".to_string(),
        GridWorld::Cliff(grid) if state == grid.goal_state() => " G ".to_string(),
        GridWorld::Cliff(grid) if state == grid.start_state() => " S ".to_string(),
        GridWorld::Cliff(grid) if grid.is_cliff(state) => " C ".to_string(),
        GridWorld::Windy(_) | GridWorld::Cliff(_) => " . ".to_string(),
    }
}

/// Draw the grid with the agent `A`, terminals `T`, goal `G`, start `S` and
/// cliff cells `C`. Windy grids get a header with the wind per column.
#[must_use]
pub fn render_grid(env: &GridWorld) -> String {
    let shape = env.shape();
    let mut lines = Vec::with_capacity(shape.height + 2);
    if let GridWorld::Windy(grid) = env {
        let wind: Vec<String> = grid.wind().iter().map(|w| format!("{w:2}")).collect();
        lines.push(format!("Wind: {}", wind.join(" ")));
        lines.push("-".repeat(shape.width * 3));
    }
    for row in 0..shape.height {
        let mut line = String::new();
        for col in 0..shape.width {
            line.push_str(&cell(env, shape.to_state(Position::new(row, col))));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Value function laid out on the grid, `T` in terminal cells
#[must_use]
pub fn render_values(shape: GridShape, values: &Array1<f64>, terminal: &[bool]) -> String {
    let mut lines = Vec::with_capacity(shape.height);
    for row in 0..shape.height {
        let mut line = String::new();
        for col in 0..shape.width {
            let s = shape.to_state(Position::new(row, col));
            if terminal.get(s).copied().unwrap_or(false) {
                line.push_str("  T   ");
            } else {
                let _ = write!(line, "{:6.2}", values[s]);
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Policy arrows laid out on the grid; tied actions share a cell
#[must_use]
pub fn render_policy(shape: GridShape, policy: &Array2<f64>, terminal: &[bool]) -> String {
    let arrows = policy_arrows(policy, terminal);
    let mut lines = Vec::with_capacity(shape.height);
    for row in 0..shape.height {
        let mut line = String::new();
        for col in 0..shape.width {
            let s = shape.to_state(Position::new(row, col));
            let _ = write!(line, " {:<4}", arrows[s]);
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Terminal mask of a model, for the renderers above
#[must_use]
pub fn terminal_mask<M: MdpModel + ?Sized>(model: &M) -> Vec<bool> {
    (0..model.n_states()).map(|s| model.is_terminal(s)).collect()
}
