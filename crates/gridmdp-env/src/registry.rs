//! Name-based environment construction

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gridmdp_core::{
    Action, EnvDescriptor, Environment, GridShape, MdpError, MdpModel, Result, StateId, StepOutcome,
    TransitionTable,
};

use crate::{CliffWalking, CliffWalkingConfig, PlainGrid, PlainGridConfig, WindyGrid, WindyGridConfig};

/// The grid-world variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvKind {
    /// [`PlainGrid`]
    Grid,
    /// [`WindyGrid`]
    Windy,
    /// [`CliffWalking`]
    Cliff,
}

impl EnvKind {
    /// Every variant
    pub const ALL: [EnvKind; 3] = [EnvKind::Grid, EnvKind::Windy, EnvKind::Cliff];

    /// Canonical name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EnvKind::Grid => "grid",
            EnvKind::Windy => "windy",
            EnvKind::Cliff => "cliff",
        }
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvKind {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grid" | "basic" | "basic_grid" | "plain" => Ok(EnvKind::Grid),
            "windy" | "windy_grid" => Ok(EnvKind::Windy),
            "cliff" | "cliff_walking" => Ok(EnvKind::Cliff),
            _ => Err(MdpError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Configuration for any variant, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvConfig {
    /// Plain grid parameters
    Grid(PlainGridConfig),
    /// Windy grid parameters
    Windy(WindyGridConfig),
    /// Cliff walking parameters
    Cliff(CliffWalkingConfig),
}

impl EnvConfig {
    /// Default configuration of `kind`
    #[must_use]
    pub fn default_for(kind: EnvKind) -> Self {
        match kind {
            EnvKind::Grid => EnvConfig::Grid(PlainGridConfig::default()),
            EnvKind::Windy => EnvConfig::Windy(WindyGridConfig::default()),
            EnvKind::Cliff => EnvConfig::Cliff(CliffWalkingConfig::default()),
        }
    }

    /// Variant this configuration builds
    #[must_use]
    pub fn kind(&self) -> EnvKind {
        match self {
            EnvConfig::Grid(_) => EnvKind::Grid,
            EnvConfig::Windy(_) => EnvKind::Windy,
            EnvConfig::Cliff(_) => EnvKind::Cliff,
        }
    }

    /// Validate the wrapped configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            EnvConfig::Grid(c) => c.validate(),
            EnvConfig::Windy(c) => c.validate(),
            EnvConfig::Cliff(c) => c.validate(),
        }
    }
}

/// Any of the three grid worlds behind one type
#[derive(Debug, Clone)]
pub enum GridWorld {
    /// Plain grid
    Plain(PlainGrid),
    /// Windy grid
    Windy(WindyGrid),
    /// Cliff walking
    Cliff(CliffWalking),
}

macro_rules! delegate {
    ($self:expr, $env:ident => $body:expr) => {
        match $self {
            GridWorld::Plain($env) => $body,
            GridWorld::Windy($env) => $body,
            GridWorld::Cliff($env) => $body,
        }
    };
}

impl GridWorld {
    /// Build from a tagged configuration
    pub fn from_config(config: EnvConfig) -> Result<Self> {
        Ok(match config {
            EnvConfig::Grid(c) => GridWorld::Plain(PlainGrid::new(c)?),
            EnvConfig::Windy(c) => GridWorld::Windy(WindyGrid::new(c)?),
            EnvConfig::Cliff(c) => GridWorld::Cliff(CliffWalking::new(c)?),
        })
    }

    /// Variant of this world
    #[must_use]
    pub fn kind(&self) -> EnvKind {
        match self {
            GridWorld::Plain(_) => EnvKind::Grid,
            GridWorld::Windy(_) => EnvKind::Windy,
            GridWorld::Cliff(_) => EnvKind::Cliff,
        }
    }
}

impl Environment for GridWorld {
    fn n_states(&self) -> usize {
        delegate!(self, env => env.n_states())
    }

    fn is_terminal(&self, state: StateId) -> bool {
        delegate!(self, env => env.is_terminal(state))
    }

    fn current_state(&self) -> Option<StateId> {
        delegate!(self, env => env.current_state())
    }

    fn reset(&mut self, start_state: Option<StateId>) -> Result<StateId> {
        delegate!(self, env => env.reset(start_state))
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome> {
        delegate!(self, env => env.step(action))
    }

    fn reseed(&mut self, seed: u64) {
        delegate!(self, env => env.reseed(seed));
    }
}

impl MdpModel for GridWorld {
    fn transitions(&self) -> Arc<TransitionTable> {
        delegate!(self, env => env.transitions())
    }

    fn shape(&self) -> GridShape {
        delegate!(self, env => env.shape())
    }

    fn describe(&self) -> EnvDescriptor {
        delegate!(self, env => env.describe())
    }

    fn terminal_states(&self) -> Vec<StateId> {
        delegate!(self, env => env.terminal_states())
    }
}

/// Create an environment by name.
///
/// `params` is deserialized into the variant's configuration; `null` or an
/// empty object yields the defaults.
pub fn make_env(name: &str, params: serde_json::Value) -> Result<GridWorld> {
    let kind: EnvKind = name.parse()?;
    let params = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params
    };
    let config = match kind {
        EnvKind::Grid => EnvConfig::Grid(serde_json::from_value(params)?),
        EnvKind::Windy => EnvConfig::Windy(serde_json::from_value(params)?),
        EnvKind::Cliff => EnvConfig::Cliff(serde_json::from_value(params)?),
    };
    tracing::debug!(env = %kind, "creating environment");
    GridWorld::from_config(config)
}

/// Names accepted by [`make_env`]
#[must_use]
pub fn list_envs() -> Vec<&'static str> {
    EnvKind::ALL.iter().map(|k| k.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_every_variant_by_name() {
        for name in list_envs() {
            let env = make_env(name, serde_json::Value::Null).unwrap();
            assert_eq!(env.kind().name(), name);
            assert!(env.transitions().validate().is_ok());
        }
    }

    #[test]
    fn params_override_defaults() {
        let env = make_env("basic", json!({ "grid_size": 6, "seed": 3 })).unwrap();
        assert_eq!(env.n_states(), 36);
        assert_eq!(env.terminal_states(), vec![0, 35]);
        assert_eq!(env.describe().name, "grid");
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            make_env("lava", serde_json::Value::Null),
            Err(MdpError::UnknownEnvironment(_))
        ));
        assert!(matches!(
            make_env("grid", json!({ "grid_size": "big" })),
            Err(MdpError::Serialization(_))
        ));
    }

    #[test]
    fn tagged_config_roundtrip() {
        let config = EnvConfig::default_for(EnvKind::Cliff);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["kind"], "cliff");
        let back: EnvConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.kind(), EnvKind::Cliff);
    }

    #[test]
    fn delegation_runs_episodes() {
        let mut env = make_env("cliff", serde_json::Value::Null).unwrap();
        assert_eq!(env.reset(None).unwrap(), 36);
        let out = env.step(Action::Up).unwrap();
        assert_eq!(out.next_state, 24);
        assert_eq!(env.current_state(), Some(24));
    }
}
