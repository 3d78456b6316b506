use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use. Every section falls back
/// to the reference game constants when omitted.
/// See [`Config::from_file`] for loading.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub world: WorldConfig,
    pub physics: PhysicsConfig,
    pub obstacle: ObstacleConfig,
    pub sprite: SpriteConfig,
    pub fitness: FitnessConfig,
    pub cohort: CohortConfig,
    pub network: NetworkConfig,
    pub play: PlayConfig,
    pub output: OutputConfig,
}

/// Play field geometry shared by every agent.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Fixed horizontal position of every agent.
    pub agent_x: i32,
    /// Vertical position of a freshly created agent.
    pub agent_start_y: f64,
    /// Agents die once their lower edge reaches this line.
    pub floor_y: f64,
    /// Agents die once they rise above this line.
    pub ceiling_y: f64,
    /// Horizontal distance obstacles move per tick.
    pub scroll_speed: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            agent_x: 230,
            agent_start_y: 350.0,
            floor_y: 730.0,
            ceiling_y: 0.0,
            scroll_speed: 5,
        }
    }
}

/// Agent kinematics.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhysicsConfig {
    /// Velocity set by a jump (negative is upward).
    pub jump_velocity: f64,
    /// Quadratic coefficient of the displacement formula.
    pub gravity: f64,
    /// Maximum downward displacement per tick.
    pub max_fall: f64,
    /// Extra displacement added whenever the agent is rising.
    pub rise_bias: f64,

    pub max_tilt: f64,
    pub min_tilt: f64,
    pub tilt_rate: f64,
    /// Distance below the last jump height within which the tilt stays up.
    pub tilt_margin: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            jump_velocity: -10.5,
            gravity: 1.5,
            max_fall: 16.0,
            rise_bias: -2.0,
            max_tilt: 25.0,
            min_tilt: -90.0,
            tilt_rate: 20.0,
            tilt_margin: 50.0,
        }
    }
}

/// Obstacle generation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObstacleConfig {
    /// Horizontal position of a newly spawned obstacle.
    pub spawn_x: i32,
    /// Vertical size of the gap.
    pub gap: i32,
    /// Lower bound (inclusive) of the gap top edge.
    pub gap_min: i32,
    /// Upper bound (exclusive) of the gap top edge.
    pub gap_max: i32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            spawn_x: 600,
            gap: 200,
            gap_min: 50,
            gap_max: 450,
        }
    }
}

/// Silhouette dimensions in pixels.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpriteConfig {
    pub agent_width: i32,
    pub agent_height: i32,
    pub obstacle_width: i32,
    pub obstacle_height: i32,
    /// Rows of the full-width cap at the open end of each piece.
    pub cap_height: i32,
    /// Columns trimmed from each side of a piece body.
    pub cap_inset: i32,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            agent_width: 68,
            agent_height: 48,
            obstacle_width: 104,
            obstacle_height: 640,
            cap_height: 48,
            cap_inset: 4,
        }
    }
}

/// Fitness increments applied during cohort evaluation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitnessConfig {
    pub survival: f64,
    pub pass: f64,
    pub collision: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            survival: 0.1,
            pass: 5.0,
            collision: -1.0,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CohortConfig {
    /// Number of agents evaluated together.
    pub n_agents: usize,
    /// Score at which an evaluation stops on its own.
    pub score_ceiling: usize,
    /// Seed of the run RNG (drawn from the OS when absent).
    pub seed: Option<u64>,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            n_agents: 50,
            score_ceiling: 50,
            seed: None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Hidden layer width (zero connects inputs straight to the output).
    pub n_hidden: usize,
    pub weight_std_dev: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_hidden: 4,
            weight_std_dev: 1.0,
        }
    }
}

/// Single-play rules.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayConfig {
    pub ceiling_y: f64,
    pub ticks_per_second: u32,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            ceiling_y: 50.0,
            ticks_per_second: 30,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of ticks between trajectory snapshots.
    pub ticks_per_save: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { ticks_per_save: 10 }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded. Missing sections and fields take their
    /// default values. Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let world = &self.world;
        check_num(world.scroll_speed, 1..1_000).context("invalid scroll speed")?;
        check_num(world.floor_y, world.ceiling_y..).context("invalid floor position")?;
        check_num(world.agent_start_y, world.ceiling_y..world.floor_y)
            .context("invalid agent starting height")?;

        let physics = &self.physics;
        check_num(physics.jump_velocity, ..0.0).context("invalid jump velocity")?;
        check_num(physics.gravity, 0.0..).context("invalid gravity")?;
        check_num(physics.max_fall, 0.0..).context("invalid maximum fall")?;
        check_num(physics.min_tilt, ..=physics.max_tilt).context("invalid tilt bounds")?;
        check_num(physics.tilt_rate, 0.0..).context("invalid tilt rate")?;

        let obstacle = &self.obstacle;
        check_num(obstacle.gap, 1..10_000).context("invalid gap size")?;
        if obstacle.gap_min >= obstacle.gap_max {
            bail!(
                "gap range is degenerate: min {} must be below max {}",
                obstacle.gap_min,
                obstacle.gap_max
            );
        }

        let sprite = &self.sprite;
        check_num(sprite.agent_width, 1..10_000).context("invalid agent width")?;
        check_num(sprite.agent_height, 1..10_000).context("invalid agent height")?;
        check_num(sprite.obstacle_width, 1..10_000).context("invalid obstacle width")?;
        check_num(sprite.obstacle_height, 1..10_000).context("invalid obstacle height")?;
        check_num(sprite.cap_height, 0..=sprite.obstacle_height).context("invalid cap height")?;
        check_num(sprite.cap_inset, 0..(sprite.obstacle_width + 1) / 2)
            .context("invalid cap inset")?;

        check_num(self.cohort.n_agents, 1..100_000).context("invalid number of agents")?;
        check_num(self.cohort.score_ceiling, 1..).context("invalid score ceiling")?;

        check_num(self.network.n_hidden, 0..1_000).context("invalid hidden layer width")?;
        check_num(self.network.weight_std_dev, 0.0..100.0)
            .context("invalid weight standard deviation")?;

        check_num(self.play.ceiling_y, ..self.world.floor_y).context("invalid play ceiling")?;
        check_num(self.play.ticks_per_second, 1..1_000).context("invalid tick rate")?;

        check_num(self.output.ticks_per_save, 1..100_000)
            .context("invalid number of ticks per save")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
