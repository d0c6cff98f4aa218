//! Grid walk with lava walls
//!
//! The agent starts in the top-left corner and must reach the bottom-right
//! one. Each difficulty level adds a lava wall spanning a whole column except
//! for a single gap, alternating between the bottom and the top row, so the
//! walk gets longer and riskier as difficulty grows while the observation
//! layout stays the same.

use async_trait::async_trait;
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use curricula_core::{Environment, Observation, RLError, Result, Step, StepInfo};

/// Move up
pub const UP: usize = 0;
/// Move right
pub const RIGHT: usize = 1;
/// Move down
pub const DOWN: usize = 2;
/// Move left
pub const LEFT: usize = 3;

const GOAL_REWARD: f64 = 1.0;
const LAVA_REWARD: f64 = -1.0;
const STEP_REWARD: f64 = -0.01;

/// Grid walk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridWalkConfig {
    /// Side length of the square grid
    pub size: usize,
    /// Number of lava walls
    pub difficulty: usize,
    /// Steps before the episode is truncated
    pub max_steps: usize,
    /// Start from a random safe cell instead of the corner
    pub random_start: bool,
    /// Seed of the start-position generator
    pub seed: Option<u64>,
}

impl Default for GridWalkConfig {
    fn default() -> Self {
        Self {
            size: 7,
            difficulty: 0,
            max_steps: 100,
            random_start: false,
            seed: None,
        }
    }
}

/// Grid walk environment
pub struct GridWalkEnv {
    config: GridWalkConfig,
    lava: Vec<bool>,
    position: (usize, usize),
    steps: usize,
    rng: ChaCha8Rng,
}

impl GridWalkEnv {
    /// Registry name
    pub const NAME: &'static str = "grid_walk";

    /// Create a new grid walk
    pub fn new(config: GridWalkConfig) -> Result<Self> {
        if config.size < 2 {
            return Err(RLError::InvalidConfig(format!("grid size must be at least 2, got {}", config.size)));
        }
        if 2 * config.difficulty + 1 > config.size {
            return Err(RLError::InvalidConfig(format!(
                "difficulty {} needs a grid of at least {} cells per side",
                config.difficulty,
                2 * config.difficulty + 1
            )));
        }
        if config.max_steps == 0 {
            return Err(RLError::InvalidConfig("max_steps must be positive".into()));
        }
        let size = config.size;
        let mut lava = vec![false; size * size];
        for k in 0..config.difficulty {
            let x = 2 * k + 1;
            let gap = if k % 2 == 0 { size - 1 } else { 0 };
            for y in (0..size).filter(|&y| y != gap) {
                lava[y * size + x] = true;
            }
        }
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            config,
            lava,
            position: (0, 0),
            steps: 0,
            rng,
        })
    }

    /// Current `(x, y)` cell; `y` grows downwards
    #[must_use]
    pub fn position(&self) -> (usize, usize) {
        self.position
    }

    /// Whether `(x, y)` is lava
    #[must_use]
    pub fn is_lava(&self, x: usize, y: usize) -> bool {
        x < self.config.size && y < self.config.size && self.lava[y * self.config.size + x]
    }

    fn goal(&self) -> (usize, usize) {
        (self.config.size - 1, self.config.size - 1)
    }

    fn neighbour(&self, action: usize) -> Option<(usize, usize)> {
        let (x, y) = self.position;
        let last = self.config.size - 1;
        match action {
            UP if y > 0 => Some((x, y - 1)),
            RIGHT if x < last => Some((x + 1, y)),
            DOWN if y < last => Some((x, y + 1)),
            LEFT if x > 0 => Some((x - 1, y)),
            _ => None,
        }
    }

    fn observe(&self) -> Observation {
        let (x, y) = self.position;
        let scale = (self.config.size - 1) as f32;
        let mut obs = vec![x as f32 / scale, y as f32 / scale];
        for action in [UP, RIGHT, DOWN, LEFT] {
            let lava = self.neighbour(action).is_some_and(|(nx, ny)| self.is_lava(nx, ny));
            obs.push(if lava { 1.0 } else { 0.0 });
        }
        Array1::from(obs)
    }
}

#[async_trait]
impl Environment for GridWalkEnv {
    fn n_actions(&self) -> usize {
        4
    }

    fn legal_mask(&self) -> Option<Array1<f32>> {
        Some(Array1::from_iter(
            (0..4).map(|a| if self.neighbour(a).is_some() { 1.0 } else { 0.0 }),
        ))
    }

    async fn reset(&mut self) -> Result<Observation> {
        self.steps = 0;
        self.position = if self.config.random_start {
            let size = self.config.size;
            let goal = self.goal();
            let safe: Vec<(usize, usize)> = (0..size * size)
                .map(|i| (i % size, i / size))
                .filter(|&(x, y)| !self.is_lava(x, y) && (x, y) != goal)
                .collect();
            safe[self.rng.gen_range(0..safe.len())]
        } else {
            (0, 0)
        };
        Ok(self.observe())
    }

    async fn step(&mut self, action: usize) -> Result<Step> {
        if action >= self.n_actions() {
            return Err(RLError::InvalidAction {
                action,
                n_actions: self.n_actions(),
            });
        }
        // Moves off the grid leave the agent in place.
        if let Some(next) = self.neighbour(action) {
            self.position = next;
        }
        self.steps += 1;

        let (x, y) = self.position;
        let (reward, terminated) = if self.position == self.goal() {
            (GOAL_REWARD, true)
        } else if self.is_lava(x, y) {
            (LAVA_REWARD, true)
        } else {
            (STEP_REWARD, false)
        };
        let truncated = !terminated && self.steps >= self.config.max_steps;

        Ok(Step {
            observation: self.observe(),
            reward,
            terminated,
            truncated,
            info: StepInfo::default(),
        })
    }
}
