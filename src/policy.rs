//! Decision makers that drive agents.

use crate::config::NetworkConfig;
use crate::model::{Agent, Obstacle};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::Normal;
use std::{
    str::FromStr,
    sync::mpsc::{Receiver, TryRecvError},
};

/// Environment input handed to a policy each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Agent vertical position.
    pub y: f64,
    /// Vertical distance to the upper edge of the next gap.
    pub gap_top_dist: f64,
    /// Vertical distance to the lower edge of the next gap.
    pub gap_bottom_dist: f64,
}

impl Observation {
    pub fn new(agent: &Agent, next: Option<&Obstacle>) -> Self {
        let y = agent.y();
        match next {
            Some(obstacle) => Self {
                y,
                gap_top_dist: (y - obstacle.gap_top() as f64).abs(),
                gap_bottom_dist: (y - obstacle.gap_bottom() as f64).abs(),
            },
            None => Self {
                y,
                gap_top_dist: 0.0,
                gap_bottom_dist: 0.0,
            },
        }
    }

    pub fn inputs(&self) -> [f64; 3] {
        [self.y, self.gap_top_dist, self.gap_bottom_dist]
    }
}

/// Shared interface of every decision maker.
pub trait Policy {
    /// Policy family identifier, used in logs.
    fn kind(&self) -> &'static str;

    /// Decide whether the agent jumps this tick.
    ///
    /// An error is a policy fault; the caller treats it as "no jump".
    fn decide(&mut self, obs: &Observation) -> Result<bool>;
}

/// Output value at or above which a network requests a jump.
const JUMP_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
struct Layer {
    n_in: usize,
    /// Row-major `n_out x (n_in + 1)`, bias last.
    weights: Vec<f64>,
}

impl Layer {
    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .chunks_exact(self.n_in + 1)
            .map(|row| {
                let sum: f64 = row[..self.n_in]
                    .iter()
                    .zip(input)
                    .map(|(w, x)| w * x)
                    .sum();
                (sum + row[self.n_in]).tanh()
            })
            .collect()
    }
}

/// Feed-forward network with `tanh` activations and a single output.
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    layers: Vec<Layer>,
}

impl NetworkPolicy {
    const N_INPUTS: usize = 3;

    /// Build a network with normally distributed weights.
    pub fn random<R: Rng>(cfg: &NetworkConfig, rng: &mut R) -> Result<Self> {
        let weight_dist =
            Normal::new(0.0, cfg.weight_std_dev).context("failed to build weight distribution")?;

        let mut sizes = vec![Self::N_INPUTS];
        if cfg.n_hidden > 0 {
            sizes.push(cfg.n_hidden);
        }
        sizes.push(1);

        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (n_in, n_out) = (pair[0], pair[1]);
                let weights = (0..n_out * (n_in + 1))
                    .map(|_| weight_dist.sample(rng))
                    .collect();
                Layer { n_in, weights }
            })
            .collect();

        Ok(Self { layers })
    }

    /// Single-layer network: `tanh(w . inputs + bias)`.
    #[cfg(test)]
    pub fn linear(weights: [f64; 3], bias: f64) -> Self {
        let mut row = weights.to_vec();
        row.push(bias);
        Self {
            layers: vec![Layer {
                n_in: Self::N_INPUTS,
                weights: row,
            }],
        }
    }

    pub fn activate(&self, inputs: [f64; 3]) -> f64 {
        let mut values = inputs.to_vec();
        for layer in &self.layers {
            debug_assert_eq!(values.len(), layer.n_in);
            values = layer.forward(&values);
        }
        values.first().copied().unwrap_or(f64::NAN)
    }

    #[cfg(test)]
    pub fn n_weights(&self) -> usize {
        self.layers.iter().map(|layer| layer.weights.len()).sum()
    }
}

impl Policy for NetworkPolicy {
    fn kind(&self) -> &'static str {
        "network"
    }

    fn decide(&mut self, obs: &Observation) -> Result<bool> {
        let output = self.activate(obs.inputs());
        if !output.is_finite() {
            bail!("network output is not finite: {output}");
        }
        Ok(output >= JUMP_THRESHOLD)
    }
}

/// Discrete input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Jump,
}

/// Policy backed by an event queue, consuming at most one event per tick.
pub struct EventPolicy {
    events: Receiver<Event>,
}

impl EventPolicy {
    pub fn new(events: Receiver<Event>) -> Self {
        Self { events }
    }
}

impl Policy for EventPolicy {
    fn kind(&self) -> &'static str {
        "event"
    }

    fn decide(&mut self, _obs: &Observation) -> Result<bool> {
        match self.events.try_recv() {
            Ok(Event::Jump) => Ok(true),
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => bail!("event source disconnected"),
        }
    }
}

/// Policy cycling through a fixed jump pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptPolicy {
    pattern: Vec<bool>,
    cursor: usize,
}

impl ScriptPolicy {
    pub fn new(pattern: Vec<bool>) -> Result<Self> {
        if pattern.is_empty() {
            bail!("script pattern must not be empty");
        }
        Ok(Self { pattern, cursor: 0 })
    }
}

impl FromStr for ScriptPolicy {
    type Err = anyhow::Error;

    /// Parse a pattern of `1` (jump) and `0` (no jump) characters.
    fn from_str(s: &str) -> Result<Self> {
        let pattern = s
            .trim()
            .chars()
            .map(|c| match c {
                '1' => Ok(true),
                '0' => Ok(false),
                _ => bail!("invalid script character {c:?}"),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(pattern)
    }
}

impl Policy for ScriptPolicy {
    fn kind(&self) -> &'static str {
        "script"
    }

    fn decide(&mut self, _obs: &Observation) -> Result<bool> {
        let decision = self.pattern[self.cursor];
        self.cursor = (self.cursor + 1) % self.pattern.len();
        Ok(decision)
    }
}
