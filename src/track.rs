use crate::config::ObstacleConfig;
use crate::model::{Obstacle, Silhouettes};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Uniform;
use std::collections::VecDeque;

/// Queue of obstacles, oldest (leftmost) first.
///
/// Pass state lives on each obstacle and is shared by the whole cohort: an
/// obstacle counts as passed once any live agent has moved beyond it.
pub struct ObstacleTrack {
    cfg: ObstacleConfig,
    silhouettes: Silhouettes,
    gap_dist: Uniform<i32>,
    obstacles: VecDeque<Obstacle>,
}

impl ObstacleTrack {
    /// Create a track holding one freshly spawned obstacle.
    ///
    /// # Errors
    /// Returns an error if the gap range is degenerate.
    pub fn new<R: Rng>(cfg: ObstacleConfig, silhouettes: Silhouettes, rng: &mut R) -> Result<Self> {
        let gap_dist =
            Uniform::new(cfg.gap_min, cfg.gap_max).context("failed to build gap distribution")?;
        let mut track = Self {
            cfg,
            silhouettes,
            gap_dist,
            obstacles: VecDeque::new(),
        };
        track.spawn(rng);
        Ok(track)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }

    /// Append an obstacle with a random gap at the spawn position.
    pub fn spawn<R: Rng>(&mut self, rng: &mut R) {
        let gap_top = self.gap_dist.sample(rng);
        log::debug!("spawning obstacle with gap top at {gap_top}");
        self.push(Obstacle::new(self.cfg.spawn_x, gap_top, &self.cfg, &self.silhouettes));
    }

    pub fn push(&mut self, obstacle: Obstacle) {
        self.obstacles.push_back(obstacle);
    }

    /// First obstacle whose trailing edge has not yet passed `agent_x`.
    ///
    /// Only the two oldest obstacles are considered.
    pub fn next_relevant(&self, agent_x: i32) -> Option<&Obstacle> {
        let first = self.obstacles.front()?;
        match self.obstacles.get(1) {
            Some(second) if agent_x > first.trailing_edge() => Some(second),
            _ => Some(first),
        }
    }

    /// Mark every obstacle left of `agent_x` as passed.
    ///
    /// Returns the number of obstacles newly passed.
    pub fn mark_passed(&mut self, agent_x: i32) -> usize {
        let mut n_passed = 0;
        for obstacle in self.obstacles.iter_mut() {
            if !obstacle.passed() && obstacle.x() < agent_x {
                obstacle.mark_passed();
                n_passed += 1;
            }
        }
        n_passed
    }

    /// Scroll every obstacle left and retire the leading one once it is fully off screen.
    pub fn advance(&mut self, scroll_speed: i32) {
        for obstacle in self.obstacles.iter_mut() {
            obstacle.shift(scroll_speed);
        }
        if self
            .obstacles
            .front()
            .is_some_and(|obstacle| obstacle.trailing_edge() < 0)
        {
            self.obstacles.pop_front();
        }
    }

    /// Append `n_passed` new obstacles.
    pub fn maybe_spawn<R: Rng>(&mut self, n_passed: usize, rng: &mut R) {
        for _ in 0..n_passed {
            self.spawn(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpriteConfig;
    use rand_chacha::ChaCha12Rng;

    fn track(rng: &mut ChaCha12Rng) -> ObstacleTrack {
        let silhouettes = Silhouettes::new(&SpriteConfig::default());
        ObstacleTrack::new(ObstacleConfig::default(), silhouettes, rng).unwrap()
    }

    #[test]
    fn gap_draws_stay_in_range() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut track = track(&mut rng);
        track.maybe_spawn(500, &mut rng);
        assert_eq!(track.len(), 501);
        for obstacle in track.iter() {
            assert!((50..450).contains(&obstacle.gap_top()));
            assert_eq!(obstacle.gap_bottom() - obstacle.gap_top(), 200);
            assert_eq!(obstacle.x(), 600);
        }
    }

    #[test]
    fn degenerate_range_fails() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let cfg = ObstacleConfig {
            gap_min: 300,
            gap_max: 300,
            ..ObstacleConfig::default()
        };
        let silhouettes = Silhouettes::new(&SpriteConfig::default());
        assert!(ObstacleTrack::new(cfg, silhouettes, &mut rng).is_err());
    }

    #[test]
    fn leading_obstacle_retires_off_screen() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut track = track(&mut rng);
        // Trailing edge starts at 704 and must end strictly below zero.
        for _ in 0..140 {
            track.advance(5);
        }
        assert_eq!(track.len(), 1);
        assert_eq!(track.iter().next().unwrap().trailing_edge(), 4);
        track.advance(5);
        assert_eq!(track.len(), 0);
    }

    #[test]
    fn next_relevant_moves_to_second_obstacle() {
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let mut track = track(&mut rng);
        assert_eq!(track.next_relevant(230).unwrap().x(), 600);

        // First obstacle at x = 120 has its trailing edge at 224 < 230.
        for _ in 0..96 {
            track.advance(5);
        }
        assert_eq!(track.next_relevant(230).unwrap().x(), 120);
        track.spawn(&mut rng);
        assert_eq!(track.next_relevant(230).unwrap().x(), 600);
    }

    #[test]
    fn obstacle_is_passed_once() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut track = track(&mut rng);
        assert_eq!(track.mark_passed(230), 0);
        for _ in 0..75 {
            track.advance(5);
        }
        assert_eq!(track.mark_passed(230), 1);
        assert_eq!(track.mark_passed(230), 0);
    }
}
