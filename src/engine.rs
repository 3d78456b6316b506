use crate::collision::collides;
use crate::config::Config;
use crate::model::{Agent, Silhouettes};
use crate::policy::{Observation, Policy};
use crate::snapshot::Snapshot;
use crate::track::ObstacleTrack;
use anyhow::{Context, Result};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

/// Rule set of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Cohort evaluation: fitness is accrued, ceiling at `world.ceiling_y`.
    Population,
    /// One controlled agent: no fitness, ceiling at `play.ceiling_y`.
    SinglePlay,
}

/// Why a simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Every agent died.
    Extinct,
    /// The score reached the configured ceiling.
    ScoreCeiling,
    /// Stopped from outside between ticks.
    Aborted,
}

/// An agent together with the policy driving it and its fitness record.
pub struct Member<'p> {
    pub agent: Agent,
    pub policy: &'p mut dyn Policy,
    pub fitness: f64,
    pub ticks_survived: usize,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub n_live: usize,
    pub n_passed: usize,
    pub n_faults: usize,
    pub termination: Option<Termination>,
}

/// Simulation engine.
///
/// Holds the configuration, the shared obstacle track, the score and tick
/// clock, and the random number generator used to place new gaps.
pub struct Engine {
    cfg: Config,
    mode: Mode,
    silhouettes: Silhouettes,
    track: ObstacleTrack,
    score: usize,
    tick: usize,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create an `Engine` with a single freshly spawned obstacle.
    pub fn new(cfg: Config, mode: Mode, mut rng: ChaCha12Rng) -> Result<Self> {
        let silhouettes = Silhouettes::new(&cfg.sprite);
        let track = ObstacleTrack::new(cfg.obstacle.clone(), silhouettes.clone(), &mut rng)
            .context("failed to construct obstacle track")?;
        Ok(Self {
            cfg,
            mode,
            silhouettes,
            track,
            score: 0,
            tick: 0,
            rng,
        })
    }

    /// Create an agent at the starting position.
    pub fn spawn_agent(&self) -> Agent {
        Agent::new(
            self.cfg.world.agent_x,
            self.cfg.world.agent_start_y,
            self.silhouettes.agent.clone(),
        )
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn tick(&self) -> usize {
        self.tick
    }

    #[cfg(test)]
    pub fn track(&self) -> &ObstacleTrack {
        &self.track
    }

    #[cfg(test)]
    pub fn track_mut(&mut self) -> &mut ObstacleTrack {
        &mut self.track
    }

    fn ceiling_y(&self) -> f64 {
        match self.mode {
            Mode::Population => self.cfg.world.ceiling_y,
            Mode::SinglePlay => self.cfg.play.ceiling_y,
        }
    }

    /// Advance the simulation by one tick.
    ///
    /// `live` holds the indices into `members` of the agents still alive and
    /// is compacted once every check of the tick has completed. Dead members
    /// keep their fitness record.
    pub fn perform_step(
        &mut self,
        members: &mut [Member<'_>],
        live: &mut Vec<usize>,
    ) -> StepReport {
        let population = self.mode == Mode::Population;
        let agent_x = self.cfg.world.agent_x;

        // Query policies and move agents.
        let mut n_faults = 0;
        let next = self.track.next_relevant(agent_x);
        for &i_mem in live.iter() {
            let member = &mut members[i_mem];
            let obs = Observation::new(&member.agent, next);
            let jump = match member.policy.decide(&obs) {
                Ok(jump) => jump,
                Err(error) => {
                    log::warn!(
                        "{} policy {i_mem} failed to decide, not jumping: {error:#}",
                        member.policy.kind()
                    );
                    n_faults += 1;
                    false
                }
            };
            member.agent.advance(jump, &self.cfg.physics);
            member.ticks_survived += 1;
            if population {
                member.fitness += self.cfg.fitness.survival;
            }
        }

        // Check collisions against the track as it was at the start of the tick.
        for obstacle in self.track.iter() {
            for &i_mem in live.iter() {
                let member = &mut members[i_mem];
                if member.agent.is_alive() && collides(&member.agent, obstacle) {
                    log::trace!("agent {i_mem} hit obstacle at x = {}", obstacle.x());
                    member.agent.kill();
                    if population {
                        member.fitness += self.cfg.fitness.collision;
                    }
                }
            }
        }

        // Score obstacles passed by the surviving cohort.
        let mut n_passed = 0;
        if live.iter().any(|&i_mem| members[i_mem].agent.is_alive()) {
            n_passed = self.track.mark_passed(agent_x);
        }
        if n_passed > 0 {
            self.score += n_passed;
            log::debug!("tick {}: score {}", self.tick, self.score);
            if population {
                let bonus = self.cfg.fitness.pass * n_passed as f64;
                for &i_mem in live.iter() {
                    if members[i_mem].agent.is_alive() {
                        members[i_mem].fitness += bonus;
                    }
                }
            }
        }

        self.track.advance(self.cfg.world.scroll_speed);
        self.track.maybe_spawn(n_passed, &mut self.rng);

        // Check vertical bounds.
        let floor_y = self.cfg.world.floor_y;
        let ceiling_y = self.ceiling_y();
        for &i_mem in live.iter() {
            let agent = &mut members[i_mem].agent;
            if agent.y() + agent.height() as f64 >= floor_y || agent.y() < ceiling_y {
                log::trace!("agent {i_mem} left the play field at y = {}", agent.y());
                agent.kill();
            }
        }

        live.retain(|&i_mem| members[i_mem].agent.is_alive());
        self.tick += 1;

        let termination = if self.score >= self.cfg.cohort.score_ceiling {
            Some(Termination::ScoreCeiling)
        } else if live.is_empty() {
            Some(Termination::Extinct)
        } else {
            None
        };

        StepReport {
            n_live: live.len(),
            n_passed,
            n_faults,
            termination,
        }
    }

    /// Observation of `agent` against the next relevant obstacle.
    pub fn observe(&self, agent: &Agent) -> Observation {
        Observation::new(agent, self.track.next_relevant(self.cfg.world.agent_x))
    }

    /// View of an agent that is not stepped yet, with the track as it stands.
    pub fn idle_snapshot(&self, agent: &Agent) -> Snapshot {
        Snapshot::new(self.tick, self.score, [(0, agent)], self.track.iter())
    }

    /// Read-only view of the live agents and the track.
    pub fn snapshot(&self, members: &[Member<'_>], live: &[usize]) -> Snapshot {
        Snapshot::new(
            self.tick,
            self.score,
            live.iter().map(|&i_mem| (i_mem, &members[i_mem].agent)),
            self.track.iter(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Obstacle;
    use crate::policy::ScriptPolicy;
    use rand::SeedableRng;

    fn engine(mode: Mode) -> Engine {
        Engine::new(Config::default(), mode, ChaCha12Rng::seed_from_u64(42)).unwrap()
    }

    fn member<'p>(engine: &Engine, policy: &'p mut dyn Policy) -> Member<'p> {
        Member {
            agent: engine.spawn_agent(),
            policy,
            fitness: 0.0,
            ticks_survived: 0,
        }
    }

    /// Replace the track content with obstacles given as `(x, gap_top)`.
    fn reset_track(engine: &mut Engine, obstacles: &[(i32, i32)]) {
        let cfg = engine.cfg.obstacle.clone();
        let obstacles: Vec<_> = obstacles
            .iter()
            .map(|&(x, gap_top)| Obstacle::new(x, gap_top, &cfg, &engine.silhouettes))
            .collect();
        let track = engine.track_mut();
        while track.len() > 0 {
            track.advance(1_000);
        }
        obstacles.into_iter().for_each(|obstacle| track.push(obstacle));
    }

    #[test]
    fn idle_agent_falls_to_the_floor() {
        let mut engine = engine(Mode::Population);
        reset_track(&mut engine, &[(2_000, 280)]);
        let mut policy: ScriptPolicy = "0".parse().unwrap();
        let mut members = vec![member(&engine, &mut policy)];
        let mut live = vec![0];

        let mut report = engine.perform_step(&mut members, &mut live);
        while report.termination.is_none() {
            report = engine.perform_step(&mut members, &mut live);
        }
        assert_eq!(report.termination, Some(Termination::Extinct));
        assert!(members[0].agent.y() + 48.0 >= 730.0);
        let expected = 0.1 * members[0].ticks_survived as f64;
        assert!((members[0].fitness - expected).abs() < 1e-9);
    }

    #[test]
    fn score_counts_obstacles_not_agents() {
        let mut engine = engine(Mode::Population);
        // Leading edge reaches x < 230 after one tick.
        reset_track(&mut engine, &[(234, 280)]);
        let mut policies: Vec<ScriptPolicy> =
            (0..3).map(|_| "0".parse().unwrap()).collect();
        let mut members: Vec<_> = policies
            .iter_mut()
            .map(|policy| member(&engine, policy))
            .collect();
        let mut live = vec![0, 1, 2];

        engine.perform_step(&mut members, &mut live);
        assert_eq!(engine.score(), 0);
        let report = engine.perform_step(&mut members, &mut live);
        assert_eq!(report.n_passed, 1);
        assert_eq!(engine.score(), 1);
        assert_eq!(engine.track().len(), 2);
        for member in &members {
            assert!((member.fitness - (0.2 + 5.0)).abs() < 1e-9);
        }
        engine.perform_step(&mut members, &mut live);
        assert_eq!(engine.score(), 1);
    }

    #[test]
    fn collision_applies_penalty_and_prunes() {
        let mut engine = engine(Mode::Population);
        // Gap far above the agent: the bottom piece covers the start height.
        reset_track(&mut engine, &[(200, 0)]);

        let mut hit: ScriptPolicy = "0".parse().unwrap();
        let mut members = vec![member(&engine, &mut hit)];
        let mut live = vec![0];
        let report = engine.perform_step(&mut members, &mut live);

        assert!(live.is_empty());
        assert_eq!(report.termination, Some(Termination::Extinct));
        assert!((members[0].fitness - (0.1 - 1.0)).abs() < 1e-9);
        assert_eq!(members[0].ticks_survived, 1);
    }

    #[test]
    fn single_play_accrues_no_fitness_and_uses_play_ceiling() {
        let mut engine = engine(Mode::SinglePlay);
        reset_track(&mut engine, &[(2_000, 280)]);
        let mut policy: ScriptPolicy = "1".parse().unwrap();
        let mut members = vec![member(&engine, &mut policy)];
        let mut live = vec![0];

        let mut report = engine.perform_step(&mut members, &mut live);
        while report.termination.is_none() {
            report = engine.perform_step(&mut members, &mut live);
        }
        assert_eq!(members[0].fitness, 0.0);
        let y = members[0].agent.y();
        assert!(y < 50.0 && y >= 39.0);
    }

    #[test]
    fn snapshot_lists_live_agents_only() {
        let mut engine = engine(Mode::Population);
        let mut up: ScriptPolicy = "1".parse().unwrap();
        let mut down: ScriptPolicy = "0".parse().unwrap();
        let mut members = vec![member(&engine, &mut up), member(&engine, &mut down)];
        let mut live = vec![0, 1];
        members[1].agent.kill();
        live.retain(|&i| members[i].agent.is_alive());

        engine.perform_step(&mut members, &mut live);
        let snapshot = engine.snapshot(&members, &live);
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.agents.len(), 1);
        assert_eq!(snapshot.agents[0].id, 0);
        assert_eq!(snapshot.obstacles.len(), 1);
    }
}
