use crate::config::Config;
use crate::engine::{Engine, Member, Mode, Termination};
use crate::model::Agent;
use crate::policy::{Observation, Policy};
use crate::snapshot::FrameSink;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::{
    mem,
    sync::atomic::{AtomicBool, Ordering},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub score: usize,
    pub ticks: usize,
    pub termination: Termination,
}

/// Single-play game: one agent per round, restarted from scratch after every game over.
pub struct Session {
    cfg: Config,
    rng: ChaCha12Rng,
    wait_for_jump: bool,
    high_score: usize,
}

impl Session {
    pub fn new(cfg: Config, rng: ChaCha12Rng) -> Self {
        Self {
            cfg,
            rng,
            wait_for_jump: false,
            high_score: 0,
        }
    }

    /// Hold every new round, with no physics and no scrolling, until the
    /// policy first asks for a jump.
    pub fn wait_for_first_jump(mut self, wait: bool) -> Self {
        self.wait_for_jump = wait;
        self
    }

    pub fn high_score(&self) -> usize {
        self.high_score
    }

    /// Play one round with a fresh agent and track.
    pub fn play_round<S: FrameSink>(
        &mut self,
        policy: &mut dyn Policy,
        abort: &AtomicBool,
        sink: &mut S,
    ) -> Result<RoundReport> {
        let rng = ChaCha12Rng::from_rng(&mut self.rng);
        let mut engine = Engine::new(self.cfg.clone(), Mode::SinglePlay, rng)
            .context("failed to construct engine")?;
        let agent = engine.spawn_agent();

        let opening_jump = if self.wait_for_jump {
            log::info!("waiting for the first jump");
            await_first_jump(&engine, &agent, policy, abort, sink)?
        } else {
            Some(false)
        };

        let termination = match opening_jump {
            None => Termination::Aborted,
            Some(jump) => {
                let mut opening = Opening { policy, jump };
                let mut members = [Member {
                    agent,
                    policy: &mut opening,
                    fitness: 0.0,
                    ticks_survived: 0,
                }];
                let mut live = vec![0];

                loop {
                    if abort.load(Ordering::SeqCst) {
                        break Termination::Aborted;
                    }
                    let report = engine.perform_step(&mut members, &mut live);
                    sink.record(&engine.snapshot(&members, &live))
                        .context("failed to record snapshot")?;
                    if let Some(termination) = report.termination {
                        break termination;
                    }
                }
            }
        };
        sink.finish().context("failed to finish sink")?;

        self.high_score = self.high_score.max(engine.score());
        log::info!(
            "round over ({termination:?}): score {}, high score {}",
            engine.score(),
            self.high_score
        );

        Ok(RoundReport {
            score: engine.score(),
            ticks: engine.tick(),
            termination,
        })
    }
}

/// Poll `policy` without stepping until it asks for a jump.
///
/// Returns `None` if aborted while waiting, otherwise whether the round opens
/// with a jump. A policy fault ends the wait without one.
fn await_first_jump<S: FrameSink>(
    engine: &Engine,
    agent: &Agent,
    policy: &mut dyn Policy,
    abort: &AtomicBool,
    sink: &mut S,
) -> Result<Option<bool>> {
    loop {
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match policy.decide(&engine.observe(agent)) {
            Ok(true) => return Ok(Some(true)),
            Ok(false) => {}
            Err(error) => {
                log::warn!(
                    "{} policy failed while waiting, starting without a jump: {error:#}",
                    policy.kind()
                );
                return Ok(Some(false));
            }
        }
        sink.record(&engine.idle_snapshot(agent))
            .context("failed to record snapshot")?;
    }
}

/// Replays the jump consumed while waiting, then defers to the wrapped policy.
struct Opening<'p> {
    policy: &'p mut dyn Policy,
    jump: bool,
}

impl Policy for Opening<'_> {
    fn kind(&self) -> &'static str {
        self.policy.kind()
    }

    fn decide(&mut self, obs: &Observation) -> Result<bool> {
        if mem::take(&mut self.jump) {
            return Ok(true);
        }
        self.policy.decide(obs)
    }
}
