use crate::config::Config;
use crate::engine::{Engine, Member, Mode, Termination};
use crate::policy::Policy;
use crate::snapshot::FrameSink;
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result, bail};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of one cohort evaluation, indexed like the policies passed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub generation: usize,
    pub fitness: Vec<f64>,
    pub ticks_survived: Vec<usize>,
    pub score: usize,
    pub ticks: usize,
    pub termination: Termination,
    pub summary: AccumulatorReport,
}

impl Evaluation {
    /// Index of the policy with the highest fitness.
    pub fn best(&self) -> Option<usize> {
        self.fitness
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i_pol, _)| i_pol)
    }
}

/// Runs cohorts of policies against a shared obstacle track and scores them.
pub struct PopulationEvaluator {
    cfg: Config,
    generation: usize,
}

impl PopulationEvaluator {
    /// Create an evaluator whose next evaluation is numbered `generation`.
    pub fn new(cfg: Config, generation: usize) -> Self {
        Self { cfg, generation }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Evaluate one cohort until it is exhausted, reaches the score ceiling,
    /// or `abort` is raised.
    ///
    /// Fitness accrued before an abort is kept in the returned [`Evaluation`].
    ///
    /// # Errors
    /// Returns an error if `policies` is empty or if the sink fails.
    pub fn evaluate<S: FrameSink>(
        &mut self,
        policies: &mut [Box<dyn Policy>],
        rng: ChaCha12Rng,
        abort: &AtomicBool,
        sink: &mut S,
    ) -> Result<Evaluation> {
        if policies.is_empty() {
            bail!("cohort must contain at least one policy");
        }

        let mut engine = Engine::new(self.cfg.clone(), Mode::Population, rng)
            .context("failed to construct engine")?;

        let mut members: Vec<Member> = policies
            .iter_mut()
            .map(|policy| Member {
                agent: engine.spawn_agent(),
                policy: &mut **policy,
                fitness: 0.0,
                ticks_survived: 0,
            })
            .collect();
        let mut live: Vec<usize> = (0..members.len()).collect();

        let mut n_faults = 0;
        let termination = loop {
            if abort.load(Ordering::SeqCst) {
                log::warn!("evaluation of generation {} aborted", self.generation);
                break Termination::Aborted;
            }

            let report = engine.perform_step(&mut members, &mut live);
            n_faults += report.n_faults;
            log::trace!("tick {}: {} live agents", engine.tick(), report.n_live);

            sink.record(&engine.snapshot(&members, &live))
                .context("failed to record snapshot")?;

            if let Some(termination) = report.termination {
                break termination;
            }
        };
        sink.finish().context("failed to finish sink")?;

        if n_faults > 0 {
            log::warn!("{n_faults} policy faults treated as no jump");
        }

        let fitness: Vec<f64> = members.iter().map(|member| member.fitness).collect();
        let summary = fitness.iter().copied().collect::<Accumulator>().report();
        let evaluation = Evaluation {
            generation: self.generation,
            ticks_survived: members.iter().map(|member| member.ticks_survived).collect(),
            fitness,
            score: engine.score(),
            ticks: engine.tick(),
            termination,
            summary,
        };

        log::info!(
            "generation {:04}: {:?} after {} ticks, score {}, fitness mean {:.3} max {:.3}",
            evaluation.generation,
            evaluation.termination,
            evaluation.ticks,
            evaluation.score,
            evaluation.summary.mean,
            evaluation.summary.max,
        );

        self.generation += 1;

        Ok(evaluation)
    }
}
