use crate::config::Config;
use crate::engine::Termination;
use crate::evaluator::{Evaluation, PopulationEvaluator};
use crate::policy::{Event, EventPolicy, NetworkPolicy, Policy, ScriptPolicy};
use crate::session::Session;
use crate::snapshot::{FrameSink, Snapshot, TrajectoryWriter};
use anyhow::{Context, Result};
use glob::glob;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Evaluate `n_generations` cohorts of random networks, continuing the
    /// generation numbering of the files already present.
    pub fn evaluate(&self, n_generations: usize, abort: &AtomicBool) -> Result<()> {
        let first = self
            .count_generation_files()
            .context("failed to count generation files")?;
        let mut rng = self.run_rng(first).context("failed to construct rng")?;
        let mut evaluator = PopulationEvaluator::new(self.cfg.clone(), first);

        for _ in 0..n_generations {
            let generation = evaluator.generation();

            let mut policies = (0..self.cfg.cohort.n_agents)
                .map(|_| {
                    NetworkPolicy::random(&self.cfg.network, &mut rng)
                        .map(|policy| Box::new(policy) as Box<dyn Policy>)
                })
                .collect::<Result<Vec<_>>>()
                .context("failed to build policies")?;

            let trajectory_file = self.trajectory_file(generation);
            let mut writer =
                TrajectoryWriter::create(&trajectory_file, self.cfg.output.ticks_per_save)
                    .with_context(|| format!("failed to create writer for {trajectory_file:?}"))?;

            let evaluation = evaluator
                .evaluate(
                    &mut policies,
                    ChaCha12Rng::from_rng(&mut rng),
                    abort,
                    &mut writer,
                )
                .with_context(|| format!("failed to evaluate generation {generation}"))?;

            if let Some(best) = evaluation.best() {
                log::info!(
                    "best policy {best} with fitness {:.3} over {} ticks",
                    evaluation.fitness[best],
                    evaluation.ticks_survived[best]
                );
            }
            log::info!("saved {} snapshots to {trajectory_file:?}", writer.n_saved());

            let generation_file = self.generation_file(generation);
            save_evaluation(&generation_file, &evaluation)
                .with_context(|| format!("failed to save {generation_file:?}"))?;
            log::info!("saved {generation_file:?}");

            if evaluation.termination == Termination::Aborted {
                break;
            }
        }

        Ok(())
    }

    /// Play single-play rounds, either from a fixed script or from stdin
    /// (every line is a jump, `q` quits).
    pub fn play(
        &self,
        script: Option<&str>,
        n_rounds: usize,
        abort: Arc<AtomicBool>,
    ) -> Result<()> {
        let rng = self.run_rng(0).context("failed to construct rng")?;
        let mut session = Session::new(self.cfg.clone(), rng).wait_for_first_jump(script.is_none());

        let (mut policy, mut pace): (Box<dyn Policy>, Pace) = match script {
            Some(script) => {
                let policy: ScriptPolicy = script.parse().context("failed to parse script")?;
                (Box::new(policy) as Box<dyn Policy>, Pace::new(None))
            }
            None => {
                let (tx, rx) = mpsc::channel();
                spawn_stdin_reader(tx, abort.clone());
                log::info!("press enter to jump, q to quit");
                let interval = Duration::from_secs(1) / self.cfg.play.ticks_per_second;
                (
                    Box::new(EventPolicy::new(rx)) as Box<dyn Policy>,
                    Pace::new(Some(interval)),
                )
            }
        };

        for _ in 0..n_rounds {
            let report = session
                .play_round(&mut *policy, &abort, &mut pace)
                .context("failed to play round")?;
            if report.termination == Termination::Aborted {
                break;
            }
        }
        log::info!("high score {}", session.high_score());

        Ok(())
    }

    /// Log the fitness summary of every saved generation.
    pub fn summarize(&self) -> Result<()> {
        let n_generations = self
            .count_generation_files()
            .context("failed to count generation files")?;

        let mut best: Option<(usize, f64)> = None;
        for generation in 0..n_generations {
            let generation_file = self.generation_file(generation);
            let evaluation = load_evaluation(&generation_file)
                .with_context(|| format!("failed to load {generation_file:?}"))?;
            log::info!(
                "generation {generation:04}: score {} fitness mean {:.3} std_dev {:.3} max {:.3}",
                evaluation.score,
                evaluation.summary.mean,
                evaluation.summary.std_dev,
                evaluation.summary.max,
            );
            if best.is_none_or(|(_, max)| evaluation.summary.max > max) {
                best = Some((generation, evaluation.summary.max));
            }
        }

        match best {
            Some((generation, max)) => {
                log::info!("best fitness {max:.3} in generation {generation:04}")
            }
            None => log::warn!("no generations to summarize"),
        }

        Ok(())
    }

    /// Remove every generation and trajectory file.
    pub fn clean(&self) -> Result<()> {
        for pattern in ["generation-*.msgpack", "trajectory-*.msgpack"] {
            let pattern = self.sim_dir.join(pattern);
            let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
            let files: Vec<_> = glob(pattern)
                .context("failed to glob output files")?
                .filter_map(Result::ok)
                .collect();
            for file in files {
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    fn run_rng(&self, stream: usize) -> Result<ChaCha12Rng> {
        match self.cfg.cohort.seed {
            Some(seed) => Ok(ChaCha12Rng::seed_from_u64(seed.wrapping_add(stream as u64))),
            None => Ok(ChaCha12Rng::try_from_os_rng()?),
        }
    }

    fn count_generation_files(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("generation-*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob generation files")?
            .filter_map(Result::ok)
            .count();
        Ok(count)
    }

    fn generation_file(&self, generation: usize) -> PathBuf {
        self.sim_dir
            .join(format!("generation-{generation:04}.msgpack"))
    }

    fn trajectory_file(&self, generation: usize) -> PathBuf {
        self.sim_dir
            .join(format!("trajectory-{generation:04}.msgpack"))
    }
}

fn save_evaluation<P: AsRef<Path>>(file: P, evaluation: &Evaluation) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, evaluation).context("failed to serialize evaluation")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn load_evaluation<P: AsRef<Path>>(file: P) -> Result<Evaluation> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);
    let evaluation = decode::from_read(&mut reader).context("failed to deserialize evaluation")?;
    Ok(evaluation)
}

fn spawn_stdin_reader(tx: mpsc::Sender<Event>, abort: Arc<AtomicBool>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim() == "q" || tx.send(Event::Jump).is_err() {
                break;
            }
        }
        abort.store(true, Ordering::SeqCst);
    });
}

/// Sink pacing single-play ticks in real time.
struct Pace {
    interval: Option<Duration>,
    score: usize,
}

impl Pace {
    fn new(interval: Option<Duration>) -> Self {
        Self { interval, score: 0 }
    }
}

impl FrameSink for Pace {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.score != self.score {
            log::info!("score {}", snapshot.score);
        }
        self.score = snapshot.score;
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.score = 0;
        Ok(())
    }
}
