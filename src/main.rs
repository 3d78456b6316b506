mod collision;
mod config;
mod engine;
mod evaluator;
mod manager;
mod model;
mod policy;
mod session;
mod snapshot;
mod stats;
mod track;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate cohorts of random network policies.
    Evaluate {
        #[arg(long, default_value_t = 1)]
        generations: usize,
    },

    /// Play single-play rounds from a 0/1 jump script, or from stdin when absent.
    Play {
        #[arg(long)]
        script: Option<String>,

        #[arg(long, default_value_t = 1)]
        rounds: usize,
    },

    Summarize,

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let abort = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(abort.clone()).context("failed to install interrupt handler")?;

    let mgr = Manager::new(args.sim_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Evaluate { generations } => mgr.evaluate(generations, &abort)?,
        Command::Play { script, rounds } => mgr.play(script.as_deref(), rounds, abort)?,
        Command::Summarize => mgr.summarize()?,
        Command::Clean => mgr.clean()?,
    }

    Ok(())
}

/// Raise `abort` on Ctrl-C so the running simulation stops after its current tick.
fn spawn_interrupt_handler(abort: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, stopping after the current tick");
                abort.store(true, Ordering::SeqCst);
            }
        });
    });
    Ok(())
}
