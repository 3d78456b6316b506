//! Read-only views of the simulation for external renderers.

use crate::model::{Agent, Obstacle};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    /// Index of the agent's policy in the cohort.
    pub id: usize,
    pub y: f64,
    pub tilt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleView {
    pub x: i32,
    pub gap_top: i32,
    pub gap_bottom: i32,
}

impl From<&Obstacle> for ObstacleView {
    fn from(obstacle: &Obstacle) -> Self {
        Self {
            x: obstacle.x(),
            gap_top: obstacle.gap_top(),
            gap_bottom: obstacle.gap_bottom(),
        }
    }
}

/// State of the simulation after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: usize,
    pub score: usize,
    pub agents: Vec<AgentView>,
    pub obstacles: Vec<ObstacleView>,
}

impl Snapshot {
    pub fn new<'a, A, O>(tick: usize, score: usize, agents: A, obstacles: O) -> Self
    where
        A: IntoIterator<Item = (usize, &'a Agent)>,
        O: IntoIterator<Item = &'a Obstacle>,
    {
        Self {
            tick,
            score,
            agents: agents
                .into_iter()
                .map(|(id, agent)| AgentView {
                    id,
                    y: agent.y(),
                    tilt: agent.tilt(),
                })
                .collect(),
            obstacles: obstacles.into_iter().map(ObstacleView::from).collect(),
        }
    }
}

/// Consumer of per-tick snapshots.
pub trait FrameSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FrameSink for Vec<Snapshot> {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.push(snapshot.clone());
        Ok(())
    }
}

/// Writes every `ticks_per_save`-th snapshot to a MessagePack stream.
pub struct TrajectoryWriter {
    writer: BufWriter<File>,
    ticks_per_save: usize,
    n_saved: usize,
}

impl TrajectoryWriter {
    pub fn create<P: AsRef<Path>>(file: P, ticks_per_save: usize) -> Result<Self> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        Ok(Self {
            writer: BufWriter::new(file),
            ticks_per_save,
            n_saved: 0,
        })
    }

    pub fn n_saved(&self) -> usize {
        self.n_saved
    }
}

impl FrameSink for TrajectoryWriter {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.tick % self.ticks_per_save != 0 {
            return Ok(());
        }
        encode::write(&mut self.writer, snapshot).context("failed to serialize snapshot")?;
        self.n_saved += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush writer stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmp_serde::decode;
    use std::{env, fs, io::BufReader};

    fn snapshot(tick: usize) -> Snapshot {
        Snapshot {
            tick,
            score: tick / 4,
            agents: vec![AgentView {
                id: 0,
                y: 300.0,
                tilt: 25.0,
            }],
            obstacles: vec![ObstacleView {
                x: 600 - 5 * tick as i32,
                gap_top: 120,
                gap_bottom: 320,
            }],
        }
    }

    #[test]
    fn writer_keeps_every_nth_snapshot() {
        let file = env::temp_dir().join(format!("trajectory-test-{}.msgpack", std::process::id()));
        let mut writer = TrajectoryWriter::create(&file, 3).unwrap();
        for tick in 1..=10 {
            writer.record(&snapshot(tick)).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(writer.n_saved(), 3);

        let mut reader = BufReader::new(File::open(&file).unwrap());
        let ticks: Vec<usize> = (0..3)
            .map(|_| decode::from_read::<_, Snapshot>(&mut reader).unwrap().tick)
            .collect();
        assert_eq!(ticks, vec![3, 6, 9]);
        fs::remove_file(&file).ok();
    }
}
