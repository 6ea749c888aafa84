use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use serde::Serialize;

use crate::{
    balance::{LossTriple, StepCounters},
    error::Result,
    gan::Probe,
};

/// One periodic report, written as a line of JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub iteration: u64,
    /// The controller's losses after the iteration.
    pub train: LossTriple,
    /// The losses on a batch of held out images.
    pub validation: LossTriple,
    /// The steps run since the previous report.
    pub steps: StepCounters,
    #[serde(flatten)]
    pub probe: Probe,
}

/// Appends reports to a JSON lines file.
pub struct MetricsSink {
    writer: BufWriter<File>,
}

impl MetricsSink {
    /// Opens `path` for appending, creating it and its parent directories if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, report: &Report) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// What a finished run did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub iterations: u64,
    pub steps: StepCounters,
    pub final_losses: LossTriple,
    pub elapsed: Duration,
}

impl Summary {
    #[inline]
    pub fn bump_iteration(&mut self) {
        self.iterations += 1;
    }

    #[inline]
    pub fn add_steps(&mut self, steps: StepCounters) {
        self.steps.absorb(steps);
    }
}
