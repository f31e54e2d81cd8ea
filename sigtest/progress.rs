use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::fmt;
use std::sync::Mutex;

/// Stages of a batch run, each visiting every experiment once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchStage {
    Aggregation,
    Statistics,
}

impl BatchStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Aggregation => "null distribution aggregation",
            Self::Statistics => "empirical statistics",
        }
    }
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for per-experiment progress. Experiments may finish on worker threads,
/// so callbacks take `&self`.
pub trait BatchProgressObserver: Sync {
    fn on_stage_start(&self, stage: BatchStage, total_experiments: usize) {
        let _ = (stage, total_experiments);
    }
    fn on_experiment_done(&self, stage: BatchStage, experiment: &str, completed: usize) {
        let _ = (stage, experiment, completed);
    }
    fn on_stage_finish(&self, stage: BatchStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopBatchProgress;

impl BatchProgressObserver for NoopBatchProgress {}

/// Logs `"{completed} / {total} completed."` after every experiment.
#[derive(Default)]
pub struct LogBatchProgress {
    total: Mutex<usize>,
}

impl BatchProgressObserver for LogBatchProgress {
    fn on_stage_start(&self, stage: BatchStage, total_experiments: usize) {
        if let Ok(mut total) = self.total.lock() {
            *total = total_experiments;
        }
        info!("Starting {stage} for {total_experiments} experiment(s).");
    }

    fn on_experiment_done(&self, stage: BatchStage, experiment: &str, completed: usize) {
        let total = self.total.lock().map(|total| *total).unwrap_or(0);
        info!("{stage} [{experiment}]: {completed} / {total} completed.");
    }
}

/// Terminal progress bar, one bar per stage.
#[derive(Default)]
pub struct ConsoleBatchProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BatchProgressObserver for ConsoleBatchProgress {
    fn on_stage_start(&self, stage: BatchStage, total_experiments: usize) {
        let pb = ProgressBar::new(total_experiments as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{prefix:>32} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        pb.set_prefix(stage.describe());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(pb);
        }
    }

    fn on_experiment_done(&self, _stage: BatchStage, experiment: &str, completed: usize) {
        let Ok(slot) = self.bar.lock() else {
            return;
        };
        if let Some(pb) = slot.as_ref() {
            pb.set_message(experiment.to_string());
            pb.set_position(completed as u64);
        }
    }

    fn on_stage_finish(&self, stage: BatchStage) {
        let finished = self.bar.lock().ok().and_then(|mut slot| slot.take());
        if let Some(pb) = finished {
            pb.finish_with_message(format!("{stage} done"));
        }
    }
}
