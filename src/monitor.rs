//! Terminal progress and event logging for engine runs

use indicatif::{ProgressBar, ProgressStyle};
use phasekit::{EngineEvent, EngineListener, ProgressMonitor};

/// Progress monitor drawing an indicatif bar
#[derive(Debug)]
pub struct ProgressBarMonitor {
    bar: ProgressBar,
}

impl ProgressBarMonitor {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }

    /// A monitor that tracks progress without drawing anything
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for ProgressBarMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor for ProgressBarMonitor {
    fn begin(&self, total_work: u64) {
        self.bar.set_length(total_work);
        self.bar.set_position(0);
    }

    fn phase_started(&self, phase_id: &str, _weight: u64) {
        self.bar.set_message(phase_id.to_string());
    }

    fn sub_task(&self, description: &str) {
        self.bar.set_message(description.to_string());
    }

    fn worked(&self, work: u64) {
        self.bar.inc(work);
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}

/// Listener that writes engine events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl EngineListener for LogListener {
    fn notify(&self, event: &EngineEvent) {
        match event {
            EngineEvent::PhaseStarted { .. } | EngineEvent::PhaseCompleted { .. } => {
                log::debug!("{event}");
            }
            EngineEvent::RollbackOperation { status, .. } | EngineEvent::UnresolvedOperation { status, .. } => {
                log::warn!("{event}: {status}");
            }
            EngineEvent::BeginOperation { .. } | EngineEvent::CommitOperation { .. } => {
                log::info!("{event}");
            }
        }
    }
}
