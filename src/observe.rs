use std::io::Write;

use crate::classify::Classification;
use crate::data::model::{Extent, ReportCoordinate};
use crate::emit::{DiagnosticRow, DiagnosticsWriter};
use crate::error::{CoregError, Result};
use crate::pipeline::RunSummary;
use crate::volume::SamplerError;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something the driver wants reported. Emitted from the writer side only,
/// in input order.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    Started {
        strategy: &'static str,
        box_extent: Extent,
        mip: u32,
        workers: usize,
    },
    Classified {
        line: usize,
        report: ReportCoordinate,
        classification: &'a Classification,
    },
    /// `processed` records have been written so far.
    Progress { processed: usize },
    /// A malformed line dropped under the skip policy.
    Skipped { error: &'a CoregError },
    /// A cutout that could not be fetched; the record goes out uncategorized.
    Unavailable { line: usize, error: &'a SamplerError },
    Finished { summary: &'a RunSummary },
}

/// Receiver for pipeline events. Errors abort the run.
pub trait PipelineObserver {
    fn on_event(&mut self, event: &PipelineEvent<'_>) -> Result<()>;
}

/// Discards every event.
impl PipelineObserver for () {
    fn on_event(&mut self, _event: &PipelineEvent<'_>) -> Result<()> {
        Ok(())
    }
}

/// Forwards each event to every observer in order.
impl PipelineObserver for Vec<Box<dyn PipelineObserver>> {
    fn on_event(&mut self, event: &PipelineEvent<'_>) -> Result<()> {
        for observer in self.iter_mut() {
            observer.on_event(event)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogObserver
// ---------------------------------------------------------------------------

/// Reports progress and anomalies through the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&mut self, event: &PipelineEvent<'_>) -> Result<()> {
        match event {
            PipelineEvent::Started {
                strategy,
                box_extent,
                mip,
                workers,
            } => log::info!(
                "classifying with {strategy} strategy, box {box_extent} at mip {mip}, {workers} workers"
            ),
            PipelineEvent::Classified {
                line,
                report,
                classification,
            } => log::trace!(
                "line {line} at {report}: {:?} ({:?})",
                classification.verdict,
                classification.reason
            ),
            PipelineEvent::Progress { processed } => log::info!("processed {processed} records"),
            PipelineEvent::Skipped { error } => log::warn!("skipping malformed record: {error}"),
            PipelineEvent::Unavailable { line, error } => {
                log::warn!("line {line}: no cutout ({error}), writing as uncategorized")
            }
            PipelineEvent::Finished { summary } => log::info!(
                "done: {} categorized, {} uncategorized, {} skipped, {} unavailable of {} lines",
                summary.categorized,
                summary.uncategorized,
                summary.skipped,
                summary.unavailable,
                summary.lines_read
            ),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Diagnostics CSV as an observer
// ---------------------------------------------------------------------------

impl<W: Write> PipelineObserver for DiagnosticsWriter<W> {
    fn on_event(&mut self, event: &PipelineEvent<'_>) -> Result<()> {
        match event {
            PipelineEvent::Classified {
                line,
                report,
                classification,
            } => self.record(&DiagnosticRow::new(*line, *report, classification)),
            PipelineEvent::Finished { .. } => self.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl PipelineObserver for Counter {
        fn on_event(&mut self, _event: &PipelineEvent<'_>) -> Result<()> {
            self.0 += 1;
            Ok(())
        }
    }

    struct Failing;

    impl PipelineObserver for Failing {
        fn on_event(&mut self, _event: &PipelineEvent<'_>) -> Result<()> {
            Err(CoregError::InvalidState("observer failed".into()))
        }
    }

    #[test]
    fn fan_out_stops_at_first_error() {
        let mut observers: Vec<Box<dyn PipelineObserver>> =
            vec![Box::new(Counter(0)), Box::new(Failing), Box::new(Counter(0))];
        let event = PipelineEvent::Progress { processed: 100 };
        assert!(observers.on_event(&event).is_err());
    }

    #[test]
    fn log_observer_accepts_every_event() {
        let summary = RunSummary::default();
        let mut log = LogObserver;
        log.on_event(&PipelineEvent::Progress { processed: 1 }).unwrap();
        log.on_event(&PipelineEvent::Finished { summary: &summary }).unwrap();
    }
}
