//! Pipeline driver: reads records, classifies them on a bounded worker pool
//! and routes each line to its sink.
//!
//! ```text
//!   Idle ──run()──► Streaming ──input exhausted / fatal error──► Done
//! ```
//!
//! Records are pulled in windows of `sampling.batch_size`. Each window is
//! parsed on the calling thread, fanned out to `sampling.workers` rayon
//! threads for sampling and classification, and collected back in input
//! order before anything is written. Relative order within each sink
//! therefore matches the input.

use std::io::Write;

use rayon::prelude::*;
use serde::Serialize;

use crate::classify::histogram::Histogram;
use crate::classify::{Classification, Classifier, Verdict};
use crate::config::{Config, FetchErrorPolicy, ParseErrorPolicy};
use crate::data::loader::{RawLine, parse_record};
use crate::data::model::{InputRecord, ReportCoordinate};
use crate::data::transform::CoordinateTransformer;
use crate::emit::OutputSinks;
use crate::error::{CoregError, Result};
use crate::observe::{PipelineEvent, PipelineObserver};
use crate::volume::{SamplerError, VolumeSampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming { processed: usize },
    Done,
}

/// Counts for one run.
///
/// `categorized + uncategorized + skipped == lines_read`; `unavailable`
/// records are included in `uncategorized`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub strategy: String,
    /// Lines skipped before reading started (resume offset).
    pub start_line: usize,
    pub lines_read: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub skipped: usize,
    pub unavailable: usize,
}

impl RunSummary {
    pub fn is_consistent(&self) -> bool {
        self.categorized + self.uncategorized + self.skipped == self.lines_read
    }
}

/// Result of sampling and classifying one record on a worker.
struct Processed {
    record: InputRecord,
    report: ReportCoordinate,
    result: std::result::Result<Classification, SamplerError>,
}

pub struct Pipeline<S> {
    config: Config,
    transformer: CoordinateTransformer,
    classifier: Classifier,
    sampler: S,
    pool: rayon::ThreadPool,
    state: PipelineState,
    start_line: usize,
}

impl<S: VolumeSampler> Pipeline<S> {
    pub fn new(config: Config, sampler: S) -> Result<Self> {
        config.validate()?;
        let classifier = config.classifier()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.sampling.workers)
            .thread_name(|i| format!("sampler-{i}"))
            .build()
            .map_err(|e| CoregError::Config(format!("cannot start worker pool: {e}")))?;
        Ok(Pipeline {
            transformer: config.transformer(),
            classifier,
            config,
            sampler,
            pool,
            state: PipelineState::Idle,
            start_line: 0,
        })
    }

    /// Record the resume offset the input reader was started at.
    pub fn with_start_line(mut self, start_line: usize) -> Self {
        self.start_line = start_line;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Transform, sample and classify a single record.
    pub fn classify_record(
        &self,
        record: &InputRecord,
    ) -> (ReportCoordinate, std::result::Result<Classification, SamplerError>) {
        let (sampling, report) = self.transformer.transform(record.world);
        let extent = self.classifier.box_extent();
        let result = self
            .sampler
            .sample(sampling, extent, self.config.sampling.mip)
            .and_then(|cutout| {
                if cutout.extent() != extent {
                    return Err(SamplerError::InvalidVolume(format!(
                        "asked for {extent}, got {}",
                        cutout.extent()
                    )));
                }
                Ok(self.classifier.classify(&Histogram::from_cutout(&cutout)))
            });
        (report, result)
    }

    /// Stream every input line through the classifier into `sinks`.
    ///
    /// Both sinks are flushed exactly once, whether the run completes or
    /// stops on a fatal error.
    pub fn run<I, W>(
        &mut self,
        input: I,
        mut sinks: OutputSinks<W>,
        observer: &mut dyn PipelineObserver,
    ) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawLine>>,
        W: Write,
    {
        if self.state != PipelineState::Idle {
            return Err(CoregError::InvalidState(format!(
                "run() called in state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Streaming { processed: 0 };

        let mut summary = RunSummary {
            strategy: self.classifier.name().to_string(),
            start_line: self.start_line,
            ..Default::default()
        };
        let streamed = self.stream(input.into_iter(), &mut sinks, observer, &mut summary);
        let flushed = sinks.finish();
        self.state = PipelineState::Done;

        streamed?;
        flushed?;
        observer.on_event(&PipelineEvent::Finished { summary: &summary })?;
        Ok(summary)
    }

    fn stream<W: Write>(
        &mut self,
        mut input: impl Iterator<Item = Result<RawLine>>,
        sinks: &mut OutputSinks<W>,
        observer: &mut dyn PipelineObserver,
        summary: &mut RunSummary,
    ) -> Result<()> {
        observer.on_event(&PipelineEvent::Started {
            strategy: self.classifier.name(),
            box_extent: self.classifier.box_extent(),
            mip: self.config.sampling.mip,
            workers: self.config.sampling.workers,
        })?;

        let batch_size = self.config.sampling.batch_size;
        loop {
            let mut batch: Vec<InputRecord> = Vec::with_capacity(batch_size);
            let mut fatal = None;
            let mut exhausted = false;
            while batch.len() < batch_size {
                let Some(line) = input.next() else {
                    exhausted = true;
                    break;
                };
                let parsed = match line {
                    Ok(line) => parse_record(line),
                    Err(error @ CoregError::Parse { .. }) => Err(error),
                    Err(error) => {
                        // read failure: the window read so far still gets written
                        fatal = Some(error);
                        break;
                    }
                };
                summary.lines_read += 1;
                match parsed {
                    Ok(record) => batch.push(record),
                    Err(error) => match self.config.policy.on_parse_error {
                        ParseErrorPolicy::Skip => {
                            summary.skipped += 1;
                            observer.on_event(&PipelineEvent::Skipped { error: &error })?;
                        }
                        ParseErrorPolicy::Abort => {
                            // lines before the bad one still get written
                            fatal = Some(error);
                            break;
                        }
                    },
                }
            }

            let this: &Self = self;
            let processed: Vec<Processed> = this.pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|record| {
                        let (report, result) = this.classify_record(&record);
                        Processed {
                            record,
                            report,
                            result,
                        }
                    })
                    .collect()
            });

            for item in processed {
                self.emit(item, sinks, observer, summary)?;
            }

            if let Some(error) = fatal {
                return Err(error);
            }
            if exhausted {
                return Ok(());
            }
        }
    }

    fn emit<W: Write>(
        &mut self,
        item: Processed,
        sinks: &mut OutputSinks<W>,
        observer: &mut dyn PipelineObserver,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let line = item.record.line_no;
        let classification = match item.result {
            Ok(c) => c,
            Err(error) => match self.config.policy.on_fetch_error {
                FetchErrorPolicy::Abort => {
                    return Err(CoregError::SourceUnavailable {
                        line,
                        message: error.to_string(),
                    });
                }
                FetchErrorPolicy::Uncategorize => {
                    summary.unavailable += 1;
                    observer.on_event(&PipelineEvent::Unavailable {
                        line,
                        error: &error,
                    })?;
                    Classification::unavailable(self.classifier.box_extent().volume())
                }
            },
        };

        sinks.write(&item.record, item.report, classification.verdict)?;
        match classification.verdict {
            Verdict::Categorized(_) => summary.categorized += 1,
            Verdict::Uncategorized => summary.uncategorized += 1,
        }
        observer.on_event(&PipelineEvent::Classified {
            line,
            report: item.report,
            classification: &classification,
        })?;

        let processed = summary.categorized + summary.uncategorized;
        self.state = PipelineState::Streaming { processed };
        if processed % self.config.progress_interval == 0 {
            observer.on_event(&PipelineEvent::Progress { processed })?;
        }
        Ok(())
    }
}
