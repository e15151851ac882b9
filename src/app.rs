use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{GeohashPrecision, SurveyCode, UnitOfWork, YearRange};
use crate::error::GeobinError;
use crate::foss::SurveySource;
use crate::pacing::{Pacer, RunControl};
use crate::reduce::KeyedReducer;
use crate::simplify::{DropCounts, Simplifier};
use crate::store::AggregateSink;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub years: YearRange,
    pub surveys: Vec<SurveyCode>,
    pub precision: GeohashPrecision,
    pub fail_fast: bool,
}

impl DownloadOptions {
    /// Survey-years in processing order: years ascending, surveys in configured order.
    pub fn units(&self) -> Vec<UnitOfWork> {
        self.years
            .years()
            .flat_map(|year| {
                self.surveys.iter().map(move |survey| UnitOfWork {
                    survey: survey.clone(),
                    year,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: UnitOfWork,
    pub observations: u64,
    pub dropped: DropCounts,
    pub rows: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUnit {
    pub unit: UnitOfWork,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub years: String,
    pub precision: u8,
    pub completed: Vec<UnitReport>,
    pub failed: Vec<FailedUnit>,
    pub skipped: Vec<UnitOfWork>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_rows(&self) -> usize {
        self.completed.iter().map(|report| report.rows).sum()
    }

    pub fn total_dropped(&self) -> DropCounts {
        let mut totals = DropCounts::default();
        for report in &self.completed {
            totals.absorb(report.dropped);
        }
        totals
    }

    pub fn total_units(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.cancelled
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Drives fetch, reduce and persist over every survey-year of a run.
pub struct App<S: SurveySource, P: Pacer> {
    source: S,
    pacer: P,
}

impl<S: SurveySource, P: Pacer> App<S, P> {
    pub fn new(source: S, pacer: P) -> Self {
        Self { source, pacer }
    }

    pub fn download(
        &self,
        sink: &mut dyn AggregateSink,
        options: &DownloadOptions,
        control: &RunControl,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary, GeobinError> {
        let started_at = Utc::now();
        let units = options.units();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        let mut cancelled = false;

        tracing::info!(
            years = %options.years,
            surveys = options.surveys.len(),
            precision = %options.precision,
            "starting download of {} survey-years",
            units.len()
        );

        for (index, unit) in units.iter().enumerate() {
            if index > 0 {
                progress.event(ProgressEvent {
                    message: "phase=Pause; waiting before next request".to_string(),
                    elapsed: None,
                });
                self.pacer.pause(control);
            }

            if control.is_cancelled() {
                tracing::warn!(%unit, "run cancelled; skipping remaining survey-years");
                cancelled = true;
                skipped.extend(units[index..].iter().cloned());
                break;
            }

            match self.process_unit(unit, options.precision, sink, progress) {
                Ok(report) => {
                    tracing::info!(
                        %unit,
                        observations = report.observations,
                        dropped = report.dropped.total(),
                        rows = report.rows,
                        "completed survey-year"
                    );
                    completed.push(report);
                }
                Err(err) if err.is_upstream() && !options.fail_fast => {
                    tracing::warn!(%unit, error = %err, "survey-year failed; continuing");
                    failed.push(FailedUnit {
                        unit: unit.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(%unit, error = %err, "aborting run");
                    return Err(err);
                }
            }
        }

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            years: options.years.to_string(),
            precision: options.precision.into(),
            completed,
            failed,
            skipped,
            cancelled,
        })
    }

    /// Fetches, reduces and persists a single survey-year.
    pub fn process_unit(
        &self,
        unit: &UnitOfWork,
        precision: GeohashPrecision,
        sink: &mut dyn AggregateSink,
        progress: &dyn ProgressSink,
    ) -> Result<UnitReport, GeobinError> {
        let started = Instant::now();
        progress.event(ProgressEvent {
            message: format!("phase=Fetch; {unit}"),
            elapsed: None,
        });

        let mut simplifier = Simplifier::new(precision);
        let mut reducer = KeyedReducer::new();
        for observation in self.source.observations(&unit.survey, unit.year, false)? {
            if let Some(record) = simplifier.apply(&observation?) {
                reducer.push(record);
            }
        }

        progress.event(ProgressEvent {
            message: format!(
                "phase=Reduce; {unit}: {} observations into {} cells",
                simplifier.seen(),
                reducer.distinct_keys()
            ),
            elapsed: Some(started.elapsed()),
        });
        let records = reducer.finish();

        progress.event(ProgressEvent {
            message: format!("phase=Persist; {unit}: {} rows", records.len()),
            elapsed: Some(started.elapsed()),
        });
        let rows = sink.persist(unit, &records)?;

        Ok(UnitReport {
            unit: unit.clone(),
            observations: simplifier.seen(),
            dropped: simplifier.drops(),
            rows,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }
}
