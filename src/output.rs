use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::store::StoredUnit;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_store(units: &[StoredUnit]) -> io::Result<()> {
        Self::print_json(&units)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_run(summary: &RunSummary) {
        for report in &summary.completed {
            println!(
                "Completed {} for {}: {} rows from {} observations ({} dropped).",
                report.unit.year,
                report.unit.survey,
                report.rows,
                report.observations,
                report.dropped.total()
            );
        }
        for failure in &summary.failed {
            println!(
                "Failed {} for {}: {}",
                failure.unit.year, failure.unit.survey, failure.error
            );
        }
        if summary.cancelled {
            println!(
                "Stopped early; {} survey-years not attempted.",
                summary.skipped.len()
            );
        }
        println!(
            "{} of {} survey-years written, {} rows total.",
            summary.completed.len(),
            summary.total_units(),
            summary.total_rows()
        );
    }

    pub fn print_store(units: &[StoredUnit]) {
        if units.is_empty() {
            println!("No aggregates stored.");
            return;
        }
        println!("{:<6} {:<8} {:>10} {:>14}", "year", "survey", "rows", "observations");
        for unit in units {
            println!(
                "{:<6} {:<8} {:>10} {:>14}",
                unit.year, unit.survey, unit.rows, unit.observations
            );
        }
    }
}
