#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use gap_geobin::app::{ProgressEvent, ProgressSink};
use gap_geobin::domain::{RawObservation, SurveyCode};
use gap_geobin::error::GeobinError;
use gap_geobin::foss::{ObservationStream, SurveySource};
use gap_geobin::pacing::{Pacer, RunControl};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn observation(survey: &str, year: f64, species: &str, lat: f64, lon: f64) -> RawObservation {
    RawObservation {
        latitude: lat,
        longitude: lon,
        survey: survey.to_string(),
        year,
        scientific_name: species.to_string(),
        common_name: format!("{species} (common)"),
        surface_temperature_c: Some(7.0),
        bottom_temperature_c: Some(2.0),
        weight_kg: Some(10.0),
        count: Some(4.0),
        area_swept_ha: 5.0,
    }
}

/// In-memory source that logs every fetch to a shared event log.
#[derive(Default)]
pub struct MockSource {
    pub data: HashMap<(String, i32), Vec<RawObservation>>,
    pub failing: HashSet<(String, i32)>,
    pub failing_mid_stream: HashSet<(String, i32)>,
    pub log: EventLog,
}

impl MockSource {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, survey: &str, year: i32, observations: Vec<RawObservation>) {
        self.data.insert((survey.to_string(), year), observations);
    }

    pub fn fetches(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("fetch"))
            .cloned()
            .collect()
    }
}

impl SurveySource for MockSource {
    fn observations(
        &self,
        survey: &SurveyCode,
        year: i32,
        presence_only: bool,
    ) -> Result<ObservationStream<'_>, GeobinError> {
        assert!(!presence_only, "pipeline must request absence records");
        self.log
            .lock()
            .unwrap()
            .push(format!("fetch {survey} {year}"));

        let key = (survey.to_string(), year);
        if self.failing.contains(&key) {
            return Err(GeobinError::UpstreamStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }

        let items = self.data.get(&key).cloned().unwrap_or_default();
        let mut stream: Vec<Result<RawObservation, GeobinError>> =
            items.into_iter().map(Ok).collect();
        if self.failing_mid_stream.contains(&key) {
            stream.push(Err(GeobinError::UpstreamHttp("connection reset".to_string())));
        }
        Ok(Box::new(stream.into_iter()))
    }
}

pub struct RecordingPacer {
    pub log: EventLog,
}

impl Pacer for RecordingPacer {
    fn pause(&self, _control: &RunControl) {
        self.log.lock().unwrap().push("pause".to_string());
    }
}

/// Pacer that cancels the run on its n-th pause.
pub struct CancellingPacer {
    pub cancel_on: usize,
    pub pauses: Mutex<usize>,
}

impl Pacer for CancellingPacer {
    fn pause(&self, control: &RunControl) {
        let mut pauses = self.pauses.lock().unwrap();
        *pauses += 1;
        if *pauses == self.cancel_on {
            control.cancel();
        }
    }
}

pub struct QuietProgress;

impl ProgressSink for QuietProgress {
    fn event(&self, _event: ProgressEvent) {}
}
