use std::collections::VecDeque;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::{RawObservation, SurveyCode};
use crate::error::GeobinError;

pub const DEFAULT_BASE_URL: &str =
    "https://apps-st.fisheries.noaa.gov/ods/foss/afsc_groundfish_survey/";
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

pub type ObservationStream<'a> =
    Box<dyn Iterator<Item = Result<RawObservation, GeobinError>> + 'a>;

/// Upstream provider of raw catch observations for one survey-year.
pub trait SurveySource: Send + Sync {
    fn observations(
        &self,
        survey: &SurveyCode,
        year: i32,
        presence_only: bool,
    ) -> Result<ObservationStream<'_>, GeobinError>;
}

#[derive(Debug, Deserialize)]
struct FossRecord {
    srvy: Option<String>,
    year: Option<f64>,
    #[serde(alias = "latitude_dd_start")]
    latitude_dd: Option<f64>,
    #[serde(alias = "longitude_dd_start")]
    longitude_dd: Option<f64>,
    scientific_name: Option<String>,
    common_name: Option<String>,
    surface_temperature_c: Option<f64>,
    bottom_temperature_c: Option<f64>,
    weight_kg: Option<f64>,
    count: Option<f64>,
    area_swept_ha: Option<f64>,
}

impl FossRecord {
    fn into_observation(self) -> Result<RawObservation, GeobinError> {
        fn required<T>(value: Option<T>, field: &str) -> Result<T, GeobinError> {
            value.ok_or_else(|| GeobinError::UpstreamMalformed(format!("missing {field}")))
        }

        Ok(RawObservation {
            latitude: required(self.latitude_dd, "latitude_dd")?,
            longitude: required(self.longitude_dd, "longitude_dd")?,
            survey: required(self.srvy, "srvy")?,
            year: required(self.year, "year")?,
            scientific_name: required(self.scientific_name, "scientific_name")?,
            common_name: self.common_name.unwrap_or_default(),
            surface_temperature_c: self.surface_temperature_c,
            bottom_temperature_c: self.bottom_temperature_c,
            weight_kg: self.weight_kg,
            count: self.count,
            area_swept_ha: required(self.area_swept_ha, "area_swept_ha")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    items: Vec<FossRecord>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
}

#[derive(Debug)]
pub struct ObservationPage {
    pub observations: Vec<Result<RawObservation, GeobinError>>,
    pub has_more: bool,
}

pub fn parse_page(body: &str) -> Result<ObservationPage, GeobinError> {
    let page: RawPage = serde_json::from_str(body)
        .map_err(|err| GeobinError::UpstreamMalformed(format!("page body: {err}")))?;
    Ok(ObservationPage {
        observations: page
            .items
            .into_iter()
            .map(FossRecord::into_observation)
            .collect(),
        has_more: page.has_more,
    })
}

#[derive(Clone)]
pub struct FossHttpClient {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl FossHttpClient {
    pub fn new(base_url: &str, page_size: u32) -> Result<Self, GeobinError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gap-geobin/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GeobinError::UpstreamHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| GeobinError::UpstreamHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            page_size: page_size.max(1),
        })
    }

    fn fetch_page(
        &self,
        survey: &SurveyCode,
        year: i32,
        offset: u64,
    ) -> Result<ObservationPage, GeobinError> {
        let filter = serde_json::json!({ "srvy": survey.as_str(), "year": year }).to_string();
        let offset = offset.to_string();
        let limit = self.page_size.to_string();
        tracing::debug!(%survey, year, %offset, "requesting observation page");

        let response = self.send_with_retries(|| {
            self.client.get(&self.base_url).query(&[
                ("q", filter.as_str()),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
            ])
        })?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| GeobinError::UpstreamHttp(err.to_string()))?;
        parse_page(&body)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, GeobinError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(status, attempt, "retrying upstream request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(error = %err, attempt, "retrying upstream request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(GeobinError::UpstreamHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, GeobinError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "upstream request failed".to_string());
        Err(GeobinError::UpstreamStatus { status, message })
    }
}

impl SurveySource for FossHttpClient {
    fn observations(
        &self,
        survey: &SurveyCode,
        year: i32,
        presence_only: bool,
    ) -> Result<ObservationStream<'_>, GeobinError> {
        let survey = survey.clone();
        Ok(Box::new(PagedObservations::new(
            move |offset: u64| self.fetch_page(&survey, year, offset),
            presence_only,
        )))
    }
}

/// Lazily walks a paginated listing, calling `fetch` with the running offset
/// once the buffered page is exhausted.
struct PagedObservations<F> {
    fetch: F,
    presence_only: bool,
    offset: u64,
    buffer: VecDeque<Result<RawObservation, GeobinError>>,
    has_more: bool,
    done: bool,
}

impl<F> PagedObservations<F>
where
    F: FnMut(u64) -> Result<ObservationPage, GeobinError>,
{
    fn new(fetch: F, presence_only: bool) -> Self {
        Self {
            fetch,
            presence_only,
            offset: 0,
            buffer: VecDeque::new(),
            has_more: true,
            done: false,
        }
    }
}

impl<F> Iterator for PagedObservations<F>
where
    F: FnMut(u64) -> Result<ObservationPage, GeobinError>,
{
    type Item = Result<RawObservation, GeobinError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                if self.presence_only && matches!(&item, Ok(obs) if obs.is_zero_catch()) {
                    continue;
                }
                return Some(item);
            }
            if self.done || !self.has_more {
                return None;
            }
            match (self.fetch)(self.offset) {
                Ok(page) => {
                    self.offset += page.observations.len() as u64;
                    // An empty page ends the walk even if the server still reports more.
                    self.has_more = page.has_more && !page.observations.is_empty();
                    self.buffer.extend(page.observations);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_page_maps_fields() {
        let body = r#"{
            "items": [
                {
                    "srvy": "EBS", "year": 2021, "latitude_dd": 58.9, "longitude_dd": -164.2,
                    "scientific_name": "Gadus chalcogrammus", "common_name": "walleye pollock",
                    "surface_temperature_c": 7.5, "bottom_temperature_c": 2.1,
                    "weight_kg": 120.0, "count": 300, "area_swept_ha": 4.5,
                    "cpue_kgha": 26.6
                },
                {
                    "srvy": "EBS", "year": 2021, "latitude_dd": 58.9, "longitude_dd": -164.2,
                    "scientific_name": "Hippoglossoides elassodon", "common_name": null,
                    "surface_temperature_c": null, "bottom_temperature_c": 2.1,
                    "weight_kg": 3.2, "count": null, "area_swept_ha": 4.5
                }
            ],
            "hasMore": true,
            "limit": 2,
            "offset": 0
        }"#;

        let page = parse_page(body).unwrap();
        assert!(page.has_more);
        assert_eq!(page.observations.len(), 2);

        let first = page.observations[0].as_ref().unwrap();
        assert_eq!(first.survey, "EBS");
        assert_eq!(first.year, 2021.0);
        assert_eq!(first.count, Some(300.0));

        let second = page.observations[1].as_ref().unwrap();
        assert_eq!(second.common_name, "");
        assert_eq!(second.surface_temperature_c, None);
        assert_eq!(second.count, None);
    }

    #[test]
    fn missing_coordinates_are_malformed() {
        let body = r#"{"items": [{"srvy": "GOA", "year": 2019, "scientific_name": "x", "area_swept_ha": 1.0}]}"#;
        let page = parse_page(body).unwrap();
        assert!(!page.has_more);
        assert_matches!(
            &page.observations[0],
            Err(GeobinError::UpstreamMalformed(message)) if message.contains("latitude")
        );
    }

    #[test]
    fn invalid_body_is_malformed() {
        assert_matches!(parse_page("<html>"), Err(GeobinError::UpstreamMalformed(_)));
    }

    fn catch(species: &str, weight: f64, count: f64) -> RawObservation {
        RawObservation {
            latitude: 58.9,
            longitude: -164.2,
            survey: "EBS".to_string(),
            year: 2021.0,
            scientific_name: species.to_string(),
            common_name: String::new(),
            surface_temperature_c: Some(7.5),
            bottom_temperature_c: Some(2.1),
            weight_kg: Some(weight),
            count: Some(count),
            area_swept_ha: 4.5,
        }
    }

    fn page(species: &[&str], has_more: bool) -> ObservationPage {
        ObservationPage {
            observations: species.iter().map(|name| Ok(catch(name, 1.0, 1.0))).collect(),
            has_more,
        }
    }

    fn names(items: Vec<Result<RawObservation, GeobinError>>) -> Vec<String> {
        items
            .into_iter()
            .map(|item| item.unwrap().scientific_name)
            .collect()
    }

    #[test]
    fn paging_advances_offset_until_has_more_is_cleared() {
        let mut pages = VecDeque::from([page(&["a", "b"], true), page(&["c"], false)]);
        let mut offsets = Vec::new();
        let stream = PagedObservations::new(
            |offset: u64| {
                offsets.push(offset);
                Ok(pages.pop_front().expect("no request past the last page"))
            },
            false,
        );

        assert_eq!(names(stream.collect()), vec!["a", "b", "c"]);
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn empty_page_stops_paging() {
        let mut requests = 0;
        let stream = PagedObservations::new(
            |_: u64| {
                requests += 1;
                Ok(page(&[], true))
            },
            false,
        );

        assert_eq!(stream.count(), 0);
        assert_eq!(requests, 1);
    }

    #[test]
    fn page_error_ends_stream_after_one_err() {
        let mut requests = 0;
        let mut stream = PagedObservations::new(
            |offset: u64| {
                requests += 1;
                if offset == 0 {
                    Ok(page(&["a"], true))
                } else {
                    Err(GeobinError::UpstreamStatus {
                        status: 500,
                        message: "boom".to_string(),
                    })
                }
            },
            false,
        );

        assert_matches!(stream.next(), Some(Ok(obs)) if obs.scientific_name == "a");
        assert_matches!(
            stream.next(),
            Some(Err(GeobinError::UpstreamStatus { status: 500, .. }))
        );
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        drop(stream);
        assert_eq!(requests, 2);
    }

    #[test]
    fn presence_only_skips_zero_catches() {
        let observations = vec![
            Ok(catch("present", 2.0, 0.0)),
            Ok(catch("absent", 0.0, 0.0)),
            Ok(catch("counted", 0.0, 3.0)),
            Err(GeobinError::UpstreamMalformed("missing srvy".to_string())),
        ];
        let mut served = Some(ObservationPage {
            observations,
            has_more: false,
        });
        let items: Vec<_> = PagedObservations::new(
            |_: u64| Ok(served.take().expect("single page")),
            true,
        )
        .collect();

        assert_eq!(items.len(), 3);
        assert_matches!(&items[0], Ok(obs) if obs.scientific_name == "present");
        assert_matches!(&items[1], Ok(obs) if obs.scientific_name == "counted");
        assert_matches!(&items[2], Err(GeobinError::UpstreamMalformed(_)));
    }

    #[test]
    fn zero_catches_kept_without_presence_filter() {
        let mut served = Some(ObservationPage {
            observations: vec![Ok(catch("absent", 0.0, 0.0))],
            has_more: false,
        });
        let stream =
            PagedObservations::new(|_: u64| Ok(served.take().expect("single page")), false);
        assert_eq!(names(stream.collect()), vec!["absent"]);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }
}
