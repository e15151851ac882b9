use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GeobinError;

pub const MIN_PRECISION: u8 = 1;
pub const MAX_PRECISION: u8 = 12;

static YEAR_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<start>\d{4})-(?P<end>\d{4})$").expect("year range pattern is valid")
});

/// Number of base32 characters in a geohash, validated once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GeohashPrecision(u8);

impl GeohashPrecision {
    pub fn new(value: u8) -> Result<Self, GeobinError> {
        if (MIN_PRECISION..=MAX_PRECISION).contains(&value) {
            Ok(Self(value))
        } else {
            Err(GeobinError::InvalidPrecision(value.to_string()))
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for GeohashPrecision {
    type Error = GeobinError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GeohashPrecision> for u8 {
    fn from(value: GeohashPrecision) -> Self {
        value.0
    }
}

impl fmt::Display for GeohashPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeohashPrecision {
    type Err = GeobinError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<u8>()
            .map_err(|_| GeobinError::InvalidPrecision(value.to_string()))?;
        Self::new(parsed)
    }
}

/// Inclusive range of survey years, written `2000-2023` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearRange {
    start: i32,
    end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, GeobinError> {
        if start > end {
            return Err(GeobinError::InvalidYearRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + use<> {
        self.start..=self.end
    }

    pub fn year_count(&self) -> usize {
        (self.end - self.start + 1) as usize
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for YearRange {
    type Err = GeobinError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = YEAR_RANGE_RE
            .captures(value.trim())
            .ok_or_else(|| GeobinError::InvalidYearRange(value.to_string()))?;
        let start = captures["start"]
            .parse()
            .map_err(|_| GeobinError::InvalidYearRange(value.to_string()))?;
        let end = captures["end"]
            .parse()
            .map_err(|_| GeobinError::InvalidYearRange(value.to_string()))?;
        Self::new(start, end).map_err(|_| GeobinError::InvalidYearRange(value.to_string()))
    }
}

/// Survey region code such as `EBS` (eastern Bering Sea) or `GOA` (Gulf of Alaska).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SurveyCode(String);

impl SurveyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurveyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SurveyCode {
    type Err = GeobinError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= 8
            && normalized.chars().all(|ch| ch.is_ascii_alphabetic());
        if !is_valid {
            return Err(GeobinError::InvalidSurvey(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for SurveyCode {
    type Error = GeobinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SurveyCode> for String {
    fn from(value: SurveyCode) -> Self {
        value.0
    }
}

pub fn default_surveys() -> Vec<SurveyCode> {
    ["NBS", "EBS", "BSS", "GOA"]
        .into_iter()
        .map(|code| SurveyCode(code.to_string()))
        .collect()
}

/// One (survey, year) fetch/reduce/persist cycle; the atomicity boundary for writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UnitOfWork {
    pub survey: SurveyCode,
    pub year: i32,
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.survey, self.year)
    }
}

/// A single catch observation as reported upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub latitude: f64,
    pub longitude: f64,
    pub survey: String,
    pub year: f64,
    pub scientific_name: String,
    pub common_name: String,
    pub surface_temperature_c: Option<f64>,
    pub bottom_temperature_c: Option<f64>,
    pub weight_kg: Option<f64>,
    pub count: Option<f64>,
    pub area_swept_ha: f64,
}

impl RawObservation {
    pub fn is_zero_catch(&self) -> bool {
        self.weight_kg.unwrap_or(0.0) == 0.0 && self.count.unwrap_or(0.0) == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AggregateKey {
    pub year: i32,
    pub survey: String,
    pub species: String,
    pub geohash: String,
}

/// Aggregate-ready record; one row of the output table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplifiedRecord {
    pub year: i32,
    pub survey: String,
    pub species: String,
    pub common_name: String,
    pub geohash: String,
    pub surface_temperature: f64,
    pub bottom_temperature: f64,
    pub weight: f64,
    pub count: f64,
    pub area_swept: f64,
    pub num_aggregated: u32,
}

impl SimplifiedRecord {
    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            year: self.year,
            survey: self.survey.clone(),
            species: self.species.clone(),
            geohash: self.geohash.clone(),
        }
    }

    pub fn has_key(&self, key: &AggregateKey) -> bool {
        self.year == key.year
            && self.survey == key.survey
            && self.species == key.species
            && self.geohash == key.geohash
    }
}
