use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeobinError {
    #[error("Expected geohash size to be an integer between 1 - 12, got {0}.")]
    #[diagnostic(code(gap_geobin::precision))]
    InvalidPrecision(String),

    #[error("Year range should be like 2000-2023, got {0}.")]
    #[diagnostic(code(gap_geobin::year_range))]
    InvalidYearRange(String),

    #[error("invalid survey code: {0}")]
    InvalidSurvey(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("upstream request failed: {0}")]
    UpstreamHttp(String),

    #[error("upstream returned status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("malformed upstream record: {0}")]
    UpstreamMalformed(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("no aggregate table in {0}")]
    #[diagnostic(help("run `gap-geobin create-table` or `download` against this path first"))]
    MissingTable(String),

    #[error("{failed} of {total} survey-years failed to download")]
    #[diagnostic(help("re-run the listed survey-years once the upstream service recovers"))]
    IncompleteRun { failed: usize, total: usize },
}

impl GeobinError {
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            GeobinError::UpstreamHttp(_)
                | GeobinError::UpstreamStatus { .. }
                | GeobinError::UpstreamMalformed(_)
        )
    }
}

impl From<rusqlite::Error> for GeobinError {
    fn from(err: rusqlite::Error) -> Self {
        GeobinError::Store(err.to_string())
    }
}
