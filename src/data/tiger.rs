//! Census TIGERweb ArcGIS REST source.
//!
//! Counties are queried state-by-state with a `STATE = 'xx'` filter so a
//! region selection pulls ~100-1,500 counties instead of the nationwide
//! 3,000+. Geometry precision is kept low for counties (display-scale data)
//! and higher for the state outlines.

use std::time::Duration;

use crate::data::{parse_counties, parse_states, CountyRecord, GeometrySource, StateRecord};
use crate::error::{MapError, Result};

pub const COUNTIES_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/State_County/MapServer/55/query";
pub const STATES_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/State_County/MapServer/54/query";

/// Called after each per-state county query: (states done, states total)
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

pub struct TigerSource {
    client: reqwest::blocking::Client,
    progress: Option<ProgressFn>,
}

impl TigerSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MapError::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            progress: None,
        })
    }

    /// Report per-state progress to the UI while a region loads
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn query(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .map_err(|e| MapError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| MapError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|e| MapError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl GeometrySource for TigerSource {
    fn fetch_counties(&self, state_fips: &[&str]) -> Result<Vec<CountyRecord>> {
        let total = state_fips.len();
        let mut counties = Vec::new();
        let mut failed = 0usize;

        for (done, fips) in state_fips.iter().enumerate() {
            let where_clause = format!("STATE = '{fips}'");
            let result = self
                .query(
                    COUNTIES_URL,
                    &[
                        ("where", where_clause.as_str()),
                        ("outFields", "NAME,GEOID,STATE,POP100"),
                        ("returnGeometry", "true"),
                        ("geometryPrecision", "2"),
                        ("f", "json"),
                    ],
                )
                .and_then(|mut payload| parse_counties(&mut payload));

            match result {
                Ok(batch) => {
                    tracing::debug!(state = *fips, count = batch.len(), "counties loaded");
                    counties.extend(batch);
                }
                // One bad state does not sink the region; the caller sees a
                // partial (still valid) county set
                Err(e) => {
                    tracing::warn!(state = *fips, error = %e, "state query failed");
                    failed += 1;
                }
            }

            if let Some(progress) = &self.progress {
                progress(done + 1, total);
            }
        }

        if counties.is_empty() && failed > 0 {
            return Err(MapError::Fetch(format!(
                "all {failed} state queries failed"
            )));
        }
        Ok(counties)
    }

    fn fetch_states(&self) -> Result<Vec<StateRecord>> {
        let mut payload = self.query(
            STATES_URL,
            &[
                ("where", "1=1"),
                ("outFields", "NAME,STATE"),
                ("returnGeometry", "true"),
                ("geometryPrecision", "6"),
                ("f", "json"),
            ],
        )?;
        parse_states(&mut payload)
    }
}
