// weather_api - REST backend for storing and querying weather observations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error;
use std::fmt;

pub const MAX_LOCATION_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 255;
pub const MAX_SOURCE_LEN: usize = 50;

pub const DEFAULT_DESCRIPTION: &str = "Clear sky";
pub const SOURCE_MANUAL: &str = "manual";
pub const SOURCE_API: &str = "api";

/// A single weather reading, either entered by hand or fetched from the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub location: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub description: String,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<i32>,
    pub observation_time: DateTime<Utc>,
    pub source: String,
}

impl Observation {
    /// Client-settable fields of this record, used as the base for updates.
    pub fn to_draft(&self) -> ObservationDraft {
        ObservationDraft {
            location: self.location.clone(),
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            description: self.description.clone(),
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            source: self.source.clone(),
        }
    }
}

/// Fields of an observation that haven't been persisted yet.
///
/// The `id` and `observation_time` of a record are assigned by the store and so
/// have no place here.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDraft {
    pub location: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub description: String,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<i32>,
    pub source: String,
}

impl ObservationDraft {
    /// Create a draft with the required fields set and defaults for everything else.
    pub fn new<S: Into<String>>(location: S, temperature: f64, humidity: f64) -> Self {
        ObservationDraft {
            location: location.into(),
            temperature,
            humidity,
            pressure: None,
            description: DEFAULT_DESCRIPTION.to_owned(),
            wind_speed: None,
            wind_direction: None,
            source: SOURCE_MANUAL.to_owned(),
        }
    }

    /// Check the constraints that the type system doesn't: blank and overlong text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        check_blank(&mut errors, "location", &self.location);
        check_blank(&mut errors, "description", &self.description);
        check_blank(&mut errors, "source", &self.source);

        check_length(&mut errors, "location", &self.location, MAX_LOCATION_LEN);
        check_length(&mut errors, "description", &self.description, MAX_DESCRIPTION_LEN);
        check_length(&mut errors, "source", &self.source, MAX_SOURCE_LEN);

        errors.into_result()
    }
}

fn check_blank(errors: &mut ValidationError, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, MSG_BLANK);
    }
}

fn check_length(errors: &mut ValidationError, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {} characters.", max));
    }
}

/// Set of changes to apply to an observation.
///
/// `None` means "leave the field alone". Nullable fields use a nested `Option` so
/// that an explicit `null` can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationPatch {
    pub location: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<Option<f64>>,
    pub description: Option<String>,
    pub wind_speed: Option<Option<f64>>,
    pub wind_direction: Option<Option<i32>>,
    pub source: Option<String>,
}

impl ObservationPatch {
    /// Overwrite fields of `draft` with every field set in this patch.
    pub fn apply(self, draft: &mut ObservationDraft) {
        if let Some(v) = self.location {
            draft.location = v;
        }
        if let Some(v) = self.temperature {
            draft.temperature = v;
        }
        if let Some(v) = self.humidity {
            draft.humidity = v;
        }
        if let Some(v) = self.pressure {
            draft.pressure = v;
        }
        if let Some(v) = self.description {
            draft.description = v;
        }
        if let Some(v) = self.wind_speed {
            draft.wind_speed = v;
        }
        if let Some(v) = self.wind_direction {
            draft.wind_direction = v;
        }
        if let Some(v) = self.source {
            draft.source = v;
        }
    }

    /// Build a new draft from this patch, applying defaults to optional fields.
    ///
    /// Fails with an error for each required field that isn't set.
    pub fn into_draft(self) -> Result<ObservationDraft, ValidationError> {
        let mut errors = ValidationError::default();
        for field in self.missing_required() {
            errors.add(field, MSG_REQUIRED);
        }

        match (self.location.clone(), self.temperature, self.humidity) {
            (Some(location), Some(temperature), Some(humidity)) => {
                let mut draft = ObservationDraft::new(location, temperature, humidity);
                self.apply(&mut draft);
                Ok(draft)
            }
            _ => Err(errors),
        }
    }

    /// Names of required fields that this patch doesn't set.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.location.is_none() {
            missing.push("location");
        }
        if self.temperature.is_none() {
            missing.push("temperature");
        }
        if self.humidity.is_none() {
            missing.push("humidity");
        }

        missing
    }
}

pub(crate) const MSG_REQUIRED: &str = "This field is required.";
pub(crate) const MSG_BLANK: &str = "This field may not be blank.";

/// Field-level problems with client input, keyed by field name.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn add<F: Into<String>, M: Into<String>>(&mut self, field: F, message: M) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for m in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, m)?;
                first = false;
            }
        }

        Ok(())
    }
}

impl error::Error for ValidationError {}

/// Optional restrictions on which observations get listed.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Case-insensitive exact match on location
    pub location: Option<String>,
    /// Exact match on source, e.g. "manual" or "api"
    pub source: Option<String>,
    pub limit: Option<u32>,
}

/// Aggregates over every stored observation.
///
/// All statistics except `total_records` are `None` when there are no records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub avg_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub total_records: u64,
}

/// Parallel series of the most recent observations, newest first.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub temperatures: Vec<f64>,
    pub humidities: Vec<f64>,
}

impl ChartData {
    pub fn from_observations(observations: &[Observation]) -> Self {
        ChartData {
            labels: observations
                .iter()
                .map(|o| o.observation_time.date_naive().to_string())
                .collect(),
            temperatures: observations.iter().map(|o| o.temperature).collect(),
            humidities: observations.iter().map(|o| o.humidity).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    pub stats: Aggregate,
    pub chart_data: ChartData,
}
