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

use crate::client::{ClientError, OpenWeatherClient, ProviderObservation};
use crate::metrics::ObservationMetrics;
use crate::model::{
    ChartData, ListFilter, Observation, ObservationDraft, ObservationPatch, StatsReport, SOURCE_API,
};
use crate::store::{ObservationStore, StoreError};
use std::error;
use std::fmt;

pub const DEFAULT_CITY: &str = "London";

/// Number of observations included in chart data.
pub const CHART_SIZE: u32 = 10;

#[derive(Debug)]
pub enum ServiceError {
    Store(StoreError),
    Client(ClientError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{}", e),
            Self::Client(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Client(e) => Some(e),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ClientError> for ServiceError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

/// Entry point for every operation on observations.
///
/// Holds no state of its own beyond its collaborators: the store, the provider
/// client and metrics.
#[derive(Debug)]
pub struct ObservationService {
    store: ObservationStore,
    client: OpenWeatherClient,
    metrics: ObservationMetrics,
    default_city: String,
}

impl ObservationService {
    pub fn new<S: Into<String>>(
        store: ObservationStore,
        client: OpenWeatherClient,
        metrics: ObservationMetrics,
        default_city: S,
    ) -> Self {
        ObservationService {
            store,
            client,
            metrics,
            default_city: default_city.into(),
        }
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Observation>, ServiceError> {
        Ok(self.store.list(filter)?)
    }

    pub fn get(&self, id: i64) -> Result<Observation, ServiceError> {
        Ok(self.store.get(id)?)
    }

    pub fn create(&self, draft: ObservationDraft) -> Result<Observation, ServiceError> {
        let obs = self.store.create(draft)?;
        self.metrics.created(&obs.source);
        Ok(obs)
    }

    pub fn update(&self, id: i64, patch: ObservationPatch) -> Result<Observation, ServiceError> {
        Ok(self.store.update(id, patch)?)
    }

    pub fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.store.delete(id)?;
        self.metrics.deleted();
        Ok(())
    }

    /// Fetch current conditions for `city` (or the default city) from the provider
    /// and store them as a new observation.
    ///
    /// The provider call and the write are not a single transaction. If the write
    /// fails the error is returned and nothing is stored.
    pub async fn fetch_and_store(&self, city: Option<&str>) -> Result<Observation, ServiceError> {
        let city = city
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.default_city.as_str());

        let current = match self.client.fetch_current(city).await {
            Ok(c) => {
                self.metrics.provider_success();
                c
            }
            Err(ClientError::Configuration) => {
                // Nothing was sent so this isn't counted as a provider request
                return Err(ClientError::Configuration.into());
            }
            Err(e) => {
                self.metrics.provider_error();
                tracing::warn!(message = "failed to fetch current weather", city = %city, error = %e);
                return Err(e.into());
            }
        };

        let obs = self.create(provider_draft(current))?;
        tracing::info!(message = "stored observation from provider", id = obs.id, location = %obs.location);
        Ok(obs)
    }

    /// Aggregate statistics plus chart series built from the most recent observations.
    ///
    /// Chart series are in the same order as the default listing, newest first.
    pub fn compute_stats(&self) -> Result<StatsReport, ServiceError> {
        let stats = self.store.aggregate()?;
        let recent = self.store.recent(CHART_SIZE)?;

        Ok(StatsReport {
            stats,
            chart_data: ChartData::from_observations(&recent),
        })
    }
}

fn provider_draft(current: ProviderObservation) -> ObservationDraft {
    let mut draft = ObservationDraft::new(current.location, current.temperature, current.humidity);
    draft.pressure = current.pressure;
    draft.description = current.description;
    draft.wind_speed = Some(current.wind_speed);
    draft.wind_direction = Some(current.wind_direction);
    draft.source = SOURCE_API.to_owned();
    draft
}
