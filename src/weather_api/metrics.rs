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

use crate::model::{SOURCE_API, SOURCE_MANUAL};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_ERROR: &str = "error";
const SOURCE_OTHER: &str = "other";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SourceLabels {
    source: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: String,
}

/// Counters for changes to stored observations and calls to the weather provider.
///
/// All metrics are created and registered upon call to `ObservationMetrics::new()`. Metrics
/// all share the prefix "weather_api_".
#[derive(Debug, Clone, Default)]
pub struct ObservationMetrics {
    created: Family<SourceLabels, Counter>,
    deleted: Counter,
    provider_requests: Family<OutcomeLabels, Counter>,
}

impl ObservationMetrics {
    /// Create a new `ObservationMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "weather_api_observations_created",
            "Observations created, by source",
            metrics.created.clone(),
        );
        reg.register(
            "weather_api_observations_deleted",
            "Observations deleted",
            metrics.deleted.clone(),
        );
        reg.register(
            "weather_api_provider_requests",
            "Requests made to the weather provider, by outcome",
            metrics.provider_requests.clone(),
        );

        metrics
    }

    /// Count a new observation. Sources other than "manual" and "api" share the
    /// "other" label so clients can't create arbitrary series.
    pub fn created(&self, source: &str) {
        let source = match source {
            SOURCE_MANUAL | SOURCE_API => source,
            _ => SOURCE_OTHER,
        };

        self.created
            .get_or_create(&SourceLabels {
                source: source.to_owned(),
            })
            .inc();
    }

    pub fn deleted(&self) {
        self.deleted.inc();
    }

    pub fn provider_success(&self) {
        self.provider_request(OUTCOME_SUCCESS);
    }

    pub fn provider_error(&self) {
        self.provider_request(OUTCOME_ERROR);
    }

    fn provider_request(&self, outcome: &str) {
        self.provider_requests
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_owned(),
            })
            .inc();
    }
}
