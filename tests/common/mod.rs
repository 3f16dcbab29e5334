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

#![allow(dead_code)]

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weather_api::client::{OpenWeatherClient, ProviderConfig};
use weather_api::metrics::ObservationMetrics;
use weather_api::service::ObservationService;
use weather_api::store::ObservationStore;

pub const API_KEY: &str = "test-key";

/// Stand-in for the OpenWeatherMap API that answers every request with a canned response.
pub struct MockProvider {
    pub base_url: Url,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockProvider {
    pub async fn start(status: StatusCode, body: Value) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        let app = Router::new().route(
            "/data/2.5/weather",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = seen.clone();
                let body = body.clone();
                async move {
                    seen.lock().unwrap().push(params);
                    (status, Json(body))
                }
            }),
        );

        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
        let base_url = Url::parse(&format!("http://{}/", server.local_addr())).unwrap();
        tokio::spawn(server);

        MockProvider { base_url, requests }
    }

    /// Query parameters of each request received so far.
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn paris_response() -> Value {
    serde_json::json!({
        "name": "Paris",
        "main": {"temp": 15, "humidity": 60, "pressure": 1012},
        "weather": [{"description": "clear"}],
        "wind": {"speed": 3}
    })
}

pub fn provider_client(base_url: &Url, api_key: Option<&str>) -> OpenWeatherClient {
    let http = Client::builder().timeout(Duration::from_secs(10)).build().unwrap();
    OpenWeatherClient::new(
        http,
        ProviderConfig {
            api_key: api_key.map(str::to_owned),
            base_url: base_url.clone(),
        },
    )
    .unwrap()
}

/// Service backed by an in-memory store, also returning the store and registry for inspection.
pub fn service(base_url: &Url, api_key: Option<&str>) -> (ObservationService, ObservationStore, Registry) {
    let store = ObservationStore::open_in_memory().unwrap();
    let mut registry = Registry::default();
    let metrics = ObservationMetrics::new(&mut registry);
    let service = ObservationService::new(store.clone(), provider_client(base_url, api_key), metrics, "London");

    (service, store, registry)
}
