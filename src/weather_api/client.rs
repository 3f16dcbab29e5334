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

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

/// Value shipped in sample `.env` files, treated the same as no key at all.
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

#[derive(Debug)]
pub enum ClientError {
    Configuration,
    InvalidUrl(Url),
    Api(StatusCode, String),
    Transport(reqwest::Error),
    Malformed(String),
}

impl ClientError {
    /// Status code returned by the provider, if it answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api(status, _) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(
                f,
                "API key not configured. Please set OPENWEATHER_API_KEY or pass --api-key"
            ),
            Self::InvalidUrl(url) => write!(f, "invalid provider base URL {}", url),
            Self::Api(_, message) => write!(f, "{}", message),
            Self::Transport(e) => write!(f, "unable to reach weather provider: {}", e),
            Self::Malformed(e) => write!(f, "unexpected response from weather provider: {}", e),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Settings for talking to the OpenWeatherMap API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
}

#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    api_key: Option<String>,
    weather_url: Url,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = concat!("weather_api/", env!("CARGO_PKG_VERSION"));
    const JSON_RESPONSE: &'static str = "application/json";

    /// Create a client that makes requests with `client`, which should already
    /// have a timeout configured.
    ///
    /// The API key isn't checked here. A missing key is reported by each call to
    /// `fetch_current()` so that the rest of the application can run without one.
    pub fn new(client: Client, config: ProviderConfig) -> Result<Self, ClientError> {
        let mut weather_url = config.base_url.clone();
        weather_url
            .path_segments_mut()
            .map(|mut p| {
                p.pop_if_empty().extend(&["data", "2.5", "weather"]);
            })
            .map_err(|_| ClientError::InvalidUrl(config.base_url))?;

        Ok(OpenWeatherClient {
            client,
            api_key: config.api_key,
            weather_url,
        })
    }

    /// Fetch current conditions for `city` in metric units.
    ///
    /// Only a single request is made, failures are not retried.
    pub async fn fetch_current(&self, city: &str) -> Result<ProviderObservation, ClientError> {
        let api_key = self.api_key()?;
        tracing::debug!(message = "making current weather request", url = %self.weather_url, city = %city);

        let res = self
            .client
            .get(self.weather_url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = res.status();
        let body = res.bytes().await.map_err(ClientError::Transport)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "API error".to_owned());

            return Err(ClientError::Api(status, message));
        }

        let current = serde_json::from_slice::<CurrentWeather>(&body)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        ProviderObservation::try_from(current)
    }

    /// True if an API key that could be valid has been configured.
    pub fn is_configured(&self) -> bool {
        self.api_key().is_ok()
    }

    fn api_key(&self) -> Result<&str, ClientError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() && k != PLACEHOLDER_API_KEY => Ok(k),
            _ => Err(ClientError::Configuration),
        }
    }
}

/// Current conditions from the provider, normalized to the fields we store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderObservation {
    pub location: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub description: String,
    pub wind_speed: f64,
    pub wind_direction: i32,
}

impl TryFrom<CurrentWeather> for ProviderObservation {
    type Error = ClientError;

    fn try_from(current: CurrentWeather) -> Result<Self, Self::Error> {
        let description = current
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .ok_or_else(|| ClientError::Malformed("no weather conditions in response".to_owned()))?;

        Ok(ProviderObservation {
            location: current.name,
            temperature: current.main.temp,
            humidity: current.main.humidity,
            pressure: current.main.pressure,
            description,
            wind_speed: current.wind.speed,
            wind_direction: current.wind.deg.map(|d| d.round() as i32).unwrap_or(0),
        })
    }
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CurrentWeather {
    pub name: String,
    pub main: MainConditions,
    pub weather: Vec<Condition>,
    pub wind: Wind,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MainConditions {
    pub temp: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Condition {
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Wind {
    pub speed: f64,
    pub deg: Option<f64>,
}
