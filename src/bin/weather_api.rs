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

use axum::http::HeaderValue;
use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weather_api::client::{OpenWeatherClient, ProviderConfig};
use weather_api::http::RequestContext;
use weather_api::metrics::ObservationMetrics;
use weather_api::service::{ObservationService, DEFAULT_CITY};
use weather_api::store::ObservationStore;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);
const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
const DEFAULT_API_URL: &str = "https://api.openweathermap.org/";
const DEFAULT_DATABASE: &str = "weather.db";

#[derive(Debug, Parser)]
#[clap(name = "weather_api", version = clap::crate_version!())]
struct WeatherApiApplication {
    /// OpenWeatherMap API key. Fetching observations from the API is disabled without one.
    #[clap(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL for the OpenWeatherMap API
    #[clap(long, env = "OPENWEATHER_API_URL", default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Timeout for fetching current weather from the OpenWeatherMap API, in milliseconds.
    #[clap(long, env = "WEATHER_API_TIMEOUT_MILLIS", default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// City to fetch current weather for when a request doesn't name one
    #[clap(long, env = "WEATHER_API_DEFAULT_CITY", default_value_t = DEFAULT_CITY.into())]
    default_city: String,

    /// Path to the SQLite database observations are stored in. Created if it doesn't exist.
    #[clap(long, env = "WEATHER_API_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, env = "WEATHER_API_LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Origin allowed to make cross-origin requests to the API, e.g. a browser frontend.
    /// May be given multiple times or as a comma separated list. CORS is disabled by default.
    #[clap(long, env = "WEATHER_API_ALLOW_ORIGIN", value_delimiter = ',')]
    allow_origin: Vec<HeaderValue>,

    /// Address to bind to.
    #[clap(long, env = "WEATHER_API_BIND", default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherApiApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = OpenWeatherClient::new(
        http_client,
        ProviderConfig {
            api_key: opts.api_key.clone(),
            base_url: opts.api_url.clone(),
        },
    )
    .unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize weather provider client", error = %e);
        process::exit(1)
    });

    if !client.is_configured() {
        tracing::warn!(
            message = "no OpenWeatherMap API key configured, fetching observations is disabled",
            api_url = %opts.api_url,
        );
    }

    let store = ObservationStore::open(&opts.database).unwrap_or_else(|e| {
        tracing::error!(message = "unable to open observation database", path = %opts.database.display(), error = %e);
        process::exit(1)
    });

    let mut registry = Registry::default();
    let metrics = ObservationMetrics::new(&mut registry);
    let service = ObservationService::new(store, client, metrics, opts.default_city.clone());
    let context = Arc::new(RequestContext::new(service, registry));

    let mut app = weather_api::http::router(context);
    if !opts.allow_origin.is_empty() {
        tracing::info!(message = "allowing cross-origin requests", origins = ?opts.allow_origin);
        app = app.layer(weather_api::http::cors_layer(opts.allow_origin.clone()));
    }

    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(
        message = "server started",
        address = %opts.bind,
        database = %opts.database.display(),
        api_url = %opts.api_url,
    );

    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
