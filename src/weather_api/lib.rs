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

//! REST backend for storing and querying weather observations
//!
//! ## Features
//!
//! `weather_api` stores weather observations in a local SQLite database and exposes them
//! over a small JSON API. Observations can be entered by hand or fetched from the
//! [OpenWeatherMap] current weather API for a particular city.
//!
//! * `GET /observations/` - List observations, most recent first. Accepts optional
//!   `location`, `source`, and `limit` query parameters.
//! * `POST /observations/` - Create an observation.
//! * `GET|PUT|PATCH|DELETE /observations/$ID/` - Retrieve, update, or delete an observation.
//! * `POST /observations/fetch_from_api/` - Fetch current conditions for `{"city": "..."}`
//!   (London by default) and store them.
//! * `GET /observations/stats/` - Temperature and humidity statistics plus chart data for
//!   the ten most recent observations.
//! * `GET /metrics` - Prometheus metrics.
//!
//! [OpenWeatherMap]: https://openweathermap.org/current
//!
//! ## Build
//!
//! `weather_api` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### API key
//!
//! Fetching observations from OpenWeatherMap requires an API key. The key can be given
//! with the `--api-key` flag or the `OPENWEATHER_API_KEY` environment variable. Without a
//! key, everything except `fetch_from_api` works and that endpoint returns an error
//! explaining how to configure one.
//!
//! ### Run
//!
//! ```text
//! OPENWEATHER_API_KEY=... ./weather_api --database /var/lib/weather_api/weather.db
//! ```
//!
//! By default the API is served on port `8000` on all interfaces. Use `--bind` to change this.
//! A browser frontend served from another origin can be allowed with `--allow-origin`.
//!
//! ```text
//! curl -sS -X POST -H 'Content-Type: application/json' \
//!     -d '{"city": "Paris"}' http://localhost:8000/observations/fetch_from_api/
//! curl -sS http://localhost:8000/observations/stats/
//! ```
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod model;
pub mod schema;
pub mod service;
pub mod store;
