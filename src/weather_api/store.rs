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

//! SQLite backed storage for weather observations.

use crate::model::{Aggregate, ListFilter, Observation, ObservationDraft, ObservationPatch, ValidationError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS weather_observations (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    location          TEXT NOT NULL,
    temperature       REAL NOT NULL,
    humidity          REAL NOT NULL,
    pressure          REAL,
    description       TEXT NOT NULL DEFAULT 'Clear sky',
    wind_speed        REAL,
    wind_direction    INTEGER,
    observation_time  TEXT NOT NULL,
    source            TEXT NOT NULL DEFAULT 'manual'
);
CREATE INDEX IF NOT EXISTS idx_observations_time ON weather_observations(observation_time);";

const COLUMNS: &str = "id, location, temperature, humidity, pressure, description, \
                       wind_speed, wind_direction, observation_time, source";

const ORDERING: &str = "ORDER BY observation_time DESC, id DESC";

#[derive(Debug)]
pub enum StoreError {
    NotFound(i64),
    Invalid(ValidationError),
    Sqlite(rusqlite::Error),
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "no observation with id {}", id),
            Self::Invalid(e) => write!(f, "invalid observation: {}", e),
            Self::Sqlite(e) => write!(f, "sqlite error: {}", e),
            Self::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            Self::Sqlite(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        Self::Invalid(e)
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Durable collection of observations in a single SQLite table.
///
/// Cloning the store is cheap and every clone shares the same connection. Writes
/// are serialized by a mutex around the connection so each one is atomic.
#[derive(Debug, Clone)]
pub struct ObservationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ObservationStore {
    /// Open (or create) the observation database at the given path.
    ///
    /// Creates the parent directory and the table if they don't exist and enables
    /// WAL journal mode.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a private database that lives only as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist a new observation, assigning its ID and observation time.
    pub fn create(&self, draft: ObservationDraft) -> Result<Observation, StoreError> {
        draft.validate()?;

        // Truncate to what we store so the returned record matches later reads.
        let observation_time = Utc::now().trunc_subsecs(6);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO weather_observations (location, temperature, humidity, pressure, description, \
             wind_speed, wind_direction, observation_time, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                draft.location,
                draft.temperature,
                draft.humidity,
                draft.pressure,
                draft.description,
                draft.wind_speed,
                draft.wind_direction,
                format_time(&observation_time),
                draft.source,
            ],
        )?;

        let id = conn.last_insert_rowid();
        tracing::debug!(message = "created observation", id = id, location = %draft.location);

        Ok(Observation {
            id,
            location: draft.location,
            temperature: draft.temperature,
            humidity: draft.humidity,
            pressure: draft.pressure,
            description: draft.description,
            wind_speed: draft.wind_speed,
            wind_direction: draft.wind_direction,
            observation_time,
            source: draft.source,
        })
    }

    pub fn get(&self, id: i64) -> Result<Observation, StoreError> {
        Self::find(&self.lock(), id)
    }

    /// Observations matching the filter, most recent first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Observation>, StoreError> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(location) = &filter.location {
            clauses.push("location = ? COLLATE NOCASE");
            args.push(Value::Text(location.clone()));
        }
        if let Some(source) = &filter.source {
            clauses.push("source = ?");
            args.push(Value::Text(source.clone()));
        }

        let mut sql = format!("SELECT {} FROM weather_observations", COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push(' ');
        sql.push_str(ORDERING);
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), observation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The `n` most recent observations, most recent first.
    pub fn recent(&self, n: u32) -> Result<Vec<Observation>, StoreError> {
        self.list(&ListFilter {
            limit: Some(n),
            ..Default::default()
        })
    }

    /// Apply the changes in `patch` to an existing observation.
    ///
    /// The observation time of the record is never changed.
    pub fn update(&self, id: i64, patch: ObservationPatch) -> Result<Observation, StoreError> {
        let conn = self.lock();
        let existing = Self::find(&conn, id)?;
        let mut draft = existing.to_draft();
        patch.apply(&mut draft);
        draft.validate()?;

        conn.execute(
            "UPDATE weather_observations SET location = ?1, temperature = ?2, humidity = ?3, \
             pressure = ?4, description = ?5, wind_speed = ?6, wind_direction = ?7, source = ?8 \
             WHERE id = ?9",
            params![
                draft.location,
                draft.temperature,
                draft.humidity,
                draft.pressure,
                draft.description,
                draft.wind_speed,
                draft.wind_direction,
                draft.source,
                id,
            ],
        )?;

        tracing::debug!(message = "updated observation", id = id);
        Ok(Observation {
            id,
            location: draft.location,
            temperature: draft.temperature,
            humidity: draft.humidity,
            pressure: draft.pressure,
            description: draft.description,
            wind_speed: draft.wind_speed,
            wind_direction: draft.wind_direction,
            observation_time: existing.observation_time,
            source: draft.source,
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self
            .lock()
            .execute("DELETE FROM weather_observations WHERE id = ?1", params![id])?;

        if deleted == 0 {
            Err(StoreError::NotFound(id))
        } else {
            tracing::debug!(message = "deleted observation", id = id);
            Ok(())
        }
    }

    /// Temperature and humidity statistics over every observation.
    pub fn aggregate(&self) -> Result<Aggregate, StoreError> {
        let conn = self.lock();
        let aggregate = conn.query_row(
            "SELECT AVG(temperature), MAX(temperature), MIN(temperature), AVG(humidity), COUNT(id) \
             FROM weather_observations",
            [],
            |row| {
                Ok(Aggregate {
                    avg_temp: row.get(0)?,
                    max_temp: row.get(1)?,
                    min_temp: row.get(2)?,
                    avg_humidity: row.get(3)?,
                    total_records: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;

        Ok(aggregate)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM weather_observations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn find(conn: &Connection, id: i64) -> Result<Observation, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM weather_observations WHERE id = ?1", COLUMNS),
            params![id],
            observation_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic in SQLite so a poisoned lock still guards a usable connection.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed width RFC 3339 so that ordering by the text column is chronological.
fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let raw_time: String = row.get(8)?;
    let observation_time = DateTime::parse_from_rfc3339(&raw_time)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Observation {
        id: row.get(0)?,
        location: row.get(1)?,
        temperature: row.get(2)?,
        humidity: row.get(3)?,
        pressure: row.get(4)?,
        description: row.get(5)?,
        wind_speed: row.get(6)?,
        wind_direction: row.get(7)?,
        observation_time,
        source: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> ObservationStore {
        ObservationStore::open_in_memory().unwrap()
    }

    fn draft(location: &str, temperature: f64) -> ObservationDraft {
        ObservationDraft::new(location, temperature, 50.0)
    }

    #[test]
    fn open_creates_table() {
        let dir = tempdir().unwrap();
        let store = ObservationStore::open(&dir.path().join("nested").join("weather.db")).unwrap();
        assert_eq!(0, store.count().unwrap());
    }

    #[test]
    fn open_twice_keeps_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weather.db");
        {
            let store = ObservationStore::open(&path).unwrap();
            store.create(draft("Berlin", 12.0)).unwrap();
        }

        let store = ObservationStore::open(&path).unwrap();
        let all = store.list(&ListFilter::default()).unwrap();
        assert_eq!(1, all.len());
        assert_eq!("Berlin", all[0].location);
    }

    #[test]
    fn create_assigns_id_and_time() {
        let store = store();
        let start = Utc::now().trunc_subsecs(6);

        let created = store.create(draft("Berlin", 12.0)).unwrap();
        assert!(created.id > 0);
        assert!(created.observation_time >= start);
        assert_eq!("manual", created.source);
        assert_eq!("Clear sky", created.description);

        let fetched = store.get(created.id).unwrap();
        assert_eq!(created, fetched);
    }

    #[test]
    fn create_rejects_invalid_draft() {
        let store = store();
        let res = store.create(draft("", 12.0));

        assert!(matches!(res, Err(StoreError::Invalid(_))));
        assert_eq!(0, store.count().unwrap());
    }

    #[test]
    fn get_missing() {
        let store = store();
        assert!(matches!(store.get(42), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn list_most_recent_first() {
        let store = store();
        for i in 0..5 {
            store.create(draft("Berlin", i as f64)).unwrap();
        }

        let all = store.list(&ListFilter::default()).unwrap();
        assert_eq!(5, all.len());
        for pair in all.windows(2) {
            assert!(pair[0].observation_time >= pair[1].observation_time);
            assert!(pair[0].id > pair[1].id);
        }
    }

    #[test]
    fn list_filters() {
        let store = store();
        store.create(draft("Berlin", 1.0)).unwrap();
        store.create(draft("berlin", 2.0)).unwrap();
        store.create(draft("Madrid", 3.0)).unwrap();
        let mut api = draft("Berlin", 4.0);
        api.source = "api".to_owned();
        store.create(api).unwrap();

        let berlin = store
            .list(&ListFilter {
                location: Some("BERLIN".to_owned()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(3, berlin.len());

        let from_api = store
            .list(&ListFilter {
                location: Some("berlin".to_owned()),
                source: Some("api".to_owned()),
                limit: None,
            })
            .unwrap();
        assert_eq!(1, from_api.len());
        assert_eq!(4.0, from_api[0].temperature);
    }

    #[test]
    fn recent_limits() {
        let store = store();
        for i in 0..12 {
            store.create(draft("Berlin", i as f64)).unwrap();
        }

        let recent = store.recent(10).unwrap();
        assert_eq!(10, recent.len());
        assert_eq!(11.0, recent[0].temperature);
        assert_eq!(2.0, recent[9].temperature);
    }

    #[test]
    fn update_keeps_observation_time() {
        let store = store();
        let created = store.create(draft("Berlin", 12.0)).unwrap();

        let updated = store
            .update(
                created.id,
                ObservationPatch {
                    temperature: Some(14.5),
                    wind_speed: Some(Some(3.2)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(14.5, updated.temperature);
        assert_eq!(Some(3.2), updated.wind_speed);
        assert_eq!("Berlin", updated.location);
        assert_eq!(created.observation_time, updated.observation_time);
        assert_eq!(updated, store.get(created.id).unwrap());
    }

    #[test]
    fn update_invalid_leaves_record() {
        let store = store();
        let created = store.create(draft("Berlin", 12.0)).unwrap();

        let res = store.update(
            created.id,
            ObservationPatch {
                location: Some(String::new()),
                ..Default::default()
            },
        );

        assert!(matches!(res, Err(StoreError::Invalid(_))));
        assert_eq!(created, store.get(created.id).unwrap());
    }

    #[test]
    fn update_missing() {
        let store = store();
        let res = store.update(7, ObservationPatch::default());
        assert!(matches!(res, Err(StoreError::NotFound(7))));
    }

    #[test]
    fn delete_existing_and_missing() {
        let store = store();
        let keep = store.create(draft("Berlin", 12.0)).unwrap();
        let gone = store.create(draft("Paris", 13.0)).unwrap();

        store.delete(gone.id).unwrap();
        assert!(matches!(store.delete(gone.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(999), Err(StoreError::NotFound(999))));

        let all = store.list(&ListFilter::default()).unwrap();
        assert_eq!(vec![keep], all);
    }

    #[test]
    fn aggregate_empty() {
        let store = store();
        let agg = store.aggregate().unwrap();

        assert_eq!(0, agg.total_records);
        assert_eq!(None, agg.avg_temp);
        assert_eq!(None, agg.max_temp);
        assert_eq!(None, agg.min_temp);
        assert_eq!(None, agg.avg_humidity);
    }

    #[test]
    fn aggregate_values() {
        let store = store();
        for (temp, humidity) in [(10.0, 40.0), (20.0, 50.0), (30.0, 90.0)] {
            store.create(ObservationDraft::new("Berlin", temp, humidity)).unwrap();
        }

        let agg = store.aggregate().unwrap();
        assert_eq!(3, agg.total_records);
        assert_eq!(Some(20.0), agg.avg_temp);
        assert_eq!(Some(30.0), agg.max_temp);
        assert_eq!(Some(10.0), agg.min_temp);
        assert_eq!(Some(60.0), agg.avg_humidity);
    }
}
