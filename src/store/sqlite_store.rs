//! The reconciliation store: idempotent persistence of observations in SQLite.
//!
//! Per (location, timestamp) key a fact is either absent or recorded. The only
//! transition is absent → recorded, made by the first successful insert; every
//! later insert for the same key hits the unique constraint and is discarded.

use crate::config::CoordinatePolicy;
use crate::identity::normalize_location_name;
use crate::store::error::{FactKind, StoreError};
use crate::store::{FactWrite, ObservationSink, StoreReceipt};
use crate::types::location::{LatLon, LocationId};
use crate::types::observation::{AirQualityFact, Observation, WeatherFact};
use crate::utils::ensure_parent_dir_exists;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS locations (
        location_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        latitude    REAL NOT NULL,
        longitude   REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS weather_facts (
        location_id INTEGER NOT NULL REFERENCES locations(location_id),
        observed_at TEXT NOT NULL,
        temperature REAL,
        humidity    REAL,
        condition   TEXT,
        wind_speed  REAL,
        UNIQUE (location_id, observed_at)
    );

    CREATE TABLE IF NOT EXISTS air_quality_facts (
        location_id INTEGER NOT NULL REFERENCES locations(location_id),
        observed_at TEXT NOT NULL,
        aqi         INTEGER CHECK (aqi BETWEEN 1 AND 5),
        co          REAL CHECK (co >= 0),
        no          REAL CHECK (no >= 0),
        no2         REAL CHECK (no2 >= 0),
        o3          REAL CHECK (o3 >= 0),
        so2         REAL CHECK (so2 >= 0),
        pm2_5       REAL CHECK (pm2_5 >= 0),
        pm10        REAL CHECK (pm10 >= 0),
        UNIQUE (location_id, observed_at)
    );

    CREATE INDEX IF NOT EXISTS idx_weather_observed_at ON weather_facts(observed_at);
    CREATE INDEX IF NOT EXISTS idx_air_quality_observed_at ON air_quality_facts(observed_at);
";

/// A row of the `locations` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLocation {
    pub id: LocationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredWeatherFact {
    pub observed_at: String,
    pub fact: WeatherFact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAirQualityFact {
    pub observed_at: String,
    pub fact: AirQualityFact,
}

/// SQLite-backed reconciliation store.
///
/// [`SqliteStore::record_observation`] commits location resolution and both fact
/// upserts in one transaction, so an observation is stored all-or-nothing.
/// [`SqliteStore::resolve_location`] and [`SqliteStore::upsert_facts`] expose
/// the two phases separately; each commits on its own.
pub struct SqliteStore {
    conn: Connection,
    policy: CoordinatePolicy,
}

impl SqliteStore {
    /// Opens (or creates) the store behind `url` and bootstraps the schema.
    ///
    /// `url` is a filesystem path, optionally prefixed with `sqlite://` or
    /// `sqlite:`, or `:memory:`. Any other `<scheme>://` URL is rejected before
    /// touching the filesystem; only the scheme ends up in the error.
    pub fn open(
        url: &str,
        policy: CoordinatePolicy,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let target = match url.split_once("://") {
            Some(("sqlite", rest)) => rest,
            Some((scheme, _)) => {
                return Err(StoreError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                })
            }
            None => url.strip_prefix("sqlite:").unwrap_or(url),
        };

        let conn = if target == IN_MEMORY {
            Connection::open_in_memory().map_err(|e| StoreError::Open(url.to_string(), e))?
        } else {
            let path = Path::new(target);
            ensure_parent_dir_exists(path)
                .map_err(|e| StoreError::DirCreation(path.to_path_buf(), e))?;
            let conn =
                Connection::open(path).map_err(|e| StoreError::Open(url.to_string(), e))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Schema)?;
            conn
        };
        conn.busy_timeout(busy_timeout)
            .map_err(|e| StoreError::Open(url.to_string(), e))?;

        Self::with_connection(conn, policy)
    }

    pub fn open_in_memory(policy: CoordinatePolicy) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Open(IN_MEMORY.to_string(), e))?;
        Self::with_connection(conn, policy)
    }

    fn with_connection(conn: Connection, policy: CoordinatePolicy) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(StoreError::Schema)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::Schema)?;
        info!("Store ready (coordinate policy: {:?})", policy);
        Ok(Self { conn, policy })
    }

    /// Phase 1: finds the location by normalized name, creating it when absent.
    pub fn resolve_location(
        &mut self,
        name: &str,
        coords: LatLon,
    ) -> Result<LocationId, StoreError> {
        let name = normalize_location_name(name);
        let tx = self.conn.transaction().map_err(|source| StoreError::Transaction {
            location: name.clone(),
            source,
        })?;
        let id = resolve_location_in(&tx, self.policy, &name, coords)?;
        tx.commit().map_err(|source| StoreError::Transaction {
            location: name,
            source,
        })?;
        Ok(id)
    }

    /// Phase 2: inserts whichever facts the observation carries, first writer wins.
    pub fn upsert_facts(
        &mut self,
        location_id: LocationId,
        observation: &Observation,
    ) -> Result<(FactWrite, FactWrite), StoreError> {
        let location = &observation.key.location;
        let tx = self.conn.transaction().map_err(|source| StoreError::Transaction {
            location: location.clone(),
            source,
        })?;
        let writes = upsert_facts_in(&tx, location_id, observation)?;
        tx.commit().map_err(|source| StoreError::Transaction {
            location: location.clone(),
            source,
        })?;
        Ok(writes)
    }

    /// Both phases in a single transaction.
    pub fn record_observation(
        &mut self,
        observation: &Observation,
    ) -> Result<StoreReceipt, StoreError> {
        let name = normalize_location_name(&observation.key.location);
        let tx = self.conn.transaction().map_err(|source| StoreError::Transaction {
            location: name.clone(),
            source,
        })?;
        let location_id = resolve_location_in(&tx, self.policy, &name, observation.coords)?;
        let (weather, air_quality) = upsert_facts_in(&tx, location_id, observation)?;
        tx.commit().map_err(|source| StoreError::Transaction {
            location: name,
            source,
        })?;

        Ok(StoreReceipt {
            location_id: Some(location_id),
            weather,
            air_quality,
        })
    }

    pub fn find_location(&self, name: &str) -> Result<Option<StoredLocation>, StoreError> {
        let name = normalize_location_name(name);
        self.conn
            .query_row(
                "SELECT location_id, name, latitude, longitude FROM locations WHERE name = ?1",
                params![name],
                |row| {
                    Ok(StoredLocation {
                        id: LocationId(row.get(0)?),
                        name: row.get(1)?,
                        latitude: row.get(2)?,
                        longitude: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn locations(&self) -> Result<Vec<StoredLocation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT location_id, name, latitude, longitude FROM locations ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredLocation {
                id: LocationId(row.get(0)?),
                name: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn weather_facts_for(&self, name: &str) -> Result<Vec<StoredWeatherFact>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT w.observed_at, w.temperature, w.humidity, w.condition, w.wind_speed \
             FROM weather_facts w JOIN locations l ON l.location_id = w.location_id \
             WHERE l.name = ?1 ORDER BY w.observed_at",
        )?;
        let rows = stmt.query_map(params![normalize_location_name(name)], |row| {
            Ok(StoredWeatherFact {
                observed_at: row.get(0)?,
                fact: WeatherFact {
                    temperature: row.get(1)?,
                    humidity: row.get(2)?,
                    condition: row.get(3)?,
                    wind_speed: row.get(4)?,
                },
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn air_quality_facts_for(
        &self,
        name: &str,
    ) -> Result<Vec<StoredAirQualityFact>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.observed_at, a.aqi, a.co, a.no, a.no2, a.o3, a.so2, a.pm2_5, a.pm10 \
             FROM air_quality_facts a JOIN locations l ON l.location_id = a.location_id \
             WHERE l.name = ?1 ORDER BY a.observed_at",
        )?;
        let rows = stmt.query_map(params![normalize_location_name(name)], |row| {
            let aqi: Option<i64> = row.get(1)?;
            Ok(StoredAirQualityFact {
                observed_at: row.get(0)?,
                fact: AirQualityFact {
                    aqi: aqi.and_then(|v| u8::try_from(v).ok()),
                    co: row.get(2)?,
                    no: row.get(3)?,
                    no2: row.get(4)?,
                    o3: row.get(5)?,
                    so2: row.get(6)?,
                    pm2_5: row.get(7)?,
                    pm10: row.get(8)?,
                },
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn count_weather_facts(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) FROM weather_facts")
    }

    pub fn count_air_quality_facts(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) FROM air_quality_facts")
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ObservationSink for SqliteStore {
    fn record(&mut self, observation: &Observation) -> Result<StoreReceipt, StoreError> {
        self.record_observation(observation)
    }
}

fn resolve_location_in(
    conn: &Connection,
    policy: CoordinatePolicy,
    name: &str,
    coords: LatLon,
) -> Result<LocationId, StoreError> {
    let sql = match policy {
        CoordinatePolicy::KeepExisting => {
            "INSERT INTO locations (name, latitude, longitude) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO NOTHING"
        }
        CoordinatePolicy::Overwrite => {
            "INSERT INTO locations (name, latitude, longitude) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET latitude = excluded.latitude, \
             longitude = excluded.longitude"
        }
    };
    let resolve = || -> rusqlite::Result<LocationId> {
        conn.execute(sql, params![name, coords.0, coords.1])?;
        conn.query_row(
            "SELECT location_id FROM locations WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map(LocationId)
    };
    resolve().map_err(|source| StoreError::ResolveLocation {
        location: name.to_string(),
        source,
    })
}

fn upsert_facts_in(
    conn: &Connection,
    location_id: LocationId,
    observation: &Observation,
) -> Result<(FactWrite, FactWrite), StoreError> {
    let timestamp = observation.key.timestamp_text();
    let fact_error = |kind: FactKind| {
        let location = observation.key.location.clone();
        let timestamp = timestamp.clone();
        move |source| StoreError::WriteFact {
            kind,
            location,
            timestamp,
            source,
        }
    };

    let weather = match &observation.weather {
        Some(fact) => insert_weather(conn, location_id, &timestamp, fact)
            .map_err(fact_error(FactKind::Weather))?,
        None => FactWrite::Unavailable,
    };
    let air_quality = match &observation.air_quality {
        Some(fact) => insert_air_quality(conn, location_id, &timestamp, fact)
            .map_err(fact_error(FactKind::AirQuality))?,
        None => FactWrite::Unavailable,
    };

    debug!(
        "{}: weather {}, air quality {}",
        observation.key, weather, air_quality
    );
    Ok((weather, air_quality))
}

fn write_outcome(changed: usize) -> FactWrite {
    if changed == 0 {
        FactWrite::AlreadyRecorded
    } else {
        FactWrite::Inserted
    }
}

fn insert_weather(
    conn: &Connection,
    location_id: LocationId,
    timestamp: &str,
    fact: &WeatherFact,
) -> rusqlite::Result<FactWrite> {
    let changed = conn.execute(
        "INSERT INTO weather_facts \
         (location_id, observed_at, temperature, humidity, condition, wind_speed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(location_id, observed_at) DO NOTHING",
        params![
            location_id.0,
            timestamp,
            fact.temperature,
            fact.humidity,
            fact.condition,
            fact.wind_speed
        ],
    )?;
    Ok(write_outcome(changed))
}

fn insert_air_quality(
    conn: &Connection,
    location_id: LocationId,
    timestamp: &str,
    fact: &AirQualityFact,
) -> rusqlite::Result<FactWrite> {
    let changed = conn.execute(
        "INSERT INTO air_quality_facts \
         (location_id, observed_at, aqi, co, no, no2, o3, so2, pm2_5, pm10) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(location_id, observed_at) DO NOTHING",
        params![
            location_id.0,
            timestamp,
            fact.aqi.map(i64::from),
            fact.co,
            fact.no,
            fact.no2,
            fact.o3,
            fact.so2,
            fact.pm2_5,
            fact.pm10
        ],
    )?;
    Ok(write_outcome(changed))
}
