//! SQLite-backed observation store.
//!
//! `ObservationStore` owns one connection, opened on first use and reused
//! until [`ObservationStore::close`] or drop. All methods are blocking; async
//! callers run them on `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row, Transaction, params, types::Type};

use crate::{
    error::{Error, Result},
    filter::country_matches,
    model::WeatherObservation,
};

const COLUMNS: &str = "city, temperature, humidity, weather, rainfall, snowfall, lat, lng, \
     country, iso2, observed_at, feels_like, pressure, wind_speed, wind_deg, wind_gust, \
     visibility, clouds";

/// Selection over stored observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criteria {
    All,
    /// Exact, case-sensitive city name.
    City(String),
    /// Country name or ISO-2 code, case-insensitive.
    Country(String),
}

impl Criteria {
    pub fn matches(&self, obs: &WeatherObservation) -> bool {
        match self {
            Criteria::All => true,
            Criteria::City(name) => obs.city == *name,
            Criteria::Country(token) => country_matches(token, &obs.country_name, &obs.country_code),
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

pub struct ObservationStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl ObservationStore {
    /// Store backed by the SQLite file at `path`. Nothing is opened yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self { location: Location::File(path.as_ref().to_path_buf()), conn: Mutex::new(None) }
    }

    /// Private in-memory database, lost when the store is dropped.
    pub fn in_memory() -> Self {
        Self { location: Location::Memory, conn: Mutex::new(None) }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Delete every stored observation. Returns the number removed.
    pub fn clear_observations(&self) -> Result<usize> {
        self.with_conn(|conn| conn.execute("DELETE FROM observations", []))
    }

    /// Insert `batch` in one transaction. An empty batch is a no-op.
    pub fn insert_many(&self, batch: &[WeatherObservation]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let inserted = insert_rows(&tx, batch)?;
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Clear and insert inside a single transaction.
    ///
    /// Readers see either the previous snapshot or the new one, never an
    /// empty table in between. A failure rolls back to the previous snapshot.
    pub fn replace_all(&self, batch: &[WeatherObservation]) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM observations", [])?;
            let inserted = insert_rows(&tx, batch)?;
            tx.commit()?;
            tracing::debug!("Replaced {} stored observations with {}", removed, inserted);
            Ok(inserted)
        })
    }

    /// Most recently observed match, if any.
    pub fn find_one(&self, criteria: &Criteria) -> Result<Option<WeatherObservation>> {
        Ok(self.select(criteria, true)?.into_iter().next())
    }

    /// All matches in insertion order.
    pub fn find_many(&self, criteria: &Criteria) -> Result<Vec<WeatherObservation>> {
        self.select(criteria, false)
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Release the connection. A later call reconnects.
    pub fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| Error::from(e))?;
            tracing::debug!("Closed observation store");
        }
        Ok(())
    }

    fn select(&self, criteria: &Criteria, newest_first: bool) -> Result<Vec<WeatherObservation>> {
        let order = if newest_first { "observed_at DESC, id DESC" } else { "id ASC" };

        let rows = self.with_conn(|conn| match criteria {
            // City is pushed down to SQLite; its `=` is already case-sensitive.
            Criteria::City(name) => {
                let sql = format!("SELECT {COLUMNS} FROM observations WHERE city = ?1 ORDER BY {order}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![name], row_to_observation)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            _ => {
                let sql = format!("SELECT {COLUMNS} FROM observations ORDER BY {order}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_observation)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        })?;

        // Country matching uses full Unicode case folding, which SQLite's lower() lacks.
        Ok(rows.into_iter().filter(|obs| criteria.matches(obs)).collect())
    }

    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(Error::StoreUnavailable("connection not established".into()));
        };
        Ok(op(conn)?)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::StoreUnavailable(format!(
                            "cannot create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                tracing::info!("Opening observation store at {}", path.display());
                Connection::open(path)?
            }
            Location::Memory => Connection::open_in_memory()?,
        };
        init_schema(&conn)?;
        Ok(conn)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            city TEXT NOT NULL,
            temperature REAL NOT NULL,
            humidity INTEGER NOT NULL,
            weather TEXT NOT NULL,
            rainfall REAL NOT NULL DEFAULT 0,
            snowfall REAL NOT NULL DEFAULT 0,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            country TEXT NOT NULL,
            iso2 TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            feels_like REAL,
            pressure REAL,
            wind_speed REAL,
            wind_deg REAL,
            wind_gust REAL,
            visibility INTEGER,
            clouds INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_observations_city ON observations(city);
        "#,
    )
}

fn insert_rows(tx: &Transaction<'_>, batch: &[WeatherObservation]) -> rusqlite::Result<usize> {
    let sql = format!(
        "INSERT INTO observations ({COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
    );
    let mut stmt = tx.prepare(&sql)?;
    for obs in batch {
        stmt.execute(params![
            obs.city,
            obs.temperature,
            obs.humidity,
            obs.weather_description,
            obs.rainfall_last_hour,
            obs.snowfall_last_hour,
            obs.latitude,
            obs.longitude,
            obs.country_name,
            obs.country_code,
            obs.observed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            obs.feels_like,
            obs.pressure,
            obs.wind_speed,
            obs.wind_deg,
            obs.wind_gust,
            obs.visibility,
            obs.clouds,
        ])?;
    }
    Ok(batch.len())
}

fn row_to_observation(row: &Row) -> rusqlite::Result<WeatherObservation> {
    let observed_at_str: String = row.get(10)?;
    let observed_at = DateTime::parse_from_rfc3339(&observed_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(WeatherObservation {
        city: row.get(0)?,
        temperature: row.get(1)?,
        humidity: row.get(2)?,
        weather_description: row.get(3)?,
        rainfall_last_hour: row.get(4)?,
        snowfall_last_hour: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        country_name: row.get(8)?,
        country_code: row.get(9)?,
        observed_at,
        feels_like: row.get(11)?,
        pressure: row.get(12)?,
        wind_speed: row.get(13)?,
        wind_deg: row.get(14)?,
        wind_gust: row.get(15)?,
        visibility: row.get(16)?,
        clouds: row.get(17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CityRecord;
    use chrono::{Duration, TimeZone};

    fn obs(city: &str, country: &str, code: &str, minute: u32) -> WeatherObservation {
        let record = CityRecord {
            name: city.into(),
            country_name: country.into(),
            country_code: code.into(),
            latitude: 1.5,
            longitude: -2.5,
        };
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        WeatherObservation::new(&record, 20.0, 55, "few clouds", at)
    }

    #[test]
    fn connection_is_lazy() {
        let store = ObservationStore::in_memory();
        assert!(!store.is_connected());

        assert_eq!(store.count().unwrap(), 0);
        assert!(store.is_connected());
    }

    #[test]
    fn insert_and_find_roundtrip_keeps_all_fields() {
        let store = ObservationStore::in_memory();
        let mut paris = obs("Paris", "France", "FR", 0);
        paris.rainfall_last_hour = 0.4;
        paris.wind_gust = Some(7.5);
        paris.visibility = Some(10000);
        paris.clouds = Some(75);

        store.insert_many(std::slice::from_ref(&paris)).unwrap();

        let found = store.find_one(&Criteria::City("Paris".into())).unwrap();
        assert_eq!(found, Some(paris));
    }

    #[test]
    fn find_one_returns_most_recent_observation() {
        let store = ObservationStore::in_memory();
        store
            .insert_many(&[obs("Paris", "France", "FR", 30), obs("Paris", "France", "FR", 10)])
            .unwrap();

        let found = store.find_one(&Criteria::City("Paris".into())).unwrap().unwrap();
        assert_eq!(found.observed_at, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn city_lookup_is_case_sensitive() {
        let store = ObservationStore::in_memory();
        store.insert_many(&[obs("Paris", "France", "FR", 0)]).unwrap();

        assert!(store.find_one(&Criteria::City("paris".into())).unwrap().is_none());
        assert!(store.find_one(&Criteria::City("Nowhere".into())).unwrap().is_none());
    }

    #[test]
    fn country_lookup_matches_name_or_code() {
        let store = ObservationStore::in_memory();
        store
            .insert_many(&[
                obs("Paris", "France", "FR", 0),
                obs("Sydney", "Australia", "AU", 1),
                obs("Lyon", "France", "FR", 2),
            ])
            .unwrap();

        let by_code = store.find_many(&Criteria::Country("fr".into())).unwrap();
        let names: Vec<&str> = by_code.iter().map(|o| o.city.as_str()).collect();
        assert_eq!(names, ["Paris", "Lyon"]);

        let by_name = store.find_many(&Criteria::Country("FRANCE".into())).unwrap();
        assert_eq!(by_name.len(), 2);

        assert!(store.find_many(&Criteria::Country("us".into())).unwrap().is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let store = ObservationStore::in_memory();
        store.insert_many(&[obs("Paris", "France", "FR", 0), obs("Lyon", "France", "FR", 1)]).unwrap();

        assert_eq!(store.clear_observations().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn insert_many_with_empty_batch_is_noop() {
        let store = ObservationStore::in_memory();
        assert_eq!(store.insert_many(&[]).unwrap(), 0);
        assert!(!store.is_connected());
    }

    #[test]
    fn replace_all_swaps_snapshot() {
        let store = ObservationStore::in_memory();
        store.insert_many(&[obs("Paris", "France", "FR", 0)]).unwrap();

        store.replace_all(&[obs("Berlin", "Germany", "DE", 5)]).unwrap();

        let all = store.find_many(&Criteria::All).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].city, "Berlin");

        assert_eq!(store.replace_all(&[]).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn failed_replace_rolls_back_to_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.db");

        // Same table, but refusing one city, so the insert fails part way through.
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL CHECK (city <> 'Atlantis'),
                temperature REAL NOT NULL,
                humidity INTEGER NOT NULL,
                weather TEXT NOT NULL,
                rainfall REAL NOT NULL DEFAULT 0,
                snowfall REAL NOT NULL DEFAULT 0,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                country TEXT NOT NULL,
                iso2 TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                feels_like REAL,
                pressure REAL,
                wind_speed REAL,
                wind_deg REAL,
                wind_gust REAL,
                visibility INTEGER,
                clouds INTEGER
            );
            "#,
        )
        .unwrap();
        drop(conn);

        let store = ObservationStore::open(&path);
        store.insert_many(&[obs("Paris", "France", "FR", 0), obs("Lyon", "France", "FR", 1)]).unwrap();

        let err = store
            .replace_all(&[obs("Berlin", "Germany", "DE", 2), obs("Atlantis", "Nowhere", "AT", 3)])
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));

        let cities: Vec<String> =
            store.find_many(&Criteria::All).unwrap().into_iter().map(|o| o.city).collect();
        assert_eq!(cities, ["Paris", "Lyon"]);
    }

    #[test]
    fn unusable_location_is_store_unavailable() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let store = ObservationStore::open(blocker.path().join("observations.db"));

        assert!(matches!(store.count(), Err(Error::StoreUnavailable(_))));
        assert!(!store.is_connected());
    }

    #[test]
    fn file_store_persists_across_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("observations.db");

        let store = ObservationStore::open(&path);
        store.insert_many(&[obs("Paris", "France", "FR", 0)]).unwrap();
        store.close().unwrap();
        assert!(!store.is_connected());

        let reopened = ObservationStore::open(&path);
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn timestamps_order_correctly_across_seconds() {
        let store = ObservationStore::in_memory();
        let mut early = obs("Paris", "France", "FR", 0);
        let mut late = early.clone();
        late.observed_at = early.observed_at + Duration::milliseconds(1500);
        early.temperature = 1.0;
        late.temperature = 2.0;

        store.insert_many(&[late, early]).unwrap();

        let found = store.find_one(&Criteria::City("Paris".into())).unwrap().unwrap();
        assert_eq!(found.temperature, 2.0);
    }
}
