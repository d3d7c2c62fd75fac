//! City catalog loading.
//!
//! The catalog is a headered CSV (the simplemaps `worldcities.csv` layout)
//! with at least the `city`, `country`, `iso2`, `lat` and `lng` columns.
//! Rows are produced lazily and in file order; a row that cannot be parsed
//! is logged and skipped. Nothing is cached, every call re-reads the source.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    model::CityRecord,
};

/// Columns a catalog must carry; anything else in the file is ignored.
pub const REQUIRED_COLUMNS: [&str; 5] = ["city", "country", "iso2", "lat", "lng"];

#[derive(Debug, Deserialize)]
struct CatalogRow {
    city: String,
    country: String,
    iso2: String,
    lat: f64,
    lng: f64,
}

impl From<CatalogRow> for CityRecord {
    fn from(row: CatalogRow) -> Self {
        CityRecord {
            name: row.city,
            country_name: row.country,
            country_code: row.iso2,
            latitude: row.lat,
            longitude: row.lng,
        }
    }
}

/// Lazy, finite sequence of [`CityRecord`]s read from a catalog source.
pub struct Catalog<R> {
    source: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<R, CatalogRow>,
    skipped: usize,
    /// Read failure that ended iteration early.
    fatal: Option<Error>,
}

impl Catalog<File> {
    /// Open the catalog file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::catalog(path, e))?;
        Self::with_source(file, path)
    }
}

impl<R: io::Read> Catalog<R> {
    /// Read a catalog from any byte source.
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::with_source(reader, "<reader>")
    }

    /// Read a catalog from `reader`, naming it `source` in errors and logs.
    pub fn with_source(reader: R, source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers().map_err(|e| Error::catalog(&source, e))?;
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();

        if !missing.is_empty() {
            return Err(Error::catalog(
                &source,
                format!("missing required column(s): {}", missing.join(", ")),
            ));
        }

        Ok(Self { source, rows: csv.into_deserialize(), skipped: 0, fatal: None })
    }

    /// Rows skipped so far because they could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// The read failure that stopped iteration, if any.
    ///
    /// `None` after the iterator is exhausted means the whole source was read.
    pub fn take_error(&mut self) -> Option<Error> {
        self.fatal.take()
    }

    /// Drain the remaining rows, failing if the source could not be read to the end.
    pub fn collect_all(mut self) -> Result<Vec<CityRecord>> {
        let cities: Vec<CityRecord> = self.by_ref().collect();
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(cities),
        }
    }
}

impl<R: io::Read> Iterator for Catalog<R> {
    type Item = CityRecord;

    fn next(&mut self) -> Option<CityRecord> {
        if self.fatal.is_some() {
            return None;
        }
        loop {
            match self.rows.next()? {
                Ok(row) => return Some(row.into()),
                Err(err) if err.is_io_error() => {
                    tracing::error!(
                        "Stopped reading catalog {}: {}",
                        self.source.display(),
                        err
                    );
                    self.fatal = Some(Error::catalog(&self.source, err));
                    return None;
                }
                Err(err) => {
                    self.skipped += 1;
                    tracing::warn!("Skipping malformed catalog row: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
city,city_ascii,lat,lng,country,iso2,iso3,population
Tokyo,Tokyo,35.6897,139.6922,Japan,JP,JPN,37732000
Paris,Paris,48.8567,2.3522,France,FR,FRA,11060000
\"Lyon\",Lyon,45.76,4.84,France,FR,FRA,516092
";

    #[test]
    fn reads_rows_in_source_order() {
        let cities: Vec<CityRecord> = Catalog::from_reader(SAMPLE.as_bytes()).unwrap().collect();

        let names: Vec<&str> = cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Tokyo", "Paris", "Lyon"]);

        let paris = &cities[1];
        assert_eq!(paris.country_name, "France");
        assert_eq!(paris.country_code, "FR");
        assert!((paris.latitude - 48.8567).abs() < 1e-9);
        assert!((paris.longitude - 2.3522).abs() < 1e-9);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let data = "\
city,country,iso2,lat,lng
Paris,France,FR,48.85,2.35
Nowhere,Atlantis,AT,not-a-number,0
Short,Row
Berlin,Germany,DE,52.52,13.40
";
        let mut catalog = Catalog::from_reader(data.as_bytes()).unwrap();
        let names: Vec<String> = catalog.by_ref().map(|c| c.name).collect();

        assert_eq!(names, ["Paris", "Berlin"]);
        assert_eq!(catalog.skipped(), 2);
    }

    /// Serves `data`, then fails every later read.
    struct BreaksAfter(io::Cursor<Vec<u8>>);

    impl io::Read for BreaksAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match io::Read::read(&mut self.0, buf)? {
                0 => Err(io::Error::other("disk gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn read_failure_mid_stream_is_reported() {
        let data = "city,country,iso2,lat,lng\nParis,France,FR,48.85,2.35\n";
        let reader = BreaksAfter(io::Cursor::new(data.as_bytes().to_vec()));

        let mut catalog = Catalog::with_source(reader, "worldcities.csv").unwrap();
        let names: Vec<String> = catalog.by_ref().map(|c| c.name).collect();
        assert_eq!(names, ["Paris"]);

        match catalog.take_error() {
            Some(Error::CatalogUnavailable { path, reason }) => {
                assert_eq!(path, PathBuf::from("worldcities.csv"));
                assert!(reason.contains("disk gone"));
            }
            other => panic!("expected CatalogUnavailable, got {other:?}"),
        }
        assert!(catalog.next().is_none());
    }

    #[test]
    fn collect_all_fails_on_read_failure() {
        let data = "city,country,iso2,lat,lng\nParis,France,FR,48.85,2.35\n";
        let reader = BreaksAfter(io::Cursor::new(data.as_bytes().to_vec()));

        let err = Catalog::from_reader(reader).unwrap().collect_all().unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable { .. }));
    }

    #[test]
    fn collect_all_returns_every_row_of_a_complete_source() {
        let cities = Catalog::from_reader(SAMPLE.as_bytes()).unwrap().collect_all().unwrap();
        assert_eq!(cities.len(), 3);
    }

    #[test]
    fn missing_columns_make_catalog_unavailable() {
        let data = "city,country,lat,lng\nParis,France,48.85,2.35\n";

        let err = Catalog::from_reader(data.as_bytes()).err().expect("must fail");
        match err {
            Error::CatalogUnavailable { reason, .. } => assert!(reason.contains("iso2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_makes_catalog_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldcities.csv");

        let err = Catalog::open(&path).err().expect("must fail");
        assert!(matches!(err, Error::CatalogUnavailable { .. }));
    }

    #[test]
    fn every_open_rereads_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();

        assert_eq!(Catalog::open(file.path()).unwrap().count(), 3);

        writeln!(file, "Nice,Nice,43.70,7.27,France,FR,FRA,342669").unwrap();
        assert_eq!(Catalog::open(file.path()).unwrap().count(), 4);
    }
}
