//! SQLite-backed storage for names, countries and name/country probabilities.
//!
//! All access goes through one connection behind a mutex, so every public
//! operation is serialized. Multi-statement writes additionally run inside a
//! transaction so readers never observe a partially replaced probability set.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{name_key, Country, CountryProbability, NameRecord, PopularName};

const COUNTRY_COLUMNS: &str = "country_code, country_name, region, independent, google_maps_url,
    open_street_map_url, capital_name, capital_latitude, capital_longitude, flag_png, flag_svg,
    flag_alt, coat_of_arms_png, coat_of_arms_svg, borders_with";

const UPSERT_NAME_SQL: &str =
    "INSERT INTO names (name, name_key, count_of_requests, last_accessed_unix_ms)
     VALUES (?1, ?2, 1, ?3)
     ON CONFLICT(name_key) DO UPDATE SET
        count_of_requests = count_of_requests + 1,
        last_accessed_unix_ms = excluded.last_accessed_unix_ms";

pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates a throwaway in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(locked) => locked,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS names (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                count_of_requests INTEGER NOT NULL DEFAULT 0,
                last_accessed_unix_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS countries (
                country_code TEXT PRIMARY KEY,
                country_name TEXT NOT NULL DEFAULT '',
                region TEXT NOT NULL DEFAULT '',
                independent INTEGER NOT NULL DEFAULT 0,
                google_maps_url TEXT NOT NULL DEFAULT '',
                open_street_map_url TEXT NOT NULL DEFAULT '',
                capital_name TEXT NOT NULL DEFAULT '',
                capital_latitude REAL,
                capital_longitude REAL,
                flag_png TEXT NOT NULL DEFAULT '',
                flag_svg TEXT NOT NULL DEFAULT '',
                flag_alt TEXT NOT NULL DEFAULT '',
                coat_of_arms_png TEXT NOT NULL DEFAULT '',
                coat_of_arms_svg TEXT NOT NULL DEFAULT '',
                borders_with TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS name_country_probabilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name_id INTEGER NOT NULL REFERENCES names(id) ON DELETE CASCADE,
                country_code TEXT NOT NULL REFERENCES countries(country_code) ON DELETE CASCADE,
                probability REAL NOT NULL,
                UNIQUE(name_id, country_code)
            );

            CREATE INDEX IF NOT EXISTS idx_name_country_probabilities_country
                ON name_country_probabilities(country_code);",
        )?;
        Ok(())
    }

    /// Finds a name by case-insensitive exact match.
    pub fn find_name_by_case_insensitive(&self, name: &str) -> Result<Option<NameRecord>, StoreError> {
        let conn = self.lock();
        Self::select_name_by_key(&conn, &name_key(name))
    }

    /// Creates `name` with a count of one, or bumps the existing row's counter.
    ///
    /// A concurrent creator of the same name simply turns this call into an
    /// increment, so the counter never loses a request.
    pub fn upsert_name(&self, name: &str, now: DateTime<Utc>) -> Result<NameRecord, StoreError> {
        let key = name_key(name);
        let conn = self.lock();
        conn.execute(UPSERT_NAME_SQL, params![name.trim(), key, now.timestamp_millis()])?;
        Self::select_name_by_key(&conn, &key)?
            .ok_or_else(|| StoreError::Corrupt(format!("name '{key}' vanished after upsert")))
    }

    /// Increments the request counter and refreshes `last_accessed`.
    pub fn increment_name_usage(
        &self,
        name: &NameRecord,
        now: DateTime<Utc>,
    ) -> Result<NameRecord, StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE names
             SET count_of_requests = count_of_requests + 1, last_accessed_unix_ms = ?1
             WHERE id = ?2",
            params![now.timestamp_millis(), name.id],
        )?;
        if updated == 0 {
            return Err(StoreError::Corrupt(format!("name id {} does not exist", name.id)));
        }
        Self::select_name_by_id(&conn, name.id)?
            .ok_or_else(|| StoreError::Corrupt(format!("name id {} vanished", name.id)))
    }

    pub fn find_country_by_code(&self, country_code: &str) -> Result<Option<Country>, StoreError> {
        let conn = self.lock();
        Self::select_country(&conn, country_code)
    }

    /// Inserts a new country. Fails with [`StoreError::DuplicateKey`] when the
    /// code is already present.
    pub fn create_country(&self, country: &Country) -> Result<Country, StoreError> {
        let borders_with = serde_json::to_string(&country.borders_with)
            .map_err(|err| StoreError::Corrupt(format!("borders_with not serializable: {err}")))?;
        let conn = self.lock();
        let result = conn.execute(
            &format!("INSERT INTO countries ({COUNTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"),
            params![
                country.country_code,
                country.country_name,
                country.region,
                country.independent,
                country.google_maps_url,
                country.open_street_map_url,
                country.capital_name,
                country.capital_latitude,
                country.capital_longitude,
                country.flag_png,
                country.flag_svg,
                country.flag_alt,
                country.coat_of_arms_png,
                country.coat_of_arms_svg,
                borders_with,
            ],
        );
        match result {
            Ok(_) => Ok(country.clone()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateKey(format!(
                "country '{}'",
                country.country_code
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces every probability row of `name` with `probabilities`, in order.
    ///
    /// Runs as one transaction: on any failure the previous set stays in place.
    pub fn replace_probabilities(
        &self,
        name: &NameRecord,
        probabilities: &[(String, f64)],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::write_probabilities(&tx, name.id, probabilities)?;
        tx.commit()?;
        Ok(())
    }

    /// Counts a refreshed lookup of `name` and swaps in its new probability
    /// set, both inside one transaction.
    ///
    /// Either the name row and its whole set change together or nothing
    /// changes, so a failed refresh is neither counted nor marked fresh.
    pub fn refresh_name(
        &self,
        name: &str,
        now: DateTime<Utc>,
        probabilities: &[(String, f64)],
    ) -> Result<NameRecord, StoreError> {
        let key = name_key(name);
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(UPSERT_NAME_SQL, params![name.trim(), key, now.timestamp_millis()])?;
        let record = Self::select_name_by_key(&tx, &key)?
            .ok_or_else(|| StoreError::Corrupt(format!("name '{key}' vanished after upsert")))?;
        Self::write_probabilities(&tx, record.id, probabilities)?;
        tx.commit()?;
        Ok(record)
    }

    fn write_probabilities(
        conn: &Connection,
        name_id: i64,
        probabilities: &[(String, f64)],
    ) -> Result<(), StoreError> {
        conn.execute(
            "DELETE FROM name_country_probabilities WHERE name_id = ?1",
            params![name_id],
        )?;
        let mut stmt = conn.prepare(
            "INSERT INTO name_country_probabilities (name_id, country_code, probability)
             VALUES (?1, ?2, ?3)",
        )?;
        for (country_code, probability) in probabilities {
            if let Err(err) = stmt.execute(params![name_id, country_code, probability]) {
                if is_unique_violation(&err) {
                    return Err(StoreError::DuplicateKey(format!(
                        "probability for name id {name_id} and country '{country_code}'"
                    )));
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Returns the joined probability set of `name`, in insertion order.
    pub fn probabilities_for_name(
        &self,
        name: &NameRecord,
    ) -> Result<Vec<CountryProbability>, StoreError> {
        let conn = self.lock();
        let prefixed_columns = COUNTRY_COLUMNS
            .split(',')
            .map(|column| format!("c.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {prefixed_columns}, p.probability
             FROM name_country_probabilities p
             JOIN countries c ON c.country_code = p.country_code
             WHERE p.name_id = ?1
             ORDER BY p.id ASC"
        ))?;
        let rows = stmt.query_map(params![name.id], |row| {
            Ok((Self::country_from_row(row)?, row.get::<_, f64>(15)?))
        })?;

        let mut probabilities = Vec::new();
        for row in rows {
            let (country, probability) = row?;
            probabilities.push(CountryProbability {
                country: country?,
                probability,
            });
        }
        Ok(probabilities)
    }

    /// Ranks names linked to `country_code` by request count, highest first.
    ///
    /// Ties fall back to name creation order.
    pub fn top_names_for_country(
        &self,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<PopularName>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT n.name, n.count_of_requests
             FROM name_country_probabilities p
             JOIN names n ON n.id = p.name_id
             WHERE p.country_code = ?1
             ORDER BY n.count_of_requests DESC, n.id ASC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![country_code, limit], |row| {
            Ok(PopularName {
                name: row.get(0)?,
                count_of_requests: count_from_sql(row.get(1)?),
            })
        })?;

        let mut names = Vec::new();
        for name in rows {
            names.push(name?);
        }
        Ok(names)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    fn select_name_by_key(conn: &Connection, key: &str) -> Result<Option<NameRecord>, StoreError> {
        let record = conn
            .query_row(
                "SELECT id, name, count_of_requests, last_accessed_unix_ms
                 FROM names WHERE name_key = ?1",
                params![key],
                Self::name_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn select_name_by_id(conn: &Connection, id: i64) -> Result<Option<NameRecord>, StoreError> {
        let record = conn
            .query_row(
                "SELECT id, name, count_of_requests, last_accessed_unix_ms
                 FROM names WHERE id = ?1",
                params![id],
                Self::name_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn select_country(conn: &Connection, country_code: &str) -> Result<Option<Country>, StoreError> {
        let country = conn
            .query_row(
                &format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE country_code = ?1"),
                params![country_code],
                Self::country_from_row,
            )
            .optional()?;
        country.transpose()
    }

    fn name_from_row(row: &Row<'_>) -> rusqlite::Result<NameRecord> {
        let last_accessed_unix_ms: Option<i64> = row.get(3)?;
        Ok(NameRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            count_of_requests: count_from_sql(row.get(2)?),
            last_accessed: last_accessed_unix_ms
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        })
    }

    // Outer result is the SQL read, inner result is the JSON decode of borders.
    fn country_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Country, StoreError>> {
        let country_code: String = row.get(0)?;
        let borders_raw: String = row.get(14)?;
        let borders_with = match serde_json::from_str::<Vec<String>>(&borders_raw) {
            Ok(borders) => borders,
            Err(err) => {
                return Ok(Err(StoreError::Corrupt(format!(
                    "country '{country_code}' has invalid borders_with: {err}"
                ))))
            }
        };
        Ok(Ok(Country {
            country_code,
            country_name: row.get(1)?,
            region: row.get(2)?,
            independent: row.get(3)?,
            google_maps_url: row.get(4)?,
            open_street_map_url: row.get(5)?,
            capital_name: row.get(6)?,
            capital_latitude: row.get(7)?,
            capital_longitude: row.get(8)?,
            flag_png: row.get(9)?,
            flag_svg: row.get(10)?,
            flag_alt: row.get(11)?,
            coat_of_arms_png: row.get(12)?,
            coat_of_arms_svg: row.get(13)?,
            borders_with,
        }))
    }
}

fn count_from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
