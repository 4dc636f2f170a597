use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use quinico_core::{PagespeedMetric, Strategy, WebpagetestMetric};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;

mod dashboard;
mod keyword;
mod pagespeed;
mod webpagetest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordDomain {
    pub id: i64,
    pub domain: String,
    pub gl: String,
    pub googlehost: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTest {
    pub domain: KeywordDomain,
    pub keyword: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankPoint {
    pub date: NaiveDate,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopTenEntry {
    pub rank: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagespeedTest {
    pub id: i64,
    pub domain: String,
    pub url: String,
}

/// One page-speed collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagespeedScore {
    pub date: NaiveDateTime,
    pub strategy: Strategy,
    pub score: i64,
    pub number_hosts: i64,
    pub number_resources: i64,
    pub number_static_resources: i64,
    pub number_css_resources: i64,
    pub total_request_bytes: i64,
    pub text_response_bytes: i64,
    pub css_response_bytes: i64,
    pub html_response_bytes: i64,
    pub image_response_bytes: i64,
    pub javascript_response_bytes: i64,
    pub other_response_bytes: i64,
    /// File name of the stored JSON report, relative to the upload directory.
    pub report: Option<String>,
}

impl PagespeedScore {
    pub fn metric_value(&self, metric: PagespeedMetric) -> i64 {
        match metric {
            PagespeedMetric::Score => self.score,
            PagespeedMetric::NumberHosts => self.number_hosts,
            PagespeedMetric::NumberResources => self.number_resources,
            PagespeedMetric::NumberStaticResources => self.number_static_resources,
            PagespeedMetric::NumberCssResources => self.number_css_resources,
            PagespeedMetric::TotalRequestBytes => self.total_request_bytes,
            PagespeedMetric::TextResponseBytes => self.text_response_bytes,
            PagespeedMetric::CssResponseBytes => self.css_response_bytes,
            PagespeedMetric::HtmlResponseBytes => self.html_response_bytes,
            PagespeedMetric::ImageResponseBytes => self.image_response_bytes,
            PagespeedMetric::JavascriptResponseBytes => self.javascript_response_bytes,
            PagespeedMetric::OtherResponseBytes => self.other_response_bytes,
        }
    }
}

/// A stored pagespeed run with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagespeedRun {
    pub id: i64,
    pub score: PagespeedScore,
}

/// Daily aggregate of a metric; `value` is `None` when every sample was null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebpagetestTest {
    pub id: i64,
    pub url: String,
    pub location: String,
}

/// One synthetic load-test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpagetestResult {
    pub date: NaiveDateTime,
    pub successful: bool,
    pub load_time: i64,
    pub bytes_out: i64,
    pub bytes_out_doc: i64,
    pub bytes_in: i64,
    pub bytes_in_doc: i64,
    pub requests: i64,
    pub requests_doc: i64,
    pub render: i64,
    pub fully_loaded: i64,
    pub doc_time: i64,
    pub gzip_total: i64,
    pub image_total: i64,
}

impl WebpagetestResult {
    pub fn metric_value(&self, metric: WebpagetestMetric) -> i64 {
        match metric {
            WebpagetestMetric::LoadTime => self.load_time,
            WebpagetestMetric::BytesOut => self.bytes_out,
            WebpagetestMetric::BytesOutDoc => self.bytes_out_doc,
            WebpagetestMetric::BytesIn => self.bytes_in,
            WebpagetestMetric::BytesInDoc => self.bytes_in_doc,
            WebpagetestMetric::Requests => self.requests,
            WebpagetestMetric::RequestsDoc => self.requests_doc,
            WebpagetestMetric::Render => self.render,
            WebpagetestMetric::FullyLoaded => self.fully_loaded,
            WebpagetestMetric::DocTime => self.doc_time,
            WebpagetestMetric::GzipTotal => self.gzip_total,
            WebpagetestMetric::ImageTotal => self.image_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpagetestRun {
    pub id: i64,
    pub test: WebpagetestTest,
    pub result: WebpagetestResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub at: NaiveDateTime,
    pub value: i64,
}

/// Per-user sizing for embeddable fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashSettings {
    pub width: u32,
    pub height: u32,
    pub font: u32,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    utc_offset_minutes: i32,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self {
            conn,
            path,
            utc_offset_minutes: 0,
        })
    }

    /// Shifts the calendar-day boundaries of timestamped measurements. Stored
    /// timestamps are UTC.
    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SQLite `date()` modifier that moves a UTC timestamp into local time.
    fn day_modifier(&self) -> String {
        format!("{:+} minutes", self.utc_offset_minutes)
    }

    fn intern_url(&self, url: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO urls (url) VALUES (?1) ON CONFLICT(url) DO NOTHING",
            params![url],
        )?;
        let id = self
            .conn
            .query_row("SELECT id FROM urls WHERE url = ?1", params![url], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    fn lookup_id(&self, sql: &str, key: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        Ok(id)
    }
}

fn strategy_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Strategy> {
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|err: String| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into()))
}

fn rank_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(index)?;
    u32::try_from(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, err.into()))
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS urls (
            id INTEGER PRIMARY KEY,
            url TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS keyword_domains (
            id INTEGER PRIMARY KEY,
            domain TEXT NOT NULL,
            gl TEXT NOT NULL,
            googlehost TEXT NOT NULL,
            UNIQUE (domain, gl, googlehost)
        );

        CREATE TABLE IF NOT EXISTS keywords (
            id INTEGER PRIMARY KEY,
            keyword TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS keyword_tests (
            id INTEGER PRIMARY KEY,
            domain_id INTEGER NOT NULL REFERENCES keyword_domains(id),
            keyword_id INTEGER NOT NULL REFERENCES keywords(id),
            UNIQUE (domain_id, keyword_id)
        );

        CREATE TABLE IF NOT EXISTS ranks (
            id INTEGER PRIMARY KEY,
            domain_id INTEGER NOT NULL REFERENCES keyword_domains(id),
            keyword_id INTEGER NOT NULL REFERENCES keywords(id),
            date TEXT NOT NULL,
            rank INTEGER NOT NULL,
            url_id INTEGER REFERENCES urls(id),
            UNIQUE (domain_id, keyword_id, date)
        );
        CREATE INDEX IF NOT EXISTS ranks_date_idx ON ranks (date);

        CREATE TABLE IF NOT EXISTS top_ten (
            id INTEGER PRIMARY KEY,
            domain_id INTEGER NOT NULL REFERENCES keyword_domains(id),
            keyword_id INTEGER NOT NULL REFERENCES keywords(id),
            date TEXT NOT NULL,
            rank INTEGER NOT NULL,
            url_id INTEGER NOT NULL REFERENCES urls(id),
            UNIQUE (domain_id, keyword_id, date, rank)
        );

        CREATE TABLE IF NOT EXISTS pagespeed_domains (
            id INTEGER PRIMARY KEY,
            domain TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS pagespeed_tests (
            id INTEGER PRIMARY KEY,
            domain_id INTEGER NOT NULL REFERENCES pagespeed_domains(id),
            url_id INTEGER NOT NULL REFERENCES urls(id),
            UNIQUE (domain_id, url_id)
        );

        CREATE TABLE IF NOT EXISTS pagespeed_scores (
            id INTEGER PRIMARY KEY,
            test_id INTEGER NOT NULL REFERENCES pagespeed_tests(id),
            date TEXT NOT NULL,
            strategy TEXT NOT NULL,
            score INTEGER NOT NULL,
            number_hosts INTEGER NOT NULL,
            number_resources INTEGER NOT NULL,
            number_static_resources INTEGER NOT NULL,
            number_css_resources INTEGER NOT NULL,
            total_request_bytes INTEGER NOT NULL,
            text_response_bytes INTEGER NOT NULL,
            css_response_bytes INTEGER NOT NULL,
            html_response_bytes INTEGER NOT NULL,
            image_response_bytes INTEGER NOT NULL,
            javascript_response_bytes INTEGER NOT NULL,
            other_response_bytes INTEGER NOT NULL,
            report TEXT
        );
        CREATE INDEX IF NOT EXISTS pagespeed_scores_test_idx
            ON pagespeed_scores (test_id, strategy, date);

        CREATE TABLE IF NOT EXISTS webpagetest_tests (
            id INTEGER PRIMARY KEY,
            url TEXT NOT NULL,
            location TEXT NOT NULL,
            UNIQUE (url, location)
        );

        CREATE TABLE IF NOT EXISTS webpagetest_results (
            id INTEGER PRIMARY KEY,
            test_id INTEGER NOT NULL REFERENCES webpagetest_tests(id),
            date TEXT NOT NULL,
            successful INTEGER NOT NULL,
            load_time INTEGER NOT NULL,
            bytes_out INTEGER NOT NULL,
            bytes_out_doc INTEGER NOT NULL,
            bytes_in INTEGER NOT NULL,
            bytes_in_doc INTEGER NOT NULL,
            requests INTEGER NOT NULL,
            requests_doc INTEGER NOT NULL,
            render INTEGER NOT NULL,
            fully_loaded INTEGER NOT NULL,
            doc_time INTEGER NOT NULL,
            gzip_total INTEGER NOT NULL,
            image_total INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS webpagetest_results_test_idx
            ON webpagetest_results (test_id, date);

        CREATE TABLE IF NOT EXISTS seomoz_urls (
            id INTEGER PRIMARY KEY,
            url TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS webmaster_domains (
            id INTEGER PRIMARY KEY,
            domain TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS dash_settings (
            username TEXT PRIMARY KEY,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            font INTEGER NOT NULL
        );
        "#,
    )?;

    tracing::debug!("sqlite schema is up to date");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    use super::SqliteStore;

    pub fn open_temp_store() -> (TempDir, SqliteStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path().join("quinico.sqlite")).expect("open store");
        (temp, store)
    }

    pub fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    pub fn datetime(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("valid datetime")
    }
}
