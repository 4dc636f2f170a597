use quinico_core::{DateRange, WebpagetestMetric};
use rusqlite::{OptionalExtension, params};

use crate::{
    SeriesPoint, SqliteStore, StoreError, WebpagetestResult, WebpagetestRun, WebpagetestTest,
};

const RUN_COLUMNS: &str = "r.id, t.id, t.url, t.location, r.date, r.successful, r.load_time, \
     r.bytes_out, r.bytes_out_doc, r.bytes_in, r.bytes_in_doc, r.requests, r.requests_doc, \
     r.render, r.fully_loaded, r.doc_time, r.gzip_total, r.image_total";

impl SqliteStore {
    pub fn upsert_webpagetest_test(&self, url: &str, location: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO webpagetest_tests (url, location) VALUES (?1, ?2)
             ON CONFLICT(url, location) DO NOTHING",
            params![url, location],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM webpagetest_tests WHERE url = ?1 AND location = ?2",
            params![url, location],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn webpagetest_tests(&self) -> Result<Vec<WebpagetestTest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, location FROM webpagetest_tests ORDER BY url ASC, location ASC",
        )?;
        let rows = stmt.query_map([], test_row)?;
        let tests = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    pub fn webpagetest_test(&self, test_id: i64) -> Result<Option<WebpagetestTest>, StoreError> {
        let test = self
            .conn
            .query_row(
                "SELECT id, url, location FROM webpagetest_tests WHERE id = ?1",
                params![test_id],
                test_row,
            )
            .optional()?;
        Ok(test)
    }

    pub fn record_webpagetest_result(
        &self,
        test_id: i64,
        result: &WebpagetestResult,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO webpagetest_results (
                test_id, date, successful, load_time, bytes_out, bytes_out_doc, bytes_in,
                bytes_in_doc, requests, requests_doc, render, fully_loaded, doc_time,
                gzip_total, image_total
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                test_id,
                result.date,
                result.successful,
                result.load_time,
                result.bytes_out,
                result.bytes_out_doc,
                result.bytes_in,
                result.bytes_in_doc,
                result.requests,
                result.requests_doc,
                result.render,
                result.fully_loaded,
                result.doc_time,
                result.gzip_total,
                result.image_total,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Timestamped values of one metric, oldest first. Failed runs are left
    /// out unless `include_failed` is set.
    pub fn webpagetest_series(
        &self,
        test_id: i64,
        metric: WebpagetestMetric,
        range: DateRange,
        include_failed: bool,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let sql = format!(
            "SELECT date, {column}
             FROM webpagetest_results
             WHERE test_id = ?1
               AND date(date, ?2) BETWEEN ?3 AND ?4
               AND (successful = 1 OR ?5)
             ORDER BY date ASC",
            column = metric.column(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                test_id,
                self.day_modifier(),
                range.from,
                range.to,
                include_failed
            ],
            |row| {
                Ok(SeriesPoint {
                    at: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        )?;
        let points = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Every run of a test inside the range, newest first.
    pub fn webpagetest_history(
        &self,
        test_id: i64,
        range: DateRange,
    ) -> Result<Vec<WebpagetestRun>, StoreError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS}
             FROM webpagetest_results r
             JOIN webpagetest_tests t ON t.id = r.test_id
             WHERE t.id = ?1 AND date(r.date, ?2) BETWEEN ?3 AND ?4
             ORDER BY r.date DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![test_id, self.day_modifier(), range.from, range.to],
            run_row,
        )?;
        let runs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn webpagetest_run(&self, run_id: i64) -> Result<Option<WebpagetestRun>, StoreError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS}
             FROM webpagetest_results r
             JOIN webpagetest_tests t ON t.id = r.test_id
             WHERE r.id = ?1"
        );
        let run = self
            .conn
            .query_row(&sql, params![run_id], run_row)
            .optional()?;
        Ok(run)
    }
}

fn test_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebpagetestTest> {
    Ok(WebpagetestTest {
        id: row.get(0)?,
        url: row.get(1)?,
        location: row.get(2)?,
    })
}

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebpagetestRun> {
    Ok(WebpagetestRun {
        id: row.get(0)?,
        test: WebpagetestTest {
            id: row.get(1)?,
            url: row.get(2)?,
            location: row.get(3)?,
        },
        result: WebpagetestResult {
            date: row.get(4)?,
            successful: row.get(5)?,
            load_time: row.get(6)?,
            bytes_out: row.get(7)?,
            bytes_out_doc: row.get(8)?,
            bytes_in: row.get(9)?,
            bytes_in_doc: row.get(10)?,
            requests: row.get(11)?,
            requests_doc: row.get(12)?,
            render: row.get(13)?,
            fully_loaded: row.get(14)?,
            doc_time: row.get(15)?,
            gzip_total: row.get(16)?,
            image_total: row.get(17)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, datetime, open_temp_store};

    fn run(at: &str, successful: bool, load_time: i64) -> WebpagetestResult {
        WebpagetestResult {
            date: datetime(at),
            successful,
            load_time,
            bytes_out: 100,
            bytes_out_doc: 90,
            bytes_in: 20_000,
            bytes_in_doc: 15_000,
            requests: 30,
            requests_doc: 25,
            render: 800,
            fully_loaded: load_time + 500,
            doc_time: load_time - 100,
            gzip_total: 12_000,
            image_total: 7_000,
        }
    }

    fn june() -> DateRange {
        DateRange {
            from: date("2026-06-01"),
            to: date("2026-06-30"),
        }
    }

    #[test]
    fn series_excludes_failed_runs_by_default() {
        let (_temp, store) = open_temp_store();
        let test_id = store
            .upsert_webpagetest_test("https://www.example.com/", "Dulles:Chrome")
            .expect("test");
        store
            .record_webpagetest_result(test_id, &run("2026-06-01 10:00:00", true, 1_200))
            .expect("first");
        store
            .record_webpagetest_result(test_id, &run("2026-06-02 10:00:00", false, 0))
            .expect("failed");
        store
            .record_webpagetest_result(test_id, &run("2026-06-03 10:00:00", true, 1_100))
            .expect("third");

        let successful = store
            .webpagetest_series(test_id, WebpagetestMetric::LoadTime, june(), false)
            .expect("series");
        assert_eq!(
            successful.iter().map(|p| p.value).collect::<Vec<_>>(),
            vec![1_200, 1_100]
        );

        let everything = store
            .webpagetest_series(test_id, WebpagetestMetric::FullyLoaded, june(), true)
            .expect("series with failures");
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[1].value, 500);
    }

    #[test]
    fn history_and_single_runs_carry_the_test() {
        let (_temp, store) = open_temp_store();
        let test_id = store
            .upsert_webpagetest_test("https://www.example.com/", "Dulles:Chrome")
            .expect("test");
        let older = store
            .record_webpagetest_result(test_id, &run("2026-06-01 10:00:00", true, 1_200))
            .expect("older");
        store
            .record_webpagetest_result(test_id, &run("2026-06-05 10:00:00", true, 900))
            .expect("newer");

        let history = store.webpagetest_history(test_id, june()).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].result.load_time, 900);
        assert_eq!(history[0].test.location, "Dulles:Chrome");

        let single = store
            .webpagetest_run(older)
            .expect("run")
            .expect("stored run");
        assert_eq!(single.result.metric_value(WebpagetestMetric::LoadTime), 1_200);
        assert_eq!(store.webpagetest_run(999).expect("missing"), None);
    }

    #[test]
    fn tests_are_listed_and_looked_up() {
        let (_temp, store) = open_temp_store();
        let id = store
            .upsert_webpagetest_test("https://b.example.com/", "Dulles:Chrome")
            .expect("b");
        store
            .upsert_webpagetest_test("https://a.example.com/", "London:Firefox")
            .expect("a");
        assert_eq!(
            store
                .upsert_webpagetest_test("https://b.example.com/", "Dulles:Chrome")
                .expect("b again"),
            id
        );

        let tests = store.webpagetest_tests().expect("tests");
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].url, "https://a.example.com/");
        assert_eq!(
            store.webpagetest_test(id).expect("lookup").map(|t| t.location),
            Some("Dulles:Chrome".to_owned())
        );
    }
}
