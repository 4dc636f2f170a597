use chrono::NaiveDate;
use quinico_core::{DateRange, PagespeedMetric, PagespeedTarget};
use rusqlite::{OptionalExtension, params};

use crate::{
    MetricPoint, PagespeedRun, PagespeedScore, PagespeedTest, SqliteStore, StoreError,
    strategy_column,
};

const SCORE_COLUMNS: &str = "s.date, s.strategy, s.score, s.number_hosts, s.number_resources, \
     s.number_static_resources, s.number_css_resources, s.total_request_bytes, \
     s.text_response_bytes, s.css_response_bytes, s.html_response_bytes, \
     s.image_response_bytes, s.javascript_response_bytes, s.other_response_bytes, s.report";

const TARGET_JOINS: &str = "FROM pagespeed_scores s
     JOIN pagespeed_tests t ON t.id = s.test_id
     JOIN pagespeed_domains d ON d.id = t.domain_id
     JOIN urls u ON u.id = t.url_id";

impl SqliteStore {
    pub fn upsert_pagespeed_test(&self, domain: &str, url: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO pagespeed_domains (domain) VALUES (?1) ON CONFLICT(domain) DO NOTHING",
            params![domain],
        )?;
        let domain_id: i64 = self.conn.query_row(
            "SELECT id FROM pagespeed_domains WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        let url_id = self.intern_url(url)?;
        self.conn.execute(
            "INSERT INTO pagespeed_tests (domain_id, url_id) VALUES (?1, ?2)
             ON CONFLICT(domain_id, url_id) DO NOTHING",
            params![domain_id, url_id],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM pagespeed_tests WHERE domain_id = ?1 AND url_id = ?2",
            params![domain_id, url_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn pagespeed_tests(&self) -> Result<Vec<PagespeedTest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, d.domain, u.url
             FROM pagespeed_tests t
             JOIN pagespeed_domains d ON d.id = t.domain_id
             JOIN urls u ON u.id = t.url_id
             ORDER BY d.domain ASC, u.url ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PagespeedTest {
                id: row.get(0)?,
                domain: row.get(1)?,
                url: row.get(2)?,
            })
        })?;
        let tests = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Stores one collection run and returns its id, which addresses the
    /// full report.
    pub fn record_pagespeed_score(
        &self,
        test_id: i64,
        score: &PagespeedScore,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO pagespeed_scores (
                test_id, date, strategy, score, number_hosts, number_resources,
                number_static_resources, number_css_resources, total_request_bytes,
                text_response_bytes, css_response_bytes, html_response_bytes,
                image_response_bytes, javascript_response_bytes, other_response_bytes, report
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                test_id,
                score.date,
                score.strategy.as_str(),
                score.score,
                score.number_hosts,
                score.number_resources,
                score.number_static_resources,
                score.number_css_resources,
                score.total_request_bytes,
                score.text_response_bytes,
                score.css_response_bytes,
                score.html_response_bytes,
                score.image_response_bytes,
                score.javascript_response_bytes,
                score.other_response_bytes,
                score.report,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Average of `metric` per local calendar day, oldest first.
    pub fn pagespeed_daily_average(
        &self,
        target: &PagespeedTarget<'_>,
        metric: PagespeedMetric,
        range: DateRange,
    ) -> Result<Vec<MetricPoint>, StoreError> {
        let sql = format!(
            "SELECT date(s.date, ?4) AS day, AVG(s.{column})
             {TARGET_JOINS}
             WHERE d.domain = ?1 AND u.url = ?2 AND s.strategy = ?3
               AND date(s.date, ?4) BETWEEN ?5 AND ?6
             GROUP BY day
             ORDER BY day ASC",
            column = metric.column(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                target.domain,
                target.url,
                target.strategy.as_str(),
                self.day_modifier(),
                range.from,
                range.to
            ],
            |row| {
                Ok(MetricPoint {
                    date: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        )?;
        let points = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Local calendar day of the most recent run for a test and strategy.
    pub fn latest_pagespeed_date(
        &self,
        target: &PagespeedTarget<'_>,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let sql = format!(
            "SELECT date(MAX(s.date), ?4)
             {TARGET_JOINS}
             WHERE d.domain = ?1 AND u.url = ?2 AND s.strategy = ?3"
        );
        let latest = self.conn.query_row(
            &sql,
            params![
                target.domain,
                target.url,
                target.strategy.as_str(),
                self.day_modifier()
            ],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    pub fn pagespeed_scores_on(
        &self,
        target: &PagespeedTarget<'_>,
        date: NaiveDate,
    ) -> Result<Vec<PagespeedScore>, StoreError> {
        let sql = format!(
            "SELECT {SCORE_COLUMNS}
             {TARGET_JOINS}
             WHERE d.domain = ?1 AND u.url = ?2 AND s.strategy = ?3
               AND date(s.date, ?4) = ?5
             ORDER BY s.date ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                target.domain,
                target.url,
                target.strategy.as_str(),
                self.day_modifier(),
                date
            ],
            score_row,
        )?;
        let scores = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    /// Raw runs inside the range, newest first.
    pub fn pagespeed_history(
        &self,
        target: &PagespeedTarget<'_>,
        range: DateRange,
    ) -> Result<Vec<PagespeedRun>, StoreError> {
        let sql = format!(
            "SELECT s.id, {SCORE_COLUMNS}
             {TARGET_JOINS}
             WHERE d.domain = ?1 AND u.url = ?2 AND s.strategy = ?3
               AND date(s.date, ?4) BETWEEN ?5 AND ?6
             ORDER BY s.date DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                target.domain,
                target.url,
                target.strategy.as_str(),
                self.day_modifier(),
                range.from,
                range.to
            ],
            run_row,
        )?;
        let runs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Report file name of a run. `None` for unknown ids and for runs stored
    /// without a report.
    pub fn pagespeed_report_name(&self, score_id: i64) -> Result<Option<String>, StoreError> {
        let report: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT report FROM pagespeed_scores WHERE id = ?1",
                params![score_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(report.flatten())
    }
}

fn score_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PagespeedScore> {
    score_at(row, 0)
}

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PagespeedRun> {
    Ok(PagespeedRun {
        id: row.get(0)?,
        score: score_at(row, 1)?,
    })
}

/// Reads the [`SCORE_COLUMNS`] block starting at column `base`.
fn score_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<PagespeedScore> {
    Ok(PagespeedScore {
        date: row.get(base)?,
        strategy: strategy_column(row, base + 1)?,
        score: row.get(base + 2)?,
        number_hosts: row.get(base + 3)?,
        number_resources: row.get(base + 4)?,
        number_static_resources: row.get(base + 5)?,
        number_css_resources: row.get(base + 6)?,
        total_request_bytes: row.get(base + 7)?,
        text_response_bytes: row.get(base + 8)?,
        css_response_bytes: row.get(base + 9)?,
        html_response_bytes: row.get(base + 10)?,
        image_response_bytes: row.get(base + 11)?,
        javascript_response_bytes: row.get(base + 12)?,
        other_response_bytes: row.get(base + 13)?,
        report: row.get(base + 14)?,
    })
}
