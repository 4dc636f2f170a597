use chrono::NaiveDate;
use quinico_core::{DateRange, KeywordTarget, RankObservation, RankSource};
use rusqlite::{OptionalExtension, params};

use crate::{
    KeywordDomain, KeywordTest, RankPoint, SqliteStore, StoreError, TopTenEntry, rank_column,
};

const TARGET_FILTER: &str = "d.domain = ?1 AND k.keyword = ?2 AND d.gl = ?3 AND d.googlehost = ?4";

impl SqliteStore {
    /// Registers a domain under a search locale, returning its id. Existing
    /// triples keep their id.
    pub fn upsert_keyword_domain(
        &self,
        domain: &str,
        gl: &str,
        googlehost: &str,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO keyword_domains (domain, gl, googlehost) VALUES (?1, ?2, ?3)
             ON CONFLICT(domain, gl, googlehost) DO NOTHING",
            params![domain, gl, googlehost],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM keyword_domains WHERE domain = ?1 AND gl = ?2 AND googlehost = ?3",
            params![domain, gl, googlehost],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Binds `keyword` to a domain so it shows up in the rank matrix.
    pub fn add_keyword_test(&self, domain_id: i64, keyword: &str) -> Result<(), StoreError> {
        let keyword_id = self.intern_keyword(keyword)?;
        self.conn.execute(
            "INSERT INTO keyword_tests (domain_id, keyword_id) VALUES (?1, ?2)
             ON CONFLICT(domain_id, keyword_id) DO NOTHING",
            params![domain_id, keyword_id],
        )?;
        Ok(())
    }

    pub fn record_rank(
        &self,
        domain_id: i64,
        keyword: &str,
        date: NaiveDate,
        rank: u32,
        url: Option<&str>,
    ) -> Result<(), StoreError> {
        let keyword_id = self.intern_keyword(keyword)?;
        let url_id = url.map(|url| self.intern_url(url)).transpose()?;
        self.conn.execute(
            "INSERT INTO ranks (domain_id, keyword_id, date, rank, url_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(domain_id, keyword_id, date) DO UPDATE SET
                rank = excluded.rank,
                url_id = excluded.url_id",
            params![domain_id, keyword_id, date, rank, url_id],
        )?;
        Ok(())
    }

    pub fn record_top_ten(
        &self,
        domain_id: i64,
        keyword: &str,
        date: NaiveDate,
        entries: &[TopTenEntry],
    ) -> Result<(), StoreError> {
        let keyword_id = self.intern_keyword(keyword)?;
        for entry in entries {
            let url_id = self.intern_url(&entry.url)?;
            self.conn.execute(
                "INSERT INTO top_ten (domain_id, keyword_id, date, rank, url_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(domain_id, keyword_id, date, rank) DO UPDATE SET
                    url_id = excluded.url_id",
                params![domain_id, keyword_id, date, entry.rank, url_id],
            )?;
        }
        Ok(())
    }

    pub fn keyword_domains(&self) -> Result<Vec<KeywordDomain>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, domain, gl, googlehost FROM keyword_domains
             ORDER BY domain ASC, gl ASC, googlehost ASC",
        )?;
        let rows = stmt.query_map([], keyword_domain_row)?;
        let domains = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(domains)
    }

    pub fn keyword_domain(&self, domain_id: i64) -> Result<Option<KeywordDomain>, StoreError> {
        let domain = self
            .conn
            .query_row(
                "SELECT id, domain, gl, googlehost FROM keyword_domains WHERE id = ?1",
                params![domain_id],
                keyword_domain_row,
            )
            .optional()?;
        Ok(domain)
    }

    pub fn keyword_domain_names(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_domain_column("domain")
    }

    pub fn keyword_gl_values(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_domain_column("gl")
    }

    pub fn keyword_googlehost_values(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_domain_column("googlehost")
    }

    /// Keywords tracked for a domain name across every locale it is
    /// registered under.
    pub fn keywords_for_domain_name(&self, domain: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT k.keyword
             FROM keyword_tests t
             JOIN keyword_domains d ON d.id = t.domain_id
             JOIN keywords k ON k.id = t.keyword_id
             WHERE d.domain = ?1
             ORDER BY k.keyword ASC",
        )?;
        let rows = stmt.query_map(params![domain], |row| row.get(0))?;
        let keywords = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    pub fn keyword_tests(&self) -> Result<Vec<KeywordTest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.domain, d.gl, d.googlehost, k.keyword
             FROM keyword_tests t
             JOIN keyword_domains d ON d.id = t.domain_id
             JOIN keywords k ON k.id = t.keyword_id
             ORDER BY d.domain ASC, k.keyword ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(KeywordTest {
                domain: keyword_domain_row(row)?,
                keyword: row.get(4)?,
            })
        })?;
        let tests = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    pub fn keyword_count(&self, domain_id: i64) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM keyword_tests WHERE domain_id = ?1",
            params![domain_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Ranks of one keyword on one domain id, oldest first.
    pub fn keyword_rank_history(
        &self,
        domain_id: i64,
        keyword: &str,
        range: DateRange,
    ) -> Result<Vec<RankPoint>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.date, r.rank
             FROM ranks r
             JOIN keywords k ON k.id = r.keyword_id
             WHERE r.domain_id = ?1 AND k.keyword = ?2 AND r.date BETWEEN ?3 AND ?4
             ORDER BY r.date ASC",
        )?;
        let rows = stmt.query_map(
            params![domain_id, keyword, range.from, range.to],
            rank_point_row,
        )?;
        let points = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    pub fn keyword_trend(
        &self,
        target: &KeywordTarget<'_>,
        range: DateRange,
    ) -> Result<Vec<RankPoint>, StoreError> {
        let sql = format!(
            "SELECT r.date, r.rank
             FROM ranks r
             JOIN keyword_domains d ON d.id = r.domain_id
             JOIN keywords k ON k.id = r.keyword_id
             WHERE {TARGET_FILTER} AND r.date BETWEEN ?5 AND ?6
             ORDER BY r.date ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                target.domain,
                target.keyword,
                target.gl,
                target.googlehost,
                range.from,
                range.to
            ],
            rank_point_row,
        )?;
        let points = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    pub fn top_ten(
        &self,
        target: &KeywordTarget<'_>,
        date: NaiveDate,
    ) -> Result<Vec<TopTenEntry>, StoreError> {
        let sql = format!(
            "SELECT t.rank, u.url
             FROM top_ten t
             JOIN keyword_domains d ON d.id = t.domain_id
             JOIN keywords k ON k.id = t.keyword_id
             JOIN urls u ON u.id = t.url_id
             WHERE {TARGET_FILTER} AND t.date = ?5
             ORDER BY t.rank ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                target.domain,
                target.keyword,
                target.gl,
                target.googlehost,
                date
            ],
            |row| {
                Ok(TopTenEntry {
                    rank: rank_column(row, 0)?,
                    url: row.get(1)?,
                })
            },
        )?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn intern_keyword(&self, keyword: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO keywords (keyword) VALUES (?1) ON CONFLICT(keyword) DO NOTHING",
            params![keyword],
        )?;
        self.lookup_id("SELECT id FROM keywords WHERE keyword = ?1", keyword)?
            .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn distinct_domain_column(&self, column: &str) -> Result<Vec<String>, StoreError> {
        let sql = format!("SELECT DISTINCT {column} FROM keyword_domains ORDER BY {column} ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let values = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

impl RankSource for SqliteStore {
    type Error = StoreError;

    fn latest_collection_date(&self) -> Result<Option<NaiveDate>, Self::Error> {
        let latest = self
            .conn
            .query_row("SELECT MAX(date) FROM ranks", [], |row| row.get(0))?;
        Ok(latest)
    }

    fn domain_keywords(&self, domain_id: i64) -> Result<Vec<String>, Self::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT k.keyword
             FROM keyword_tests t
             JOIN keywords k ON k.id = t.keyword_id
             WHERE t.domain_id = ?1",
        )?;
        let rows = stmt.query_map(params![domain_id], |row| row.get(0))?;
        let keywords = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    fn observations_on(
        &self,
        domain_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<RankObservation>, Self::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT k.keyword, r.rank, COALESCE(u.url, '')
             FROM ranks r
             JOIN keywords k ON k.id = r.keyword_id
             LEFT JOIN urls u ON u.id = r.url_id
             WHERE r.domain_id = ?1 AND r.date = ?2
             ORDER BY k.keyword ASC",
        )?;
        let rows = stmt.query_map(params![domain_id, date], |row| {
            Ok(RankObservation {
                keyword: row.get(0)?,
                rank: rank_column(row, 1)?,
                url: row.get(2)?,
            })
        })?;
        let observations = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(observations)
    }
}

fn keyword_domain_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeywordDomain> {
    Ok(KeywordDomain {
        id: row.get(0)?,
        domain: row.get(1)?,
        gl: row.get(2)?,
        googlehost: row.get(3)?,
    })
}

fn rank_point_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RankPoint> {
    Ok(RankPoint {
        date: row.get(0)?,
        rank: rank_column(row, 1)?,
    })
}

#[cfg(test)]
mod tests {
    use quinico_core::{RankValue, build_rank_matrix, compute_changes};

    use super::*;
    use crate::test_support::{date, open_temp_store};

    fn target<'a>(keyword: &'a str) -> KeywordTarget<'a> {
        KeywordTarget {
            domain: "www.example.com",
            keyword,
            gl: "us",
            googlehost: "google.com",
        }
    }

    #[test]
    fn domain_upsert_is_idempotent_per_locale() {
        let (_temp, store) = open_temp_store();
        let us = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("insert us");
        let again = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("insert us again");
        let uk = store
            .upsert_keyword_domain("www.example.com", "uk", "google.co.uk")
            .expect("insert uk");

        assert_eq!(us, again);
        assert_ne!(us, uk);
        assert_eq!(store.keyword_domains().expect("domains").len(), 2);
        assert_eq!(
            store.keyword_domain_names().expect("names"),
            vec!["www.example.com".to_owned()]
        );
        assert_eq!(
            store.keyword_gl_values().expect("gl values"),
            vec!["uk".to_owned(), "us".to_owned()]
        );
        assert_eq!(store.keyword_domain(9999).expect("lookup"), None);
    }

    #[test]
    fn rank_source_feeds_the_matrix_builder() {
        let (_temp, store) = open_temp_store();
        let domain_id = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("domain");
        store.add_keyword_test(domain_id, "alpha").expect("alpha");
        store.add_keyword_test(domain_id, "beta").expect("beta");

        let today = date("2026-06-10");
        let yesterday = date("2026-06-09");
        store
            .record_rank(domain_id, "alpha", today, 2, Some("https://www.example.com/a"))
            .expect("alpha today");
        store
            .record_rank(domain_id, "alpha", yesterday, 0, None)
            .expect("alpha yesterday");
        store
            .record_rank(domain_id, "beta", yesterday, 7, Some("https://www.example.com/b"))
            .expect("beta yesterday");

        assert_eq!(store.latest_collection_date().expect("latest"), Some(today));
        assert_eq!(store.keyword_count(domain_id).expect("count"), 2);

        let matrix = build_rank_matrix(&store, domain_id, today)
            .expect("build")
            .expect("matrix");
        let alpha = &matrix.keywords["alpha"];
        assert_eq!(alpha.url.as_deref(), Some("https://www.example.com/a"));
        assert_eq!(alpha.ranks[1], RankValue::Observed(0));
        assert_eq!(matrix.keywords["beta"].current(), RankValue::NotAvailable);

        let changes = compute_changes(&matrix);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].date, yesterday);
        assert_eq!(changes[0].counts.up, 1);
    }

    #[test]
    fn recording_the_same_day_twice_keeps_the_latest_rank() {
        let (_temp, store) = open_temp_store();
        let domain_id = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("domain");
        let day = date("2026-06-10");
        store
            .record_rank(domain_id, "alpha", day, 9, None)
            .expect("first");
        store
            .record_rank(domain_id, "alpha", day, 4, Some("https://www.example.com/"))
            .expect("second");

        let observations = store.observations_on(domain_id, day).expect("observations");
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].rank, 4);
        assert_eq!(observations[0].url, "https://www.example.com/");
    }

    #[test]
    fn trend_and_top_ten_filter_on_the_full_target() {
        let (_temp, store) = open_temp_store();
        let us = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("us");
        let uk = store
            .upsert_keyword_domain("www.example.com", "uk", "google.co.uk")
            .expect("uk");
        for (offset, rank) in [(1, 5), (2, 4), (3, 3)] {
            let day = date(&format!("2026-06-0{offset}"));
            store
                .record_rank(us, "alpha", day, rank, None)
                .expect("us rank");
            store
                .record_rank(uk, "alpha", day, rank + 20, None)
                .expect("uk rank");
        }
        store
            .record_top_ten(
                us,
                "alpha",
                date("2026-06-03"),
                &[
                    TopTenEntry {
                        rank: 2,
                        url: "https://second.example/".to_owned(),
                    },
                    TopTenEntry {
                        rank: 1,
                        url: "https://first.example/".to_owned(),
                    },
                ],
            )
            .expect("top ten");

        let range = DateRange {
            from: date("2026-06-02"),
            to: date("2026-06-30"),
        };
        let trend = store.keyword_trend(&target("alpha"), range).expect("trend");
        assert_eq!(
            trend,
            vec![
                RankPoint {
                    date: date("2026-06-02"),
                    rank: 4
                },
                RankPoint {
                    date: date("2026-06-03"),
                    rank: 3
                },
            ]
        );

        let top_ten = store
            .top_ten(&target("alpha"), date("2026-06-03"))
            .expect("top ten");
        assert_eq!(top_ten.len(), 2);
        assert_eq!(top_ten[0].url, "https://first.example/");

        let history = store
            .keyword_rank_history(uk, "alpha", range)
            .expect("history");
        assert_eq!(history.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![24, 23]);
    }

    #[test]
    fn keywords_are_listed_per_domain_name() {
        let (_temp, store) = open_temp_store();
        let us = store
            .upsert_keyword_domain("www.example.com", "us", "google.com")
            .expect("us");
        let uk = store
            .upsert_keyword_domain("www.example.com", "uk", "google.co.uk")
            .expect("uk");
        let other = store
            .upsert_keyword_domain("shop.example.org", "us", "google.com")
            .expect("other");
        store.add_keyword_test(us, "zeta").expect("zeta");
        store.add_keyword_test(uk, "alpha").expect("alpha");
        store.add_keyword_test(uk, "zeta").expect("zeta uk");
        store.add_keyword_test(other, "cart").expect("cart");

        assert_eq!(
            store
                .keywords_for_domain_name("www.example.com")
                .expect("keywords"),
            vec!["alpha".to_owned(), "zeta".to_owned()]
        );
        assert_eq!(store.keyword_tests().expect("tests").len(), 4);
    }
}
