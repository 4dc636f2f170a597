use rusqlite::{OptionalExtension, params};

use crate::{DashSettings, SqliteStore, StoreError};

impl SqliteStore {
    pub fn dash_settings(&self, username: &str) -> Result<Option<DashSettings>, StoreError> {
        let settings = self
            .conn
            .query_row(
                "SELECT width, height, font FROM dash_settings WHERE username = ?1",
                params![username],
                |row| {
                    Ok(DashSettings {
                        width: row.get(0)?,
                        height: row.get(1)?,
                        font: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    pub fn save_dash_settings(
        &self,
        username: &str,
        settings: DashSettings,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO dash_settings (username, width, height, font) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET
                width = excluded.width,
                height = excluded.height,
                font = excluded.font",
            params![username, settings.width, settings.height, settings.font],
        )?;
        Ok(())
    }

    pub fn add_seomoz_url(&self, url: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO seomoz_urls (url) VALUES (?1) ON CONFLICT(url) DO NOTHING",
            params![url],
        )?;
        Ok(())
    }

    pub fn seomoz_urls(&self) -> Result<Vec<String>, StoreError> {
        self.single_column("SELECT url FROM seomoz_urls ORDER BY url ASC")
    }

    pub fn add_webmaster_domain(&self, domain: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO webmaster_domains (domain) VALUES (?1) ON CONFLICT(domain) DO NOTHING",
            params![domain],
        )?;
        Ok(())
    }

    pub fn webmaster_domains(&self) -> Result<Vec<String>, StoreError> {
        self.single_column("SELECT domain FROM webmaster_domains ORDER BY domain ASC")
    }

    fn single_column(&self, sql: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let values = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp_store;

    #[test]
    fn settings_are_per_user_and_overwritable() {
        let (_temp, store) = open_temp_store();
        assert_eq!(store.dash_settings("alice").expect("lookup"), None);

        let small = DashSettings {
            width: 300,
            height: 200,
            font: 10,
        };
        store.save_dash_settings("alice", small).expect("save");
        assert_eq!(store.dash_settings("alice").expect("lookup"), Some(small));
        assert_eq!(store.dash_settings("bob").expect("other user"), None);

        let large = DashSettings {
            width: 800,
            height: 600,
            font: 14,
        };
        store.save_dash_settings("alice", large).expect("overwrite");
        assert_eq!(store.dash_settings("alice").expect("lookup"), Some(large));
    }

    #[test]
    fn tracked_seo_entities_are_sorted_and_unique() {
        let (_temp, store) = open_temp_store();
        store.add_seomoz_url("www.b.example").expect("b");
        store.add_seomoz_url("www.a.example").expect("a");
        store.add_seomoz_url("www.a.example").expect("a again");
        store.add_webmaster_domain("b.example").expect("domain b");
        store.add_webmaster_domain("a.example").expect("domain a");

        assert_eq!(
            store.seomoz_urls().expect("urls"),
            vec!["www.a.example".to_owned(), "www.b.example".to_owned()]
        );
        assert_eq!(
            store.webmaster_domains().expect("domains"),
            vec!["a.example".to_owned(), "b.example".to_owned()]
        );
    }
}
