//! Primary-domain entities: institutions, persons, journals, events, users
//!
//! SQLite-backed implementations of the loader's [`EntityStore`] and the
//! attribution [`UserDirectory`]. Lookups prefer external identifiers and
//! fall back to names only when a stub carries none.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use biblio_common::Result;

use crate::loader::{EntityStore, JournalStub};
use crate::models::{normalize_text, EventStub, InstitutionStub, PersonName, PersonStub};
use crate::services::attribution::{name_similarity, UserDirectory, UserMatch, NAME_MATCH_THRESHOLD};

#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_institution_by(&self, column: &str, value: &str) -> Result<Option<i64>> {
        let sql = format!("SELECT id FROM institutions WHERE {} = ? LIMIT 1", column);
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get("id")))
    }
}

fn event_name(stub: &EventStub) -> String {
    stub.name
        .iter()
        .map(|n| n.content.trim())
        .find(|n| !n.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn find_institution(&self, stub: &InstitutionStub) -> Result<Option<i64>> {
        let ids = [
            ("scopus_afid", &stub.scopus_afid),
            ("open_alex_id", &stub.open_alex_id),
            ("ror", &stub.ror),
        ];
        let mut identified = false;
        for (column, value) in ids {
            if let Some(value) = value {
                identified = true;
                if let Some(id) = self.find_institution_by(column, value).await? {
                    return Ok(Some(id));
                }
            }
        }
        if identified {
            return Ok(None);
        }

        match stub.display_name() {
            Some(name) => {
                let row = sqlx::query(
                    "SELECT id FROM institutions WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
                )
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.map(|r| r.get("id")))
            }
            None => Ok(None),
        }
    }

    async fn create_institution(&self, stub: &InstitutionStub) -> Result<i64> {
        let name = stub
            .display_name()
            .or(stub.ror.as_deref())
            .or(stub.scopus_afid.as_deref())
            .or(stub.open_alex_id.as_deref())
            .unwrap_or_default();
        let result = sqlx::query(
            "INSERT INTO institutions (name, scopus_afid, open_alex_id, ror) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&stub.scopus_afid)
        .bind(&stub.open_alex_id)
        .bind(&stub.ror)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn find_person(&self, stub: &PersonStub) -> Result<Option<i64>> {
        let row = if stub.has_external_id() {
            sqlx::query(
                "SELECT id FROM persons
                  WHERE scopus_author_id = ? OR open_alex_id = ? OR orcid = ? OR web_of_science_id = ?
                  ORDER BY id LIMIT 1",
            )
            .bind(&stub.scopus_author_id)
            .bind(&stub.open_alex_id)
            .bind(&stub.orcid)
            .bind(&stub.web_of_science_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id FROM persons
                  WHERE lower(first_name) = lower(?) AND lower(last_name) = lower(?)
                  ORDER BY id LIMIT 1",
            )
            .bind(stub.name.first_name.trim())
            .bind(stub.name.last_name.trim())
            .fetch_optional(&self.pool)
            .await?
        };
        Ok(row.map(|r| r.get("id")))
    }

    async fn create_person(&self, stub: &PersonStub) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO persons
                (first_name, middle_name, last_name, scopus_author_id, open_alex_id, orcid, web_of_science_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stub.name.first_name)
        .bind(&stub.name.middle_name)
        .bind(&stub.name.last_name)
        .bind(&stub.scopus_author_id)
        .bind(&stub.open_alex_id)
        .bind(&stub.orcid)
        .bind(&stub.web_of_science_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn find_journal(&self, stub: &JournalStub) -> Result<Option<i64>> {
        if stub.e_issn.is_some() || stub.print_issn.is_some() {
            let row = sqlx::query(
                "SELECT id FROM journals
                  WHERE e_issn IN (?, ?) OR print_issn IN (?, ?)
                  ORDER BY id LIMIT 1",
            )
            .bind(&stub.e_issn)
            .bind(&stub.print_issn)
            .bind(&stub.e_issn)
            .bind(&stub.print_issn)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                return Ok(Some(row.get("id")));
            }
        }

        if stub.title.trim().is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(
            "SELECT id FROM journals WHERE lower(title) = lower(?) ORDER BY id LIMIT 1",
        )
        .bind(stub.title.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn create_journal(&self, stub: &JournalStub) -> Result<i64> {
        let result = sqlx::query("INSERT INTO journals (title, e_issn, print_issn) VALUES (?, ?, ?)")
            .bind(stub.title.trim())
            .bind(&stub.e_issn)
            .bind(&stub.print_issn)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn find_event(&self, stub: &EventStub) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT id FROM events WHERE name_key = ? AND date_from IS ? ORDER BY id LIMIT 1",
        )
        .bind(normalize_text(&event_name(stub)))
        .bind(&stub.date_from)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn create_event(&self, stub: &EventStub) -> Result<i64> {
        let name = event_name(stub);
        let result = sqlx::query(
            "INSERT INTO events (name, name_key, date_from, date_to, place) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(normalize_text(&name))
        .bind(&stub.date_from)
        .bind(&stub.date_to)
        .bind(&stub.place)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Users of the primary domain and their employments
#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn employments(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT institution_id FROM user_employments WHERE user_id = ? ORDER BY institution_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("institution_id")).collect())
    }

    /// Register a user, returning its id
    pub async fn add_user(&self, person: &PersonStub, institution_ids: &[i64]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let user_id = sqlx::query(
            "INSERT INTO users (first_name, last_name, scopus_author_id, open_alex_id, orcid, web_of_science_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&person.name.first_name)
        .bind(&person.name.last_name)
        .bind(&person.scopus_author_id)
        .bind(&person.open_alex_id)
        .bind(&person.orcid)
        .bind(&person.web_of_science_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for institution_id in institution_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO user_employments (user_id, institution_id) VALUES (?, ?)",
            )
            .bind(user_id)
            .bind(institution_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(user_id)
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_by_external_author_id(&self, person: &PersonStub) -> Result<Option<UserMatch>> {
        let row = sqlx::query(
            "SELECT id FROM users
              WHERE scopus_author_id = ? OR open_alex_id = ? OR orcid = ? OR web_of_science_id = ?
              ORDER BY id LIMIT 1",
        )
        .bind(&person.scopus_author_id)
        .bind(&person.open_alex_id)
        .bind(&person.orcid)
        .bind(&person.web_of_science_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let user_id: i64 = row.get("id");
                let institution_ids = self.employments(user_id).await?;
                Ok(Some(UserMatch { user_id, institution_ids }))
            }
            None => Ok(None),
        }
    }

    async fn search_by_name(&self, name: &PersonName) -> Result<Option<UserMatch>> {
        let mut rows = sqlx::query(
            "SELECT id, first_name, last_name FROM users WHERE lower(last_name) = lower(?)",
        )
        .bind(name.last_name.trim())
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            // Transliterated or misspelled surnames
            rows = sqlx::query("SELECT id, first_name, last_name FROM users")
                .fetch_all(&self.pool)
                .await?;
        }

        let best = rows
            .iter()
            .map(|row| {
                let candidate = PersonName {
                    first_name: row.get("first_name"),
                    middle_name: None,
                    last_name: row.get("last_name"),
                };
                let stripped = PersonName { middle_name: None, ..name.clone() };
                (row.get::<i64, _>("id"), name_similarity(&stripped, &candidate))
            })
            .filter(|(_, score)| *score >= NAME_MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((user_id, _)) => {
                let institution_ids = self.employments(user_id).await?;
                Ok(Some(UserMatch { user_id, institution_ids }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MultilingualContent;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        biblio_common::db::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_institution_lookup_by_id_then_name() {
        let store = SqliteEntityStore::new(test_pool().await);
        let mut stub = InstitutionStub::named("University of Novi Sad");
        stub.scopus_afid = Some("60068801".to_string());
        let id = store.create_institution(&stub).await.unwrap();

        let mut by_id = InstitutionStub::named("UNS");
        by_id.scopus_afid = Some("60068801".to_string());
        assert_eq!(store.find_institution(&by_id).await.unwrap(), Some(id));

        let by_name = InstitutionStub::named("university of novi sad");
        assert_eq!(store.find_institution(&by_name).await.unwrap(), Some(id));

        let mut other_id = InstitutionStub::named("University of Novi Sad");
        other_id.ror = Some("00xa57a59".to_string());
        assert_eq!(store.find_institution(&other_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_journal_matches_either_issn() {
        let store = SqliteEntityStore::new(test_pool().await);
        let id = store
            .create_journal(&JournalStub {
                title: "Journal of Tests".to_string(),
                e_issn: Some("1111-2222".to_string()),
                print_issn: None,
            })
            .await
            .unwrap();

        let wanted = JournalStub {
            title: String::new(),
            e_issn: None,
            print_issn: Some("1111-2222".to_string()),
        };
        assert_eq!(store.find_journal(&wanted).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_event_distinguished_by_date() {
        let store = SqliteEntityStore::new(test_pool().await);
        let mut stub = EventStub {
            name: vec![MultilingualContent::new("EN", "ICIST 2023", 1)],
            ..Default::default()
        };
        let undated = store.create_event(&stub).await.unwrap();
        assert_eq!(store.find_event(&stub).await.unwrap(), Some(undated));

        stub.date_from = Some("2023-03-12".to_string());
        assert_eq!(store.find_event(&stub).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_directory_matches() {
        let directory = SqliteUserDirectory::new(test_pool().await);
        let mut person = PersonStub::named("Jelena Petrović");
        person.orcid = Some("0000-0001-2345-6789".to_string());
        let user_id = directory.add_user(&person, &[4, 9]).await.unwrap();

        let mut wanted = PersonStub::named("J. Petrovic");
        wanted.orcid = Some("0000-0001-2345-6789".to_string());
        let found = directory.find_by_external_author_id(&wanted).await.unwrap().unwrap();
        assert_eq!(found, UserMatch { user_id, institution_ids: vec![4, 9] });

        let fuzzy = directory
            .search_by_name(&PersonName::parse("Jelena Petrovic"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fuzzy.user_id, user_id);

        let none = directory.search_by_name(&PersonName::parse("Marko Ilić")).await.unwrap();
        assert_eq!(none, None);
    }
}
