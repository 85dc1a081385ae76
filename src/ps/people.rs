//! Person repository. Mirrors [`crate::ps::images`]'s association-sync shape
//! for the single `sources` collection, plus the affected-image-UUID lookup
//! needed by the Services Layer to fan out a reindex of every image a person
//! is attached to before that person's update or delete commits.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CuratorError, Result};
use crate::ps::associations;
use crate::types::image::ImageSource;
use crate::types::person::{NewPerson, Person, PersonSource, PersonUpdate};

#[derive(Clone)]
pub struct PersonRepository {
    pool: SqlitePool,
}

impl PersonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewPerson) -> Result<Person> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query_scalar::<_, String>(
            "SELECT uuid FROM people WHERE name = ? COLLATE NOCASE",
        )
        .bind(&new.name)
        .fetch_optional(&mut *tx)
        .await?
        {
            let existing_uuid =
                Uuid::parse_str(&existing).map_err(|e| CuratorError::internal(e.to_string()))?;
            return Err(CuratorError::conflict(existing_uuid));
        }

        let uuid = Uuid::now_v7();
        let now = Utc::now();

        let person_id = sqlx::query(
            "INSERT INTO people (uuid, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid.to_string())
        .bind(&new.name)
        .bind(&new.description)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sync_sources(&mut tx, person_id, &new.sources).await?;

        tx.commit().await?;
        self.get_by_uuid(uuid).await
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<Person> {
        let row = sqlx::query_as::<_, PersonRow>(
            "SELECT id, uuid, name, description, created_at, updated_at FROM people WHERE uuid = ?",
        )
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CuratorError::NotFound)?;

        let mut tx = self.pool.begin().await?;
        let sources = load_sources(&mut tx, row.id).await?;
        tx.commit().await?;

        Ok(row.into_person(sources))
    }

    /// Updates the mutable fields and source set. Returns the UUIDs of every
    /// image currently associated with this person, read before the update
    /// commits, so the Services Layer can enqueue a reindex of each one
    /// regardless of whether this update changes the name (which appears in
    /// the image's denormalised person association in the Text Index).
    pub async fn update(&self, uuid: Uuid, update: PersonUpdate) -> Result<(Person, Vec<Uuid>)> {
        let mut tx = self.pool.begin().await?;

        let person_id: i64 = sqlx::query_scalar("SELECT id FROM people WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CuratorError::NotFound)?;

        let affected = affected_image_uuids(&mut tx, person_id).await?;

        if let Some(name) = &update.name {
            if let Some(existing) = sqlx::query_scalar::<_, String>(
                "SELECT uuid FROM people WHERE name = ? COLLATE NOCASE AND id != ?",
            )
            .bind(name)
            .bind(person_id)
            .fetch_optional(&mut *tx)
            .await?
            {
                let existing_uuid = Uuid::parse_str(&existing)
                    .map_err(|e| CuratorError::internal(e.to_string()))?;
                return Err(CuratorError::conflict(existing_uuid));
            }
            sqlx::query("UPDATE people SET name = ? WHERE id = ?")
                .bind(name)
                .bind(person_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(description) = update.description {
            sqlx::query("UPDATE people SET description = ? WHERE id = ?")
                .bind(&description)
                .bind(person_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(sources) = update.sources {
            sync_sources(&mut tx, person_id, &sources).await?;
        }

        sqlx::query("UPDATE people SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(person_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        let person = self.get_by_uuid(uuid).await?;
        Ok((person, affected))
    }

    /// Deletes the person, returning the UUIDs of every image that was
    /// associated with them, computed before the delete statement runs.
    pub async fn delete(&self, uuid: Uuid) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let person_id: i64 = sqlx::query_scalar("SELECT id FROM people WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CuratorError::NotFound)?;

        let affected = affected_image_uuids(&mut tx, person_id).await?;

        sqlx::query("DELETE FROM people WHERE id = ?")
            .bind(person_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(affected)
    }

    /// Every person UUID, for the Services Layer's startup reindex pass.
    pub async fn all_uuids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT uuid FROM people")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(uuid,)| Uuid::parse_str(&uuid).map_err(|e| CuratorError::internal(e.to_string())))
            .collect()
    }
}

async fn sync_sources(
    tx: &mut Transaction<'_, Sqlite>,
    person_id: i64,
    sources: &[PersonSource],
) -> Result<()> {
    let existing: Vec<(String,)> =
        sqlx::query_as("SELECT url FROM person_sources WHERE person_id = ?")
            .bind(person_id)
            .fetch_all(&mut **tx)
            .await?;
    let existing_map: HashMap<String, ()> = existing.into_iter().map(|(u,)| (u, ())).collect();

    let desired: Vec<(String, &ImageSource)> =
        sources.iter().map(|s| (s.url.clone(), s)).collect();
    let diff = associations::diff(desired, existing_map);

    for (url, source) in diff.to_insert {
        sqlx::query(
            "INSERT INTO person_sources (person_id, url, title, description) VALUES (?, ?, ?, ?)",
        )
        .bind(person_id)
        .bind(&url)
        .bind(&source.title)
        .bind(&source.description)
        .execute(&mut **tx)
        .await?;
    }

    for (url, source) in diff.to_retain {
        sqlx::query(
            "UPDATE person_sources SET title = ?, description = ? WHERE person_id = ? AND url = ?",
        )
        .bind(&source.title)
        .bind(&source.description)
        .bind(person_id)
        .bind(&url)
        .execute(&mut **tx)
        .await?;
    }

    for url in diff.to_delete {
        sqlx::query("DELETE FROM person_sources WHERE person_id = ? AND url = ?")
            .bind(person_id)
            .bind(&url)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn load_sources(tx: &mut Transaction<'_, Sqlite>, person_id: i64) -> Result<Vec<PersonSource>> {
    let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT url, title, description FROM person_sources WHERE person_id = ?",
    )
    .bind(person_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(url, title, description)| ImageSource { url, title, description })
        .collect())
}

async fn affected_image_uuids(tx: &mut Transaction<'_, Sqlite>, person_id: i64) -> Result<Vec<Uuid>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT i.uuid FROM image_people ip
        JOIN images i ON i.id = ip.image_id
        WHERE ip.person_id = ?
        "#,
    )
    .bind(person_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter()
        .map(|(uuid,)| Uuid::parse_str(&uuid).map_err(|e| CuratorError::internal(e.to_string())))
        .collect()
}

#[derive(sqlx::FromRow)]
struct PersonRow {
    id: i64,
    uuid: String,
    name: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PersonRow {
    fn into_person(self, sources: Vec<PersonSource>) -> Person {
        Person {
            id: self.id,
            uuid: Uuid::parse_str(&self.uuid).expect("stored uuid is valid"),
            name: self.name,
            description: self.description,
            created_at: self.created_at.parse().expect("stored timestamp is valid"),
            updated_at: self.updated_at.parse().expect("stored timestamp is valid"),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ps::{create_database_pool, migrations, DatabaseConfig};
    use crate::ps::images::ImageRepository;
    use crate::types::image::{ImageFormat, NewImage};
    use tempfile::TempDir;

    async fn test_repos() -> (PersonRepository, ImageRepository, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.db");
        let config = DatabaseConfig::with_path(path.to_string_lossy().to_string());
        let pool = create_database_pool(&config).await.unwrap();
        migrations::run(&pool).await.unwrap();
        (
            PersonRepository::new(pool.clone()),
            ImageRepository::new(pool),
            dir,
        )
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let (repo, _images, _dir) = test_repos().await;
        repo.create(NewPerson {
            name: "Ada Lovelace".into(),
            description: None,
            sources: vec![],
        })
        .await
        .unwrap();

        let second = repo
            .create(NewPerson {
                name: "ada lovelace".into(),
                description: None,
                sources: vec![],
            })
            .await;
        assert!(matches!(second, Err(CuratorError::Conflict { .. })));
    }

    #[tokio::test]
    async fn delete_returns_affected_image_uuids() {
        let (people, images, _dir) = test_repos().await;
        let person = people
            .create(NewPerson {
                name: "Grace Hopper".into(),
                description: None,
                sources: vec![],
            })
            .await
            .unwrap();

        let image = images
            .create(NewImage {
                filename: "compiler.jpg".into(),
                md5: "a".repeat(32),
                sha1: "b".repeat(40),
                width: 10,
                height: 10,
                format: ImageFormat::Png,
                size_bytes: 100,
                embedding: vec![0.0; 512],
                title: None,
                description: None,
                tags: vec![],
                people: vec![(person.uuid, "subject".into())],
                sources: vec![],
            })
            .await
            .unwrap();

        let affected = people.delete(person.uuid).await.unwrap();
        assert_eq!(affected, vec![image.uuid]);
    }
}
