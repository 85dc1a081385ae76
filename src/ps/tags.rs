//! Tag tree maintenance: closure table upkeep, sibling position management
//! with lazy renormalisation, and the four fundamental placement operations
//! (insert-inside, insert-before, insert-after, move).

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{CuratorError, Result};
use crate::types::tag::{NewTag, Placement, Tag, TagUpdate};

/// Gap left between sibling positions so most inserts need no renormalisation.
pub const GAP: i64 = 10;

/// The system assumes a shallow forest; this bounds the closure rebuild walk
/// and catches runaway cycles defensively (cycles are also rejected
/// explicitly before any write).
const MAX_DEPTH: u32 = 64;

#[derive(Clone)]
pub struct TagRepository {
    pool: SqlitePool,
}

impl TagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<Tag> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at FROM tags WHERE uuid = ?",
        )
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CuratorError::NotFound)?;
        Ok(row.into())
    }

    async fn get_by_id(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<Tag> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at FROM tags WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CuratorError::NotFound)?;
        Ok(row.into())
    }

    pub async fn create(&self, new: NewTag, placement: Placement) -> Result<Tag> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query_scalar::<_, String>(
            "SELECT uuid FROM tags WHERE name = ? COLLATE NOCASE",
        )
        .bind(&new.name)
        .fetch_optional(&mut *tx)
        .await?
        {
            let existing_uuid = Uuid::parse_str(&existing)
                .map_err(|e| CuratorError::internal(e.to_string()))?;
            return Err(CuratorError::conflict(existing_uuid));
        }

        let parent_id = match placement_parent(&mut tx, &placement).await? {
            Some(p) => Some(p),
            None => None,
        };
        let position = Self::resolve_position(&mut tx, &placement).await?;

        let uuid = Uuid::now_v7();
        let now = Utc::now();

        let id = sqlx::query(
            "INSERT INTO tags (uuid, name, description, parent_id, position, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid.to_string())
        .bind(&new.name)
        .bind(&new.description)
        .bind(parent_id)
        .bind(position)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // Self row plus one row per ancestor of the (possibly absent) parent.
        sqlx::query("INSERT INTO tag_closure (ancestor, descendant, depth) VALUES (?, ?, 0)")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(parent_id) = parent_id {
            copy_ancestor_closure(&mut tx, parent_id, id).await?;
        }

        tx.commit().await?;
        self.get_by_uuid(uuid).await
    }

    pub async fn update(&self, uuid: Uuid, update: TagUpdate) -> Result<Tag> {
        let mut tx = self.pool.begin().await?;
        let tag = sqlx::query_as::<_, TagRow>(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at FROM tags WHERE uuid = ?",
        )
        .bind(uuid.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CuratorError::NotFound)?;

        if let Some(ref name) = update.name {
            if !name.eq_ignore_ascii_case(&tag.name) {
                if sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM tags WHERE name = ? COLLATE NOCASE AND id != ?",
                )
                .bind(name)
                .bind(tag.id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some()
                {
                    return Err(CuratorError::conflict(uuid));
                }
            }
        }

        let new_name = update.name.unwrap_or(tag.name.clone());
        let new_description = update.description.unwrap_or(tag.description.clone());
        let now = Utc::now();

        sqlx::query("UPDATE tags SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(&new_name)
            .bind(&new_description)
            .bind(now.to_rfc3339())
            .bind(tag.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.get_by_uuid(uuid).await
    }

    /// Moves a tag to a new placement. Returns the UUIDs of images affected
    /// by the move (every image associated with any tag in the moved
    /// subtree, both old and new ancestry having diverged).
    pub async fn move_tag(&self, uuid: Uuid, placement: Placement) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let moving = sqlx::query_as::<_, TagRow>(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at FROM tags WHERE uuid = ?",
        )
        .bind(uuid.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CuratorError::NotFound)?;

        let new_parent_id = placement_parent(&mut tx, &placement).await?;

        if let Some(new_parent_id) = new_parent_id {
            if new_parent_id == moving.id || is_descendant(&mut tx, moving.id, new_parent_id).await? {
                return Err(CuratorError::invalid(
                    "cannot move a tag into its own subtree",
                ));
            }
        }

        let position = Self::resolve_position(&mut tx, &placement).await?;

        sqlx::query("UPDATE tags SET parent_id = ?, position = ?, updated_at = ? WHERE id = ?")
            .bind(new_parent_id)
            .bind(position)
            .bind(Utc::now().to_rfc3339())
            .bind(moving.id)
            .execute(&mut *tx)
            .await?;

        let subtree = subtree_ids(&mut tx, moving.id).await?;
        let affected = affected_image_uuids(&mut tx, &subtree).await?;

        rebuild_closure_for_subtree(&mut tx, moving.id, new_parent_id).await?;

        tx.commit().await?;
        Ok(affected)
    }

    /// Deletes a tag and its entire subtree. Returns the UUIDs of images
    /// that were associated with any deleted tag, so the caller can fan out
    /// reindex work.
    pub async fn delete(&self, uuid: Uuid) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let tag_id: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let tag_id = tag_id.ok_or(CuratorError::NotFound)?;

        let subtree = subtree_ids(&mut tx, tag_id).await?;
        let affected = affected_image_uuids(&mut tx, &subtree).await?;

        // ON DELETE CASCADE on tags/tag_closure/image_tags removes the rest.
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(affected)
    }

    /// UUIDs of every image associated with `uuid` or any tag in its
    /// subtree, for callers (e.g. the Services Layer) that need to fan out
    /// reindex work after a change that does not itself return the list.
    pub async fn affected_image_uuids(&self, uuid: Uuid) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let tag_id = resolve_tag_id(&mut tx, uuid).await?;
        let subtree = subtree_ids(&mut tx, tag_id).await?;
        let affected = affected_image_uuids(&mut tx, &subtree).await?;
        tx.commit().await?;
        Ok(affected)
    }

    /// The UUID of `tag`'s parent, if any, resolved from its internal
    /// `parent_id`. Used to build the Text Index and Hierarchy Cache
    /// representations, which key parents by UUID rather than internal id.
    pub async fn parent_uuid(&self, tag: &Tag) -> Result<Option<Uuid>> {
        match tag.parent_id {
            None => Ok(None),
            Some(parent_id) => {
                let uuid: String = sqlx::query_scalar("SELECT uuid FROM tags WHERE id = ?")
                    .bind(parent_id)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(Some(
                    Uuid::parse_str(&uuid).map_err(|e| CuratorError::internal(e.to_string()))?,
                ))
            }
        }
    }

    /// Every tag in the subtree rooted at `uuid`, including itself. Used by
    /// the Services Layer to learn which Text Index and Hierarchy Cache
    /// entries to remove for a deleted subtree before the Primary Store
    /// cascade removes the underlying rows.
    pub async fn subtree(&self, uuid: Uuid) -> Result<Vec<Tag>> {
        let mut tx = self.pool.begin().await?;
        let tag_id = resolve_tag_id(&mut tx, uuid).await?;
        let ids = subtree_ids(&mut tx, tag_id).await?;

        let placeholders = std::iter::repeat("?").take(ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at \
             FROM tags WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, TagRow>(&sql);
        for id in &ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    /// Every tag UUID, for the Services Layer's startup reindex pass.
    pub async fn all_uuids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT uuid FROM tags")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(uuid,)| Uuid::parse_str(&uuid).map_err(|e| CuratorError::internal(e.to_string())))
            .collect()
    }

    pub async fn get_children(&self, parent_uuid: Option<Uuid>) -> Result<Vec<Tag>> {
        let parent_id = match parent_uuid {
            Some(u) => Some(self.get_by_uuid(u).await?.id),
            None => None,
        };
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, uuid, name, description, parent_id, position, created_at, updated_at FROM tags WHERE parent_id IS ? ORDER BY position ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn resolve_position(tx: &mut Transaction<'_, Sqlite>, placement: &Placement) -> Result<i64> {
        match placement {
            Placement::Inside { parent } => {
                let parent_id = match parent {
                    Some(u) => Some(resolve_tag_id(tx, *u).await?),
                    None => None,
                };
                let max: Option<i64> =
                    sqlx::query_scalar("SELECT MAX(position) FROM tags WHERE parent_id IS ?")
                        .bind(parent_id)
                        .fetch_one(&mut **tx)
                        .await?;
                Ok(max.map(|m| m + GAP).unwrap_or(GAP))
            }
            Placement::Before { sibling } => {
                let sibling_id = resolve_tag_id(tx, *sibling).await?;
                let (parent_id, sibling_position) = sibling_parent_and_position(tx, sibling_id).await?;
                let candidate = sibling_position - 1;
                if slot_free(tx, parent_id, candidate).await? {
                    Ok(candidate)
                } else {
                    renormalise_siblings(tx, parent_id).await?;
                    let (_, sibling_position) = sibling_parent_and_position(tx, sibling_id).await?;
                    Ok(sibling_position - 1)
                }
            }
            Placement::After { sibling } => {
                let sibling_id = resolve_tag_id(tx, *sibling).await?;
                let (parent_id, sibling_position) = sibling_parent_and_position(tx, sibling_id).await?;
                let candidate = sibling_position + 1;
                if slot_free(tx, parent_id, candidate).await? {
                    Ok(candidate)
                } else {
                    renormalise_siblings(tx, parent_id).await?;
                    let (_, sibling_position) = sibling_parent_and_position(tx, sibling_id).await?;
                    Ok(sibling_position + 1)
                }
            }
        }
    }
}

async fn resolve_tag_id(tx: &mut Transaction<'_, Sqlite>, uuid: Uuid) -> Result<i64> {
    sqlx::query_scalar("SELECT id FROM tags WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CuratorError::NotFound)
}

async fn placement_parent(
    tx: &mut Transaction<'_, Sqlite>,
    placement: &Placement,
) -> Result<Option<i64>> {
    match placement {
        Placement::Inside { parent } => match parent {
            Some(u) => Ok(Some(resolve_tag_id(tx, *u).await?)),
            None => Ok(None),
        },
        Placement::Before { sibling } | Placement::After { sibling } => {
            let sibling_id = resolve_tag_id(tx, *sibling).await?;
            let parent_id: Option<i64> = sqlx::query_scalar("SELECT parent_id FROM tags WHERE id = ?")
                .bind(sibling_id)
                .fetch_one(&mut **tx)
                .await?;
            Ok(parent_id)
        }
    }
}

async fn sibling_parent_and_position(
    tx: &mut Transaction<'_, Sqlite>,
    tag_id: i64,
) -> Result<(Option<i64>, i64)> {
    let row: (Option<i64>, i64) =
        sqlx::query_as("SELECT parent_id, position FROM tags WHERE id = ?")
            .bind(tag_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(row)
}

async fn slot_free(tx: &mut Transaction<'_, Sqlite>, parent_id: Option<i64>, position: i64) -> Result<bool> {
    let occupied: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM tags WHERE parent_id IS ? AND position = ?")
            .bind(parent_id)
            .bind(position)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(occupied.is_none())
}

/// Rewrites every sibling under `parent_id` to `G, 2G, 3G, ...` in ascending
/// position order. Staged through a disjoint negative range first since
/// SQLite's UNIQUE index on `(parent_id, position)` is checked immediately,
/// not at commit.
async fn renormalise_siblings(tx: &mut Transaction<'_, Sqlite>, parent_id: Option<i64>) -> Result<()> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM tags WHERE parent_id IS ? ORDER BY position ASC",
    )
    .bind(parent_id)
    .fetch_all(&mut **tx)
    .await?;

    for (i, id) in ids.iter().enumerate() {
        let staging_position = -1 - i as i64;
        sqlx::query("UPDATE tags SET position = ? WHERE id = ?")
            .bind(staging_position)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    for (i, id) in ids.iter().enumerate() {
        let final_position = GAP * (i as i64 + 1);
        sqlx::query("UPDATE tags SET position = ? WHERE id = ?")
            .bind(final_position)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn is_descendant(tx: &mut Transaction<'_, Sqlite>, ancestor_id: i64, candidate_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM tag_closure WHERE ancestor = ? AND descendant = ?",
    )
    .bind(ancestor_id)
    .bind(candidate_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(found.is_some())
}

async fn copy_ancestor_closure(tx: &mut Transaction<'_, Sqlite>, parent_id: i64, new_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tag_closure (ancestor, descendant, depth)
        SELECT ancestor, ?, depth + 1 FROM tag_closure WHERE descendant = ?
        "#,
    )
    .bind(new_id)
    .bind(parent_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// All tag ids in the subtree rooted at `tag_id`, including itself.
async fn subtree_ids(tx: &mut Transaction<'_, Sqlite>, tag_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar("SELECT descendant FROM tag_closure WHERE ancestor = ?")
        .bind(tag_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(CuratorError::from)
}

async fn affected_image_uuids(tx: &mut Transaction<'_, Sqlite>, tag_ids: &[i64]) -> Result<Vec<Uuid>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat("?").take(tag_ids.len()).collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT DISTINCT i.uuid FROM images i JOIN image_tags it ON it.image_id = i.id WHERE it.tag_id IN ({placeholders})"
    );
    let mut query = sqlx::query_scalar::<_, String>(&sql);
    for id in tag_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(&mut **tx).await?;
    rows.into_iter()
        .map(|s| Uuid::parse_str(&s).map_err(|e| CuratorError::internal(e.to_string())))
        .collect()
}

/// Deletes every closure row whose descendant is in the moved subtree, then
/// regenerates it: each node is its own depth-0 ancestor, and each node
/// inherits its new parent's ancestors at depth+1.
async fn rebuild_closure_for_subtree(
    tx: &mut Transaction<'_, Sqlite>,
    moved_id: i64,
    new_parent_id: Option<i64>,
) -> Result<()> {
    let subtree = subtree_ids(tx, moved_id).await?;

    let placeholders = std::iter::repeat("?").take(subtree.len()).collect::<Vec<_>>().join(",");
    let delete_sql = format!("DELETE FROM tag_closure WHERE descendant IN ({placeholders})");
    let mut query = sqlx::query(&delete_sql);
    for id in &subtree {
        query = query.bind(id);
    }
    query.execute(&mut **tx).await?;

    // Self rows for the whole subtree.
    for id in &subtree {
        sqlx::query("INSERT INTO tag_closure (ancestor, descendant, depth) VALUES (?, ?, 0)")
            .bind(id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    // New external ancestry for the moved node and everything beneath it:
    // walk the subtree breadth-first from `moved_id`, tracking each node's
    // chain of ancestors including those inherited from `new_parent_id`.
    let mut frontier = vec![(moved_id, 0u32)];
    let mut depth_guard = 0u32;
    while let Some((node_id, _)) = frontier.pop() {
        depth_guard += 1;
        if depth_guard > MAX_DEPTH * 1024 {
            return Err(CuratorError::internal("tag subtree exceeds depth guard"));
        }

        if node_id == moved_id {
            if let Some(parent_id) = new_parent_id {
                copy_ancestor_closure(tx, parent_id, node_id).await?;
            }
        } else {
            let parent_id: Option<i64> = sqlx::query_scalar("SELECT parent_id FROM tags WHERE id = ?")
                .bind(node_id)
                .fetch_one(&mut **tx)
                .await?;
            if let Some(parent_id) = parent_id {
                copy_ancestor_closure(tx, parent_id, node_id).await?;
            }
        }

        let children: Vec<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE parent_id = ?")
            .bind(node_id)
            .fetch_all(&mut **tx)
            .await?;
        for child in children {
            frontier.push((child, 0));
        }
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    uuid: String,
    name: String,
    description: String,
    parent_id: Option<i64>,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            uuid: Uuid::parse_str(&row.uuid).expect("stored uuid is valid"),
            name: row.name,
            description: row.description,
            parent_id: row.parent_id,
            position: row.position,
            created_at: row.created_at.parse().expect("stored timestamp is valid"),
            updated_at: row.updated_at.parse().expect("stored timestamp is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ps::{create_database_pool, migrations, DatabaseConfig};
    use tempfile::TempDir;

    async fn test_repo() -> (TagRepository, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tags.db");
        let config = DatabaseConfig::with_path(path.to_string_lossy().to_string());
        let pool = create_database_pool(&config).await.unwrap();
        migrations::run(&pool).await.unwrap();
        (TagRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn root_insert_gets_self_closure_row() {
        let (repo, _dir) = test_repo().await;
        let tag = repo
            .create(
                NewTag {
                    name: "animals".into(),
                    description: String::new(),
                    parent_uuid: None,
                },
                Placement::Inside { parent: None },
            )
            .await
            .unwrap();
        assert_eq!(tag.position, GAP);
        assert_eq!(tag.parent_id, None);
    }

    #[tokio::test]
    async fn child_closure_includes_all_ancestors() {
        let (repo, _dir) = test_repo().await;
        let a = repo
            .create(
                NewTag { name: "a".into(), description: String::new(), parent_uuid: None },
                Placement::Inside { parent: None },
            )
            .await
            .unwrap();
        let b = repo
            .create(
                NewTag { name: "b".into(), description: String::new(), parent_uuid: Some(a.uuid) },
                Placement::Inside { parent: Some(a.uuid) },
            )
            .await
            .unwrap();
        let c = repo
            .create(
                NewTag { name: "c".into(), description: String::new(), parent_uuid: Some(b.uuid) },
                Placement::Inside { parent: Some(b.uuid) },
            )
            .await
            .unwrap();

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT ancestor, depth FROM tag_closure WHERE descendant = ? ORDER BY depth",
        )
        .bind(c.id)
        .fetch_all(&repo.pool)
        .await
        .unwrap();

        assert_eq!(rows, vec![(c.id, 0), (b.id, 1), (a.id, 2)]);
    }

    #[tokio::test]
    async fn moving_into_own_subtree_is_rejected() {
        let (repo, _dir) = test_repo().await;
        let a = repo
            .create(
                NewTag { name: "a".into(), description: String::new(), parent_uuid: None },
                Placement::Inside { parent: None },
            )
            .await
            .unwrap();
        let b = repo
            .create(
                NewTag { name: "b".into(), description: String::new(), parent_uuid: Some(a.uuid) },
                Placement::Inside { parent: Some(a.uuid) },
            )
            .await
            .unwrap();

        let result = repo.move_tag(a.uuid, Placement::Inside { parent: Some(b.uuid) }).await;
        assert!(matches!(result, Err(CuratorError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn sibling_positions_strictly_increase_after_many_inserts() {
        let (repo, _dir) = test_repo().await;
        let root = repo
            .create(
                NewTag { name: "root".into(), description: String::new(), parent_uuid: None },
                Placement::Inside { parent: None },
            )
            .await
            .unwrap();

        let mut last: Option<Uuid> = None;
        for i in 0..25 {
            let placement = match last {
                None => Placement::Inside { parent: Some(root.uuid) },
                Some(prev) => Placement::After { sibling: prev },
            };
            let child = repo
                .create(
                    NewTag { name: format!("child-{i}"), description: String::new(), parent_uuid: Some(root.uuid) },
                    placement,
                )
                .await
                .unwrap();
            last = Some(child.uuid);
        }

        let children = repo.get_children(Some(root.uuid)).await.unwrap();
        let positions: Vec<i64> = children.iter().map(|t| t.position).collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        for w in positions.windows(2) {
            assert!(w[1] > w[0]);
        }
    }
}
